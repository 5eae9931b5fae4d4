//! State: the fork-aware ABI version store and the persistent ABI cache

pub mod abi_cache;
pub mod versions;

pub use abi_cache::{AbiCache, CachedAbi};
pub use versions::{AbiEvent, AbiVersionStore, ApplyOutcome};
