//! ABI infrastructure - binary decoding, file loading and bootstrap

pub(crate) mod binary;
mod decoder;
mod loader;
mod resolver;
mod rows;

pub use binary::{name_to_string, string_to_name, BinaryReader};
pub use decoder::BinaryAbiDecoder;
pub use loader::{AbiFileLoader, AbiScan};
pub use resolver::AbiBootstrapRepository;
pub use rows::BinaryRowDecoder;
