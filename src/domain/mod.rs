//! Domain layer - pure models and collaborator contracts

pub mod abi;
pub mod fork;
pub mod value;

pub use fork::ForkStep;
pub use value::{Asset, ExtendedAsset, KeyMaterial, NativeValue, Symbol};
