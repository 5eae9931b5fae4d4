//! ABI domain models and contracts
//!
//! This module defines the contract ABI model, the versioned entries tracked
//! per account, and the collaborator traits used to decode and fetch ABIs,
//! independent of the underlying implementations.

mod decoder;
mod definition;

use std::sync::Arc;

pub use decoder::{AbiDecoder, AbiRepository, RowDecoder};
pub use definition::{
    AbiDefinition, ActionDef, ClauseDef, FieldDef, StructDef, TableDef, TypeDef, VariantDef,
};

/// An ABI as known at a given chain position
#[derive(Debug, Clone, PartialEq)]
pub struct AbiVersion {
    pub abi: Arc<AbiDefinition>,
    /// Block at which this ABI became effective
    pub block_num: u32,
    pub account: String,
    pub irreversible: bool,
}

impl AbiVersion {
    pub fn new(
        account: impl Into<String>,
        abi: impl Into<Arc<AbiDefinition>>,
        block_num: u32,
        irreversible: bool,
    ) -> Self {
        Self {
            abi: abi.into(),
            block_num,
            account: account.into(),
            irreversible,
        }
    }
}
