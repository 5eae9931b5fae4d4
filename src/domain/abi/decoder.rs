//! ABI collaborator traits: binary ABI decoding, row decoding, bootstrap

use async_trait::async_trait;

use super::{AbiDefinition, AbiVersion};
use crate::domain::value::NativeValue;
use crate::error::Result;

/// Decodes the binary ABI carried by a `setabi` action
///
/// This trait abstracts over the actual binary layout so the version store
/// can be tested with canned definitions.
pub trait AbiDecoder: Send + Sync {
    /// Decode a hex encoded binary ABI
    ///
    /// # Arguments
    /// * `trx_id` - Transaction that carried the payload (for diagnostics)
    /// * `account` - Account the ABI is published for
    /// * `hex_payload` - The hex encoded ABI bytes
    fn decode_abi(&self, trx_id: &str, account: &str, hex_payload: &str)
        -> Result<AbiDefinition>;
}

/// Decodes raw table rows into native values using an ABI
pub trait RowDecoder: Send + Sync {
    /// Decode `data` as an instance of `type_name`
    ///
    /// # Returns
    /// * `Ok(NativeValue::Object(..))` - For struct types
    /// * `Err(CodecError::RowDecode)` - If the bytes do not match the type
    fn decode_row(&self, abi: &AbiDefinition, type_name: &str, data: &[u8])
        -> Result<NativeValue>;
}

/// Source of an account's ABI when no version has been observed yet
#[async_trait]
pub trait AbiRepository: Send + Sync {
    /// ABI effective for `account` at `block_num`
    async fn get_abi(&self, account: &str, block_num: u32) -> Result<AbiVersion>;

    /// True when the repository has neither overrides nor a remote service
    fn is_noop(&self) -> bool;
}
