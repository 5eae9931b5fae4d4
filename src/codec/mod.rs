//! Codecs: registered schemas compiled into encode/decode functions
//!
//! This module provides:
//! - [`CodecId`] and [`Codec`], the cache key and the cached value
//! - The [`AvroEngine`] contract implemented by the binary Avro adapter
//! - Domain value converters
//! - The codec cache and the [`StreamedAbiCodec`] façade

pub mod cache;
pub mod converters;
pub mod service;

use std::sync::Arc;

use crate::domain::value::NativeValue;
use crate::error::{CodecError, Result};

pub use cache::CodecCache;
pub use converters::Converters;
pub use service::{Collaborators, StreamedAbiCodec};

/// Confluent wire format magic byte
pub const MAGIC_BYTE: u8 = 0;
const HEADER_LEN: usize = 5;

/// Cache key: one codec per (account, entity) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodecId {
    pub account: String,
    pub name: String,
}

impl CodecId {
    pub fn new(account: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for CodecId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.account, self.name)
    }
}

/// A schema compiled by an [`AvroEngine`]
pub trait CompiledSchema: Send + Sync {
    /// Encode `value` as an Avro datum (no header)
    fn encode(&self, value: &NativeValue) -> Result<Vec<u8>>;

    /// Decode an Avro datum (no header)
    fn decode(&self, datum: &[u8]) -> Result<NativeValue>;
}

/// Binary Avro engine
///
/// This trait abstracts over the Avro implementation so the codec cache can
/// be exercised without one.
pub trait AvroEngine: Send + Sync {
    /// Compile an Avro JSON schema with the given converters installed
    fn compile(&self, schema: &str, converters: &Converters) -> Result<Arc<dyn CompiledSchema>>;
}

/// A registered schema ready to encode and decode messages
#[derive(Clone)]
pub struct Codec {
    id: u32,
    version: u32,
    subject: String,
    schema: String,
    registry_url: String,
    compiled: Arc<dyn CompiledSchema>,
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("subject", &self.subject)
            .field("registry_url", &self.registry_url)
            .finish_non_exhaustive()
    }
}

impl Codec {
    pub fn new(
        id: u32,
        version: u32,
        subject: impl Into<String>,
        schema: impl Into<String>,
        registry_url: impl Into<String>,
        compiled: Arc<dyn CompiledSchema>,
    ) -> Self {
        Self {
            id,
            version,
            subject: subject.into(),
            schema: schema.into(),
            registry_url: registry_url.into(),
            compiled,
        }
    }

    /// Registry-assigned schema id
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Registry-assigned version within the subject
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Avro JSON schema
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// URL of the schema in the registry
    pub fn schema_url(&self) -> String {
        format!(
            "{}/schemas/ids/{}",
            self.registry_url.trim_end_matches('/'),
            self.id
        )
    }

    /// Encode `value` in the Confluent wire format: magic byte, big-endian
    /// schema id, Avro datum
    pub fn marshal(&self, value: &NativeValue) -> Result<Vec<u8>> {
        let datum = self.compiled.encode(value)?;
        let mut buf = Vec::with_capacity(HEADER_LEN + datum.len());
        buf.push(MAGIC_BYTE);
        buf.extend_from_slice(&self.id.to_be_bytes());
        buf.extend_from_slice(&datum);
        Ok(buf)
    }

    /// Decode a message produced by [`Codec::marshal`]
    pub fn unmarshal(&self, bytes: &[u8]) -> Result<NativeValue> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::Codec(format!(
                "message too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0] != MAGIC_BYTE {
            return Err(CodecError::Codec(format!("invalid magic byte {}", bytes[0])));
        }
        let id = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        if id != self.id {
            return Err(CodecError::Codec(format!(
                "message written with schema {id}, codec uses {}",
                self.id
            )));
        }
        self.compiled.decode(&bytes[HEADER_LEN..])
    }

    /// Message headers pointing consumers at the schema
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("content-type", "application/avro".to_string()),
            ("ce_dataschema", self.schema_url()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Datum is the debug text of the value; enough to check framing
    struct DebugSchema;

    impl CompiledSchema for DebugSchema {
        fn encode(&self, value: &NativeValue) -> Result<Vec<u8>> {
            match value {
                NativeValue::String(s) => Ok(s.as_bytes().to_vec()),
                other => Err(CodecError::Codec(format!("unsupported {other:?}"))),
            }
        }

        fn decode(&self, datum: &[u8]) -> Result<NativeValue> {
            Ok(NativeValue::String(String::from_utf8_lossy(datum).into_owned()))
        }
    }

    fn codec() -> Codec {
        Codec::new(
            258,
            3,
            "io.dkafka.DKafkaCheckpoint",
            "{}",
            "http://registry:8081/",
            Arc::new(DebugSchema),
        )
    }

    #[test]
    fn test_codec_id_display() {
        assert_eq!(CodecId::new("eosio.token", "accounts").to_string(), "eosio.token::accounts");
    }

    #[test]
    fn test_marshal_prefixes_magic_and_id() {
        let bytes = codec().marshal(&NativeValue::from("hi")).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 1, 2, b'h', b'i']);
        assert_eq!(codec().unmarshal(&bytes).unwrap(), NativeValue::from("hi"));
    }

    #[test]
    fn test_unmarshal_rejects_foreign_messages() {
        let codec = codec();
        assert!(codec.unmarshal(&[0, 0, 0]).is_err());
        assert!(codec.unmarshal(&[1, 0, 0, 1, 2]).is_err());
        assert!(codec.unmarshal(&[0, 0, 0, 0, 9, b'x']).is_err());
    }

    #[test]
    fn test_headers() {
        let headers = codec().headers();
        assert_eq!(headers[0], ("content-type", "application/avro".to_string()));
        assert_eq!(
            headers[1],
            ("ce_dataschema", "http://registry:8081/schemas/ids/258".to_string())
        );
    }
}
