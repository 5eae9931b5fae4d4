//! Error taxonomy for schema generation, registry sync and ABI tracking

use thiserror::Error;

/// Convenience alias used across the crate
pub type Result<T, E = CodecError> = std::result::Result<T, E>;

/// Failures surfaced to callers of the codec façade.
///
/// Fork-notification edge cases (stale undo, unknown step) are not errors:
/// they are reported through [`crate::store::ApplyOutcome`] and logged.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("no ABI known for account '{account}' at block {block_num}: {reason}")]
    DefinitionNotFound {
        account: String,
        block_num: u32,
        reason: String,
    },

    #[error("cannot resolve type '{type_name}': {reason}")]
    TypeUnresolvable { type_name: String, reason: String },

    #[error("{kind} '{name}' not found in ABI")]
    EntityNotFound { kind: EntityKind, name: String },

    #[error("invalid Avro name or namespace: {0}")]
    InvalidName(String),

    #[error("schema registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("cannot align compatibility of subject '{subject}': {reason}")]
    CompatibilityConflict { subject: String, reason: String },

    #[error("row decode error: {0}")]
    RowDecode(String),

    #[error("ABI decode error: {0}")]
    AbiDecode(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("cannot register static schema '{name}': {source}")]
    StaticSchema {
        name: String,
        #[source]
        source: Box<CodecError>,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl CodecError {
    pub(crate) fn unresolvable(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TypeUnresolvable {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }
}

/// Kind of contract entity a schema is generated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Action,
    Table,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Action => f.write_str("action"),
            Self::Table => f.write_str("table"),
        }
    }
}

/// Schema registry communication failures
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registry answered {code}: {message}")]
    Status { code: u16, message: String },

    #[error("unexpected registry response: {0}")]
    Decode(String),

    #[error("subject '{0}' not found")]
    SubjectNotFound(String),
}
