//! Schema registry clients
//!
//! This module defines the registry contract used by the codec façade and
//! two implementations: a Confluent REST client and an in-memory registry.

mod http;
mod memory;

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, RegistryError};

pub use http::HttpSchemaRegistry;
pub use memory::{InMemorySchemaRegistry, RegistryCall};

/// Subject compatibility policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompatibilityLevel {
    None,
    Backward,
    BackwardTransitive,
    #[default]
    Forward,
    ForwardTransitive,
    Full,
    FullTransitive,
}

impl CompatibilityLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Backward => "BACKWARD",
            Self::BackwardTransitive => "BACKWARD_TRANSITIVE",
            Self::Forward => "FORWARD",
            Self::ForwardTransitive => "FORWARD_TRANSITIVE",
            Self::Full => "FULL",
            Self::FullTransitive => "FULL_TRANSITIVE",
        }
    }
}

impl std::fmt::Display for CompatibilityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompatibilityLevel {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(Self::None),
            "BACKWARD" => Ok(Self::Backward),
            "BACKWARD_TRANSITIVE" => Ok(Self::BackwardTransitive),
            "FORWARD" => Ok(Self::Forward),
            "FORWARD_TRANSITIVE" => Ok(Self::ForwardTransitive),
            "FULL" => Ok(Self::Full),
            "FULL_TRANSITIVE" => Ok(Self::FullTransitive),
            other => Err(CodecError::Config(format!(
                "unknown compatibility level '{other}'"
            ))),
        }
    }
}

/// A schema as stored by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredSchema {
    pub id: u32,
    pub version: u32,
    pub subject: String,
    pub schema: String,
}

/// Schema registry operations used by the codec façade
#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    /// Compatibility level of `subject`, `None` when the subject is unknown
    async fn get_compatibility(
        &self,
        subject: &str,
    ) -> Result<Option<CompatibilityLevel>, RegistryError>;

    async fn set_compatibility(
        &self,
        subject: &str,
        level: CompatibilityLevel,
    ) -> Result<(), RegistryError>;

    /// Register an Avro schema under `subject`, or find the identical one
    async fn create_schema(&self, subject: &str, schema: &str)
        -> Result<RegisteredSchema, RegistryError>;
}
