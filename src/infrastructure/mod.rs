//! Infrastructure layer - External service integrations
//!
//! This layer contains:
//! - Binary ABI and table-row decoding, ABI files and the bootstrap service
//! - Schema registry clients (Confluent REST and in-memory)
//! - The `apache-avro` backed codec engine

pub mod abi;
pub mod avro;
pub mod registry;

pub use abi::{AbiBootstrapRepository, AbiFileLoader, BinaryAbiDecoder, BinaryRowDecoder};
pub use avro::ApacheAvroEngine;
pub use registry::{HttpSchemaRegistry, InMemorySchemaRegistry, SchemaRegistry};
