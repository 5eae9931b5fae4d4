//! Avro schema generation from contract ABIs
//!
//! This module provides:
//! - The schema node model serialized as Avro JSON
//! - Built-in type tables for table rows and action arguments
//! - The recursive type resolver
//! - Message envelopes for table and action notifications

pub mod builtins;
pub mod message;
pub mod names;
pub mod node;
pub mod resolver;

pub use builtins::ResolveMode;
pub use message::{
    action_schema, checkpoint_schema, table_schema, MessageSchemaGenerator, MessageSchemaSupplier,
    SchemaOptions, DKAFKA_NAMESPACE,
};
pub use node::{Field, MessageSchema, MetaSchema, Primitive, RecordSchema, Scalar, Schema};
pub use resolver::{Memo, TypeResolver};
