//! Change-data-capture codecs for EOS-style contracts
//!
//! Contract ABIs are turned into Avro schemas for table and action
//! notifications, registered in a schema registry, and compiled into codecs
//! producing Confluent wire-format messages. ABI changes observed on chain,
//! including forks, invalidate the codecs built from the replaced ABI.
//!
//! Layers:
//! - [`domain`]: ABI model, native values, collaborator traits
//! - [`schema`]: schema node model, type resolver, message envelopes
//! - [`store`]: fork-aware ABI version store, persistent ABI cache
//! - [`codec`]: codecs, converters, codec cache and the [`StreamedAbiCodec`] façade
//! - [`infrastructure`]: binary decoders, registry clients, Avro engine
//! - [`config`]: TOML configuration

pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod schema;
pub mod store;

pub use codec::{Codec, CodecId, Collaborators, StreamedAbiCodec};
pub use config::Config;
pub use domain::abi::{AbiDefinition, AbiVersion};
pub use domain::{ForkStep, NativeValue};
pub use error::{CodecError, EntityKind, RegistryError, Result};
pub use store::ApplyOutcome;
