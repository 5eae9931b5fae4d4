//! Streamed ABI codec: ABI tracking, schema generation and registry sync
//!
//! The façade ties the version store, the type resolver and the schema
//! registry together. Codecs are built lazily per (account, entity) and
//! dropped whenever an ABI changes.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{AvroEngine, Codec, CodecCache, CodecId, Converters};
use crate::domain::abi::{AbiDecoder, AbiRepository, AbiVersion, RowDecoder};
use crate::domain::fork::ForkStep;
use crate::domain::value::NativeValue;
use crate::error::{CodecError, EntityKind, Result};
use crate::infrastructure::registry::{CompatibilityLevel, SchemaRegistry};
use crate::schema::{checkpoint_schema, MessageSchema, MessageSchemaSupplier};
use crate::store::{AbiVersionStore, ApplyOutcome};

/// External collaborators of a [`StreamedAbiCodec`]
#[derive(Clone)]
pub struct Collaborators {
    /// Source of an account's ABI before any `setabi` was seen
    pub bootstrapper: Arc<dyn AbiRepository>,
    pub abi_decoder: Arc<dyn AbiDecoder>,
    pub row_decoder: Arc<dyn RowDecoder>,
    pub schemas: Arc<dyn MessageSchemaSupplier>,
    pub registry: Arc<dyn SchemaRegistry>,
    pub engine: Arc<dyn AvroEngine>,
}

/// Lazily built, registry-backed codecs for the entities of tracked
/// accounts
pub struct StreamedAbiCodec {
    versions: Mutex<AbiVersionStore>,
    cache: Mutex<CodecCache>,
    collaborators: Collaborators,
    converters: Converters,
    compatibility: CompatibilityLevel,
    registry_url: String,
}

impl StreamedAbiCodec {
    /// Create the codec and register the checkpoint schema.
    ///
    /// # Errors
    /// * `CodecError::StaticSchema` - If the checkpoint schema cannot be
    ///   registered
    pub async fn new(
        collaborators: Collaborators,
        registry_url: impl Into<String>,
        compatibility: CompatibilityLevel,
    ) -> Result<Self> {
        Self::with_static_schemas(
            collaborators,
            registry_url,
            compatibility,
            vec![checkpoint_schema()],
        )
        .await
    }

    /// Create the codec with the given ABI-independent schemas registered
    pub async fn with_static_schemas(
        collaborators: Collaborators,
        registry_url: impl Into<String>,
        compatibility: CompatibilityLevel,
        static_schemas: Vec<MessageSchema>,
    ) -> Result<Self> {
        let versions = AbiVersionStore::new();
        let cache = CodecCache::new(versions.subscribe());
        let codec = Self {
            versions: Mutex::new(versions),
            cache: Mutex::new(cache),
            collaborators,
            converters: Converters::eos(),
            compatibility,
            registry_url: registry_url.into(),
        };

        for schema in static_schemas {
            let name = schema.subject();
            let id = CodecId::new(
                schema.record.namespace.clone().unwrap_or_default(),
                schema.record.name.clone(),
            );
            info!(schema = %name, "register static schema");
            let static_codec = codec.new_codec(schema).await.map_err(|err| {
                CodecError::StaticSchema {
                    name: name.clone(),
                    source: Box::new(err),
                }
            })?;
            codec.cache.lock().await.insert_static(id, static_codec);
        }
        Ok(codec)
    }

    /// True when no ABI can be bootstrapped
    pub fn is_noop(&self) -> bool {
        self.collaborators.bootstrapper.is_noop()
    }

    pub fn compatibility(&self) -> CompatibilityLevel {
        self.compatibility
    }

    /// Codec for `id` as of `block_num`.
    ///
    /// A cache hit performs no I/O. On a miss the ABI is resolved, the
    /// message schema generated and registered, and the compiled codec
    /// cached. Nothing is cached on failure.
    pub async fn get_codec(&self, id: &CodecId, block_num: u32) -> Result<Codec> {
        let mut cache = self.cache.lock().await;
        if let Some(codec) = cache.get(id) {
            return Ok(codec);
        }

        let abi = self.abi(&id.account, block_num).await?;
        debug!(
            codec = %id,
            block_num,
            abi_block_num = abi.block_num,
            "create schema from ABI"
        );
        let schema = self.collaborators.schemas.message_schema(&id.name, &abi)?;
        let codec = self.new_codec(schema).await?;
        cache.insert(id.clone(), codec.clone());
        Ok(codec)
    }

    /// Apply a `setabi` seen at `block_num`.
    ///
    /// Every cached codec built from an ABI is dropped before the next
    /// lookup. A payload that fails to decode changes nothing.
    pub async fn update_abi(
        &self,
        block_num: u32,
        step: ForkStep,
        trx_id: &str,
        account: &str,
        hex_payload: &str,
    ) -> Result<ApplyOutcome> {
        let mut versions = self.versions.lock().await;
        versions.update_abi(
            self.collaborators.abi_decoder.as_ref(),
            block_num,
            step,
            trx_id,
            account,
            hex_payload,
        )
    }

    /// Decode a raw row of `table` with the ABI authoritative at `block_num`
    pub async fn decode_row(
        &self,
        account: &str,
        table: &str,
        data: &[u8],
        block_num: u32,
    ) -> Result<NativeValue> {
        let abi = self.abi(account, block_num).await?;
        let Some(table_def) = abi.abi.table(table) else {
            return Err(CodecError::EntityNotFound {
                kind: EntityKind::Table,
                name: table.to_string(),
            });
        };
        self.collaborators
            .row_decoder
            .decode_row(&abi.abi, &table_def.kind, data)
    }

    /// ABI authoritative for `account`, bootstrapping it when none is known
    pub async fn abi(&self, account: &str, block_num: u32) -> Result<AbiVersion> {
        if let Some(latest) = self.versions.lock().await.latest(account) {
            return Ok(latest.clone());
        }

        let bootstrapped = self
            .collaborators
            .bootstrapper
            .get_abi(account, block_num)
            .await
            .map_err(|err| match err {
                err @ CodecError::DefinitionNotFound { .. } => err,
                other => CodecError::DefinitionNotFound {
                    account: account.to_string(),
                    block_num,
                    reason: other.to_string(),
                },
            })?;
        Ok(self.versions.lock().await.bootstrap(bootstrapped).clone())
    }

    /// Register `schema` and compile it.
    ///
    /// The subject's compatibility is aligned before registering when the
    /// subject exists with another level, after registering when the subject
    /// is new.
    async fn new_codec(&self, mut schema: MessageSchema) -> Result<Codec> {
        schema.meta.compatibility = self.compatibility.to_string();
        let subject = schema.subject();
        let json = schema
            .to_json()
            .map_err(|e| CodecError::Codec(format!("serialize schema {subject}: {e}")))?;
        let registry = &self.collaborators.registry;

        debug!(%subject, "get compatibility level of subject");
        let current = registry.get_compatibility(&subject).await?;
        if let Some(level) = current {
            if level != self.compatibility {
                self.align_compatibility(&subject).await?;
            }
        }

        debug!(%subject, schema = %json, "register schema");
        let registered = registry.create_schema(&subject, &json).await?;
        if current.is_none() {
            self.align_compatibility(&subject).await?;
        }

        debug!(%subject, id = registered.id, "create avro codec");
        let compiled = self
            .collaborators
            .engine
            .compile(&registered.schema, &self.converters)?;
        Ok(Codec::new(
            registered.id,
            registered.version,
            subject,
            registered.schema,
            self.registry_url.clone(),
            compiled,
        ))
    }

    async fn align_compatibility(&self, subject: &str) -> Result<()> {
        debug!(subject, compatibility = %self.compatibility, "set subject compatibility");
        self.collaborators
            .registry
            .set_compatibility(subject, self.compatibility)
            .await
            .map_err(|err| CodecError::CompatibilityConflict {
                subject: subject.to_string(),
                reason: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CompiledSchema;
    use crate::domain::abi::AbiDefinition;
    use crate::infrastructure::registry::{InMemorySchemaRegistry, RegistryCall};
    use crate::schema::{MessageSchemaGenerator, SchemaOptions};
    use async_trait::async_trait;

    const TOKEN_ABI: &str = r#"{
        "version": "eosio::abi/1.1",
        "structs": [
            {"name": "account", "base": "", "fields": [{"name": "balance", "type": "asset"}]}
        ],
        "actions": [],
        "tables": [{"name": "accounts", "index_type": "i64", "type": "account"}]
    }"#;

    struct Passthrough;

    impl CompiledSchema for Passthrough {
        fn encode(&self, _value: &NativeValue) -> Result<Vec<u8>> {
            Ok(vec![1])
        }

        fn decode(&self, _datum: &[u8]) -> Result<NativeValue> {
            Ok(NativeValue::Null)
        }
    }

    struct FakeEngine;

    impl AvroEngine for FakeEngine {
        fn compile(&self, _schema: &str, _converters: &Converters) -> Result<Arc<dyn CompiledSchema>> {
            Ok(Arc::new(Passthrough))
        }
    }

    struct FakeBootstrap {
        known: bool,
    }

    #[async_trait]
    impl AbiRepository for FakeBootstrap {
        async fn get_abi(&self, account: &str, block_num: u32) -> Result<AbiVersion> {
            if !self.known {
                return Err(CodecError::Codec("connection refused".to_string()));
            }
            let abi = AbiDefinition::from_json(TOKEN_ABI)
                .map_err(|e| CodecError::AbiDecode(e.to_string()))?;
            Ok(AbiVersion::new(account, abi, block_num.saturating_sub(1), false))
        }

        fn is_noop(&self) -> bool {
            !self.known
        }
    }

    struct FakeDecoder;

    impl AbiDecoder for FakeDecoder {
        fn decode_abi(&self, _trx_id: &str, _account: &str, _hex: &str) -> Result<AbiDefinition> {
            AbiDefinition::from_json(TOKEN_ABI).map_err(|e| CodecError::AbiDecode(e.to_string()))
        }
    }

    struct EchoRows;

    impl RowDecoder for EchoRows {
        fn decode_row(&self, _abi: &AbiDefinition, type_name: &str, data: &[u8]) -> Result<NativeValue> {
            Ok(NativeValue::object([
                ("type", NativeValue::from(type_name)),
                ("len", NativeValue::Int(data.len() as i64)),
            ]))
        }
    }

    fn collaborators(registry: Arc<InMemorySchemaRegistry>, known: bool) -> Collaborators {
        Collaborators {
            bootstrapper: Arc::new(FakeBootstrap { known }),
            abi_decoder: Arc::new(FakeDecoder),
            row_decoder: Arc::new(EchoRows),
            schemas: Arc::new(MessageSchemaGenerator::new(
                EntityKind::Table,
                SchemaOptions::default(),
            )),
            registry,
            engine: Arc::new(FakeEngine),
        }
    }

    #[tokio::test]
    async fn test_checkpoint_registered_at_startup() {
        let registry = Arc::new(InMemorySchemaRegistry::new());
        let codec = StreamedAbiCodec::new(
            collaborators(registry.clone(), true),
            "http://registry:8081",
            CompatibilityLevel::Forward,
        )
        .await
        .unwrap();

        let subject = "io.dkafka.DKafkaCheckpoint".to_string();
        assert_eq!(
            registry.calls().await,
            vec![
                RegistryCall::GetCompatibility(subject.clone()),
                RegistryCall::CreateSchema(subject.clone()),
                RegistryCall::SetCompatibility(subject, CompatibilityLevel::Forward),
            ]
        );

        let checkpoint = codec
            .get_codec(&CodecId::new("io.dkafka", "DKafkaCheckpoint"), 1)
            .await
            .unwrap();
        assert_eq!(checkpoint.id(), 1);
        assert_eq!(checkpoint.schema_url(), "http://registry:8081/schemas/ids/1");
    }

    #[tokio::test]
    async fn test_static_schema_failure() {
        let registry = Arc::new(InMemorySchemaRegistry::new());
        registry.fail_subject("io.dkafka.DKafkaCheckpoint").await;
        let result = StreamedAbiCodec::new(
            collaborators(registry, true),
            "http://registry:8081",
            CompatibilityLevel::Forward,
        )
        .await;
        match result {
            Err(CodecError::StaticSchema { name, .. }) => {
                assert_eq!(name, "io.dkafka.DKafkaCheckpoint")
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("startup must fail"),
        }
    }

    #[tokio::test]
    async fn test_unknown_account_is_definition_not_found() {
        let registry = Arc::new(InMemorySchemaRegistry::new());
        let codec = StreamedAbiCodec::new(
            collaborators(registry, false),
            "http://registry:8081",
            CompatibilityLevel::Forward,
        )
        .await
        .unwrap();
        assert!(codec.is_noop());

        let err = codec
            .get_codec(&CodecId::new("eosio.token", "accounts"), 42)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::DefinitionNotFound { ref account, block_num: 42, .. } if account == "eosio.token"
        ));
    }

    #[tokio::test]
    async fn test_decode_row_uses_table_type() {
        let registry = Arc::new(InMemorySchemaRegistry::new());
        let codec = StreamedAbiCodec::new(
            collaborators(registry, true),
            "http://registry:8081",
            CompatibilityLevel::Forward,
        )
        .await
        .unwrap();

        let row = codec
            .decode_row("eosio.token", "accounts", &[0; 16], 10)
            .await
            .unwrap();
        assert_eq!(row.as_object().unwrap()["type"], NativeValue::from("account"));

        let err = codec
            .decode_row("eosio.token", "stat", &[], 10)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::EntityNotFound { kind: EntityKind::Table, .. }
        ));
    }

    #[tokio::test]
    async fn test_update_abi_replaces_bootstrapped_version() {
        let registry = Arc::new(InMemorySchemaRegistry::new());
        let codec = StreamedAbiCodec::new(
            collaborators(registry, true),
            "http://registry:8081",
            CompatibilityLevel::Forward,
        )
        .await
        .unwrap();

        assert_eq!(codec.abi("eosio.token", 10).await.unwrap().block_num, 9);
        let outcome = codec
            .update_abi(20, ForkStep::Irreversible, "trx", "eosio.token", "00")
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Installed);

        let latest = codec.abi("eosio.token", 30).await.unwrap();
        assert_eq!(latest.block_num, 20);
        assert!(latest.irreversible);
    }
}
