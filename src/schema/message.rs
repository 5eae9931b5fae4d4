//! Message envelopes wrapping ABI entity records
//!
//! Every CDC message is a top-level record carrying a `context` describing
//! the block and transaction, plus the action or table payload resolved from
//! the account's ABI.

use tracing::debug;

use super::builtins::ResolveMode;
use super::names::{cdc_namespace, to_camel};
use super::node::{Field, MessageSchema, MetaSchema, Primitive, RecordSchema, Scalar, Schema};
use super::resolver::{Memo, TypeResolver};
use crate::domain::abi::AbiVersion;
use crate::error::{EntityKind, Result};

/// Namespace of the envelope records shared by every message
pub const DKAFKA_NAMESPACE: &str = "io.dkafka";

const NOTIFICATION: &str = "notification";
const DEFAULT_COMPATIBILITY: &str = "FORWARD";

const CHECKPOINT_DOC: &str = "Periodically emitted checkpoint used to save the current position";
const CHECKPOINT_STEP_DOC: &str = "Step of the current block value can be: 1(New),2(Undo),3(Redo),4(Handoff),5(Irreversible),6(Stalled)\n - 1(New): First time we're seeing this block\n - 2(Undo): We are undoing this block (it was done previously)\n - 4(Redo): We are redoing this block (it was done previously)\n - 8(Handoff): The block passed a handoff from one producer to another\n - 16(Irreversible): This block passed the LIB barrier and is in chain\n - 32(Stalled): This block passed the LIB and is definitely forked out\n";
const BLOCK_REF_DOC: &str = "BlockRef represents a reference to a block and is mainly define as the pair <BlockID, BlockNum>";

/// Naming and metadata shared by generated schemas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaOptions {
    /// Base namespace, may be empty
    pub namespace: String,
    pub major_version: u32,
    /// Semantic version written in `meta`
    pub version: String,
    /// Domain written in `meta`, the account when unset
    pub domain: Option<String>,
    pub compatibility: String,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            namespace: DKAFKA_NAMESPACE.to_string(),
            major_version: 1,
            version: "1.0.0".to_string(),
            domain: None,
            compatibility: DEFAULT_COMPATIBILITY.to_string(),
        }
    }
}

impl SchemaOptions {
    fn meta(&self, account: &str) -> MetaSchema {
        MetaSchema {
            compatibility: self.compatibility.clone(),
            kind: NOTIFICATION.to_string(),
            version: Some(self.version.clone()),
            domain: Some(self.domain.clone().unwrap_or_else(|| account.to_string())),
        }
    }
}

/// Produces the message schema of one entity of an ABI
pub trait MessageSchemaSupplier: Send + Sync {
    fn message_schema(&self, entity: &str, abi: &AbiVersion) -> Result<MessageSchema>;
}

/// Generates table or action notifications, depending on its kind
#[derive(Debug, Clone)]
pub struct MessageSchemaGenerator {
    kind: EntityKind,
    options: SchemaOptions,
}

impl MessageSchemaGenerator {
    pub fn new(kind: EntityKind, options: SchemaOptions) -> Self {
        Self { kind, options }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }
}

impl MessageSchemaSupplier for MessageSchemaGenerator {
    fn message_schema(&self, entity: &str, abi: &AbiVersion) -> Result<MessageSchema> {
        match self.kind {
            EntityKind::Table => table_schema(entity, abi, &self.options),
            EntityKind::Action => action_schema(entity, abi, &self.options),
        }
    }
}

/// `{Camel}TableNotification` for table `table` of `abi`
pub fn table_schema(table: &str, abi: &AbiVersion, options: &SchemaOptions) -> Result<MessageSchema> {
    let camel = to_camel(table);
    let namespace = cdc_namespace(&options.namespace, &abi.account, "tables", options.major_version)?;
    let name = format!("{camel}TableNotification");
    let op_info_name = format!("{camel}TableOpInfo");
    let row_name = format!("{camel}TableOp");
    debug!(%namespace, %name, %op_info_name, %row_name, "generate table schema");

    let mut memo = Memo::new();
    memo.claim(&name);
    memo.claim(&op_info_name);
    let row = TypeResolver::new(&abi.abi, ResolveMode::Table).entity_record(
        EntityKind::Table,
        table,
        &row_name,
        &mut memo,
    )?;

    let record = RecordSchema::new(
        name,
        vec![
            Field::new("context", notification_context()),
            Field::new("action", action_info_basic()),
            Field::new("db_op", table_op_info(op_info_name, row)),
        ],
    )
    .with_namespace(namespace);
    Ok(MessageSchema {
        record,
        meta: options.meta(&abi.account),
    })
}

/// `{Camel}ActionNotification` for action `action` of `abi`
pub fn action_schema(action: &str, abi: &AbiVersion, options: &SchemaOptions) -> Result<MessageSchema> {
    let camel = to_camel(action);
    let namespace = cdc_namespace(&options.namespace, &abi.account, "actions", options.major_version)?;
    let name = format!("{camel}ActionNotification");
    let info_name = format!("{camel}ActionInfo");
    let params_name = format!("{camel}ActionParams");
    debug!(%namespace, %name, %info_name, %params_name, "generate action schema");

    let mut memo = Memo::new();
    memo.claim(&name);
    memo.claim(&info_name);
    let params = TypeResolver::new(&abi.abi, ResolveMode::Action).entity_record(
        EntityKind::Action,
        action,
        &params_name,
        &mut memo,
    )?;

    let record = RecordSchema::new(
        name,
        vec![
            Field::new("context", notification_context()),
            Field::new("act_info", action_info(info_name, params)),
        ],
    )
    .with_namespace(namespace);
    Ok(MessageSchema {
        record,
        meta: options.meta(&abi.account),
    })
}

/// Heartbeat message saving the stream position; independent of any ABI
pub fn checkpoint_schema() -> MessageSchema {
    let block_ref = RecordSchema::new(
        "BlockRef",
        vec![
            Field::new("id", Primitive::String),
            Field::new("num", Primitive::Long),
        ],
    )
    .with_namespace(DKAFKA_NAMESPACE)
    .with_doc(BLOCK_REF_DOC);

    let record = RecordSchema::new(
        "DKafkaCheckpoint",
        vec![
            Field::new("step", Primitive::Int).with_doc(CHECKPOINT_STEP_DOC),
            Field::new("block", block_ref),
            Field::new("headBlock", Schema::Named("BlockRef".to_string())),
            Field::new("lastIrreversibleBlock", Schema::Named("BlockRef".to_string())),
            Field::new("time", Scalar::timestamp_millis(None)),
        ],
    )
    .with_namespace(DKAFKA_NAMESPACE)
    .with_doc(CHECKPOINT_DOC);

    MessageSchema {
        record,
        meta: MetaSchema {
            compatibility: DEFAULT_COMPATIBILITY.to_string(),
            kind: NOTIFICATION.to_string(),
            version: Some("1.0.0".to_string()),
            domain: Some("dkafka".to_string()),
        },
    }
}

fn notification_context() -> RecordSchema {
    let correlation = RecordSchema::new(
        "Correlation",
        vec![
            Field::new("payer", Primitive::String),
            Field::new("id", Primitive::String),
        ],
    )
    .with_namespace(DKAFKA_NAMESPACE);

    RecordSchema::new(
        "NotificationContext",
        vec![
            Field::new("block_num", Primitive::Long),
            Field::new("block_id", Primitive::String),
            Field::new("status", Primitive::String),
            Field::new("executed", Primitive::Boolean),
            Field::new("block_step", Primitive::String),
            Field::optional("correlation", correlation),
            Field::new("trx_id", Primitive::String),
            Field::new("time", Scalar::timestamp_millis(Some("block_timestamp_type"))),
            Field::new("cursor", Primitive::String),
        ],
    )
    .with_namespace(DKAFKA_NAMESPACE)
}

fn action_info_basic_fields() -> Vec<Field> {
    vec![
        Field::new("account", Primitive::String),
        Field::new("receiver", Primitive::String),
        Field::new("name", Primitive::String),
        Field::new("global_seq", Primitive::Long),
        Field::new("authorizations", Schema::array(Primitive::String)),
        Field::new("action_ordinal", Primitive::Long),
        Field::new("creator_action_ordinal", Primitive::Long),
        Field::new("closest_unnotified_ancestor_action_ordinal", Primitive::Long),
        Field::new("execution_index", Primitive::Long),
    ]
}

fn action_info_basic() -> RecordSchema {
    RecordSchema::new("ActionInfoBasic", action_info_basic_fields()).with_namespace(DKAFKA_NAMESPACE)
}

fn db_op_fields() -> Vec<Field> {
    vec![
        Field::optional("operation", Primitive::Int),
        Field::optional("action_index", Primitive::Long),
        Field::new("index", Primitive::Int),
        Field::optional("code", Primitive::String),
        Field::optional("scope", Primitive::String),
        Field::optional("table_name", Primitive::String),
        Field::optional("primary_key", Primitive::String),
        Field::optional("old_payer", Primitive::String),
        Field::optional("new_payer", Primitive::String),
        Field::optional("old_data", Primitive::Bytes),
        Field::optional("new_data", Primitive::Bytes),
    ]
}

fn table_op_info(name: String, row: RecordSchema) -> RecordSchema {
    let row_name = row.name.clone();
    let mut fields = db_op_fields();
    fields.push(Field::optional("old_json", row));
    fields.push(Field::optional("new_json", Schema::Named(row_name)));
    RecordSchema::new(name, fields)
}

fn action_info(name: String, params: RecordSchema) -> RecordSchema {
    let db_op_basic = RecordSchema::new("DBOpBasic", db_op_fields()).with_namespace(DKAFKA_NAMESPACE);
    let mut fields = action_info_basic_fields();
    fields.push(Field::new("json_data", params));
    fields.push(Field::new("db_ops", Schema::array(db_op_basic)));
    RecordSchema::new(name, fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::abi::AbiDefinition;

    const NFT_ABI: &str = r#"{
        "version": "eosio::abi/1.1",
        "types": [],
        "structs": [
            {"name": "resale_share", "base": "", "fields": [
                {"name": "receiver", "type": "name"},
                {"name": "basis_point", "type": "uint16"}
            ]},
            {"name": "factory_a", "base": "", "fields": [
                {"name": "id", "type": "uint64"},
                {"name": "chosen_rate", "type": "asset[]"},
                {"name": "minimum_resell_price", "type": "asset"},
                {"name": "resale_shares", "type": "resale_share[]"},
                {"name": "lockup_time", "type": "uint32?"}
            ]},
            {"name": "issue", "base": "", "fields": [
                {"name": "to", "type": "name"},
                {"name": "quantity", "type": "asset"}
            ]}
        ],
        "actions": [{"name": "issue", "type": "issue", "ricardian_contract": ""}],
        "tables": [{"name": "factory.a", "index_type": "i64", "key_names": [], "key_types": [], "type": "factory_a"}]
    }"#;

    fn nft_version() -> AbiVersion {
        AbiVersion::new("eosio.nft.ft", AbiDefinition::from_json(NFT_ABI).unwrap(), 5, true)
    }

    fn options() -> SchemaOptions {
        SchemaOptions {
            namespace: "test".to_string(),
            major_version: 0,
            version: "0.1.0".to_string(),
            domain: None,
            compatibility: "FORWARD".to_string(),
        }
    }

    #[test]
    fn test_table_notification() {
        let schema = table_schema("factory.a", &nft_version(), &options()).unwrap();

        assert_eq!(
            schema.subject(),
            "test.eosio.nft.ft.tables.v0.FactoryATableNotification"
        );
        assert_eq!(schema.meta.domain.as_deref(), Some("eosio.nft.ft"));

        let db_op = schema.record.field("db_op").unwrap().schema.as_record().unwrap();
        assert_eq!(db_op.name, "FactoryATableOpInfo");
        let old_json = &db_op.field("old_json").unwrap().schema;
        let Schema::Union(members) = old_json else {
            panic!("old_json must be optional");
        };
        let row = members[1].as_record().unwrap();
        assert_eq!(row.name, "FactoryATableOp");
        assert_eq!(
            row.field("minimum_resell_price").unwrap().schema,
            Schema::Named("eosio.Asset".to_string())
        );
        assert_eq!(
            db_op.field("new_json").unwrap().schema.to_json().unwrap(),
            r#"["null","FactoryATableOp"]"#
        );
    }

    #[test]
    fn test_table_notification_json_prefix() {
        let json = table_schema("factory.a", &nft_version(), &options())
            .unwrap()
            .to_json()
            .unwrap();
        assert!(json.starts_with(
            r#"{"type":"record","name":"FactoryATableNotification","namespace":"test.eosio.nft.ft.tables.v0","fields":[{"name":"context","type":{"type":"record","name":"NotificationContext","namespace":"io.dkafka","fields":[{"name":"block_num","type":"long"}"#
        ));
        assert!(json.ends_with(
            r#""meta":{"compatibility":"FORWARD","type":"notification","version":"0.1.0","domain":"eosio.nft.ft"}}"#
        ));
    }

    #[test]
    fn test_action_notification_uses_action_mode() {
        let schema = action_schema("issue", &nft_version(), &options()).unwrap();
        assert_eq!(
            schema.subject(),
            "test.eosio.nft.ft.actions.v0.IssueActionNotification"
        );

        let info = schema.record.field("act_info").unwrap().schema.as_record().unwrap();
        assert_eq!(info.name, "IssueActionInfo");
        let params = info.field("json_data").unwrap().schema.as_record().unwrap();
        assert_eq!(params.name, "IssueActionParams");
        assert_eq!(
            params.field("quantity").unwrap().schema,
            Schema::primitive(Primitive::String)
        );
        assert!(matches!(info.field("db_ops").unwrap().schema, Schema::Array(_)));
    }

    #[test]
    fn test_generator_dispatches_by_kind() {
        let version = nft_version();
        let tables = MessageSchemaGenerator::new(EntityKind::Table, options());
        let actions = MessageSchemaGenerator::new(EntityKind::Action, options());

        assert!(tables.message_schema("factory.a", &version).is_ok());
        assert!(tables.message_schema("issue", &version).is_err());
        assert!(actions.message_schema("issue", &version).is_ok());
    }

    #[test]
    fn test_checkpoint_schema() {
        let checkpoint = checkpoint_schema();
        assert_eq!(checkpoint.subject(), "io.dkafka.DKafkaCheckpoint");
        let json = checkpoint.to_json().unwrap();
        assert!(json.contains(r#"{"name":"headBlock","type":"BlockRef"}"#));
        assert!(json.ends_with(
            r#""meta":{"compatibility":"FORWARD","type":"notification","version":"1.0.0","domain":"dkafka"}}"#
        ));
    }
}
