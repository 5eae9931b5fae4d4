//! Type resolver: ABI type names to Avro schema nodes
//!
//! Resolution is pure: the same ABI, mode and type name always produce the
//! same tree, which keeps repeated generations registry compatible. Records
//! are emitted once per top-level call and referenced by name afterwards,
//! which is also what makes self-referencing structs terminate.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::builtins::{self, CompositeKind, ResolveMode, CATCH_ALL_VARIANT};
use super::names::{check_name, to_camel};
use super::node::{Field, RecordSchema, Schema};
use crate::domain::abi::AbiDefinition;
use crate::error::{CodecError, EntityKind, Result};

const EXTENSION_MARKER: &str = "$";
const ARRAY_MARKER: &str = "[]";
const OPTIONAL_MARKER: &str = "?";

/// Per-call resolution state.
///
/// Never reuse a memo across top-level calls: a reference is only valid in
/// the document where its record was emitted.
#[derive(Debug, Default)]
pub struct Memo {
    /// ABI type name -> reference of the record emitted for it
    refs: HashMap<String, String>,
    /// Qualified record names already taken in this document
    claimed: HashSet<String>,
    /// Structs whose base chain is being walked
    bases: Vec<String>,
    /// Aliases being expanded
    aliases: Vec<String>,
}

impl Memo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reference previously recorded for `type_name`
    pub fn reference(&self, type_name: &str) -> Option<&str> {
        self.refs.get(type_name).map(String::as_str)
    }

    /// Reserve a record name, suffixing `2`, `3`... on collision
    pub(crate) fn claim(&mut self, name: &str) -> String {
        if self.claimed.insert(name.to_string()) {
            return name.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{name}{n}");
            if self.claimed.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    fn record(&mut self, type_name: &str, reference: String) {
        self.refs.insert(type_name.to_string(), reference);
    }
}

/// Resolves type names of one ABI in one mode
#[derive(Debug, Clone, Copy)]
pub struct TypeResolver<'a> {
    abi: &'a AbiDefinition,
    mode: ResolveMode,
}

impl<'a> TypeResolver<'a> {
    pub fn new(abi: &'a AbiDefinition, mode: ResolveMode) -> Self {
        Self { abi, mode }
    }

    pub fn mode(&self) -> ResolveMode {
        self.mode
    }

    /// Resolve a field type, honoring the `$`, `[]` and `?` suffixes.
    ///
    /// `T[]$` resolves to a bare array: the array branch returns before the
    /// extension marker gets a chance to wrap it as optional.
    pub fn resolve_field_type(&self, type_name: &str, memo: &mut Memo) -> Result<Schema> {
        debug!(type_name, "resolve field type");
        let (name, is_extension) = match type_name.strip_suffix(EXTENSION_MARKER) {
            Some(stripped) => (stripped, true),
            None => (type_name, false),
        };

        if let Some(element) = name.strip_suffix(ARRAY_MARKER) {
            let items = self.resolve_field_type(element, memo)?;
            return Ok(Schema::array(items));
        }

        let optional = name.strip_suffix(OPTIONAL_MARKER);
        if optional.is_some() || is_extension {
            let inner = self.resolve_field_type(optional.unwrap_or(name), memo)?;
            return Ok(Schema::optional(inner));
        }

        self.resolve_type(name, memo)
    }

    /// Resolve a bare type name (no suffix)
    pub fn resolve_type(&self, name: &str, memo: &mut Memo) -> Result<Schema> {
        if let Some(schema) = builtins::primitive(self.mode, name) {
            return Ok(schema);
        }
        if let Some(schema) = builtins::decimal(name) {
            return Ok(schema);
        }
        if let Some(target) = self.abi.alias(name) {
            return self.resolve_alias(name, target, memo);
        }
        if let Some(reference) = memo.reference(name) {
            debug!(name, reference, "reuse emitted record");
            return Ok(Schema::Named(reference.to_string()));
        }
        if let Some(kind) = builtins::composite(self.mode, name) {
            return self.composite_record(name, kind, memo);
        }
        if self.abi.variant(name).is_some() {
            return self.variant_to_union(name, memo);
        }
        self.struct_to_record(name, None, memo).map(Schema::Record)
    }

    fn resolve_alias(&self, name: &str, target: &str, memo: &mut Memo) -> Result<Schema> {
        if memo.aliases.iter().any(|pending| pending == name) {
            return Err(CodecError::unresolvable(name, "alias cycle"));
        }
        debug!(name, target, "expand alias");
        memo.aliases.push(name.to_string());
        let resolved = self.resolve_field_type(target, memo);
        memo.aliases.pop();
        resolved
    }

    fn composite_record(&self, name: &str, kind: CompositeKind, memo: &mut Memo) -> Result<Schema> {
        let reference = kind.reference();
        memo.claimed.insert(reference.clone());
        memo.record(name, reference);
        let record = kind.record(|| self.resolve_type("asset", memo))?;
        Ok(Schema::Record(record))
    }

    fn variant_to_union(&self, name: &str, memo: &mut Memo) -> Result<Schema> {
        if name == CATCH_ALL_VARIANT {
            return Ok(builtins::catch_all_union());
        }
        let Some(variant) = self.abi.variant(name) else {
            return Err(CodecError::unresolvable(name, "variant not found"));
        };
        match variant.types.as_slice() {
            [] => Err(CodecError::unresolvable(name, "variant without member types")),
            [single] => self.resolve_field_type(single, memo),
            types => {
                let mut members: Vec<Schema> = Vec::with_capacity(types.len());
                for member in types {
                    // unions cannot nest in Avro
                    let resolved = match self.resolve_field_type(member, memo)? {
                        Schema::Union(inner) => inner,
                        schema => vec![schema],
                    };
                    for schema in resolved {
                        let key = union_key(&schema);
                        if members.iter().any(|known| union_key(known) == key) {
                            debug!(variant = name, member = %member, %key, "drop duplicate union member");
                            continue;
                        }
                        members.push(schema);
                    }
                }
                Ok(Schema::Union(members))
            }
        }
    }

    /// Build the record of struct `name`, base fields first.
    ///
    /// The struct is recorded in the memo before its fields are resolved so
    /// that a recursive reference becomes a bare name. `record_name`
    /// overrides the camel-cased struct name.
    pub fn struct_to_record(
        &self,
        name: &str,
        record_name: Option<&str>,
        memo: &mut Memo,
    ) -> Result<RecordSchema> {
        if self.abi.struct_def(name).is_none() {
            return Err(CodecError::unresolvable(name, "unknown type"));
        }
        let wanted = match record_name {
            Some(record_name) => record_name.to_string(),
            None => to_camel(name),
        };
        check_name(&wanted)?;
        let record_name = memo.claim(&wanted);
        memo.record(name, record_name.clone());

        let fields = self.collect_fields(name, memo)?;
        debug!(name, record = %record_name, fields = fields.len(), "struct resolved");
        Ok(RecordSchema::new(record_name, fields))
    }

    /// Fields of `name` with every ancestor's fields inlined in front
    fn collect_fields(&self, name: &str, memo: &mut Memo) -> Result<Vec<Field>> {
        let Some(def) = self.abi.struct_def(name) else {
            return Err(CodecError::unresolvable(name, "unknown type"));
        };
        if memo.bases.iter().any(|pending| pending == name) {
            return Err(CodecError::unresolvable(name, "struct inherits from itself"));
        }

        memo.bases.push(name.to_string());
        let inherited = if def.base.is_empty() {
            Ok(Vec::new())
        } else {
            self.collect_fields(&def.base, memo).map_err(|err| {
                CodecError::unresolvable(name, format!("base '{}': {err}", def.base))
            })
        };
        memo.bases.pop();

        let mut fields = inherited?;
        fields.reserve(def.fields.len());
        for field in &def.fields {
            let schema = self.resolve_field_type(&field.kind, memo).map_err(|err| {
                CodecError::unresolvable(&field.kind, format!("field '{}': {err}", field.name))
            })?;
            let field = if schema.is_nullable_union() {
                Field::nullable(&field.name, schema)
            } else {
                Field::new(&field.name, schema)
            };
            fields.push(field);
        }
        Ok(fields)
    }

    /// Record of an action's arguments or a table's row, under `record_name`
    pub fn entity_record(
        &self,
        kind: EntityKind,
        entity: &str,
        record_name: &str,
        memo: &mut Memo,
    ) -> Result<RecordSchema> {
        let struct_name = match kind {
            EntityKind::Action => self.abi.action(entity).map(|def| def.kind.as_str()),
            EntityKind::Table => self.abi.table(entity).map(|def| def.kind.as_str()),
        };
        let Some(struct_name) = struct_name else {
            return Err(CodecError::EntityNotFound {
                kind,
                name: entity.to_string(),
            });
        };
        self.struct_to_record(struct_name, Some(record_name), memo)
    }
}

/// Identity of a union member: Avro allows one member per unnamed type
/// and one per record name
fn union_key(schema: &Schema) -> &str {
    match schema {
        Schema::Scalar(scalar) => scalar.kind.as_str(),
        Schema::Array(_) => "array",
        Schema::Union(_) => "union",
        Schema::Record(record) => &record.name,
        Schema::Named(name) => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::abi::{ActionDef, FieldDef, StructDef, TableDef, TypeDef, VariantDef};
    use crate::schema::node::{Primitive, Scalar};

    fn field(name: &str, kind: &str) -> FieldDef {
        FieldDef {
            name: name.to_string(),
            kind: kind.to_string(),
        }
    }

    fn struct_def(name: &str, base: &str, fields: Vec<FieldDef>) -> StructDef {
        StructDef {
            name: name.to_string(),
            base: base.to_string(),
            fields,
        }
    }

    fn variant(name: &str, types: &[&str]) -> VariantDef {
        VariantDef {
            name: name.to_string(),
            types: types.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn sample_abi() -> AbiDefinition {
        AbiDefinition::new(
            "eosio::abi/1.2",
            vec![TypeDef {
                new_type_name: "account_name".to_string(),
                kind: "name".to_string(),
            }],
            vec![
                struct_def(
                    "my_struct",
                    "",
                    vec![field("fieldA", "uint32"), field("fieldB", "int64")],
                ),
                struct_def("parent", "", vec![field("id", "uint64")]),
                struct_def("child", "parent", vec![field("owner", "account_name")]),
                struct_def("node", "", vec![field("next", "node?")]),
                struct_def(
                    "pair",
                    "",
                    vec![field("left", "my_struct"), field("right", "my_struct")],
                ),
                struct_def("loop_a", "loop_b", vec![]),
                struct_def("loop_b", "loop_a", vec![]),
                struct_def(
                    "wallet",
                    "",
                    vec![
                        field("balance", "asset"),
                        field("reserve", "asset"),
                        field("deposit", "extended_asset"),
                    ],
                ),
            ],
            vec![ActionDef {
                name: "transfer".to_string(),
                kind: "wallet".to_string(),
                ricardian_contract: String::new(),
            }],
            vec![TableDef {
                name: "children".to_string(),
                index_type: "i64".to_string(),
                key_names: vec![],
                key_types: vec![],
                kind: "child".to_string(),
            }],
            vec![
                variant("just_int", &["int32"]),
                variant("int_or_string", &["int32", "string"]),
                variant("nothing", &[]),
            ],
        )
    }

    fn resolve(abi: &AbiDefinition, type_name: &str) -> Result<Schema> {
        TypeResolver::new(abi, ResolveMode::Table).resolve_field_type(type_name, &mut Memo::new())
    }

    #[test]
    fn test_end_to_end_struct() {
        let abi = sample_abi();
        let schema = TypeResolver::new(&abi, ResolveMode::Table)
            .resolve_type("my_struct", &mut Memo::new())
            .unwrap();

        let expected = RecordSchema::new(
            "MyStruct",
            vec![
                Field::new("fieldA", Scalar::eos(Primitive::Long, "uint32")),
                Field::new("fieldB", Scalar::eos(Primitive::Long, "int64")),
            ],
        );
        assert_eq!(schema, Schema::Record(expected));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let abi = sample_abi();
        for name in ["my_struct", "child", "node", "pair", "wallet", "int_or_string"] {
            assert_eq!(resolve(&abi, name).unwrap(), resolve(&abi, name).unwrap());
        }
    }

    #[test]
    fn test_array_suffix() {
        let abi = sample_abi();
        assert_eq!(
            resolve(&abi, "my_struct[]").unwrap(),
            Schema::array(resolve(&abi, "my_struct").unwrap())
        );
    }

    #[test]
    fn test_optional_and_extension_suffixes() {
        let abi = sample_abi();
        let inner = resolve(&abi, "uint32").unwrap();
        let optional = Schema::Union(vec![Schema::null(), inner.clone()]);

        assert_eq!(resolve(&abi, "uint32?").unwrap(), optional);
        assert_eq!(resolve(&abi, "uint32$").unwrap(), optional);
        assert_eq!(
            resolve(&abi, "uint32[]?$").unwrap(),
            Schema::Union(vec![Schema::null(), Schema::array(inner.clone())])
        );
        // array with extension marker stays a bare array
        assert_eq!(resolve(&abi, "uint32[]$").unwrap(), Schema::array(inner));
    }

    #[test]
    fn test_base_fields_come_first() {
        let abi = sample_abi();
        let Schema::Record(record) = resolve(&abi, "child").unwrap() else {
            panic!("child must resolve to a record");
        };
        let names: Vec<_> = record.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "owner"]);
        assert_eq!(
            record.fields[1].schema,
            Schema::from(Scalar::eos(Primitive::String, "name"))
        );
    }

    #[test]
    fn test_base_cycle_is_an_error() {
        let abi = sample_abi();
        assert!(matches!(
            resolve(&abi, "loop_a"),
            Err(CodecError::TypeUnresolvable { .. })
        ));
    }

    #[test]
    fn test_variants() {
        let abi = sample_abi();
        assert_eq!(
            resolve(&abi, "just_int").unwrap(),
            resolve(&abi, "int32").unwrap()
        );
        assert_eq!(
            resolve(&abi, "int_or_string").unwrap(),
            Schema::Union(vec![
                resolve(&abi, "int32").unwrap(),
                resolve(&abi, "string").unwrap()
            ])
        );
        assert!(matches!(
            resolve(&abi, "nothing"),
            Err(CodecError::TypeUnresolvable { .. })
        ));
    }

    #[test]
    fn test_variant_members_sharing_an_avro_type_collapse() {
        let abi = AbiDefinition::from_json(
            r#"{
                "structs": [{"name": "point", "base": "", "fields": [{"name": "x", "type": "int32"}]}],
                "variants": [
                    {"name": "small", "types": ["int32", "uint8", "string", "int16?", "point", "point"]}
                ]
            }"#,
        )
        .unwrap();
        let Schema::Union(members) = resolve(&abi, "small").unwrap() else {
            panic!("variant must resolve to a union");
        };
        let keys: Vec<&str> = members.iter().map(union_key).collect();
        assert_eq!(keys, vec!["int", "string", "null", "Point"]);
        assert_eq!(members[0], resolve(&abi, "int32").unwrap());
    }

    #[test]
    fn test_catch_all_variant_uses_fixed_union() {
        let base = sample_abi();
        let abi = AbiDefinition::new(
            base.version.clone(),
            base.types.clone(),
            base.structs.clone(),
            vec![],
            vec![],
            vec![variant(CATCH_ALL_VARIANT, &["int8", "int16", "int8[]"])],
        );
        assert_eq!(
            resolve(&abi, CATCH_ALL_VARIANT).unwrap(),
            builtins::catch_all_union()
        );
    }

    #[test]
    fn test_self_reference_becomes_named() {
        let abi = sample_abi();
        let Schema::Record(record) = resolve(&abi, "node").unwrap() else {
            panic!("node must resolve to a record");
        };
        assert_eq!(record.name, "Node");
        let next = record.field("next").unwrap();
        assert!(next.is_optional());
        assert_eq!(next.default, Some(serde_json::Value::Null));
        assert_eq!(
            next.schema.to_json().unwrap(),
            r#"["null","Node"]"#
        );
    }

    #[test]
    fn test_sibling_reuses_record() {
        let abi = sample_abi();
        let Schema::Record(record) = resolve(&abi, "pair").unwrap() else {
            panic!("pair must resolve to a record");
        };
        assert!(matches!(record.fields[0].schema, Schema::Record(_)));
        assert_eq!(record.fields[1].schema, Schema::Named("MyStruct".to_string()));
    }

    #[test]
    fn test_composites_in_table_mode() {
        let abi = sample_abi();
        let Schema::Record(record) = resolve(&abi, "wallet").unwrap() else {
            panic!("wallet must resolve to a record");
        };
        assert_eq!(
            record.fields[0].schema.as_record().map(RecordSchema::qualified_name),
            Some("eosio.Asset".to_string())
        );
        assert_eq!(record.fields[1].schema, Schema::Named("eosio.Asset".to_string()));
        let deposit = record.fields[2].schema.as_record().unwrap();
        assert_eq!(
            deposit.field("quantity").unwrap().schema,
            Schema::Named("eosio.Asset".to_string())
        );
    }

    #[test]
    fn test_action_mode_uses_strings() {
        let abi = sample_abi();
        let resolver = TypeResolver::new(&abi, ResolveMode::Action);
        let record = resolver
            .entity_record(EntityKind::Action, "transfer", "TransferActionParams", &mut Memo::new())
            .unwrap();
        assert_eq!(record.name, "TransferActionParams");
        for field in &record.fields {
            assert_eq!(field.schema, Schema::primitive(Primitive::String));
        }
    }

    #[test]
    fn test_entity_record_errors() {
        let abi = sample_abi();
        let resolver = TypeResolver::new(&abi, ResolveMode::Table);
        let err = resolver
            .entity_record(EntityKind::Table, "missing", "MissingTableOp", &mut Memo::new())
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::EntityNotFound {
                kind: EntityKind::Table,
                ..
            }
        ));
        assert!(matches!(
            resolve(&abi, "no_such_type"),
            Err(CodecError::TypeUnresolvable { .. })
        ));
    }

    #[test]
    fn test_name_collision_gets_suffix() {
        let abi = AbiDefinition::new(
            "",
            vec![],
            vec![
                struct_def("a_b", "", vec![field("x", "int32")]),
                struct_def("a.b", "", vec![field("y", "int32")]),
                struct_def("outer", "", vec![field("one", "a_b"), field("two", "a.b")]),
            ],
            vec![],
            vec![],
            vec![],
        );
        let Schema::Record(record) = resolve(&abi, "outer").unwrap() else {
            panic!("outer must resolve to a record");
        };
        assert_eq!(record.fields[0].schema.as_record().unwrap().name, "AB");
        assert_eq!(record.fields[1].schema.as_record().unwrap().name, "AB2");
    }
}
