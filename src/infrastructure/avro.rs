//! Binary Avro engine backed by `apache-avro`
//!
//! Values are shaped by walking the registered JSON schema: converters run
//! first, then each value is matched to its schema node (union branches are
//! picked by trying members in order). `apache-avro` does the binary
//! encoding and decoding.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use apache_avro::types::Value as AvroValue;
use apache_avro::{Decimal, Schema as AvroSchema};
use chrono::DateTime;
use serde_json::{Map, Value as Json};

use crate::codec::{AvroEngine, CompiledSchema, Converters};
use crate::domain::value::NativeValue;
use crate::error::{CodecError, Result};

/// [`AvroEngine`] using `apache-avro`
#[derive(Debug, Clone, Copy, Default)]
pub struct ApacheAvroEngine;

impl ApacheAvroEngine {
    pub fn new() -> Self {
        Self
    }
}

impl AvroEngine for ApacheAvroEngine {
    fn compile(&self, schema: &str, converters: &Converters) -> Result<Arc<dyn CompiledSchema>> {
        let avro = AvroSchema::parse_str(schema)
            .map_err(|e| CodecError::Codec(format!("invalid Avro schema: {e}")))?;
        let json: Json = serde_json::from_str(schema)
            .map_err(|e| CodecError::Codec(format!("invalid schema JSON: {e}")))?;
        let mut names = HashMap::new();
        collect_names(&json, None, &mut names);
        Ok(Arc::new(CompiledAvro {
            avro,
            json,
            names,
            converters: converters.clone(),
        }))
    }
}

/// Named type definition and the namespace its children inherit
#[derive(Debug, Clone)]
struct NamedType {
    schema: Json,
    namespace: Option<String>,
}

struct CompiledAvro {
    avro: AvroSchema,
    json: Json,
    names: HashMap<String, NamedType>,
    converters: Converters,
}

impl CompiledSchema for CompiledAvro {
    fn encode(&self, value: &NativeValue) -> Result<Vec<u8>> {
        let shaped = self.to_avro(&self.json, None, value)?;
        apache_avro::to_avro_datum(&self.avro, shaped)
            .map_err(|e| CodecError::Codec(format!("Avro encoding failed: {e}")))
    }

    fn decode(&self, datum: &[u8]) -> Result<NativeValue> {
        let mut reader = datum;
        let value = apache_avro::from_avro_datum(&self.avro, &mut reader, None)
            .map_err(|e| CodecError::Codec(format!("Avro decoding failed: {e}")))?;
        self.from_avro(&self.json, None, value)
    }
}

fn mismatch(expected: &str, value: &NativeValue) -> CodecError {
    CodecError::Codec(format!("expected {expected}, got {value:?}"))
}

/// Full name of a named type declared or referenced in `namespace`
fn full_name(name: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) if !name.contains('.') && !ns.is_empty() => format!("{ns}.{name}"),
        _ => name.to_string(),
    }
}

fn namespace_of(full: &str) -> Option<String> {
    full.rsplit_once('.').map(|(ns, _)| ns.to_string())
}

/// Index record, enum and fixed declarations by full name
fn collect_names(schema: &Json, namespace: Option<&str>, names: &mut HashMap<String, NamedType>) {
    match schema {
        Json::Array(members) => {
            for member in members {
                collect_names(member, namespace, names);
            }
        }
        Json::Object(obj) => {
            let kind = obj.get("type");
            match kind.and_then(Json::as_str) {
                Some(kind @ ("record" | "enum" | "fixed")) => {
                    let Some(name) = obj.get("name").and_then(Json::as_str) else {
                        return;
                    };
                    let declared = obj.get("namespace").and_then(Json::as_str);
                    let full = full_name(name, declared.or(namespace));
                    let inner_ns = namespace_of(&full);
                    names.insert(
                        full,
                        NamedType {
                            schema: schema.clone(),
                            namespace: inner_ns.clone(),
                        },
                    );
                    if kind == "record" {
                        let fields = obj.get("fields").and_then(Json::as_array);
                        for field in fields.into_iter().flatten() {
                            if let Some(field_type) = field.get("type") {
                                collect_names(field_type, inner_ns.as_deref(), names);
                            }
                        }
                    }
                }
                Some("array") => {
                    if let Some(items) = obj.get("items") {
                        collect_names(items, namespace, names);
                    }
                }
                Some("map") => {
                    if let Some(values) = obj.get("values") {
                        collect_names(values, namespace, names);
                    }
                }
                _ => {
                    if let Some(nested @ (Json::Object(_) | Json::Array(_))) = kind {
                        collect_names(nested, namespace, names);
                    }
                }
            }
        }
        _ => {}
    }
}

impl CompiledAvro {
    fn lookup(&self, name: &str, namespace: Option<&str>) -> Result<&NamedType> {
        self.names
            .get(&full_name(name, namespace))
            .or_else(|| self.names.get(name))
            .ok_or_else(|| CodecError::Codec(format!("unknown named type {name}")))
    }

    fn to_avro(&self, schema: &Json, ns: Option<&str>, value: &NativeValue) -> Result<AvroValue> {
        let converted = self.converters.convert(value)?;
        let value = converted.as_ref().unwrap_or(value);

        match schema {
            Json::String(name) => match primitive_to_avro(name, value) {
                Some(result) => result,
                None => {
                    let named = self.lookup(name, ns)?;
                    self.to_avro(&named.schema, named.namespace.as_deref(), value)
                }
            },
            Json::Array(members) => self.union_to_avro(members, ns, value),
            Json::Object(obj) => self.complex_to_avro(obj, ns, value),
            other => Err(CodecError::Codec(format!("invalid schema node {other}"))),
        }
    }

    fn union_to_avro(&self, members: &[Json], ns: Option<&str>, value: &NativeValue) -> Result<AvroValue> {
        if value.is_null() {
            let idx = members
                .iter()
                .position(|m| m.as_str() == Some("null"))
                .ok_or_else(|| mismatch("non-null union member", value))?;
            return Ok(AvroValue::Union(idx as u32, Box::new(AvroValue::Null)));
        }
        for (idx, member) in members.iter().enumerate() {
            if member.as_str() == Some("null") {
                continue;
            }
            if let Ok(shaped) = self.to_avro(member, ns, value) {
                return Ok(AvroValue::Union(idx as u32, Box::new(shaped)));
            }
        }
        Err(mismatch("a union member", value))
    }

    fn complex_to_avro(
        &self,
        obj: &Map<String, Json>,
        ns: Option<&str>,
        value: &NativeValue,
    ) -> Result<AvroValue> {
        match obj.get("logicalType").and_then(Json::as_str) {
            Some("decimal") => return decimal_to_avro(obj, value),
            Some("timestamp-millis") => return timestamp_to_avro(value),
            _ => {}
        }

        let Some(kind) = obj.get("type") else {
            return Err(CodecError::Codec("schema node without type".to_string()));
        };
        let Some(kind_name) = kind.as_str() else {
            return self.to_avro(kind, ns, value);
        };
        match kind_name {
            "record" => {
                let name = obj.get("name").and_then(Json::as_str).unwrap_or_default();
                let declared = obj.get("namespace").and_then(Json::as_str);
                let inner_ns = namespace_of(&full_name(name, declared.or(ns)));
                self.record_to_avro(obj, inner_ns.as_deref(), value)
            }
            "array" => {
                let NativeValue::Array(items) = value else {
                    return Err(mismatch("array", value));
                };
                let item_schema = obj.get("items").unwrap_or(&Json::Null);
                items
                    .iter()
                    .map(|item| self.to_avro(item_schema, ns, item))
                    .collect::<Result<Vec<_>>>()
                    .map(AvroValue::Array)
            }
            "map" => {
                let NativeValue::Object(entries) = value else {
                    return Err(mismatch("map", value));
                };
                let value_schema = obj.get("values").unwrap_or(&Json::Null);
                entries
                    .iter()
                    .map(|(key, entry)| Ok((key.clone(), self.to_avro(value_schema, ns, entry)?)))
                    .collect::<Result<HashMap<_, _>>>()
                    .map(AvroValue::Map)
            }
            "enum" => {
                let NativeValue::String(symbol) = value else {
                    return Err(mismatch("enum symbol", value));
                };
                let symbols = obj.get("symbols").and_then(Json::as_array);
                let idx = symbols
                    .into_iter()
                    .flatten()
                    .position(|s| s.as_str() == Some(symbol.as_str()))
                    .ok_or_else(|| mismatch("known enum symbol", value))?;
                Ok(AvroValue::Enum(idx as u32, symbol.clone()))
            }
            "fixed" => {
                let size = obj.get("size").and_then(Json::as_u64).unwrap_or_default() as usize;
                match value {
                    NativeValue::Bytes(bytes) if bytes.len() == size => {
                        Ok(AvroValue::Fixed(size, bytes.clone()))
                    }
                    other => Err(mismatch("fixed bytes", other)),
                }
            }
            primitive => primitive_to_avro(primitive, value).unwrap_or_else(|| {
                let named = self.lookup(primitive, ns)?;
                self.to_avro(&named.schema, named.namespace.as_deref(), value)
            }),
        }
    }

    fn record_to_avro(
        &self,
        obj: &Map<String, Json>,
        ns: Option<&str>,
        value: &NativeValue,
    ) -> Result<AvroValue> {
        let NativeValue::Object(entries) = value else {
            return Err(mismatch("record", value));
        };
        let fields = obj.get("fields").and_then(Json::as_array);
        let mut shaped = Vec::new();
        for field in fields.into_iter().flatten() {
            let name = field.get("name").and_then(Json::as_str).unwrap_or_default();
            let field_schema = field.get("type").unwrap_or(&Json::Null);
            let field_value = entries.get(name).unwrap_or(&NativeValue::Null);
            let avro = self.to_avro(field_schema, ns, field_value).map_err(|e| {
                CodecError::Codec(format!("field {name}: {e}"))
            })?;
            shaped.push((name.to_string(), avro));
        }
        Ok(AvroValue::Record(shaped))
    }

    fn from_avro(&self, schema: &Json, ns: Option<&str>, value: AvroValue) -> Result<NativeValue> {
        match (schema, value) {
            (Json::Array(members), AvroValue::Union(idx, inner)) => {
                let member = members.get(idx as usize).unwrap_or(&Json::Null);
                self.from_avro(member, ns, *inner)
            }
            (Json::String(name), value) if !is_primitive(name) => {
                let named = self.lookup(name, ns)?;
                self.from_avro(&named.schema, named.namespace.as_deref(), value)
            }
            (Json::Object(obj), AvroValue::Decimal(decimal)) => {
                let scale = obj.get("scale").and_then(Json::as_u64).unwrap_or_default() as u32;
                let unscaled = Vec::<u8>::try_from(&decimal)
                    .map_err(|e| CodecError::Codec(format!("invalid decimal: {e}")))?;
                Ok(NativeValue::Decimal { unscaled, scale })
            }
            (Json::Object(obj), AvroValue::Record(fields)) => {
                let name = obj.get("name").and_then(Json::as_str).unwrap_or_default();
                let declared = obj.get("namespace").and_then(Json::as_str);
                let inner_ns = namespace_of(&full_name(name, declared.or(ns)));
                let schemas: HashMap<&str, &Json> = obj
                    .get("fields")
                    .and_then(Json::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(|f| Some((f.get("name")?.as_str()?, f.get("type")?)))
                    .collect();
                let mut entries = BTreeMap::new();
                for (field, value) in fields {
                    let field_schema = schemas.get(field.as_str()).copied().unwrap_or(&Json::Null);
                    let native = self.from_avro(field_schema, inner_ns.as_deref(), value)?;
                    entries.insert(field, native);
                }
                Ok(NativeValue::Object(entries))
            }
            (Json::Object(obj), AvroValue::Array(items)) => {
                let item_schema = obj.get("items").unwrap_or(&Json::Null);
                items
                    .into_iter()
                    .map(|item| self.from_avro(item_schema, ns, item))
                    .collect::<Result<Vec<_>>>()
                    .map(NativeValue::Array)
            }
            (Json::Object(obj), AvroValue::Map(entries)) => {
                let value_schema = obj.get("values").unwrap_or(&Json::Null);
                entries
                    .into_iter()
                    .map(|(key, entry)| Ok((key, self.from_avro(value_schema, ns, entry)?)))
                    .collect::<Result<BTreeMap<_, _>>>()
                    .map(NativeValue::Object)
            }
            (Json::Object(obj), value) if obj.get("type").is_some_and(|t| !t.is_string()) => {
                let nested = obj.get("type").unwrap_or(&Json::Null);
                self.from_avro(nested, ns, value)
            }
            (_, value) => plain_from_avro(value),
        }
    }
}

fn is_primitive(name: &str) -> bool {
    matches!(
        name,
        "null" | "boolean" | "int" | "long" | "float" | "double" | "bytes" | "string"
    )
}

/// Shape `value` for a primitive type, `None` if `name` is not primitive
fn primitive_to_avro(name: &str, value: &NativeValue) -> Option<Result<AvroValue>> {
    let shaped = match (name, value) {
        ("null", NativeValue::Null) => Ok(AvroValue::Null),
        ("boolean", NativeValue::Bool(b)) => Ok(AvroValue::Boolean(*b)),
        ("int", NativeValue::Int(i)) => i32::try_from(*i)
            .map(AvroValue::Int)
            .map_err(|_| mismatch("int", value)),
        ("int", NativeValue::UInt(u)) => i32::try_from(*u)
            .map(AvroValue::Int)
            .map_err(|_| mismatch("int", value)),
        ("long", NativeValue::Int(i)) => Ok(AvroValue::Long(*i)),
        // uint64 above i64::MAX wraps, as the chain's own tooling does
        ("long", NativeValue::UInt(u)) => Ok(AvroValue::Long(*u as i64)),
        ("long", NativeValue::Timestamp(ts)) => Ok(AvroValue::Long(ts.timestamp_millis())),
        ("float", NativeValue::Float(f)) => Ok(AvroValue::Float(*f as f32)),
        ("float", NativeValue::Int(i)) => Ok(AvroValue::Float(*i as f32)),
        ("float", NativeValue::UInt(u)) => Ok(AvroValue::Float(*u as f32)),
        ("double", NativeValue::Float(f)) => Ok(AvroValue::Double(*f)),
        ("double", NativeValue::Int(i)) => Ok(AvroValue::Double(*i as f64)),
        ("double", NativeValue::UInt(u)) => Ok(AvroValue::Double(*u as f64)),
        ("bytes", NativeValue::Bytes(bytes)) => Ok(AvroValue::Bytes(bytes.clone())),
        ("string", NativeValue::String(s)) => Ok(AvroValue::String(s.clone())),
        (name, value) if is_primitive(name) => Err(mismatch(name, value)),
        _ => return None,
    };
    Some(shaped)
}

fn decimal_to_avro(obj: &Map<String, Json>, value: &NativeValue) -> Result<AvroValue> {
    let expected = obj.get("scale").and_then(Json::as_u64).unwrap_or_default() as u32;
    match value {
        NativeValue::Decimal { unscaled, scale } if *scale == expected => {
            Ok(AvroValue::Decimal(Decimal::from(unscaled.clone())))
        }
        NativeValue::Int(i) if expected == 0 => Ok(AvroValue::Decimal(Decimal::from(
            crate::codec::converters::twos_complement(i128::from(*i)),
        ))),
        NativeValue::UInt(u) if expected == 0 => Ok(AvroValue::Decimal(Decimal::from(
            crate::codec::converters::twos_complement(i128::from(*u)),
        ))),
        other => Err(mismatch(&format!("decimal of scale {expected}"), other)),
    }
}

fn timestamp_to_avro(value: &NativeValue) -> Result<AvroValue> {
    match value {
        NativeValue::Timestamp(ts) => Ok(AvroValue::TimestampMillis(ts.timestamp_millis())),
        NativeValue::Int(millis) => Ok(AvroValue::TimestampMillis(*millis)),
        other => Err(mismatch("timestamp", other)),
    }
}

fn plain_from_avro(value: AvroValue) -> Result<NativeValue> {
    let native = match value {
        AvroValue::Null => NativeValue::Null,
        AvroValue::Boolean(b) => NativeValue::Bool(b),
        AvroValue::Int(i) => NativeValue::Int(i64::from(i)),
        AvroValue::Long(l) => NativeValue::Int(l),
        AvroValue::Float(f) => NativeValue::Float(f64::from(f)),
        AvroValue::Double(d) => NativeValue::Float(d),
        AvroValue::Bytes(bytes) | AvroValue::Fixed(_, bytes) => NativeValue::Bytes(bytes),
        AvroValue::String(s) | AvroValue::Enum(_, s) => NativeValue::String(s),
        AvroValue::TimestampMillis(millis) => NativeValue::Timestamp(
            DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| CodecError::Codec(format!("timestamp {millis} out of range")))?,
        ),
        AvroValue::Union(_, inner) => plain_from_avro(*inner)?,
        AvroValue::Array(items) => NativeValue::Array(
            items
                .into_iter()
                .map(plain_from_avro)
                .collect::<Result<Vec<_>>>()?,
        ),
        other => {
            return Err(CodecError::Codec(format!(
                "unsupported Avro value {other:?}"
            )))
        }
    };
    Ok(native)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value::{Asset, Symbol};

    const ACCOUNT_SCHEMA: &str = r#"{
        "type": "record",
        "name": "AccountsTableOp",
        "namespace": "io.dkafka.eosio.token.tables.v1",
        "fields": [
            {"name": "owner", "type": "string"},
            {"name": "balance", "type": {
                "type": "record",
                "name": "Asset",
                "namespace": "eosio",
                "convert": "eosio.Asset",
                "fields": [
                    {"name": "amount", "type": {"type": "bytes", "logicalType": "decimal", "precision": 32, "scale": 8}},
                    {"name": "symbol", "type": "string"},
                    {"name": "precision", "type": "int"}
                ]
            }},
            {"name": "staked", "type": ["null", "eosio.Asset"], "default": null},
            {"name": "count", "type": {"eos.type": "uint32", "type": "long"}},
            {"name": "updated", "type": {"type": "long", "logicalType": "timestamp-millis"}}
        ]
    }"#;

    fn eos(amount: i64) -> NativeValue {
        NativeValue::Asset(Asset {
            amount,
            symbol: Symbol {
                precision: 4,
                code: "EOS".to_string(),
            },
        })
    }

    fn row(staked: NativeValue) -> NativeValue {
        NativeValue::object([
            ("owner", NativeValue::from("alice")),
            ("balance", eos(15_000)),
            ("staked", staked),
            ("count", NativeValue::UInt(3)),
            (
                "updated",
                NativeValue::Timestamp(DateTime::from_timestamp_millis(1_000).unwrap()),
            ),
        ])
    }

    fn compiled() -> Arc<dyn CompiledSchema> {
        ApacheAvroEngine::new()
            .compile(ACCOUNT_SCHEMA, &Converters::eos())
            .unwrap()
    }

    #[test]
    fn test_encode_converts_assets() {
        let schema = compiled();
        let decoded = schema.decode(&schema.encode(&row(NativeValue::Null)).unwrap()).unwrap();
        let fields = decoded.as_object().unwrap();

        assert_eq!(fields["owner"], NativeValue::from("alice"));
        assert!(fields["staked"].is_null());
        assert_eq!(fields["count"], NativeValue::Int(3));
        let balance = fields["balance"].as_object().unwrap();
        // 1.5000 EOS at scale 8
        assert_eq!(
            balance["amount"],
            NativeValue::Decimal {
                unscaled: crate::codec::converters::twos_complement(150_000_000),
                scale: 8
            }
        );
        assert_eq!(balance["symbol"], NativeValue::from("EOS"));
        assert_eq!(balance["precision"], NativeValue::Int(4));
        let NativeValue::Timestamp(updated) = &fields["updated"] else {
            panic!("updated must be a timestamp");
        };
        assert_eq!(updated.timestamp_millis(), 1_000);
    }

    #[test]
    fn test_named_reference_in_union() {
        let schema = compiled();
        let decoded = schema.decode(&schema.encode(&row(eos(-1))).unwrap()).unwrap();
        let staked = decoded.as_object().unwrap()["staked"].as_object().unwrap().clone();
        assert_eq!(staked["symbol"], NativeValue::from("EOS"));
    }

    #[test]
    fn test_missing_required_field() {
        let schema = compiled();
        let err = schema
            .encode(&NativeValue::object([("owner", NativeValue::from("alice"))]))
            .unwrap_err();
        assert!(err.to_string().contains("balance"));
    }

    #[test]
    fn test_invalid_schema() {
        assert!(ApacheAvroEngine::new()
            .compile(r#"{"type": "record"}"#, &Converters::eos())
            .is_err());
    }

    #[test]
    fn test_collect_names_inherits_namespace() {
        let json: Json = serde_json::from_str(ACCOUNT_SCHEMA).unwrap();
        let mut names = HashMap::new();
        collect_names(&json, None, &mut names);
        assert!(names.contains_key("io.dkafka.eosio.token.tables.v1.AccountsTableOp"));
        assert_eq!(
            names["eosio.Asset"].namespace.as_deref(),
            Some("eosio")
        );
    }
}
