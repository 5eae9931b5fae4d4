//! Schema node model: the typed tree serialized as Avro JSON

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Avro primitive types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Primitive {
    #[default]
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
}

impl Primitive {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Bytes => "bytes",
            Self::String => "string",
        }
    }
}

/// A primitive with optional annotations.
///
/// Serializes to the bare type name when it carries no annotation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Scalar {
    pub kind: Primitive,
    /// Source ABI type (`eos.type` attribute)
    pub eos_type: Option<String>,
    pub logical_type: Option<String>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    /// Converter hook name applied by the codec engine
    pub convert: Option<String>,
}

impl Scalar {
    pub fn new(kind: Primitive) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn eos(kind: Primitive, eos_type: &str) -> Self {
        Self::new(kind).with_eos_type(eos_type)
    }

    pub fn with_eos_type(mut self, eos_type: &str) -> Self {
        self.eos_type = Some(eos_type.to_string());
        self
    }

    pub fn with_logical_type(mut self, logical_type: &str) -> Self {
        self.logical_type = Some(logical_type.to_string());
        self
    }

    pub fn with_convert(mut self, convert: &str) -> Self {
        self.convert = Some(convert.to_string());
        self
    }

    pub fn decimal(precision: u32, scale: u32) -> Self {
        Self {
            precision: Some(precision),
            scale: Some(scale),
            ..Self::new(Primitive::Bytes).with_logical_type("decimal")
        }
    }

    /// `long` carrying milliseconds since epoch
    pub fn timestamp_millis(eos_type: Option<&str>) -> Self {
        let scalar = Self::new(Primitive::Long).with_logical_type("timestamp-millis");
        match eos_type {
            Some(eos_type) => scalar.with_eos_type(eos_type),
            None => scalar,
        }
    }

    fn is_bare(&self) -> bool {
        self.eos_type.is_none()
            && self.logical_type.is_none()
            && self.precision.is_none()
            && self.scale.is_none()
            && self.convert.is_none()
    }
}

/// A record field
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub doc: Option<String>,
    pub schema: Schema,
    pub default: Option<serde_json::Value>,
}

impl Field {
    pub fn new(name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        Self {
            name: name.into(),
            doc: None,
            schema: schema.into(),
            default: None,
        }
    }

    /// Field whose schema already is a `null`-first union, defaulting to null
    pub fn nullable(name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        Self {
            default: Some(serde_json::Value::Null),
            ..Self::new(name, schema)
        }
    }

    /// Field wrapping `schema` as optional, defaulting to null
    pub fn optional(name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        Self::nullable(name, Schema::optional(schema.into()))
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn is_optional(&self) -> bool {
        self.schema.is_nullable_union()
    }
}

/// A named record
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordSchema {
    pub name: String,
    pub namespace: Option<String>,
    pub doc: Option<String>,
    pub convert: Option<String>,
    pub fields: Vec<Field>,
}

impl RecordSchema {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
            ..Self::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        self.namespace = (!namespace.is_empty()).then_some(namespace);
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn with_convert(mut self, convert: impl Into<String>) -> Self {
        self.convert = Some(convert.into());
        self
    }

    /// Name used to reference this record once emitted
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}.{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    fn serialize_entries<M: SerializeMap>(&self, map: &mut M) -> Result<(), M::Error> {
        map.serialize_entry("type", "record")?;
        map.serialize_entry("name", &self.name)?;
        if let Some(namespace) = &self.namespace {
            map.serialize_entry("namespace", namespace)?;
        }
        if let Some(doc) = &self.doc {
            map.serialize_entry("doc", doc)?;
        }
        if let Some(convert) = &self.convert {
            map.serialize_entry("convert", convert)?;
        }
        map.serialize_entry("fields", &self.fields)
    }
}

/// A schema node
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    Scalar(Scalar),
    Array(Box<Schema>),
    Union(Vec<Schema>),
    Record(RecordSchema),
    /// Bare reference to a record already emitted in the same document
    Named(String),
}

impl Schema {
    pub fn primitive(kind: Primitive) -> Self {
        Self::Scalar(Scalar::new(kind))
    }

    pub fn null() -> Self {
        Self::primitive(Primitive::Null)
    }

    pub fn array(items: impl Into<Schema>) -> Self {
        Self::Array(Box::new(items.into()))
    }

    /// Prefix with `null`, flattening an inner union
    pub fn optional(inner: Schema) -> Self {
        match inner {
            Self::Union(members) if members.first().is_some_and(Schema::is_null) => {
                Self::Union(members)
            }
            Self::Union(members) => {
                let mut union = Vec::with_capacity(members.len() + 1);
                union.push(Self::null());
                union.extend(members);
                Self::Union(union)
            }
            other => Self::Union(vec![Self::null(), other]),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Self::Scalar(scalar) => scalar.kind == Primitive::Null && scalar.is_bare(),
            _ => false,
        }
    }

    /// True for a union whose first member is `null`
    pub fn is_nullable_union(&self) -> bool {
        matches!(self, Self::Union(members) if members.first().is_some_and(Schema::is_null))
    }

    pub fn as_record(&self) -> Option<&RecordSchema> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Avro JSON text of this schema
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<Primitive> for Schema {
    fn from(kind: Primitive) -> Self {
        Self::primitive(kind)
    }
}

impl From<Scalar> for Schema {
    fn from(scalar: Scalar) -> Self {
        Self::Scalar(scalar)
    }
}

impl From<RecordSchema> for Schema {
    fn from(record: RecordSchema) -> Self {
        Self::Record(record)
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let kind = self.kind.as_str();
        if self.is_bare() {
            return serializer.serialize_str(kind);
        }
        let mut map = serializer.serialize_map(None)?;
        if let Some(eos_type) = &self.eos_type {
            map.serialize_entry("eos.type", eos_type)?;
        }
        if let Some(logical_type) = &self.logical_type {
            map.serialize_entry("logicalType", logical_type)?;
        }
        map.serialize_entry("type", kind)?;
        if let Some(precision) = self.precision {
            map.serialize_entry("precision", &precision)?;
        }
        if let Some(scale) = self.scale {
            map.serialize_entry("scale", &scale)?;
        }
        if let Some(convert) = &self.convert {
            map.serialize_entry("convert", convert)?;
        }
        map.end()
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("name", &self.name)?;
        if let Some(doc) = &self.doc {
            map.serialize_entry("doc", doc)?;
        }
        map.serialize_entry("type", &self.schema)?;
        if let Some(default) = &self.default {
            map.serialize_entry("default", default)?;
        }
        map.end()
    }
}

impl Serialize for RecordSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        self.serialize_entries(&mut map)?;
        map.end()
    }
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Scalar(scalar) => scalar.serialize(serializer),
            Self::Array(items) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "array")?;
                map.serialize_entry("items", items)?;
                map.end()
            }
            Self::Union(members) => members.serialize(serializer),
            Self::Record(record) => record.serialize(serializer),
            Self::Named(name) => serializer.serialize_str(name),
        }
    }
}

/// Notification metadata attached to every message schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetaSchema {
    pub compatibility: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// Top-level record published to the registry
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSchema {
    pub record: RecordSchema,
    pub meta: MetaSchema,
}

impl MessageSchema {
    /// Registry subject: `{namespace}.{name}`
    pub fn subject(&self) -> String {
        format!(
            "{}.{}",
            self.record.namespace.as_deref().unwrap_or_default(),
            self.record.name
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Serialize for MessageSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        self.record.serialize_entries(&mut map)?;
        map.serialize_entry("meta", &self.meta)?;
        map.end()
    }
}
