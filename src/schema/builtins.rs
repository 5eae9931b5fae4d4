//! Built-in ABI types and their Avro mappings
//!
//! Two primitive tables exist because rows and actions reach us in different
//! shapes: table rows are decoded from raw binary (exact numeric, time and
//! checksum types), action arguments arrive pre-rendered as JSON strings
//! (assets, keys, signatures, times and symbols are plain strings).

use super::node::{Field, Primitive, RecordSchema, Scalar, Schema};
use crate::error::Result;

/// Which primitive table the resolver uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolveMode {
    /// Persistent table rows, decoded from binary
    Table,
    /// Action arguments, rendered as JSON by the upstream decoder
    Action,
}

/// Converter tags understood by the codec engine
pub mod convert {
    pub const ASSET: &str = "eosio.Asset";
    pub const EXTENDED_ASSET: &str = "eosio.ExtendedAsset";
    pub const PUBLIC_KEY: &str = "ecc.PublicKey";
    pub const SIGNATURE: &str = "ecc.Signature";
    pub const INT128: &str = "eos.Int128";
    pub const UINT128: &str = "eos.Uint128";
    pub const SYMBOL: &str = "eos.Symbol";
}

/// Precision and scale of asset amounts
pub const ASSET_AMOUNT_PRECISION: u32 = 32;
pub const ASSET_AMOUNT_SCALE: u32 = 8;

/// Name of the key/value store variant spanning every primitive and vector
pub const CATCH_ALL_VARIANT: &str = "variant_int8_int16_int32_int64_uint8_uint16_uint32_uint64_float32_float64_string_boolean_INT8_VEC_INT16_VEC_INT32_VEC_INT64_VEC_UINT8_VEC_UINT16_VEC_UINT32_VEC_UINT64_VEC_FLOAT32_VEC_FLOAT64_VEC_STRING_VEC_BOOL_VEC";

/// Primitive mapping of `name` in `mode`
pub fn primitive(mode: ResolveMode, name: &str) -> Option<Schema> {
    if mode == ResolveMode::Action {
        match name {
            "asset" | "extended_asset" | "public_key" | "signature" | "time_point"
            | "time_point_sec" | "block_timestamp_type" | "symbol" => {
                return Some(Schema::primitive(Primitive::String));
            }
            "uint64" => return Some(Scalar::eos(Primitive::Long, "uint64").into()),
            _ => {}
        }
    }
    let scalar = match name {
        "bool" => Scalar::eos(Primitive::Boolean, name),
        "int8" | "uint8" | "int16" | "uint16" | "int32" | "varint32" => {
            Scalar::eos(Primitive::Int, name)
        }
        "uint32" | "int64" | "varuint32" => Scalar::eos(Primitive::Long, name),
        "uint64" => Scalar::eos(Primitive::Long, name).with_logical_type("eos.uint64"),
        "float32" => Scalar::eos(Primitive::Float, name),
        "float64" => Scalar::eos(Primitive::Double, name),
        "time_point" | "time_point_sec" | "block_timestamp_type" => {
            Scalar::timestamp_millis(Some(name))
        }
        "name" | "string" | "symbol_code" => Scalar::eos(Primitive::String, name),
        "bytes" | "checksum160" | "checksum256" | "checksum512" => {
            Scalar::eos(Primitive::Bytes, name)
        }
        "symbol" => Scalar::eos(Primitive::String, name).with_convert(convert::SYMBOL),
        _ => return None,
    };
    Some(scalar.into())
}

/// 128-bit integers, carried as scale-0 decimals
pub fn decimal(name: &str) -> Option<Schema> {
    let tag = match name {
        "int128" => convert::INT128,
        "uint128" => convert::UINT128,
        _ => return None,
    };
    Some(
        Scalar::decimal(39, 0)
            .with_eos_type(name)
            .with_convert(tag)
            .into(),
    )
}

/// Hand-authored records for asset-like, key-like and signature-like types
pub fn composite(mode: ResolveMode, name: &str) -> Option<CompositeKind> {
    if mode == ResolveMode::Action {
        return None;
    }
    match name {
        "asset" => Some(CompositeKind::Asset),
        "extended_asset" => Some(CompositeKind::ExtendedAsset),
        "public_key" => Some(CompositeKind::PublicKey),
        "signature" => Some(CompositeKind::Signature),
        _ => None,
    }
}

/// Built-in composite records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeKind {
    Asset,
    ExtendedAsset,
    PublicKey,
    Signature,
}

impl CompositeKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Asset => "Asset",
            Self::ExtendedAsset => "ExtendedAsset",
            Self::PublicKey => "PublicKey",
            Self::Signature => "Signature",
        }
    }

    pub fn namespace(self) -> &'static str {
        match self {
            Self::Asset | Self::ExtendedAsset => "eosio",
            Self::PublicKey | Self::Signature => "ecc",
        }
    }

    /// Qualified name, used for references once emitted
    pub fn reference(self) -> String {
        format!("{}.{}", self.namespace(), self.name())
    }

    /// Build the record. `quantity` supplies the nested asset schema of an
    /// extended asset and is not called for the other kinds.
    pub fn record(self, quantity: impl FnOnce() -> Result<Schema>) -> Result<RecordSchema> {
        let record = match self {
            Self::Asset => asset_record(),
            Self::ExtendedAsset => RecordSchema::new(
                self.name(),
                vec![
                    Field::new("quantity", quantity()?),
                    Field::new("contract", Scalar::eos(Primitive::String, "name")),
                ],
            )
            .with_namespace(self.namespace())
            .with_convert(convert::EXTENDED_ASSET),
            Self::PublicKey => curve_record(self.name(), convert::PUBLIC_KEY),
            Self::Signature => curve_record(self.name(), convert::SIGNATURE),
        };
        Ok(record)
    }
}

pub fn asset_record() -> RecordSchema {
    RecordSchema::new(
        "Asset",
        vec![
            Field::new(
                "amount",
                Scalar::decimal(ASSET_AMOUNT_PRECISION, ASSET_AMOUNT_SCALE),
            ),
            Field::new("symbol", Primitive::String),
            Field::new("precision", Primitive::Int),
        ],
    )
    .with_namespace("eosio")
    .with_convert(convert::ASSET)
}

fn curve_record(name: &str, tag: &str) -> RecordSchema {
    RecordSchema::new(
        name,
        vec![
            Field::new("curve", Primitive::Int),
            Field::new("content", Primitive::Bytes),
        ],
    )
    .with_namespace("ecc")
    .with_convert(tag)
}

/// Fixed union used for [`CATCH_ALL_VARIANT`].
///
/// Avro forbids two unnamed members of the same type in one union, so the
/// numeric members collapse to their widest Avro type and the vector members
/// to a single array of the scalar union.
pub fn catch_all_union() -> Schema {
    let scalars = vec![
        Schema::primitive(Primitive::Int),
        Schema::primitive(Primitive::Long),
        Schema::primitive(Primitive::Float),
        Schema::primitive(Primitive::Double),
        Schema::primitive(Primitive::String),
        Schema::primitive(Primitive::Boolean),
    ];
    let mut members = scalars.clone();
    members.push(Schema::array(Schema::Union(scalars)));
    Schema::Union(members)
}
