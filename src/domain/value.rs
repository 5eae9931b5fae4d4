//! Native values produced by the row decoder and consumed by codecs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token symbol: precision and code (e.g. `4,EOS`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub precision: u8,
    pub code: String,
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.precision, self.code)
    }
}

/// Token quantity expressed in the smallest unit of its symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub amount: i64,
    pub symbol: Symbol,
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let precision = usize::from(self.symbol.precision);
        let sign = if self.amount < 0 { "-" } else { "" };
        let abs = self.amount.unsigned_abs();
        if precision == 0 {
            return write!(f, "{sign}{abs} {}", self.symbol.code);
        }
        let digits = format!("{abs:0>width$}", width = precision + 1);
        let (int_part, frac_part) = digits.split_at(digits.len() - precision);
        write!(f, "{sign}{int_part}.{frac_part} {}", self.symbol.code)
    }
}

/// Asset bound to the contract that issued it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedAsset {
    pub quantity: Asset,
    pub contract: String,
}

/// Public key or signature bytes tagged with their curve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMaterial {
    pub curve: u8,
    pub content: Vec<u8>,
}

/// A decoded value.
///
/// Domain types (assets, keys, symbols, 128-bit integers) stay typed so that
/// codec converters can shape them for the wire schema.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Int128(i128),
    UInt128(u128),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    /// Big-endian two's complement unscaled value
    Decimal { unscaled: Vec<u8>, scale: u32 },
    Asset(Asset),
    ExtendedAsset(ExtendedAsset),
    PublicKey(KeyMaterial),
    Signature(KeyMaterial),
    Symbol(Symbol),
    Array(Vec<NativeValue>),
    Object(BTreeMap<String, NativeValue>),
}

impl NativeValue {
    /// Build an object from `(key, value)` pairs
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, NativeValue)>) -> Self {
        Self::Object(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, NativeValue>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<serde_json::Value> for NativeValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInt(u)
                } else {
                    Self::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<&str> for NativeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for NativeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for NativeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for NativeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
