//! Converters shaping domain values into their wire schema representation
//!
//! A converter is selected by the value itself: an asset value always goes
//! through the `eosio.Asset` converter, a 128-bit integer through
//! `eos.Int128`, and so on. The tags match the `convert` attributes written
//! into generated schemas.

use std::collections::HashMap;

use crate::domain::value::{Asset, KeyMaterial, NativeValue};
use crate::error::{CodecError, Result};
use crate::schema::builtins::{convert, ASSET_AMOUNT_SCALE};

/// Converter function: domain value in, schema-shaped value out
pub type ConvertFn = fn(&NativeValue) -> Result<NativeValue>;

/// Converter table keyed by `convert` tag
#[derive(Clone)]
pub struct Converters {
    table: HashMap<&'static str, ConvertFn>,
}

impl std::fmt::Debug for Converters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<_> = self.table.keys().collect();
        tags.sort();
        f.debug_struct("Converters").field("tags", &tags).finish()
    }
}

impl Default for Converters {
    fn default() -> Self {
        Self::eos()
    }
}

impl Converters {
    /// No converter installed
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Converters for every EOS domain type
    pub fn eos() -> Self {
        let mut converters = Self::empty();
        converters.register(convert::ASSET, asset);
        converters.register(convert::EXTENDED_ASSET, extended_asset);
        converters.register(convert::PUBLIC_KEY, key_material);
        converters.register(convert::SIGNATURE, key_material);
        converters.register(convert::INT128, int128);
        converters.register(convert::UINT128, uint128);
        converters.register(convert::SYMBOL, symbol);
        converters
    }

    pub fn register(&mut self, tag: &'static str, converter: ConvertFn) {
        self.table.insert(tag, converter);
    }

    pub fn get(&self, tag: &str) -> Option<ConvertFn> {
        self.table.get(tag).copied()
    }

    /// Convert `value` if it is a domain value with an installed converter.
    ///
    /// Returns `None` when the value needs no conversion.
    pub fn convert(&self, value: &NativeValue) -> Result<Option<NativeValue>> {
        let Some(tag) = tag_of(value) else {
            return Ok(None);
        };
        match self.get(tag) {
            Some(converter) => converter(value).map(Some),
            None => Ok(None),
        }
    }
}

/// Converter tag of a domain value
pub fn tag_of(value: &NativeValue) -> Option<&'static str> {
    match value {
        NativeValue::Asset(_) => Some(convert::ASSET),
        NativeValue::ExtendedAsset(_) => Some(convert::EXTENDED_ASSET),
        NativeValue::PublicKey(_) => Some(convert::PUBLIC_KEY),
        NativeValue::Signature(_) => Some(convert::SIGNATURE),
        NativeValue::Int128(_) => Some(convert::INT128),
        NativeValue::UInt128(_) => Some(convert::UINT128),
        NativeValue::Symbol(_) => Some(convert::SYMBOL),
        _ => None,
    }
}

/// Minimal big-endian two's complement bytes of `value`
pub fn twos_complement(value: i128) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

/// Inverse of [`twos_complement`]; `None` when wider than 128 bits
pub fn from_twos_complement(bytes: &[u8]) -> Option<i128> {
    if bytes.is_empty() {
        return Some(0);
    }
    if bytes.len() > 16 {
        return None;
    }
    let fill = if bytes[0] & 0x80 != 0 { 0xff } else { 0x00 };
    let mut buf = [fill; 16];
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    Some(i128::from_be_bytes(buf))
}

/// Asset amount as an unscaled decimal of scale [`ASSET_AMOUNT_SCALE`]
///
/// # Errors
/// * `CodecError::Codec` - If the scaled amount does not fit in 128 bits
pub fn asset_amount(asset: &Asset) -> Result<i128> {
    let amount = i128::from(asset.amount);
    let precision = u32::from(asset.symbol.precision);
    let scaled = if precision <= ASSET_AMOUNT_SCALE {
        10i128
            .checked_pow(ASSET_AMOUNT_SCALE - precision)
            .and_then(|factor| amount.checked_mul(factor))
    } else {
        10i128
            .checked_pow(precision - ASSET_AMOUNT_SCALE)
            .map(|divisor| amount / divisor)
    };
    scaled.ok_or_else(|| {
        CodecError::Codec(format!(
            "asset {} {} with precision {precision} cannot be scaled to {ASSET_AMOUNT_SCALE} decimals",
            asset.amount, asset.symbol.code
        ))
    })
}

fn unsupported(tag: &str, value: &NativeValue) -> CodecError {
    CodecError::Codec(format!("unsupported value for converter {tag}: {value:?}"))
}

fn asset_object(asset: &Asset) -> Result<NativeValue> {
    Ok(NativeValue::object([
        (
            "amount",
            NativeValue::Decimal {
                unscaled: twos_complement(asset_amount(asset)?),
                scale: ASSET_AMOUNT_SCALE,
            },
        ),
        ("symbol", NativeValue::String(asset.symbol.code.clone())),
        ("precision", NativeValue::Int(i64::from(asset.symbol.precision))),
    ]))
}

fn asset(value: &NativeValue) -> Result<NativeValue> {
    match value {
        NativeValue::Asset(asset) => asset_object(asset),
        other => Err(unsupported(convert::ASSET, other)),
    }
}

fn extended_asset(value: &NativeValue) -> Result<NativeValue> {
    match value {
        NativeValue::ExtendedAsset(extended) => Ok(NativeValue::object([
            ("quantity", asset_object(&extended.quantity)?),
            ("contract", NativeValue::String(extended.contract.clone())),
        ])),
        other => Err(unsupported(convert::EXTENDED_ASSET, other)),
    }
}

fn key_object(key: &KeyMaterial) -> NativeValue {
    NativeValue::object([
        ("curve", NativeValue::Int(i64::from(key.curve))),
        ("content", NativeValue::Bytes(key.content.clone())),
    ])
}

fn key_material(value: &NativeValue) -> Result<NativeValue> {
    match value {
        NativeValue::PublicKey(key) | NativeValue::Signature(key) => Ok(key_object(key)),
        other => Err(unsupported(convert::PUBLIC_KEY, other)),
    }
}

fn int128(value: &NativeValue) -> Result<NativeValue> {
    match value {
        NativeValue::Int128(v) => Ok(NativeValue::Decimal {
            unscaled: twos_complement(*v),
            scale: 0,
        }),
        other => Err(unsupported(convert::INT128, other)),
    }
}

fn uint128(value: &NativeValue) -> Result<NativeValue> {
    match value {
        NativeValue::UInt128(v) => {
            let bytes = v.to_be_bytes();
            // keep a sign byte when the top bit is set
            let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
            let mut unscaled = Vec::with_capacity(17);
            if bytes[first] & 0x80 != 0 {
                unscaled.push(0);
            }
            unscaled.extend_from_slice(&bytes[first..]);
            Ok(NativeValue::Decimal { unscaled, scale: 0 })
        }
        other => Err(unsupported(convert::UINT128, other)),
    }
}

fn symbol(value: &NativeValue) -> Result<NativeValue> {
    match value {
        NativeValue::Symbol(symbol) => Ok(NativeValue::String(symbol.code.clone())),
        other => Err(unsupported(convert::SYMBOL, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value::{ExtendedAsset, Symbol};

    fn eos(amount: i64, precision: u8) -> Asset {
        Asset {
            amount,
            symbol: Symbol {
                precision,
                code: "EOS".to_string(),
            },
        }
    }

    #[test]
    fn test_twos_complement() {
        assert_eq!(twos_complement(0), vec![0x00]);
        assert_eq!(twos_complement(127), vec![0x7f]);
        assert_eq!(twos_complement(128), vec![0x00, 0x80]);
        assert_eq!(twos_complement(-1), vec![0xff]);
        assert_eq!(twos_complement(-129), vec![0xff, 0x7f]);
        for value in [0, 1, -1, 255, -256, i128::MAX, i128::MIN] {
            assert_eq!(from_twos_complement(&twos_complement(value)), Some(value));
        }
        assert_eq!(from_twos_complement(&[0x01; 17]), None);
    }

    #[test]
    fn test_asset_amount_scaling() {
        assert_eq!(asset_amount(&eos(10_000, 4)).unwrap(), 100_000_000);
        assert_eq!(asset_amount(&eos(5, 8)).unwrap(), 5);
        assert_eq!(asset_amount(&eos(1_234, 10)).unwrap(), 12);
        assert_eq!(asset_amount(&eos(-3, 0)).unwrap(), -300_000_000);
    }

    #[test]
    fn test_out_of_range_precision_fails_conversion() {
        for precision in [47, 60, u8::MAX] {
            let err = Converters::eos()
                .convert(&NativeValue::Asset(eos(1, precision)))
                .unwrap_err();
            assert!(matches!(err, CodecError::Codec(_)));
        }

        let extended = NativeValue::ExtendedAsset(ExtendedAsset {
            quantity: eos(i64::MAX, 60),
            contract: "eosio.token".to_string(),
        });
        assert!(matches!(
            Converters::eos().convert(&extended),
            Err(CodecError::Codec(_))
        ));
        assert_eq!(asset_amount(&eos(1, 46)).unwrap(), 0);
        assert_eq!(
            asset_amount(&eos(i64::MAX, 0)).unwrap(),
            i128::from(i64::MAX) * 100_000_000
        );
    }

    #[test]
    fn test_asset_converter() {
        let converters = Converters::eos();
        let converted = converters
            .convert(&NativeValue::Asset(eos(10_000, 4)))
            .unwrap()
            .unwrap();
        let object = converted.as_object().unwrap();
        assert_eq!(
            object["amount"],
            NativeValue::Decimal {
                unscaled: twos_complement(100_000_000),
                scale: 8
            }
        );
        assert_eq!(object["symbol"], NativeValue::from("EOS"));
        assert_eq!(object["precision"], NativeValue::Int(4));
    }

    #[test]
    fn test_extended_asset_converts_quantity() {
        let value = NativeValue::ExtendedAsset(ExtendedAsset {
            quantity: eos(1, 4),
            contract: "eosio.token".to_string(),
        });
        let converted = Converters::eos().convert(&value).unwrap().unwrap();
        let object = converted.as_object().unwrap();
        assert!(object["quantity"].as_object().is_some());
        assert_eq!(object["contract"], NativeValue::from("eosio.token"));
    }

    #[test]
    fn test_uint128_keeps_sign_byte() {
        let converted = Converters::eos()
            .convert(&NativeValue::UInt128(u128::MAX))
            .unwrap()
            .unwrap();
        let NativeValue::Decimal { unscaled, scale } = converted else {
            panic!("uint128 must convert to a decimal");
        };
        assert_eq!(scale, 0);
        assert_eq!(unscaled.len(), 17);
        assert_eq!(unscaled[0], 0);

        let small = Converters::eos()
            .convert(&NativeValue::UInt128(5))
            .unwrap()
            .unwrap();
        assert_eq!(
            small,
            NativeValue::Decimal {
                unscaled: vec![5],
                scale: 0
            }
        );
    }

    #[test]
    fn test_plain_values_pass_through() {
        let converters = Converters::eos();
        assert!(converters.convert(&NativeValue::Int(3)).unwrap().is_none());
        assert!(Converters::empty()
            .convert(&NativeValue::Asset(eos(1, 4)))
            .unwrap()
            .is_none());
        assert_eq!(
            converters
                .convert(&NativeValue::Symbol(Symbol {
                    precision: 4,
                    code: "EOS".to_string()
                }))
                .unwrap(),
            Some(NativeValue::from("EOS"))
        );
    }
}
