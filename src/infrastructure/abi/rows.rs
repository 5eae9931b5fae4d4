//! Binary table-row decoder driven by a contract ABI

use std::collections::BTreeMap;

use anyhow::{bail, ensure, Context, Result};
use chrono::{DateTime, Utc};

use super::binary::BinaryReader;
use crate::domain::abi::{AbiDefinition, RowDecoder};
use crate::domain::value::{Asset, ExtendedAsset, KeyMaterial, NativeValue, Symbol};
use crate::error::CodecError;

const MAX_DEPTH: usize = 32;
/// Array items accepted in a single row
const MAX_ROW_ITEMS: usize = 1 << 20;

/// 2000-01-01T00:00:00Z, origin of block timestamps
const BLOCK_TIMESTAMP_EPOCH_MS: i64 = 946_684_800_000;
const BLOCK_INTERVAL_MS: i64 = 500;

const KEY_LEN: usize = 33;
const SIGNATURE_LEN: usize = 65;
/// WebAuthn curve index
const CURVE_WA: u8 = 2;

/// Decodes raw rows into [`NativeValue`]s.
///
/// Variants decode to the value of their active member.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryRowDecoder;

impl BinaryRowDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl RowDecoder for BinaryRowDecoder {
    fn decode_row(
        &self,
        abi: &AbiDefinition,
        type_name: &str,
        data: &[u8],
    ) -> crate::error::Result<NativeValue> {
        let mut row = RowReader::new(abi, data);
        let value = row
            .read_type(type_name, 0)
            .map_err(|e| CodecError::RowDecode(format!("{type_name}: {e:#}")))?;
        if !row.reader.is_empty() {
            return Err(CodecError::RowDecode(format!(
                "{type_name}: {} trailing bytes after offset {}",
                row.reader.remaining(),
                row.reader.position()
            )));
        }
        Ok(value)
    }
}

/// Decoding state of one row
struct RowReader<'a> {
    abi: &'a AbiDefinition,
    reader: BinaryReader<'a>,
    /// Array items read so far, across every array of the row
    items: usize,
}

impl<'a> RowReader<'a> {
    fn new(abi: &'a AbiDefinition, data: &'a [u8]) -> Self {
        Self {
            abi,
            reader: BinaryReader::new(data),
            items: 0,
        }
    }

    fn read_type(&mut self, type_name: &str, depth: usize) -> Result<NativeValue> {
        ensure!(depth < MAX_DEPTH, "type nesting deeper than {MAX_DEPTH}");

        if let Some(inner) = type_name.strip_suffix('$') {
            if self.reader.is_empty() {
                return Ok(NativeValue::Null);
            }
            return self.read_type(inner, depth + 1);
        }
        if let Some(inner) = type_name.strip_suffix("[]") {
            let count = self.read_count(type_name, inner)?;
            let mut items = Vec::with_capacity(count.min(self.reader.remaining()));
            for idx in 0..count {
                let item = self
                    .read_type(inner, depth + 1)
                    .with_context(|| format!("item {idx} of {type_name}"))?;
                items.push(item);
            }
            return Ok(NativeValue::Array(items));
        }
        if let Some(inner) = type_name.strip_suffix('?') {
            if !self.reader.read_bool()? {
                return Ok(NativeValue::Null);
            }
            return self.read_type(inner, depth + 1);
        }

        if let Some(value) = read_builtin(&mut self.reader, type_name)? {
            return Ok(value);
        }
        let abi = self.abi;
        if let Some(target) = abi.alias(type_name) {
            return self.read_type(target, depth + 1);
        }
        if let Some(variant) = abi.variant(type_name) {
            let idx = self.reader.read_varuint32()? as usize;
            let Some(member) = variant.types.get(idx) else {
                bail!("variant {type_name} has no member {idx}");
            };
            return self.read_type(member, depth + 1);
        }
        if abi.struct_def(type_name).is_some() {
            let mut fields = BTreeMap::new();
            self.read_struct(type_name, &mut fields, depth)?;
            return Ok(NativeValue::Object(fields));
        }
        bail!("unknown type {type_name}")
    }

    /// Read the fields of `name` and its bases, base fields first
    fn read_struct(
        &mut self,
        name: &str,
        fields: &mut BTreeMap<String, NativeValue>,
        depth: usize,
    ) -> Result<()> {
        ensure!(depth < MAX_DEPTH, "struct {name} has too many bases");
        let abi = self.abi;
        let Some(def) = abi.struct_def(name) else {
            bail!("unknown struct {name}");
        };
        if !def.base.is_empty() {
            self.read_struct(&def.base, fields, depth + 1)?;
        }
        for field in &def.fields {
            let value = self
                .read_type(&field.kind, depth + 1)
                .with_context(|| format!("field {}.{}", name, field.name))?;
            fields.insert(field.name.clone(), value);
        }
        Ok(())
    }

    /// Element count of an array, bounded by the bytes left and the row's
    /// item budget
    fn read_count(&mut self, type_name: &str, item_type: &str) -> Result<usize> {
        let count = self.reader.read_varuint32()? as usize;
        let remaining = self.reader.remaining();
        let width = min_width(self.abi, item_type, 0);
        ensure!(
            count.saturating_mul(width) <= remaining,
            "{type_name} announces {count} items of at least {width} bytes, {remaining} bytes left"
        );
        self.items = self.items.saturating_add(count);
        ensure!(
            self.items <= MAX_ROW_ITEMS,
            "{type_name} exceeds the limit of {MAX_ROW_ITEMS} array items per row"
        );
        Ok(count)
    }
}

/// Fewest bytes an instance of `type_name` can take
fn min_width(abi: &AbiDefinition, type_name: &str, depth: usize) -> usize {
    if depth >= MAX_DEPTH || type_name.ends_with('$') {
        return 0;
    }
    if type_name.ends_with("[]") || type_name.ends_with('?') {
        return 1;
    }
    if let Some(width) = builtin_width(type_name) {
        return width;
    }
    if let Some(target) = abi.alias(type_name) {
        return min_width(abi, target, depth + 1);
    }
    if abi.variant(type_name).is_some() {
        return 1;
    }
    let mut width = 0;
    let mut name = type_name;
    let mut level = depth;
    while let Some(def) = abi.struct_def(name) {
        width += def
            .fields
            .iter()
            .map(|field| min_width(abi, &field.kind, level + 1))
            .sum::<usize>();
        level += 1;
        if def.base.is_empty() || level >= MAX_DEPTH {
            break;
        }
        name = &def.base;
    }
    width
}

fn builtin_width(type_name: &str) -> Option<usize> {
    let width = match type_name {
        "bool" | "int8" | "uint8" | "varint32" | "varuint32" | "string" | "bytes" => 1,
        "int16" | "uint16" => 2,
        "int32" | "uint32" | "float32" | "time_point_sec" | "block_timestamp_type" => 4,
        "int64" | "uint64" | "float64" | "time_point" | "name" | "symbol" | "symbol_code" => 8,
        "int128" | "uint128" | "float128" | "asset" => 16,
        "checksum160" => 20,
        "extended_asset" => 24,
        "checksum256" => 32,
        "public_key" => 1 + KEY_LEN,
        "checksum512" => 64,
        "signature" => 1 + SIGNATURE_LEN,
        _ => return None,
    };
    Some(width)
}

fn read_builtin(reader: &mut BinaryReader<'_>, type_name: &str) -> Result<Option<NativeValue>> {
    let value = match type_name {
        "bool" => NativeValue::Bool(reader.read_bool()?),
        "int8" => NativeValue::Int(i64::from(reader.read_u8()? as i8)),
        "uint8" => NativeValue::UInt(u64::from(reader.read_u8()?)),
        "int16" => NativeValue::Int(i64::from(reader.read_u16()? as i16)),
        "uint16" => NativeValue::UInt(u64::from(reader.read_u16()?)),
        "int32" => NativeValue::Int(i64::from(reader.read_u32()? as i32)),
        "uint32" => NativeValue::UInt(u64::from(reader.read_u32()?)),
        "int64" => NativeValue::Int(reader.read_u64()? as i64),
        "uint64" => NativeValue::UInt(reader.read_u64()?),
        "int128" => NativeValue::Int128(reader.read_u128()? as i128),
        "uint128" => NativeValue::UInt128(reader.read_u128()?),
        "varint32" => NativeValue::Int(i64::from(reader.read_varint32()?)),
        "varuint32" => NativeValue::UInt(u64::from(reader.read_varuint32()?)),
        "float32" => NativeValue::Float(f64::from(f32::from_bits(reader.read_u32()?))),
        "float64" => NativeValue::Float(f64::from_bits(reader.read_u64()?)),
        "float128" => NativeValue::Bytes(reader.read_bytes(16)?.to_vec()),
        "time_point" => {
            let micros = reader.read_u64()? as i64;
            NativeValue::Timestamp(timestamp_millis(micros / 1_000)?)
        }
        "time_point_sec" => {
            let secs = i64::from(reader.read_u32()?);
            NativeValue::Timestamp(timestamp_millis(secs * 1_000)?)
        }
        "block_timestamp_type" => {
            let slot = i64::from(reader.read_u32()?);
            NativeValue::Timestamp(timestamp_millis(
                BLOCK_TIMESTAMP_EPOCH_MS + slot * BLOCK_INTERVAL_MS,
            )?)
        }
        "name" => NativeValue::String(reader.read_name()?),
        "string" => NativeValue::String(reader.read_string()?),
        "bytes" => NativeValue::Bytes(reader.read_blob()?.to_vec()),
        "checksum160" => NativeValue::Bytes(reader.read_bytes(20)?.to_vec()),
        "checksum256" => NativeValue::Bytes(reader.read_bytes(32)?.to_vec()),
        "checksum512" => NativeValue::Bytes(reader.read_bytes(64)?.to_vec()),
        "public_key" => NativeValue::PublicKey(read_public_key(reader)?),
        "signature" => NativeValue::Signature(read_signature(reader)?),
        "symbol" => NativeValue::Symbol(read_symbol(reader)?),
        "symbol_code" => NativeValue::String(symbol_code(reader.read_u64()?)?),
        "asset" => NativeValue::Asset(read_asset(reader)?),
        "extended_asset" => NativeValue::ExtendedAsset(ExtendedAsset {
            quantity: read_asset(reader)?,
            contract: reader.read_name()?,
        }),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn timestamp_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .with_context(|| format!("timestamp {millis}ms out of range"))
}

fn read_public_key(reader: &mut BinaryReader<'_>) -> Result<KeyMaterial> {
    let curve = reader.read_u8()?;
    let mut content = reader.read_bytes(KEY_LEN)?.to_vec();
    if curve == CURVE_WA {
        // user presence flag and relying party id
        content.push(reader.read_u8()?);
        content.extend_from_slice(&encoded_blob(reader)?);
    }
    Ok(KeyMaterial { curve, content })
}

fn read_signature(reader: &mut BinaryReader<'_>) -> Result<KeyMaterial> {
    let curve = reader.read_u8()?;
    let mut content = reader.read_bytes(SIGNATURE_LEN)?.to_vec();
    if curve == CURVE_WA {
        // authenticator data and client JSON
        content.extend_from_slice(&encoded_blob(reader)?);
        content.extend_from_slice(&encoded_blob(reader)?);
    }
    Ok(KeyMaterial { curve, content })
}

/// A length-prefixed blob, prefix included
fn encoded_blob(reader: &mut BinaryReader<'_>) -> Result<Vec<u8>> {
    let start = reader.position();
    let mut lookahead = reader.clone();
    lookahead.read_blob()?;
    let len = lookahead.position() - start;
    Ok(reader.read_bytes(len)?.to_vec())
}

fn read_symbol(reader: &mut BinaryReader<'_>) -> Result<Symbol> {
    let raw = reader.read_u64()?;
    Ok(Symbol {
        precision: (raw & 0xff) as u8,
        code: symbol_code(raw >> 8)?,
    })
}

/// Up to seven upper-case letters, lowest byte first
fn symbol_code(raw: u64) -> Result<String> {
    let code: String = raw
        .to_le_bytes()
        .iter()
        .take_while(|byte| **byte != 0)
        .map(|byte| char::from(*byte))
        .collect();
    ensure!(
        code.chars().all(|c| c.is_ascii_uppercase()),
        "invalid symbol code {code:?}"
    );
    Ok(code)
}

fn read_asset(reader: &mut BinaryReader<'_>) -> Result<Asset> {
    let amount = reader.read_u64()? as i64;
    let symbol = read_symbol(reader)?;
    Ok(Asset { amount, symbol })
}
