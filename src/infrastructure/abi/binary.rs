//! EOS binary primitives: little-endian integers, LEB128 varints, names

use anyhow::{bail, ensure, Context, Result};

const NAME_CHARS: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";
const NAME_MAX_LEN: usize = 13;

/// Cursor over a binary payload
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        ensure!(
            len <= self.remaining(),
            "need {len} bytes at offset {}, {} left",
            self.pos,
            self.remaining()
        );
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => bail!("invalid bool byte {other:#04x}"),
        }
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_u128(&mut self) -> Result<u128> {
        Ok(u128::from_le_bytes(self.read_array()?))
    }

    /// Unsigned LEB128, at most 32 bits
    pub fn read_varuint32(&mut self) -> Result<u32> {
        let mut value: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            ensure!(shift < 35, "varuint32 longer than 5 bytes");
        }
        u32::try_from(value).context("varuint32 overflow")
    }

    /// Zig-zag encoded LEB128
    pub fn read_varint32(&mut self) -> Result<i32> {
        let raw = self.read_varuint32()?;
        Ok(((raw >> 1) as i32) ^ -((raw & 1) as i32))
    }

    /// Length-prefixed byte string
    pub fn read_blob(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varuint32()? as usize;
        self.read_bytes(len)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_blob()?;
        String::from_utf8(bytes.to_vec()).context("string is not valid UTF-8")
    }

    /// 64-bit account/action name
    pub fn read_name(&mut self) -> Result<String> {
        Ok(name_to_string(self.read_u64()?))
    }

    /// Read a varuint32 count then `count` items
    pub fn read_vec<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let count = self.read_varuint32()? as usize;
        // every item takes at least one byte
        ensure!(
            count <= self.remaining(),
            "sequence of {count} items exceeds the {} bytes left",
            self.remaining()
        );
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(item(self)?);
        }
        Ok(items)
    }
}

/// Render a 64-bit name with the base-32 alphabet, dropping trailing dots
pub fn name_to_string(value: u64) -> String {
    let mut chars = [b'.'; NAME_MAX_LEN];
    let mut rest = value;
    for i in 0..NAME_MAX_LEN {
        let (mask, width) = if i == 0 { (0x0f, 4) } else { (0x1f, 5) };
        chars[NAME_MAX_LEN - 1 - i] = NAME_CHARS[(rest & mask) as usize];
        rest >>= width;
    }
    let len = chars
        .iter()
        .rposition(|c| *c != b'.')
        .map_or(0, |idx| idx + 1);
    chars[..len].iter().map(|c| char::from(*c)).collect()
}

/// Encode a name; up to 12 characters of the alphabet plus an optional
/// 13th in `.1-5a-j`
pub fn string_to_name(name: &str) -> Result<u64> {
    ensure!(name.len() <= NAME_MAX_LEN, "name '{name}' is longer than 13 characters");
    let mut value = 0u64;
    for (i, c) in name.bytes().enumerate() {
        let Some(symbol) = NAME_CHARS.iter().position(|known| *known == c) else {
            bail!("invalid character '{}' in name '{name}'", char::from(c));
        };
        let symbol = symbol as u64;
        if i < NAME_MAX_LEN - 1 {
            value |= symbol << (64 - 5 * (i + 1));
        } else {
            ensure!(symbol <= 0x0f, "invalid 13th character in name '{name}'");
            value |= symbol;
        }
    }
    Ok(value)
}
