//! Binary ABI decoder for `setabi` payloads

use anyhow::{Context, Result};
use tracing::debug;

use super::binary::BinaryReader;
use crate::domain::abi::{
    AbiDecoder, AbiDefinition, ActionDef, ClauseDef, FieldDef, StructDef, TableDef, TypeDef,
    VariantDef,
};
use crate::error::CodecError;

/// Decodes the EOS binary ABI layout
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryAbiDecoder;

impl BinaryAbiDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode raw ABI bytes
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<AbiDefinition> {
        let mut reader = BinaryReader::new(bytes);

        let version = reader.read_string().context("version")?;
        let types = reader.read_vec(read_type_def).context("types")?;
        let structs = reader.read_vec(read_struct_def).context("structs")?;
        let actions = reader.read_vec(read_action_def).context("actions")?;
        let tables = reader.read_vec(read_table_def).context("tables")?;
        let clauses = reader.read_vec(read_clause_def).context("ricardian clauses")?;
        // error messages and extensions are not kept
        reader
            .read_vec(|r| {
                r.read_u64()?;
                r.read_string()
            })
            .context("error messages")?;
        reader
            .read_vec(|r| {
                r.read_u16()?;
                r.read_blob().map(|_| ())
            })
            .context("abi extensions")?;

        // binary extension, absent from ABIs older than 1.1
        let variants = if reader.is_empty() {
            Vec::new()
        } else {
            reader.read_vec(read_variant_def).context("variants")?
        };
        if !reader.is_empty() {
            debug!(
                version = %version,
                ignored = reader.remaining(),
                "ignore ABI sections after variants"
            );
        }

        let mut abi = AbiDefinition::new(version, types, structs, actions, tables, variants);
        abi.ricardian_clauses = clauses;
        Ok(abi)
    }
}

impl AbiDecoder for BinaryAbiDecoder {
    fn decode_abi(
        &self,
        trx_id: &str,
        account: &str,
        hex_payload: &str,
    ) -> crate::error::Result<AbiDefinition> {
        let payload = hex_payload.trim();
        let payload = payload.strip_prefix("0x").unwrap_or(payload);
        let bytes = hex::decode(payload).map_err(|e| {
            CodecError::AbiDecode(format!(
                "invalid hex ABI of {account} in transaction {trx_id}: {e}"
            ))
        })?;
        self.decode_bytes(&bytes).map_err(|e| {
            CodecError::AbiDecode(format!(
                "cannot decode ABI of {account} in transaction {trx_id}: {e:#}"
            ))
        })
    }
}

fn read_type_def(reader: &mut BinaryReader<'_>) -> Result<TypeDef> {
    Ok(TypeDef {
        new_type_name: reader.read_string()?,
        kind: reader.read_string()?,
    })
}

fn read_field_def(reader: &mut BinaryReader<'_>) -> Result<FieldDef> {
    Ok(FieldDef {
        name: reader.read_string()?,
        kind: reader.read_string()?,
    })
}

fn read_struct_def(reader: &mut BinaryReader<'_>) -> Result<StructDef> {
    Ok(StructDef {
        name: reader.read_string()?,
        base: reader.read_string()?,
        fields: reader.read_vec(read_field_def)?,
    })
}

fn read_action_def(reader: &mut BinaryReader<'_>) -> Result<ActionDef> {
    Ok(ActionDef {
        name: reader.read_name()?,
        kind: reader.read_string()?,
        ricardian_contract: reader.read_string()?,
    })
}

fn read_table_def(reader: &mut BinaryReader<'_>) -> Result<TableDef> {
    Ok(TableDef {
        name: reader.read_name()?,
        index_type: reader.read_string()?,
        key_names: reader.read_vec(|r| r.read_string())?,
        key_types: reader.read_vec(|r| r.read_string())?,
        kind: reader.read_string()?,
    })
}

fn read_clause_def(reader: &mut BinaryReader<'_>) -> Result<ClauseDef> {
    Ok(ClauseDef {
        id: reader.read_string()?,
        body: reader.read_string()?,
    })
}

fn read_variant_def(reader: &mut BinaryReader<'_>) -> Result<VariantDef> {
    Ok(VariantDef {
        name: reader.read_string()?,
        types: reader.read_vec(|r| r.read_string())?,
    })
}
