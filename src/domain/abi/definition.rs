//! ABI definition - types, structs, variants, actions and tables of a contract

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A type alias (`new_type_name` -> `type`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub new_type_name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// A struct field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// A struct with an optional single parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDef {
    pub name: String,
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

/// A tagged union
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDef {
    pub name: String,
    #[serde(default)]
    pub types: Vec<String>,
}

/// An action entry point, its arguments are described by `kind`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub ricardian_contract: String,
}

/// A persistent table, its rows are described by `kind`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    #[serde(default)]
    pub index_type: String,
    #[serde(default)]
    pub key_names: Vec<String>,
    #[serde(default)]
    pub key_types: Vec<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Ricardian clause attached to the contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClauseDef {
    pub id: String,
    pub body: String,
}

/// Contract ABI as published by `setabi`.
///
/// Immutable once built; lookups go through name indexes built at
/// construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "RawAbi", into = "RawAbi")]
pub struct AbiDefinition {
    pub version: String,
    pub types: Vec<TypeDef>,
    pub structs: Vec<StructDef>,
    pub actions: Vec<ActionDef>,
    pub tables: Vec<TableDef>,
    pub ricardian_clauses: Vec<ClauseDef>,
    pub variants: Vec<VariantDef>,
    aliases: HashMap<String, usize>,
    struct_index: HashMap<String, usize>,
    variant_index: HashMap<String, usize>,
}

impl PartialEq for AbiDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.types == other.types
            && self.structs == other.structs
            && self.actions == other.actions
            && self.tables == other.tables
            && self.ricardian_clauses == other.ricardian_clauses
            && self.variants == other.variants
    }
}

impl AbiDefinition {
    /// Build a definition and its lookup indexes
    pub fn new(
        version: impl Into<String>,
        types: Vec<TypeDef>,
        structs: Vec<StructDef>,
        actions: Vec<ActionDef>,
        tables: Vec<TableDef>,
        variants: Vec<VariantDef>,
    ) -> Self {
        Self::from(RawAbi {
            version: version.into(),
            types,
            structs,
            actions,
            tables,
            ricardian_clauses: Vec::new(),
            variants,
        })
    }

    /// Parse the JSON representation of an ABI
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Target type of an alias, if `name` is one
    pub fn alias(&self, name: &str) -> Option<&str> {
        self.aliases
            .get(name)
            .map(|&idx| self.types[idx].kind.as_str())
    }

    pub fn struct_def(&self, name: &str) -> Option<&StructDef> {
        self.struct_index.get(name).map(|&idx| &self.structs[idx])
    }

    pub fn variant(&self, name: &str) -> Option<&VariantDef> {
        self.variant_index.get(name).map(|&idx| &self.variants[idx])
    }

    pub fn action(&self, name: &str) -> Option<&ActionDef> {
        self.actions.iter().find(|action| action.name == name)
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|table| table.name == name)
    }

    /// Names of every action and table declared by the contract
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.actions
            .iter()
            .map(|a| a.name.as_str())
            .chain(self.tables.iter().map(|t| t.name.as_str()))
    }
}

/// Wire shape of the ABI JSON, without indexes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct RawAbi {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub types: Vec<TypeDef>,
    #[serde(default)]
    pub structs: Vec<StructDef>,
    #[serde(default)]
    pub actions: Vec<ActionDef>,
    #[serde(default)]
    pub tables: Vec<TableDef>,
    #[serde(default)]
    pub ricardian_clauses: Vec<ClauseDef>,
    #[serde(default)]
    pub variants: Vec<VariantDef>,
}

impl From<RawAbi> for AbiDefinition {
    fn from(raw: RawAbi) -> Self {
        // first declaration wins, like the chain's own ABI serializer
        let mut aliases = HashMap::new();
        for (idx, def) in raw.types.iter().enumerate() {
            aliases.entry(def.new_type_name.clone()).or_insert(idx);
        }
        let mut struct_index = HashMap::new();
        for (idx, def) in raw.structs.iter().enumerate() {
            struct_index.entry(def.name.clone()).or_insert(idx);
        }
        let mut variant_index = HashMap::new();
        for (idx, def) in raw.variants.iter().enumerate() {
            variant_index.entry(def.name.clone()).or_insert(idx);
        }
        Self {
            version: raw.version,
            types: raw.types,
            structs: raw.structs,
            actions: raw.actions,
            tables: raw.tables,
            ricardian_clauses: raw.ricardian_clauses,
            variants: raw.variants,
            aliases,
            struct_index,
            variant_index,
        }
    }
}

impl From<AbiDefinition> for RawAbi {
    fn from(abi: AbiDefinition) -> Self {
        Self {
            version: abi.version,
            types: abi.types,
            structs: abi.structs,
            actions: abi.actions,
            tables: abi.tables,
            ricardian_clauses: abi.ricardian_clauses,
            variants: abi.variants,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN_ABI: &str = r#"{
        "version": "eosio::abi/1.1",
        "types": [{"new_type_name": "account_name", "type": "name"}],
        "structs": [
            {"name": "transfer", "base": "", "fields": [
                {"name": "from", "type": "account_name"},
                {"name": "to", "type": "name"},
                {"name": "quantity", "type": "asset"},
                {"name": "memo", "type": "string"}
            ]},
            {"name": "account", "base": "", "fields": [{"name": "balance", "type": "asset"}]}
        ],
        "actions": [{"name": "transfer", "type": "transfer", "ricardian_contract": ""}],
        "tables": [{"name": "accounts", "index_type": "i64", "key_names": [], "key_types": [], "type": "account"}]
    }"#;

    #[test]
    fn test_parse_and_lookup() {
        let abi = AbiDefinition::from_json(TOKEN_ABI).unwrap();

        assert_eq!(abi.version, "eosio::abi/1.1");
        assert_eq!(abi.alias("account_name"), Some("name"));
        assert_eq!(abi.alias("name"), None);
        assert_eq!(abi.struct_def("transfer").unwrap().fields.len(), 4);
        assert_eq!(abi.action("transfer").unwrap().kind, "transfer");
        assert_eq!(abi.table("accounts").unwrap().kind, "account");
        assert!(abi.variant("anything").is_none());
        assert_eq!(
            abi.entity_names().collect::<Vec<_>>(),
            vec!["transfer", "accounts"]
        );
    }

    #[test]
    fn test_json_round_trip_keeps_indexes() {
        let abi = AbiDefinition::from_json(TOKEN_ABI).unwrap();
        let json = serde_json::to_string(&abi).unwrap();
        let back = AbiDefinition::from_json(&json).unwrap();

        assert_eq!(abi, back);
        assert!(back.struct_def("account").is_some());
    }
}
