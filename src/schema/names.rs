//! Avro naming rules: record names, namespaces, case conversion

use crate::error::{CodecError, Result};

/// Upper camel case: `my_struct` -> `MyStruct`, `my.table` -> `MyTable`.
///
/// Separators (`_`, `.`, `-`, space) are dropped and the next letter is
/// upper-cased, as is a letter following a digit.
pub fn to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = true;
    for c in name.chars() {
        if matches!(c, '_' | '.' | '-' | ' ') {
            upper_next = true;
            continue;
        }
        if upper_next {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        upper_next = c.is_ascii_digit();
    }
    out
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate an Avro record name (`[A-Za-z_][A-Za-z0-9_]*`)
pub fn check_name(name: &str) -> Result<&str> {
    if is_valid_name(name) {
        Ok(name)
    } else {
        Err(CodecError::InvalidName(name.to_string()))
    }
}

/// Validate an Avro namespace: dot separated names, possibly empty
pub fn check_namespace(namespace: &str) -> Result<&str> {
    if namespace.is_empty() || namespace.split('.').all(is_valid_name) {
        Ok(namespace)
    } else {
        Err(CodecError::InvalidName(namespace.to_string()))
    }
}

/// Namespace for an account's CDC messages: `{base}.{account}.{kind}.v{major}`.
///
/// Account segments starting with a digit are prefixed with `_` so the
/// result stays a valid Avro namespace.
pub fn cdc_namespace(base: &str, account: &str, kind: &str, major_version: u32) -> Result<String> {
    let account = account
        .split('.')
        .map(|segment| {
            if segment.starts_with(|c: char| c.is_ascii_digit()) {
                format!("_{segment}")
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(".");
    let namespace = if base.is_empty() {
        format!("{account}.{kind}.v{major_version}")
    } else {
        format!("{base}.{account}.{kind}.v{major_version}")
    };
    check_namespace(&namespace)?;
    Ok(namespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_camel() {
        assert_eq!(to_camel("my_struct"), "MyStruct");
        assert_eq!(to_camel("my.table"), "MyTable");
        assert_eq!(to_camel("regproducer2"), "Regproducer2");
        assert_eq!(to_camel("block_signing_authority_v0"), "BlockSigningAuthorityV0");
        assert_eq!(to_camel("factory.a"), "FactoryA");
        assert_eq!(to_camel("MyStruct"), "MyStruct");
    }

    #[test]
    fn test_check_name() {
        assert!(check_name("MyStruct").is_ok());
        assert!(check_name("_private1").is_ok());
        assert!(check_name("1abc").is_err());
        assert!(check_name("my.struct").is_err());
        assert!(check_name("").is_err());
    }

    #[test]
    fn test_check_namespace() {
        assert!(check_namespace("").is_ok());
        assert!(check_namespace("io.dkafka").is_ok());
        assert!(check_namespace("io..dkafka").is_err());
        assert!(check_namespace("io.1dkafka").is_err());
    }

    #[test]
    fn test_cdc_namespace() {
        assert_eq!(
            cdc_namespace("io.dkafka.data", "eosio.nft.ft", "tables", 2).unwrap(),
            "io.dkafka.data.eosio.nft.ft.tables.v2"
        );
        assert_eq!(
            cdc_namespace("io.dkafka.data", "eosio.token", "actions", 1).unwrap(),
            "io.dkafka.data.eosio.token.actions.v1"
        );
        assert_eq!(
            cdc_namespace("", "ultra.rgrab", "actions", 1).unwrap(),
            "ultra.rgrab.actions.v1"
        );
        assert_eq!(
            cdc_namespace("io.dkafka.data", "aa1aa2aa3aa4", "tables", 1).unwrap(),
            "io.dkafka.data.aa1aa2aa3aa4.tables.v1"
        );
        assert_eq!(
            cdc_namespace("io.dkafka.data", "1aa2aa3aa4bx", "tables", 1).unwrap(),
            "io.dkafka.data._1aa2aa3aa4bx.tables.v1"
        );
    }
}
