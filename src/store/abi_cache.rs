//! Persistent cache for bootstrapped contract ABIs

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Contract ABI fetched from the bootstrap service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAbi {
    pub account: String,
    pub abi_block_num: u32,
    pub abi_json: String,
}

/// SQLite-backed ABI cache
#[derive(Debug)]
pub struct AbiCache {
    conn: Connection,
}

impl AbiCache {
    /// Open or create the cache database
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("open db {}", path.display()))?;
        let cache = Self { conn };
        cache.init()?;
        Ok(cache)
    }

    /// Initialize database schema
    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            -- One row per ABI version of an account
            CREATE TABLE IF NOT EXISTS abis (
                account       TEXT NOT NULL,
                abi_block_num INTEGER NOT NULL,
                abi_json      TEXT NOT NULL,
                created_at    INTEGER DEFAULT (strftime('%s', 'now')),
                PRIMARY KEY (account, abi_block_num)
            );
            ",
        )?;
        Ok(())
    }

    /// Save an ABI effective from `abi_block_num`
    pub fn save_abi(&self, account: &str, abi_block_num: u32, abi_json: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO abis(account, abi_block_num, abi_json) VALUES (?1, ?2, ?3)
             ON CONFLICT(account, abi_block_num) DO UPDATE SET abi_json=excluded.abi_json",
            params![account, abi_block_num, abi_json],
        )?;
        Ok(())
    }

    /// ABI of `account` effective at `block_num`: the newest version set at
    /// or before that block
    pub fn get_abi(&self, account: &str, block_num: u32) -> Result<Option<CachedAbi>> {
        self.conn
            .query_row(
                "SELECT account, abi_block_num, abi_json FROM abis
                 WHERE account = ?1 AND abi_block_num <= ?2
                 ORDER BY abi_block_num DESC LIMIT 1",
                params![account, block_num],
                |row| {
                    Ok(CachedAbi {
                        account: row.get(0)?,
                        abi_block_num: row.get(1)?,
                        abi_json: row.get(2)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("read cached ABI of {account}"))
    }

    /// Number of cached ABI versions
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM abis", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abi_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AbiCache::open(&dir.path().join("abis.db")).unwrap();

        cache.save_abi("eosio.token", 10, r#"{"version":"v10"}"#).unwrap();
        cache.save_abi("eosio.token", 20, r#"{"version":"v20"}"#).unwrap();

        assert!(cache.get_abi("eosio.token", 5).unwrap().is_none());
        assert_eq!(cache.get_abi("eosio.token", 15).unwrap().unwrap().abi_block_num, 10);
        let latest = cache.get_abi("eosio.token", 99).unwrap().unwrap();
        assert_eq!(latest.abi_block_num, 20);
        assert_eq!(latest.abi_json, r#"{"version":"v20"}"#);
        assert!(cache.get_abi("other", 99).unwrap().is_none());
    }

    #[test]
    fn test_save_overwrites_same_block() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AbiCache::open(&dir.path().join("abis.db")).unwrap();

        cache.save_abi("eosio", 1, "{}").unwrap();
        cache.save_abi("eosio", 1, r#"{"version":"again"}"#).unwrap();

        assert_eq!(cache.count().unwrap(), 1);
        assert_eq!(
            cache.get_abi("eosio", 1).unwrap().unwrap().abi_json,
            r#"{"version":"again"}"#
        );
    }
}
