//! ABI bootstrap: static overrides, persistent cache, remote ABI service

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::abi::{AbiDefinition, AbiRepository, AbiVersion};
use crate::error::CodecError;
use crate::store::AbiCache;

/// Remote ABI service answer
#[derive(Debug, Deserialize)]
struct AbiResponse {
    abi_block_num: u32,
    /// ABI JSON, either inline or as an encoded string
    abi: serde_json::Value,
}

/// HTTP client of the ABI service
#[derive(Debug, Clone)]
struct AbiServiceClient {
    http: reqwest::Client,
    url: String,
}

impl AbiServiceClient {
    async fn fetch(&self, account: &str, block_num: u32) -> Result<AbiResponse> {
        let url = format!("{}/v1/abi", self.url);
        let response = self
            .http
            .get(&url)
            .query(&[("account", account.to_string()), ("block_num", block_num.to_string())])
            .send()
            .await
            .with_context(|| format!("call ABI service for {account}"))?
            .error_for_status()
            .with_context(|| format!("ABI service rejected {account} at block {block_num}"))?;
        response
            .json()
            .await
            .with_context(|| format!("parse ABI service answer for {account}"))
    }
}

/// Bootstrap repository for accounts without an observed `setabi`.
///
/// Lookups try, in order, the static overrides, the persistent cache, then
/// the remote service; remote answers are written to the cache.
#[derive(Default)]
pub struct AbiBootstrapRepository {
    overrides: HashMap<String, AbiVersion>,
    cache: Option<Mutex<AbiCache>>,
    client: Option<AbiServiceClient>,
}

impl AbiBootstrapRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(mut self, overrides: HashMap<String, AbiVersion>) -> Self {
        self.overrides.extend(overrides);
        self
    }

    pub fn with_cache(mut self, cache: AbiCache) -> Self {
        self.cache = Some(Mutex::new(cache));
        self
    }

    /// Enable the remote ABI service at `url`
    pub fn with_remote(mut self, url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build ABI service HTTP client")?;
        self.client = Some(AbiServiceClient {
            http,
            url: url.trim_end_matches('/').to_string(),
        });
        Ok(self)
    }

    pub fn overrides(&self) -> &HashMap<String, AbiVersion> {
        &self.overrides
    }

    async fn cached(&self, account: &str, block_num: u32) -> Result<Option<AbiVersion>> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        let Some(cached) = cache.lock().await.get_abi(account, block_num)? else {
            return Ok(None);
        };
        let abi = AbiDefinition::from_json(&cached.abi_json)
            .with_context(|| format!("parse cached ABI of {account}"))?;
        debug!(account, block_num, abi_block_num = cached.abi_block_num, "ABI cache hit");
        Ok(Some(AbiVersion::new(account, abi, cached.abi_block_num, true)))
    }

    async fn fetch(&self, client: &AbiServiceClient, account: &str, block_num: u32) -> Result<AbiVersion> {
        let response = client.fetch(account, block_num).await?;
        let abi_json = match response.abi {
            serde_json::Value::String(json) => json,
            inline => inline.to_string(),
        };
        let abi = AbiDefinition::from_json(&abi_json)
            .with_context(|| format!("decode ABI of {account}"))?;
        info!(
            account,
            block_num,
            abi_block_num = response.abi_block_num,
            "new ABI loaded"
        );

        if let Some(cache) = &self.cache {
            if let Err(err) = cache
                .lock()
                .await
                .save_abi(account, response.abi_block_num, &abi_json)
            {
                warn!(account, error = %err, "cannot cache ABI");
            }
        }
        Ok(AbiVersion::new(account, abi, response.abi_block_num, true))
    }

    async fn lookup(&self, account: &str, block_num: u32) -> Result<AbiVersion> {
        if let Some(version) = self.overrides.get(account) {
            return Ok(version.clone());
        }
        if let Some(version) = self.cached(account, block_num).await? {
            return Ok(version);
        }
        match &self.client {
            Some(client) => self.fetch(client, account, block_num).await,
            None => anyhow::bail!("no client, no override nor cached ABI for {account}"),
        }
    }
}

#[async_trait]
impl AbiRepository for AbiBootstrapRepository {
    async fn get_abi(&self, account: &str, block_num: u32) -> crate::error::Result<AbiVersion> {
        self.lookup(account, block_num)
            .await
            .map_err(|err| CodecError::DefinitionNotFound {
                account: account.to_string(),
                block_num,
                reason: format!("{err:#}"),
            })
    }

    fn is_noop(&self) -> bool {
        self.overrides.is_empty() && self.client.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN_ABI: &str = r#"{"version":"eosio::abi/1.1","structs":[{"name":"account","base":"","fields":[{"name":"balance","type":"asset"}]}],"tables":[{"name":"accounts","type":"account"}]}"#;

    #[tokio::test]
    async fn test_empty_repository_is_noop() {
        let repository = AbiBootstrapRepository::new();
        assert!(repository.is_noop());
        let err = repository.get_abi("eosio.token", 10).await.unwrap_err();
        assert!(matches!(
            err,
            CodecError::DefinitionNotFound { block_num: 10, .. }
        ));
    }

    #[tokio::test]
    async fn test_overrides_win() {
        let abi = AbiDefinition::from_json(TOKEN_ABI).unwrap();
        let repository = AbiBootstrapRepository::new().with_overrides(HashMap::from([(
            "eosio.token".to_string(),
            AbiVersion::new("eosio.token", abi, 3, true),
        )]));
        assert!(!repository.is_noop());

        let version = repository.get_abi("eosio.token", 100).await.unwrap();
        assert_eq!(version.block_num, 3);
        assert!(repository.get_abi("other", 100).await.is_err());
    }

    #[tokio::test]
    async fn test_cache_serves_without_client() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AbiCache::open(&dir.path().join("abis.db")).unwrap();
        cache.save_abi("eosio.token", 7, TOKEN_ABI).unwrap();
        let repository = AbiBootstrapRepository::new().with_cache(cache);

        let version = repository.get_abi("eosio.token", 8).await.unwrap();
        assert_eq!(version.block_num, 7);
        assert!(version.abi.table("accounts").is_some());
        assert!(repository.get_abi("eosio.token", 6).await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let repository = AbiBootstrapRepository::new()
            .with_remote("http://127.0.0.1:9/", Duration::from_millis(200))
            .unwrap();
        assert!(!repository.is_noop());
        let err = repository.get_abi("eosio.token", 1).await.unwrap_err();
        assert!(err.to_string().contains("eosio.token"));
    }

    #[test]
    fn test_service_answer_shapes() {
        let inline: AbiResponse =
            serde_json::from_str(&format!(r#"{{"abi_block_num":4,"abi":{TOKEN_ABI}}}"#)).unwrap();
        assert_eq!(inline.abi_block_num, 4);
        assert!(inline.abi.is_object());

        let encoded: AbiResponse = serde_json::from_value(serde_json::json!({
            "abi_block_num": 5,
            "abi": TOKEN_ABI,
        }))
        .unwrap();
        assert!(encoded.abi.is_string());
    }
}
