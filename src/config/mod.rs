use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{CodecError, Result};
use crate::infrastructure::abi::{AbiBootstrapRepository, AbiFileLoader};
use crate::infrastructure::registry::{CompatibilityLevel, HttpSchemaRegistry};
use crate::schema::{SchemaOptions, DKAFKA_NAMESPACE};
use crate::store::AbiCache;

const APP_NAME: &str = "chain-cdc-codec";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub url: String,
    pub compatibility: CompatibilityLevel,
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8081".to_string(),
            compatibility: CompatibilityLevel::default(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// ABI service base URL
    pub url: Option<String>,
    pub timeout_secs: u64,
    /// SQLite file caching bootstrapped ABIs
    pub cache_path: Option<PathBuf>,
    /// account -> `path[:abi_block_num]`
    pub overrides: HashMap<String, String>,
    /// Directories scanned for `<account>.json` / `<account>.abi` files
    pub abi_dirs: Vec<PathBuf>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 10,
            cache_path: None,
            overrides: HashMap::new(),
            abi_dirs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base namespace of generated schemas, may be empty
    pub namespace: String,
    pub major_version: u32,
    pub version: String,
    pub domain: Option<String>,
    pub registry: RegistryConfig,
    pub bootstrap: BootstrapConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: DKAFKA_NAMESPACE.to_string(),
            major_version: 1,
            version: "1.0.0".to_string(),
            domain: None,
            registry: RegistryConfig::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl Config {
    pub fn schema_options(&self) -> SchemaOptions {
        SchemaOptions {
            namespace: self.namespace.clone(),
            major_version: self.major_version,
            version: self.version.clone(),
            domain: self.domain.clone(),
            compatibility: self.registry.compatibility.to_string(),
        }
    }

    pub fn schema_registry(&self) -> Result<HttpSchemaRegistry> {
        let registry = HttpSchemaRegistry::new(
            &self.registry.url,
            Duration::from_secs(self.registry.timeout_secs),
        )?;
        Ok(registry)
    }

    /// Bootstrap repository from the scanned directories, the overrides
    /// (which win over scanned files), the cache and the ABI service
    pub fn bootstrap_repository(&self) -> Result<AbiBootstrapRepository> {
        let bootstrap = &self.bootstrap;

        let scan = AbiFileLoader::scan_roots(&bootstrap.abi_dirs);
        for error in &scan.errors {
            warn!(%error, "skip ABI file");
        }
        let mut versions = scan.versions;
        let overrides = AbiFileLoader::load_overrides(&bootstrap.overrides)
            .map_err(|e| CodecError::Config(format!("{e:#}")))?;
        versions.extend(overrides);

        let mut repository = AbiBootstrapRepository::new().with_overrides(versions);
        if let Some(path) = &bootstrap.cache_path {
            let cache = AbiCache::open(path).map_err(|e| CodecError::Config(format!("{e:#}")))?;
            repository = repository.with_cache(cache);
        }
        if let Some(url) = &bootstrap.url {
            repository = repository
                .with_remote(url, Duration::from_secs(bootstrap.timeout_secs))
                .map_err(|e| CodecError::Config(format!("{e:#}")))?;
        }
        Ok(repository)
    }
}

/// Load the configuration, falling back to defaults when the file is missing
/// or invalid
pub fn load() -> Config {
    let Some(path) = config_path() else {
        return Config::default();
    };
    match load_from(&path) {
        Ok(config) => config,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "use default configuration");
            Config::default()
        }
    }
}

pub fn load_from(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .map_err(|e| CodecError::Config(format!("read {}: {e}", path.display())))?;
    toml::from_str::<Config>(&content)
        .map_err(|e| CodecError::Config(format!("parse {}: {e}", path.display())))
}

pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("CDC_CODEC_CONFIG").map(PathBuf::from) {
        return Some(path);
    }
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from) {
        return Some(xdg.join(APP_NAME).join("config.toml"));
    }
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        return Some(home.join(".config").join(APP_NAME).join("config.toml"));
    }

    directories::ProjectDirs::from("io", "dkafka", APP_NAME)
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

pub fn data_dir() -> Option<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME").map(PathBuf::from) {
        return Some(xdg.join(APP_NAME));
    }
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        return Some(home.join(".local").join("share").join(APP_NAME));
    }
    directories::ProjectDirs::from("io", "dkafka", APP_NAME)
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Default location of the ABI cache database
pub fn abi_cache_path() -> Option<PathBuf> {
    data_dir().map(|dir| dir.join("abis.sqlite3"))
}
