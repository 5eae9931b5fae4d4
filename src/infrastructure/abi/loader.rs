//! ABI file loader - reads override ABIs from JSON files and directories

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::domain::abi::{AbiDefinition, AbiVersion};

const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Outcome of a directory scan
#[derive(Debug, Default)]
pub struct AbiScan {
    /// Loaded ABIs by account
    pub versions: HashMap<String, AbiVersion>,
    pub scanned_files: usize,
    /// Files that could not be loaded, with the reason
    pub errors: Vec<String>,
    pub scan_ms: u128,
}

impl AbiScan {
    fn merge(&mut self, other: AbiScan) {
        self.versions.extend(other.versions);
        self.scanned_files += other.scanned_files;
        self.errors.extend(other.errors);
    }
}

/// Loads ABI JSON files.
///
/// A file spec is `path[:abi_block_num]`; without a block number the ABI is
/// effective from block 0. When scanning directories, the account is the
/// file name without its `.json`/`.abi` extension.
pub struct AbiFileLoader;

impl AbiFileLoader {
    /// Split an `account:path[:abi_block_num]` spec
    pub fn parse_spec(spec: &str) -> Result<(String, String)> {
        match spec.split_once(':') {
            Some((account, file)) if !account.is_empty() && !file.is_empty() => {
                Ok((account.to_string(), file.to_string()))
            }
            _ => bail!("invalid ABI spec '{spec}', expected account:path[:abi_block_num]"),
        }
    }

    /// Load the ABI of `account` from a `path[:abi_block_num]` file spec
    pub fn load_file(account: &str, file_spec: &str) -> Result<AbiVersion> {
        let (path, abi_block_num) = split_block_num(file_spec);
        let content = fs::read_to_string(path)
            .with_context(|| format!("read ABI file {path} of {account}"))?;
        let abi = AbiDefinition::from_json(&content)
            .with_context(|| format!("parse ABI file {path} of {account}"))?;
        debug!(account, path, abi_block_num, "load ABI file");
        Ok(AbiVersion::new(account, abi, abi_block_num, true))
    }

    /// Load `account -> path[:abi_block_num]` overrides
    pub fn load_overrides<'a>(
        overrides: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> Result<HashMap<String, AbiVersion>> {
        overrides
            .into_iter()
            .map(|(account, file_spec)| {
                Self::load_file(account, file_spec).map(|version| (account.clone(), version))
            })
            .collect()
    }

    /// Load `account:path[:abi_block_num]` specs
    pub fn load_specs(specs: &[String]) -> Result<HashMap<String, AbiVersion>> {
        specs
            .iter()
            .map(|spec| {
                let (account, file_spec) = Self::parse_spec(spec)?;
                let version = Self::load_file(&account, &file_spec)?;
                Ok((account, version))
            })
            .collect()
    }

    /// Scan a directory for `<account>.json` and `<account>.abi` files
    pub fn scan(root: impl AsRef<Path>) -> AbiScan {
        let started = Instant::now();
        let root = root.as_ref();
        let mut scan = AbiScan::default();

        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !Self::is_ignored_dir(e.path()))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    scan.errors.push(err.to_string());
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let Some(account) = Self::account_of(path) else {
                continue;
            };
            match entry.metadata() {
                Ok(meta) if meta.len() > MAX_FILE_SIZE => continue,
                Ok(_) => {}
                Err(err) => {
                    scan.errors.push(format!("{}: {}", path.display(), err));
                    continue;
                }
            }

            scan.scanned_files += 1;
            match Self::load_file(&account, &path.to_string_lossy()) {
                Ok(version) => {
                    scan.versions.insert(account, version);
                }
                Err(err) => scan.errors.push(format!("{}: {:#}", path.display(), err)),
            }
        }

        scan.scan_ms = started.elapsed().as_millis();
        if !scan.errors.is_empty() {
            warn!(root = %root.display(), errors = scan.errors.len(), "some ABI files were skipped");
        }
        scan
    }

    /// Scan several directories; later roots win on duplicate accounts
    pub fn scan_roots(roots: &[PathBuf]) -> AbiScan {
        let started = Instant::now();
        let mut scan = AbiScan::default();
        for root in roots {
            scan.merge(Self::scan(root));
        }
        scan.scan_ms = started.elapsed().as_millis();
        scan
    }

    fn account_of(path: &Path) -> Option<String> {
        let ext = path.extension().and_then(|s| s.to_str())?;
        if !matches!(ext, "json" | "abi") {
            return None;
        }
        path.file_stem()
            .and_then(|s| s.to_str())
            .filter(|stem| !stem.is_empty())
            .map(str::to_string)
    }

    fn is_ignored_dir(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|name| matches!(name, ".git" | "target" | "node_modules"))
            .unwrap_or(false)
    }
}

/// Split a trailing `:abi_block_num`, if the suffix is a block number
fn split_block_num(file_spec: &str) -> (&str, u32) {
    if let Some((path, block)) = file_spec.rsplit_once(':') {
        if let Ok(block_num) = block.parse::<u32>() {
            return (path, block_num);
        }
    }
    (file_spec, 0)
}
