//! Fork-aware ABI version store
//!
//! Tracks, per account, the ABI authoritative at the head of the chain plus
//! a stack of the versions it replaced so that undo steps can restore them.

use std::collections::HashMap;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::domain::abi::{AbiDecoder, AbiVersion};
use crate::domain::fork::ForkStep;
use crate::error::Result;

const EVENT_CAPACITY: usize = 64;

/// Notification sent to subscribers whenever an ABI update is accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiEvent {
    Updated {
        account: String,
        block_num: u32,
        step: ForkStep,
    },
}

/// Result of applying a fork step to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A forward step made the version the latest
    Installed,
    /// An undo dropped the latest version
    Reverted,
    /// Undo on an account without any version
    NothingToUndo,
    /// Undo targeting a block newer than the latest version
    StaleUndo,
    /// Unknown fork step, ignored
    UnknownStep,
}

#[derive(Debug, Clone, PartialEq)]
struct AccountVersions {
    latest: AbiVersion,
    /// Replaced versions, oldest first
    history: Vec<AbiVersion>,
}

/// Per-account latest ABI and undo history.
///
/// An account is either absent or has a latest version; an absent account
/// never keeps a history around.
#[derive(Debug)]
pub struct AbiVersionStore {
    accounts: HashMap<String, AccountVersions>,
    events: broadcast::Sender<AbiEvent>,
}

impl Default for AbiVersionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AbiVersionStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            accounts: HashMap::new(),
            events,
        }
    }

    /// Receive an [`AbiEvent`] for every accepted ABI update
    pub fn subscribe(&self) -> broadcast::Receiver<AbiEvent> {
        self.events.subscribe()
    }

    pub fn latest(&self, account: &str) -> Option<&AbiVersion> {
        self.accounts.get(account).map(|versions| &versions.latest)
    }

    /// Replaced versions of `account`, oldest first
    pub fn history(&self, account: &str) -> &[AbiVersion] {
        self.accounts
            .get(account)
            .map(|versions| versions.history.as_slice())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Adopt a bootstrapped version for an account without one.
    ///
    /// Returns the latest version, which is `version` unless the account
    /// already had one.
    pub fn bootstrap(&mut self, version: AbiVersion) -> &AbiVersion {
        let versions = self
            .accounts
            .entry(version.account.clone())
            .or_insert_with(|| {
                info!(account = %version.account, abi_block_num = version.block_num, "bootstrap ABI");
                AccountVersions {
                    latest: version,
                    history: Vec::new(),
                }
            });
        &versions.latest
    }

    /// Decode a `setabi` payload and apply it at `block_num`.
    ///
    /// Subscribers are notified before the store changes. A payload that
    /// fails to decode leaves the store untouched.
    ///
    /// # Arguments
    /// * `decoder` - Binary ABI decoder
    /// * `block_num` - Block carrying the `setabi` action
    /// * `step` - Fork step of that block
    /// * `trx_id` - Transaction carrying the action
    /// * `account` - Account whose ABI is set
    /// * `hex_payload` - Hex encoded binary ABI
    pub fn update_abi(
        &mut self,
        decoder: &dyn AbiDecoder,
        block_num: u32,
        step: ForkStep,
        trx_id: &str,
        account: &str,
        hex_payload: &str,
    ) -> Result<ApplyOutcome> {
        info!(account, block_num, %step, trx_id, "update ABI");
        let abi = decoder.decode_abi(trx_id, account, hex_payload)?;

        // no receivers is fine
        let _ = self.events.send(AbiEvent::Updated {
            account: account.to_string(),
            block_num,
            step,
        });

        let version = AbiVersion::new(account, abi, block_num, step == ForkStep::Irreversible);
        Ok(self.apply(version, block_num, step))
    }

    /// Apply a fork step for `version.account`
    pub fn apply(&mut self, version: AbiVersion, block_num: u32, step: ForkStep) -> ApplyOutcome {
        match step {
            ForkStep::Unknown => {
                warn!(account = %version.account, block_num, "skip ABI update on unknown step");
                ApplyOutcome::UnknownStep
            }
            ForkStep::Undo => self.undo(&version.account, block_num),
            _ => {
                self.push(version);
                ApplyOutcome::Installed
            }
        }
    }

    fn undo(&mut self, account: &str, block_num: u32) -> ApplyOutcome {
        let Some(versions) = self.accounts.get_mut(account) else {
            warn!(account, undo_block_num = block_num, "undo skipped, no latest ABI");
            return ApplyOutcome::NothingToUndo;
        };
        if block_num > versions.latest.block_num {
            // replaced by an irreversible compaction already
            info!(
                account,
                undo_block_num = block_num,
                latest_block_num = versions.latest.block_num,
                "undo skipped, undo block is after latest ABI"
            );
            return ApplyOutcome::StaleUndo;
        }

        match versions.history.pop() {
            Some(previous) => {
                info!(
                    account,
                    undo_block_num = block_num,
                    previous_block_num = previous.block_num,
                    "undo latest ABI, restore previous"
                );
                versions.latest = previous;
            }
            None => {
                info!(account, undo_block_num = block_num, "undo latest ABI, no history left");
                self.accounts.remove(account);
            }
        }
        ApplyOutcome::Reverted
    }

    fn push(&mut self, version: AbiVersion) {
        info!(account = %version.account, abi_block_num = version.block_num, "install ABI");
        match self.accounts.get_mut(&version.account) {
            None => {
                self.accounts.insert(
                    version.account.clone(),
                    AccountVersions {
                        latest: version,
                        history: Vec::new(),
                    },
                );
            }
            Some(versions) => {
                let previous = std::mem::replace(&mut versions.latest, version);
                match versions.history.last_mut() {
                    Some(top) if top.block_num == previous.block_num => *top = previous,
                    _ => versions.history.push(previous),
                }
            }
        }
    }
}
