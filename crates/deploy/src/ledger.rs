//! Persistent record of what has been deployed on each target.
//!
//! Layout on disk:
//!
//! ```text
//! <root>/<target>/.lock
//! <root>/<target>/<Contract>.json          deployment record
//! <root>/<target>/<Contract>.pending.json  submitted, outcome not yet known
//! ```

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use alloy_core::primitives::Address;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    chain::TxId,
    error::{DeployError, Result},
    target::Target,
};

const LOCK_FILENAME: &str = ".lock";
const RECORD_EXTENSION: &str = "json";
const PENDING_SUFFIX: &str = ".pending.json";

/// A confirmed deployment of one contract on one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub target: Target,
    pub chain_id: u64,
    pub contract: String,
    pub address: Address,
    pub tx_id: TxId,
    pub deployed_at: DateTime<Utc>,
}

/// A submitted transaction whose outcome has not been observed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTx {
    pub contract: String,
    pub tx_id: TxId,
    pub submitted_at: DateTime<Utc>,
}

/// Exclusive hold on a target's ledger, released on drop.
#[derive(Debug)]
pub struct LedgerLock {
    target: Target,
    _file: File,
}

impl LedgerLock {
    pub fn target(&self) -> Target {
        self.target
    }
}

/// File-backed deployment ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    root: PathBuf,
}

impl Ledger {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn target_dir(&self, target: Target) -> PathBuf {
        self.root.join(target.to_string())
    }

    fn record_path(&self, target: Target, contract: &str) -> PathBuf {
        self.target_dir(target)
            .join(format!("{contract}.{RECORD_EXTENSION}"))
    }

    fn pending_path(&self, target: Target, contract: &str) -> PathBuf {
        self.target_dir(target)
            .join(format!("{contract}{PENDING_SUFFIX}"))
    }

    fn ensure_target_dir(&self, target: Target) -> Result<PathBuf> {
        let dir = self.target_dir(target);
        std::fs::create_dir_all(&dir).map_err(|e| DeployError::ledger_io(&dir, e))?;
        Ok(dir)
    }

    /// Take the exclusive lock for `target` without blocking.
    ///
    /// Two runs against the same target cannot interleave their read-check-write
    /// cycles while one of them holds this lock.
    pub fn lock(&self, target: Target) -> Result<LedgerLock> {
        let path = self.ensure_target_dir(target)?.join(LOCK_FILENAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| DeployError::ledger_io(&path, e))?;

        file.try_lock_exclusive().map_err(|e| {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                DeployError::LedgerLocked {
                    target: target.to_string(),
                }
            } else {
                DeployError::ledger_io(&path, e)
            }
        })?;

        tracing::debug!(network = %target, path = %path.display(), "Ledger lock acquired");
        Ok(LedgerLock {
            target,
            _file: file,
        })
    }

    pub fn lookup(&self, target: Target, contract: &str) -> Result<Option<DeploymentRecord>> {
        read_json(&self.record_path(target, contract))
    }

    /// Record a confirmed deployment.
    ///
    /// Recording the same address twice is a no-op; recording a different address
    /// for an existing key fails with `DuplicateRecord`.
    pub fn record(
        &self,
        target: Target,
        contract: &str,
        address: Address,
        tx_id: TxId,
    ) -> Result<DeploymentRecord> {
        if let Some(existing) = self.lookup(target, contract)? {
            if existing.address == address {
                tracing::debug!(network = %target, contract, %address, "Record already present");
                return Ok(existing);
            }
            return Err(DeployError::DuplicateRecord {
                target: target.to_string(),
                contract: contract.to_string(),
                existing: existing.address.to_string(),
                attempted: address.to_string(),
            });
        }

        self.ensure_target_dir(target)?;
        let record = DeploymentRecord {
            target,
            chain_id: target.chain_id(),
            contract: contract.to_string(),
            address,
            tx_id,
            deployed_at: Utc::now(),
        };
        write_json(&self.record_path(target, contract), &record)?;

        tracing::debug!(network = %target, contract, %address, tx_id = %tx_id, "Deployment recorded");
        Ok(record)
    }

    /// All records of a target, oldest first.
    pub fn records(&self, target: Target) -> Result<Vec<DeploymentRecord>> {
        let dir = self.target_dir(target);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&dir).map_err(|e| DeployError::ledger_io(&dir, e))?;
        let mut records = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| DeployError::ledger_io(&dir, e))?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(PENDING_SUFFIX) || name == crate::report::SUMMARY_FILENAME {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(record) = read_json::<DeploymentRecord>(&path)? {
                records.push(record);
            }
        }

        records.sort_by(|a, b| {
            a.deployed_at
                .cmp(&b.deployed_at)
                .then_with(|| a.contract.cmp(&b.contract))
        });
        Ok(records)
    }

    pub fn mark_pending(&self, target: Target, contract: &str, tx_id: TxId) -> Result<()> {
        self.ensure_target_dir(target)?;
        let pending = PendingTx {
            contract: contract.to_string(),
            tx_id,
            submitted_at: Utc::now(),
        };
        write_json(&self.pending_path(target, contract), &pending)
    }

    pub fn pending(&self, target: Target, contract: &str) -> Result<Option<PendingTx>> {
        read_json(&self.pending_path(target, contract))
    }

    pub fn clear_pending(&self, target: Target, contract: &str) -> Result<()> {
        let path = self.pending_path(target, contract);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DeployError::ledger_io(&path, e)),
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(DeployError::ledger_io(path, e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| DeployError::ledger_io(path, format!("corrupted entry: {e}")))
}

/// Write through a sibling temp file and rename, so readers never observe a
/// partially written entry.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| DeployError::ledger_io(path, e))?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json).map_err(|e| DeployError::ledger_io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| DeployError::ledger_io(path, e))
}
