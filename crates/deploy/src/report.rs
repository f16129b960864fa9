//! Operator-facing summary of a run.

use std::path::{Path, PathBuf};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use comfy_table::{Table, presets::UTF8_FULL};
use serde::{Deserialize, Serialize};

use crate::{
    bytecode::BytecodeHash,
    chain::TxId,
    deployer::{ContractOutcome, ContractState},
    target::{Target, TargetConfig, VmDialect},
};

/// File name of the summary persisted next to a target's ledger entries.
///
/// Contract names cannot start with a dot, so this never shadows a record.
pub const SUMMARY_FILENAME: &str = ".summary.json";

/// One contract in a summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub target: Target,
    pub contract: String,
    pub address: Address,
    pub state: ContractState,
    pub tx_id: TxId,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub code_hash: Option<BytecodeHash>,
    /// `None` when the dialect does not require verification.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub verified: Option<bool>,
}

impl SummaryEntry {
    pub fn from_outcome(
        target: Target,
        outcome: ContractOutcome,
        code_hash: Option<BytecodeHash>,
        verified: Option<bool>,
    ) -> Self {
        Self {
            target,
            contract: outcome.contract,
            address: outcome.address,
            state: outcome.state,
            tx_id: outcome.tx_id,
            code_hash,
            verified,
        }
    }

    pub fn is_newly_deployed(&self) -> bool {
        self.state == ContractState::Deployed
    }
}

/// Structured result of an orchestration run on one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub target: Target,
    pub chain_id: u64,
    pub dialect: VmDialect,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<SummaryEntry>,
}

impl Summary {
    pub fn new(config: &TargetConfig) -> Self {
        Self {
            target: config.target,
            chain_id: config.chain_id,
            dialect: config.dialect,
            generated_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: SummaryEntry) {
        self.entries.push(entry);
    }

    pub fn deployed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_newly_deployed()).count()
    }

    pub fn reused_count(&self) -> usize {
        self.entries.len() - self.deployed_count()
    }

    /// Contracts whose deployed code did not match the artifact.
    pub fn mismatches(&self) -> impl Iterator<Item = &SummaryEntry> {
        self.entries.iter().filter(|e| e.verified == Some(false))
    }

    /// Render the summary as a table for the terminal.
    pub fn render(&self) -> String {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL).set_header(vec![
            "Target",
            "Contract",
            "Address",
            "Status",
            "Code hash",
            "Verified",
        ]);

        for entry in &self.entries {
            let verified = match entry.verified {
                Some(true) => "yes",
                Some(false) => "MISMATCH",
                None => "-",
            };
            table.add_row(vec![
                entry.target.to_string(),
                entry.contract.clone(),
                entry.address.to_string(),
                entry.state.to_string(),
                entry
                    .code_hash
                    .map(|hash| hash.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                verified.to_string(),
            ]);
        }

        table.to_string()
    }

    /// Save the summary as formatted JSON in `dir`.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let path = dir.join(SUMMARY_FILENAME);
        let json = serde_json::to_string_pretty(self).context("Failed to serialize summary")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;

        tracing::debug!(path = %path.display(), "Summary saved");
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read summary from {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse summary JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetRegistry;
    use tempdir::TempDir;

    fn summary() -> Summary {
        let config = TargetRegistry::default().resolve("abstract").unwrap();
        let mut summary = Summary::new(&config);
        summary.push(SummaryEntry::from_outcome(
            config.target,
            ContractOutcome {
                contract: "UniswapV2Factory".to_string(),
                address: Address::with_last_byte(1),
                state: ContractState::Reused,
                tx_id: TxId::with_last_byte(1),
                args: Vec::new(),
            },
            None,
            Some(true),
        ));
        summary.push(SummaryEntry::from_outcome(
            config.target,
            ContractOutcome {
                contract: "MagicSwapV2Router".to_string(),
                address: Address::with_last_byte(2),
                state: ContractState::Deployed,
                tx_id: TxId::with_last_byte(2),
                args: Vec::new(),
            },
            None,
            Some(false),
        ));
        summary
    }

    #[test]
    fn test_counts() {
        let summary = summary();
        assert_eq!(summary.deployed_count(), 1);
        assert_eq!(summary.reused_count(), 1);
        assert_eq!(
            summary.mismatches().map(|e| e.contract.as_str()).collect::<Vec<_>>(),
            vec!["MagicSwapV2Router"]
        );
    }

    #[test]
    fn test_render_contains_rows() {
        let rendered = summary().render();
        assert!(rendered.contains("UniswapV2Factory"));
        assert!(rendered.contains("MagicSwapV2Router"));
        assert!(rendered.contains("reused"));
        assert!(rendered.contains("deployed"));
        assert!(rendered.contains("MISMATCH"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new("magicswap-summary").expect("Failed to create temp dir");
        let summary = summary();

        let path = summary.save(dir.path()).unwrap();
        assert!(path.ends_with(SUMMARY_FILENAME));

        let loaded = Summary::load(&path).unwrap();
        assert_eq!(loaded, summary);
    }

    #[test]
    fn test_load_corrupted() {
        let dir = TempDir::new("magicswap-summary").expect("Failed to create temp dir");
        let path = dir.path().join(SUMMARY_FILENAME);
        std::fs::write(&path, "{ invalid json }").unwrap();
        assert!(Summary::load(&path).is_err());
    }
}
