//! Layered configuration: built-in target table, optional TOML file, environment.

use std::{collections::BTreeMap, path::{Path, PathBuf}, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::{
    error::{DeployError, Result},
    target::{Target, TargetParams, TargetRegistry},
};

/// The default name of the configuration file.
pub const CONFIG_FILENAME: &str = "magicswap.toml";

/// Prefix of environment variables overriding configuration values.
pub const ENV_PREFIX: &str = "MAGICSWAP_";

/// How a bytecode hash mismatch is handled on content-addressed targets.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum HashCheck {
    /// Abort the run with a hash mismatch error.
    #[default]
    Enforce,
    /// Log the mismatch and flag it in the summary.
    Report,
}

/// Complete orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Directory holding the per-target deployment ledgers.
    pub ledger_dir: PathBuf,
    /// Directory holding the compiled contract artifacts.
    pub artifacts_dir: PathBuf,
    /// How long to wait for a transaction confirmation before giving up.
    pub confirmation_timeout_secs: u64,
    /// Interval between receipt polls.
    pub poll_interval_ms: u64,
    pub hash_check: HashCheck,
    /// Parameters for each target, keyed by target name.
    pub targets: BTreeMap<String, TargetParams>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            ledger_dir: PathBuf::from("deployments"),
            artifacts_dir: PathBuf::from("artifacts-zk"),
            confirmation_timeout_secs: 300,
            poll_interval_ms: 1_000,
            hash_check: HashCheck::default(),
            targets: Target::iter()
                .map(|target| {
                    (
                        target.to_string().replace('-', "_"),
                        TargetParams::builtin(target),
                    )
                })
                .collect(),
        }
    }
}

impl DeployConfig {
    /// The figment merging defaults, an optional TOML file and the environment.
    ///
    /// Environment keys use `__` for nesting, e.g.
    /// `MAGICSWAP_TARGETS__ABSTRACT__RPC_URL`.
    pub fn figment(config_path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(DeployConfig::default()));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(
            Env::prefixed(ENV_PREFIX)
                .split("__")
                .ignore(&["VERBOSITY", "CONFIG"]),
        )
    }

    /// Load the configuration. A missing file is not an error.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(config_path))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment
            .extract()
            .map_err(|e| DeployError::ConfigValidation {
                target: "*".to_string(),
                field: e.path.join("."),
                reason: e.kind.to_string(),
            })?;

        // Reject unknown target sections up front.
        config.registry()?;

        tracing::debug!(
            ledger_dir = %config.ledger_dir.display(),
            artifacts_dir = %config.artifacts_dir.display(),
            hash_check = %config.hash_check,
            targets = config.targets.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn registry(&self) -> Result<TargetRegistry> {
        TargetRegistry::from_sections(&self.targets)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Render the resolved configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| DeployError::ConfigValidation {
            target: "*".to_string(),
            field: String::new(),
            reason: e.to_string(),
        })
    }
}
