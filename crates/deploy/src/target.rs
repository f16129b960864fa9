//! Target registry: the static set of chains the exchange is deployed to.

use std::{collections::BTreeMap, str::FromStr};

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use url::Url;

use crate::error::{DeployError, Result};

/// Upper bound for fee values, in basis points (100.00%).
pub const MAX_FEE_BPS: i64 = 10_000;

/// Default liquidity provider fee (0.3%).
pub const DEFAULT_LP_FEE: i64 = 30;
/// Default protocol fee (0.3%).
pub const DEFAULT_PROTOCOL_FEE: i64 = 30;

/// KMS signer used for production deployments.
pub const PROD_KMS_KEY: &str =
    "arn:aws:kms:us-east-1:884078395586:key/mrk-58392046945f4fd3a273d6fee98cf9c8";
/// KMS signer used for dev deployments.
pub const DEV_KMS_KEY: &str =
    "arn:aws:kms:us-west-2:665230337498:key/mrk-a9779aa79c2646429ded5dc3431054ba";

/// A supported deployment target.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Target {
    TreasureTopaz,
    Treasure,
    AbstractTestnet,
    Abstract,
    ArbitrumOne,
}

impl Target {
    pub fn chain_id(&self) -> u64 {
        match self {
            Target::TreasureTopaz => 978658,
            Target::Treasure => 61166,
            Target::AbstractTestnet => 11124,
            Target::Abstract => 2741,
            Target::ArbitrumOne => 42161,
        }
    }

    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        Self::iter().find(|target| target.chain_id() == chain_id)
    }

    /// Parse a target from its name (kebab or snake case) or its chain id.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        let parsed = match value.parse::<u64>() {
            Ok(chain_id) => Self::from_chain_id(chain_id),
            Err(_) => Self::from_str(&value.to_ascii_lowercase().replace('_', "-")).ok(),
        };

        parsed.ok_or_else(|| DeployError::UnsupportedTarget {
            target: value.to_string(),
        })
    }

    pub fn is_testnet(&self) -> bool {
        matches!(self, Target::TreasureTopaz | Target::AbstractTestnet)
    }
}

/// The virtual machine dialect of a target.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum VmDialect {
    /// Addresses derive from sender and nonce.
    #[default]
    Standard,
    /// Addresses derive from the hash of the deployed code.
    ContentAddressed,
}

impl VmDialect {
    pub fn requires_hash_verification(&self) -> bool {
        matches!(self, VmDialect::ContentAddressed)
    }
}

/// Raw, unvalidated parameters for one target, as read from configuration.
///
/// Fees are signed so that negative values coming from a config file surface as a
/// validation error instead of a parse error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetParams {
    pub lp_fee: i64,
    pub protocol_fee: i64,
    pub protocol_fee_beneficiary: String,
    pub wrapped_native_asset: String,
    pub dialect: VmDialect,
    pub signer_key_id: String,
    pub rpc_url: String,
}

impl TargetParams {
    /// The built-in parameters of a target.
    pub fn builtin(target: Target) -> Self {
        let (beneficiary, weth, rpc_url) = match target {
            Target::TreasureTopaz => (
                "0xa65d67513328445b4a4d2f498624483c2601dda4",
                "0x095ded714d42cbd5fb2e84a0ffbfb140e38dc9e1",
                "https://rpc.topaz.treasure.lol",
            ),
            Target::Treasure => (
                "0xa65d67513328445b4a4d2f498624483c2601dda4",
                "0x263d8f36bb8d0d9526255e205868c26690b04b88",
                "https://rpc.treasure.lol",
            ),
            Target::AbstractTestnet => (
                "0x5a25839b49eec2d4c173b42668a84f5988599929",
                "0xe642f7d1f07af75ed8198f0b4d68f14244baaab5",
                "https://api.testnet.abs.xyz",
            ),
            Target::Abstract => (
                "0x5a25839b49eec2d4c173b42668a84f5988599929",
                "0x3439153eb7af838ad19d56e1571fbd09333c2809",
                "https://api.mainnet.abs.xyz",
            ),
            Target::ArbitrumOne => (
                "0x0000000000000000000000000000000000000001",
                "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1",
                "https://arb1.arbitrum.io/rpc",
            ),
        };

        let (protocol_fee, dialect) = match target {
            Target::ArbitrumOne => (0, VmDialect::Standard),
            _ => (DEFAULT_PROTOCOL_FEE, VmDialect::ContentAddressed),
        };

        let signer_key_id = if target.is_testnet() {
            DEV_KMS_KEY
        } else {
            PROD_KMS_KEY
        };

        Self {
            lp_fee: DEFAULT_LP_FEE,
            protocol_fee,
            protocol_fee_beneficiary: beneficiary.to_string(),
            wrapped_native_asset: weth.to_string(),
            dialect,
            signer_key_id: signer_key_id.to_string(),
            rpc_url: rpc_url.to_string(),
        }
    }

    /// Validate the raw parameters into an immutable [`TargetConfig`].
    pub fn validate(&self, target: Target) -> Result<TargetConfig> {
        let invalid = |field: &str, reason: String| DeployError::ConfigValidation {
            target: target.to_string(),
            field: field.to_string(),
            reason,
        };

        let fee = |field: &str, value: i64| -> Result<u16> {
            if !(0..=MAX_FEE_BPS).contains(&value) {
                return Err(invalid(
                    field,
                    format!("must be between 0 and {MAX_FEE_BPS} basis points, got {value}"),
                ));
            }
            Ok(value as u16)
        };

        let address = |field: &str, value: &str| -> Result<Address> {
            let value = value.trim();
            if !value.starts_with("0x") || value.len() != 42 {
                return Err(invalid(
                    field,
                    format!("must be a 0x-prefixed 20-byte hex address, got '{value}'"),
                ));
            }
            Address::from_str(value).map_err(|e| invalid(field, format!("{e}: '{value}'")))
        };

        let signer_key_id = self.signer_key_id.trim();
        if signer_key_id.is_empty() {
            return Err(invalid("signer_key_id", "is missing".to_string()));
        }

        let rpc_url = self.rpc_url.trim();
        if rpc_url.is_empty() {
            return Err(invalid("rpc_url", "is missing".to_string()));
        }
        let rpc_url = Url::parse(rpc_url).map_err(|e| invalid("rpc_url", e.to_string()))?;

        Ok(TargetConfig {
            target,
            chain_id: target.chain_id(),
            lp_fee: fee("lp_fee", self.lp_fee)?,
            protocol_fee: fee("protocol_fee", self.protocol_fee)?,
            protocol_fee_beneficiary: address(
                "protocol_fee_beneficiary",
                &self.protocol_fee_beneficiary,
            )?,
            wrapped_native_asset: address("wrapped_native_asset", &self.wrapped_native_asset)?,
            dialect: self.dialect,
            signer_key_id: signer_key_id.to_string(),
            rpc_url,
        })
    }
}

/// Validated, immutable configuration selected for one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetConfig {
    pub target: Target,
    pub chain_id: u64,
    /// Liquidity provider fee, in basis points.
    pub lp_fee: u16,
    /// Protocol fee, in basis points.
    pub protocol_fee: u16,
    pub protocol_fee_beneficiary: Address,
    pub wrapped_native_asset: Address,
    pub dialect: VmDialect,
    pub signer_key_id: String,
    pub rpc_url: Url,
}

/// Data-driven mapping from target to its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRegistry {
    params: BTreeMap<Target, TargetParams>,
}

impl Default for TargetRegistry {
    fn default() -> Self {
        Self {
            params: Target::iter()
                .map(|target| (target, TargetParams::builtin(target)))
                .collect(),
        }
    }
}

impl TargetRegistry {
    /// Build a registry from named parameter sections.
    ///
    /// Section keys may be target names or chain ids. Targets without a section
    /// keep no parameters and cannot be resolved.
    pub fn from_sections(sections: &BTreeMap<String, TargetParams>) -> Result<Self> {
        let mut params = BTreeMap::new();
        for (key, section) in sections {
            let target = Target::parse(key)?;
            if params.insert(target, section.clone()).is_some() {
                return Err(DeployError::ConfigValidation {
                    target: target.to_string(),
                    field: key.clone(),
                    reason: "is configured more than once".to_string(),
                });
            }
        }
        Ok(Self { params })
    }

    /// Resolve and validate the configuration of a target.
    ///
    /// Pure lookup: no network access happens here.
    pub fn resolve(&self, target_id: &str) -> Result<TargetConfig> {
        let target = Target::parse(target_id)?;
        let params = self
            .params
            .get(&target)
            .ok_or_else(|| DeployError::UnsupportedTarget {
                target: target_id.to_string(),
            })?;

        let config = params.validate(target)?;
        tracing::debug!(
            network = %config.target,
            chain_id = config.chain_id,
            dialect = %config.dialect,
            "Resolved target configuration"
        );
        Ok(config)
    }

    pub fn targets(&self) -> impl Iterator<Item = (&Target, &TargetParams)> {
        self.params.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_by_name_and_chain_id() {
        assert_eq!(Target::parse("abstract").unwrap(), Target::Abstract);
        assert_eq!(
            Target::parse("abstract_testnet").unwrap(),
            Target::AbstractTestnet
        );
        assert_eq!(Target::parse("Treasure-Topaz").unwrap(), Target::TreasureTopaz);
        assert_eq!(Target::parse("61166").unwrap(), Target::Treasure);
        assert_eq!(Target::parse("42161").unwrap(), Target::ArbitrumOne);
    }

    #[test]
    fn test_parse_unknown_target() {
        assert!(matches!(
            Target::parse("421614"),
            Err(DeployError::UnsupportedTarget { .. })
        ));
        assert!(matches!(
            Target::parse("mainnet"),
            Err(DeployError::UnsupportedTarget { .. })
        ));
    }

    #[test]
    fn test_builtin_targets_resolve() {
        let registry = TargetRegistry::default();
        for target in Target::iter() {
            let config = registry.resolve(&target.to_string()).unwrap();
            assert_eq!(config.chain_id, target.chain_id());
            assert_eq!(config.lp_fee, 30);
        }

        let abstract_config = registry.resolve("abstract").unwrap();
        assert_eq!(abstract_config.dialect, VmDialect::ContentAddressed);
        assert_eq!(abstract_config.protocol_fee, 30);
        assert_eq!(abstract_config.signer_key_id, PROD_KMS_KEY);

        let arbitrum = registry.resolve("arbitrum-one").unwrap();
        assert_eq!(arbitrum.dialect, VmDialect::Standard);
        assert_eq!(arbitrum.protocol_fee, 0);
        assert_eq!(arbitrum.protocol_fee_beneficiary, Address::with_last_byte(1));
    }

    #[test]
    fn test_testnets_use_dev_key() {
        let registry = TargetRegistry::default();
        assert_eq!(
            registry.resolve("abstract-testnet").unwrap().signer_key_id,
            DEV_KMS_KEY
        );
        assert_eq!(
            registry.resolve("treasure-topaz").unwrap().signer_key_id,
            DEV_KMS_KEY
        );
    }

    #[test]
    fn test_fee_bounds() {
        let mut params = TargetParams::builtin(Target::Abstract);

        params.lp_fee = -1;
        let err = params.validate(Target::Abstract).unwrap_err();
        assert!(matches!(err, DeployError::ConfigValidation { ref field, .. } if field == "lp_fee"));

        params.lp_fee = 10_001;
        assert!(params.validate(Target::Abstract).is_err());

        params.lp_fee = 10_000;
        params.protocol_fee = 0;
        let config = params.validate(Target::Abstract).unwrap();
        assert_eq!(config.lp_fee, 10_000);
        assert_eq!(config.protocol_fee, 0);

        params.protocol_fee = 10_001;
        let err = params.validate(Target::Abstract).unwrap_err();
        assert!(
            matches!(err, DeployError::ConfigValidation { ref field, .. } if field == "protocol_fee")
        );
    }

    #[test]
    fn test_address_must_be_twenty_bytes() {
        let mut params = TargetParams::builtin(Target::Treasure);

        params.protocol_fee_beneficiary = "0xa65d67513328445b4a4d2f498624483c2601dd".to_string();
        let err = params.validate(Target::Treasure).unwrap_err();
        assert!(matches!(
            err,
            DeployError::ConfigValidation { ref field, .. } if field == "protocol_fee_beneficiary"
        ));

        params.protocol_fee_beneficiary =
            "0xa65d67513328445b4a4d2f498624483c2601dda4aa".to_string();
        assert!(params.validate(Target::Treasure).is_err());

        params.protocol_fee_beneficiary = "0xGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGG".to_string();
        assert!(params.validate(Target::Treasure).is_err());

        params.protocol_fee_beneficiary = "0xa65d67513328445b4a4d2f498624483c2601dda4".to_string();
        params.wrapped_native_asset = "263d8f36bb8d0d9526255e205868c26690b04b88".to_string();
        let err = params.validate(Target::Treasure).unwrap_err();
        assert!(matches!(
            err,
            DeployError::ConfigValidation { ref field, .. } if field == "wrapped_native_asset"
        ));
    }

    #[test]
    fn test_missing_endpoint_and_key() {
        let mut params = TargetParams::builtin(Target::Treasure);
        params.rpc_url = "  ".to_string();
        assert!(matches!(
            params.validate(Target::Treasure),
            Err(DeployError::ConfigValidation { ref field, .. }) if field == "rpc_url"
        ));

        let mut params = TargetParams::builtin(Target::Treasure);
        params.signer_key_id = String::new();
        assert!(matches!(
            params.validate(Target::Treasure),
            Err(DeployError::ConfigValidation { ref field, .. }) if field == "signer_key_id"
        ));
    }

    #[test]
    fn test_registry_rejects_unknown_sections() {
        let mut sections = BTreeMap::new();
        sections.insert(
            "optimism".to_string(),
            TargetParams::builtin(Target::Abstract),
        );
        assert!(matches!(
            TargetRegistry::from_sections(&sections),
            Err(DeployError::UnsupportedTarget { .. })
        ));
    }

    #[test]
    fn test_registry_rejects_duplicate_sections() {
        let mut sections = BTreeMap::new();
        sections.insert("abstract".to_string(), TargetParams::builtin(Target::Abstract));
        sections.insert("2741".to_string(), TargetParams::builtin(Target::Abstract));
        assert!(TargetRegistry::from_sections(&sections).is_err());
    }

    #[test]
    fn test_unconfigured_target_is_unsupported() {
        let registry = TargetRegistry::from_sections(&BTreeMap::new()).unwrap();
        assert!(matches!(
            registry.resolve("abstract"),
            Err(DeployError::UnsupportedTarget { .. })
        ));
    }
}
