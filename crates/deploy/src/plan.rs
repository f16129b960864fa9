//! Declarative deployment plan: which contracts to deploy, in which order, and
//! where each constructor argument comes from.

use std::collections::{BTreeMap, HashSet};

use alloy_core::primitives::{Address, U256};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{
    artifact::Artifact,
    error::{DeployError, Result},
    target::TargetConfig,
};

pub const UNISWAP_V2_FACTORY: &str = "UniswapV2Factory";
pub const MAGICSWAP_V2_ROUTER: &str = "MagicSwapV2Router";
pub const NFT_VAULT_FACTORY: &str = "NftVaultFactory";
pub const STAKING_CONTRACT: &str = "StakingContractMainnet";
pub const NFT_VAULT_MANAGER: &str = "NftVaultManager";

/// Pair contract whose bytecode hash the factory relies on for pair addresses.
pub const UNISWAP_V2_PAIR: &str = "UniswapV2Pair";

/// A concrete constructor argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ArgValue {
    Uint(U256),
    Address(Address),
    Bool(bool),
}

impl ArgValue {
    /// ABI encoding of a static value: one 32-byte word.
    pub fn abi_word(&self) -> [u8; 32] {
        match self {
            ArgValue::Uint(value) => value.to_be_bytes::<32>(),
            ArgValue::Address(address) => address.into_word().0,
            ArgValue::Bool(value) => U256::from(*value as u8).to_be_bytes::<32>(),
        }
    }

    /// Whether this value can be passed for a Solidity parameter of type `ty`.
    pub fn matches_type(&self, ty: &str) -> bool {
        match self {
            ArgValue::Uint(_) => ty.starts_with("uint"),
            ArgValue::Address(_) => ty == "address",
            ArgValue::Bool(_) => ty == "bool",
        }
    }
}

/// A field of [`TargetConfig`] usable as a constructor argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum ConfigField {
    #[display("lp_fee")]
    LpFee,
    #[display("protocol_fee")]
    ProtocolFee,
    #[display("protocol_fee_beneficiary")]
    ProtocolFeeBeneficiary,
    #[display("wrapped_native_asset")]
    WrappedNativeAsset,
}

impl ConfigField {
    pub fn read(&self, config: &TargetConfig) -> ArgValue {
        match self {
            ConfigField::LpFee => ArgValue::Uint(U256::from(config.lp_fee)),
            ConfigField::ProtocolFee => ArgValue::Uint(U256::from(config.protocol_fee)),
            ConfigField::ProtocolFeeBeneficiary => {
                ArgValue::Address(config.protocol_fee_beneficiary)
            }
            ConfigField::WrappedNativeAsset => ArgValue::Address(config.wrapped_native_asset),
        }
    }
}

/// Rule producing one constructor argument at deployment time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgResolver {
    Literal(ArgValue),
    Config(ConfigField),
    /// Address of a contract deployed earlier in the same plan.
    AddressOf(String),
}

impl ArgResolver {
    pub fn resolve(
        &self,
        config: &TargetConfig,
        deployed: &BTreeMap<String, Address>,
    ) -> Result<ArgValue> {
        match self {
            ArgResolver::Literal(value) => Ok(*value),
            ArgResolver::Config(field) => Ok(field.read(config)),
            ArgResolver::AddressOf(contract) => deployed
                .get(contract)
                .copied()
                .map(ArgValue::Address)
                .ok_or_else(|| {
                    DeployError::invalid_plan(format!(
                        "address of `{contract}` requested before it was deployed"
                    ))
                }),
        }
    }
}

/// One contract of the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSpec {
    pub name: String,
    pub args: Vec<ArgResolver>,
}

impl ContractSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, resolver: ArgResolver) -> Self {
        self.args.push(resolver);
        self
    }

    pub fn config_arg(self, field: ConfigField) -> Self {
        self.arg(ArgResolver::Config(field))
    }

    pub fn address_of(self, contract: impl Into<String>) -> Self {
        self.arg(ArgResolver::AddressOf(contract.into()))
    }

    pub fn literal(self, value: ArgValue) -> Self {
        self.arg(ArgResolver::Literal(value))
    }

    /// Resolve every argument, in order.
    pub fn resolve_args(
        &self,
        config: &TargetConfig,
        deployed: &BTreeMap<String, Address>,
    ) -> Result<Vec<ArgValue>> {
        self.args
            .iter()
            .map(|resolver| resolver.resolve(config, deployed))
            .collect()
    }

    /// Check resolved values against the artifact's constructor signature.
    pub fn check_signature(&self, artifact: &Artifact, args: &[ArgValue]) -> Result<()> {
        if artifact.constructor_inputs.len() != args.len() {
            return Err(DeployError::invalid_plan(format!(
                "`{}` constructor takes {} arguments, plan provides {}",
                self.name,
                artifact.constructor_inputs.len(),
                args.len()
            )));
        }

        for (index, (ty, value)) in artifact.constructor_inputs.iter().zip(args).enumerate() {
            if !value.matches_type(ty) {
                return Err(DeployError::invalid_plan(format!(
                    "`{}` constructor argument {index} is `{ty}`, plan provides {value:?}",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Contracts in dependency order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub contracts: Vec<ContractSpec>,
}

impl DeploymentPlan {
    pub fn new(contracts: Vec<ContractSpec>) -> Self {
        Self { contracts }
    }

    /// The exchange deployment: factory, router wired to the factory, then the
    /// vault and staking contracts.
    pub fn magicswap() -> Self {
        Self::new(vec![
            ContractSpec::new(UNISWAP_V2_FACTORY)
                .config_arg(ConfigField::ProtocolFee)
                .config_arg(ConfigField::LpFee)
                .config_arg(ConfigField::ProtocolFeeBeneficiary),
            ContractSpec::new(MAGICSWAP_V2_ROUTER)
                .address_of(UNISWAP_V2_FACTORY)
                .config_arg(ConfigField::WrappedNativeAsset),
            ContractSpec::new(NFT_VAULT_FACTORY),
            ContractSpec::new(STAKING_CONTRACT),
            ContractSpec::new(NFT_VAULT_MANAGER),
        ])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.contracts.iter().map(|spec| spec.name.as_str())
    }

    /// Check that names are unique, usable as ledger keys, and that every
    /// address reference points to an earlier contract.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for spec in &self.contracts {
            let valid_name = !spec.name.is_empty()
                && spec
                    .name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid_name {
                return Err(DeployError::invalid_plan(format!(
                    "`{}` is not a valid contract name",
                    spec.name
                )));
            }

            let missing = spec.args.iter().find_map(|resolver| match resolver {
                ArgResolver::AddressOf(dependency) if !seen.contains(dependency.as_str()) => {
                    Some(dependency)
                }
                _ => None,
            });
            if let Some(dependency) = missing {
                return Err(DeployError::invalid_plan(format!(
                    "`{}` depends on `{dependency}`, which is not deployed before it",
                    spec.name
                )));
            }

            if !seen.insert(spec.name.as_str()) {
                return Err(DeployError::invalid_plan(format!(
                    "`{}` appears more than once",
                    spec.name
                )));
            }
        }
        Ok(())
    }
}

impl Default for DeploymentPlan {
    fn default() -> Self {
        Self::magicswap()
    }
}

/// Deployment payload: bytecode followed by the ABI-encoded arguments.
pub fn deployment_payload(bytecode: &[u8], args: &[ArgValue]) -> Vec<u8> {
    let mut data = Vec::with_capacity(bytecode.len() + args.len() * 32);
    data.extend_from_slice(bytecode);
    for arg in args {
        data.extend_from_slice(&arg.abi_word());
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{Target, TargetRegistry};

    fn config() -> TargetConfig {
        TargetRegistry::default().resolve("abstract").unwrap()
    }

    #[test]
    fn test_default_plan_is_valid() {
        let plan = DeploymentPlan::magicswap();
        plan.validate().unwrap();
        assert_eq!(
            plan.names().collect::<Vec<_>>(),
            vec![
                UNISWAP_V2_FACTORY,
                MAGICSWAP_V2_ROUTER,
                NFT_VAULT_FACTORY,
                STAKING_CONTRACT,
                NFT_VAULT_MANAGER
            ]
        );
    }

    #[test]
    fn test_forward_reference_rejected() {
        let plan = DeploymentPlan::new(vec![
            ContractSpec::new("Router").address_of("Factory"),
            ContractSpec::new("Factory"),
        ]);
        assert!(matches!(plan.validate(), Err(DeployError::InvalidPlan { .. })));
    }

    #[test]
    fn test_self_reference_rejected() {
        let plan = DeploymentPlan::new(vec![ContractSpec::new("Loop").address_of("Loop")]);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_duplicate_and_bad_names_rejected() {
        let plan = DeploymentPlan::new(vec![ContractSpec::new("A"), ContractSpec::new("A")]);
        assert!(plan.validate().is_err());

        let plan = DeploymentPlan::new(vec![ContractSpec::new("../A")]);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_resolve_factory_args() {
        let config = config();
        let factory = &DeploymentPlan::magicswap().contracts[0];
        let args = factory.resolve_args(&config, &BTreeMap::new()).unwrap();

        assert_eq!(
            args,
            vec![
                ArgValue::Uint(U256::from(30)),
                ArgValue::Uint(U256::from(30)),
                ArgValue::Address(config.protocol_fee_beneficiary),
            ]
        );
    }

    #[test]
    fn test_resolve_router_args_needs_factory() {
        let config = config();
        let router = &DeploymentPlan::magicswap().contracts[1];
        assert!(router.resolve_args(&config, &BTreeMap::new()).is_err());

        let factory_address = Address::with_last_byte(0x42);
        let deployed = BTreeMap::from([(UNISWAP_V2_FACTORY.to_string(), factory_address)]);
        let args = router.resolve_args(&config, &deployed).unwrap();
        assert_eq!(
            args,
            vec![
                ArgValue::Address(factory_address),
                ArgValue::Address(config.wrapped_native_asset),
            ]
        );
    }

    #[test]
    fn test_check_signature() {
        let artifact = Artifact::new(
            UNISWAP_V2_FACTORY,
            vec!["uint256".into(), "uint256".into(), "address".into()],
            vec![0u8; 32],
        );
        let spec = &DeploymentPlan::magicswap().contracts[0];
        let args = spec.resolve_args(&config(), &BTreeMap::new()).unwrap();
        spec.check_signature(&artifact, &args).unwrap();

        assert!(spec.check_signature(&artifact, &args[..2]).is_err());

        let swapped = vec![args[2], args[1], args[0]];
        assert!(spec.check_signature(&artifact, &swapped).is_err());
    }

    #[test]
    fn test_abi_words() {
        let address = Address::with_last_byte(0xef);
        let word = ArgValue::Address(address).abi_word();
        assert_eq!(&word[..12], &[0u8; 12]);
        assert_eq!(&word[12..], address.as_slice());

        let word = ArgValue::Uint(U256::from(30)).abi_word();
        assert_eq!(word[31], 30);
        assert!(word[..31].iter().all(|b| *b == 0));

        assert_eq!(ArgValue::Bool(true).abi_word()[31], 1);
    }

    #[test]
    fn test_deployment_payload() {
        let bytecode = [0x60u8, 0x80, 0x60, 0x40];
        let payload = deployment_payload(
            &bytecode,
            &[
                ArgValue::Uint(U256::from(1)),
                ArgValue::Address(Address::with_last_byte(2)),
            ],
        );
        assert_eq!(payload.len(), 4 + 64);
        assert_eq!(&payload[..4], &bytecode);
        assert_eq!(payload[4 + 31], 1);
        assert_eq!(payload[4 + 63], 2);
    }

    #[test]
    fn test_literal_resolver() {
        let spec = ContractSpec::new("Staking").literal(ArgValue::Bool(false));
        let args = spec
            .resolve_args(
                &TargetRegistry::default()
                    .resolve(&Target::Treasure.to_string())
                    .unwrap(),
                &BTreeMap::new(),
            )
            .unwrap();
        assert_eq!(args, vec![ArgValue::Bool(false)]);
    }
}
