//! Compiled contract artifacts.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use alloy_core::primitives::Bytes;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{DeployError, Result};

/// A compiled contract: name, constructor signature and bytecode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub contract_name: String,
    /// Solidity types of the constructor inputs, in order.
    pub constructor_inputs: Vec<String>,
    pub bytecode: Bytes,
}

impl Artifact {
    pub fn new(
        contract_name: impl Into<String>,
        constructor_inputs: Vec<String>,
        bytecode: impl Into<Bytes>,
    ) -> Self {
        Self {
            contract_name: contract_name.into(),
            constructor_inputs,
            bytecode: bytecode.into(),
        }
    }

    /// Parse a hardhat-style artifact JSON document.
    pub fn from_json(contract: &str, content: &str) -> Result<Self> {
        let invalid = |reason: String| DeployError::InvalidArtifact {
            contract: contract.to_string(),
            reason,
        };

        let raw: RawArtifact = serde_json::from_str(content).map_err(|e| invalid(e.to_string()))?;

        let constructor_inputs = raw
            .abi
            .iter()
            .find(|entry| entry.get("type").and_then(Value::as_str) == Some("constructor"))
            .and_then(|ctor| ctor.get("inputs"))
            .and_then(Value::as_array)
            .map(|inputs| {
                inputs
                    .iter()
                    .map(|input| {
                        input
                            .get("type")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .ok_or_else(|| invalid("constructor input without a type".to_string()))
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        let bytecode = raw.bytecode.trim();
        let bytecode = hex::decode(bytecode.strip_prefix("0x").unwrap_or(bytecode))
            .map_err(|e| invalid(format!("bytecode is not valid hex: {e}")))?;
        if bytecode.is_empty() {
            return Err(invalid(
                "bytecode is empty (abstract contract or interface?)".to_string(),
            ));
        }

        Ok(Self {
            contract_name: raw.contract_name,
            constructor_inputs,
            bytecode: bytecode.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    contract_name: String,
    #[serde(default)]
    abi: Vec<Value>,
    bytecode: String,
}

/// Artifacts keyed by contract name.
pub type ArtifactSet = BTreeMap<String, Artifact>;

/// Locates artifacts in a compiler output directory.
///
/// The directory is searched recursively for `<Contract>.json`; debug files
/// (`*.dbg.json`) are ignored.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load(&self, contract: &str) -> Result<Artifact> {
        let path = self.find(contract)?.ok_or_else(|| DeployError::ArtifactNotFound {
            contract: contract.to_string(),
            dir: self.root.display().to_string(),
        })?;

        let content = std::fs::read_to_string(&path).map_err(|e| DeployError::InvalidArtifact {
            contract: contract.to_string(),
            reason: format!("failed to read {}: {e}", path.display()),
        })?;

        let artifact = Artifact::from_json(contract, &content)?;
        tracing::debug!(
            contract,
            path = %path.display(),
            bytecode_len = artifact.bytecode.len(),
            "Loaded artifact"
        );
        Ok(artifact)
    }

    /// Load every named artifact, failing on the first one missing.
    pub fn load_all<'a>(&self, contracts: impl IntoIterator<Item = &'a str>) -> Result<ArtifactSet> {
        contracts
            .into_iter()
            .map(|contract| self.load(contract).map(|artifact| (contract.to_string(), artifact)))
            .collect()
    }

    fn find(&self, contract: &str) -> Result<Option<PathBuf>> {
        let file_name = format!("{contract}.json");
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(DeployError::InvalidArtifact {
                        contract: contract.to_string(),
                        reason: format!("failed to read {}: {e}", dir.display()),
                    });
                }
            };

            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.file_name().and_then(|n| n.to_str()) == Some(file_name.as_str()) {
                    return Ok(Some(path));
                }
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    const FACTORY_ARTIFACT: &str = r#"{
        "_format": "hh-zksolc-artifact-1",
        "contractName": "UniswapV2Factory",
        "sourceName": "contracts/UniswapV2/core/UniswapV2Factory.sol",
        "abi": [
            {
                "type": "constructor",
                "inputs": [
                    { "name": "_defaultProtocolFee", "type": "uint256" },
                    { "name": "_defaultLpFee", "type": "uint256" },
                    { "name": "_protocolFeeBeneficiary", "type": "address" }
                ],
                "stateMutability": "nonpayable"
            },
            { "type": "function", "name": "allPairsLength", "inputs": [], "outputs": [] }
        ],
        "bytecode": "0x6080604052",
        "deployedBytecode": "0x6080"
    }"#;

    #[test]
    fn test_parse_constructor_inputs() {
        let artifact = Artifact::from_json("UniswapV2Factory", FACTORY_ARTIFACT).unwrap();
        assert_eq!(artifact.contract_name, "UniswapV2Factory");
        assert_eq!(
            artifact.constructor_inputs,
            vec!["uint256", "uint256", "address"]
        );
        assert_eq!(artifact.bytecode.as_ref(), &[0x60, 0x80, 0x60, 0x40, 0x52]);
    }

    #[test]
    fn test_parse_without_constructor() {
        let artifact = Artifact::from_json(
            "NftVaultFactory",
            r#"{ "contractName": "NftVaultFactory", "abi": [], "bytecode": "0x00" }"#,
        )
        .unwrap();
        assert!(artifact.constructor_inputs.is_empty());
    }

    #[test]
    fn test_reject_empty_bytecode() {
        let err = Artifact::from_json(
            "IUniswapV2Pair",
            r#"{ "contractName": "IUniswapV2Pair", "abi": [], "bytecode": "0x" }"#,
        )
        .unwrap_err();
        assert!(matches!(err, DeployError::InvalidArtifact { .. }));
    }

    #[test]
    fn test_store_finds_nested_artifact() {
        let dir = TempDir::new("magicswap-artifacts").expect("Failed to create temp dir");
        let nested = dir
            .path()
            .join("contracts/UniswapV2/core/UniswapV2Factory.sol");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("UniswapV2Factory.json"), FACTORY_ARTIFACT).unwrap();
        std::fs::write(nested.join("UniswapV2Factory.dbg.json"), "{}").unwrap();

        let store = ArtifactStore::new(dir.path());
        let artifact = store.load("UniswapV2Factory").unwrap();
        assert_eq!(artifact.constructor_inputs.len(), 3);

        assert!(matches!(
            store.load("MagicSwapV2Router"),
            Err(DeployError::ArtifactNotFound { .. })
        ));
        assert!(store.load_all(["UniswapV2Factory", "MagicSwapV2Router"]).is_err());
    }
}
