//! Bytecode hashing for content-addressed VMs.
//!
//! On content-addressed dialects the address of a contract derives from the hash
//! of its code, so the hash of the compiled artifact must match the hash of the
//! code actually deployed on-chain.

use std::collections::HashMap;

use alloy_core::primitives::B256;
use derive_more::{Deref, Display};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    chain::ChainRpc,
    error::{DeployError, Result},
    ledger::Ledger,
    target::TargetConfig,
};

/// Size of a VM word, in bytes.
pub const WORD_SIZE: usize = 32;

/// Current version marker of the versioned bytecode hash.
pub const BYTECODE_HASH_VERSION: u8 = 1;

/// Maximum number of words a bytecode may span (exclusive).
pub const MAX_BYTECODE_WORDS: usize = 1 << 16;

/// Versioned hash of a contract bytecode.
///
/// Layout: `[version, 0, word_count (u16 BE), sha256(bytecode)[4..32]]`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Deref, Display,
)]
#[display("{_0}")]
pub struct BytecodeHash(B256);

impl BytecodeHash {
    /// Number of 32-byte words of the hashed bytecode.
    pub fn word_count(&self) -> u16 {
        u16::from_be_bytes([self.0[2], self.0[3]])
    }
}

/// Compute the versioned hash of a bytecode.
///
/// Pure function of its input. Fails when the bytecode cannot exist on a
/// content-addressed VM: its length must be a whole number of words, the word
/// count must be odd and below [`MAX_BYTECODE_WORDS`].
pub fn compute_hash(bytecode: &[u8]) -> Result<BytecodeHash> {
    if bytecode.is_empty() {
        return Err(invalid_bytecode("bytecode is empty".to_string()));
    }
    if bytecode.len() % WORD_SIZE != 0 {
        return Err(invalid_bytecode(format!(
            "length {} is not a multiple of {WORD_SIZE} bytes",
            bytecode.len()
        )));
    }

    let words = bytecode.len() / WORD_SIZE;
    if words >= MAX_BYTECODE_WORDS {
        return Err(invalid_bytecode(format!(
            "{words} words exceeds the maximum of {}",
            MAX_BYTECODE_WORDS - 1
        )));
    }
    if words % 2 == 0 {
        return Err(invalid_bytecode(format!(
            "word count must be odd, got {words}"
        )));
    }

    let mut digest: [u8; 32] = Sha256::digest(bytecode).into();
    digest[0] = BYTECODE_HASH_VERSION;
    digest[1] = 0;
    digest[2..4].copy_from_slice(&(words as u16).to_be_bytes());

    Ok(BytecodeHash(B256::from(digest)))
}

fn invalid_bytecode(reason: String) -> DeployError {
    DeployError::InvalidBytecode { reason }
}

/// Compares deployed code against expected hashes, caching artifact hashes for
/// the duration of a run.
pub struct BytecodeVerifier<'a, R> {
    ledger: &'a Ledger,
    rpc: &'a R,
    cache: HashMap<String, BytecodeHash>,
}

impl<'a, R: ChainRpc> BytecodeVerifier<'a, R> {
    pub fn new(ledger: &'a Ledger, rpc: &'a R) -> Self {
        Self {
            ledger,
            rpc,
            cache: HashMap::new(),
        }
    }

    /// Hash of a contract's compiled bytecode, memoized by contract name.
    pub fn expected_hash(&mut self, contract: &str, bytecode: &[u8]) -> Result<BytecodeHash> {
        if let Some(hash) = self.cache.get(contract) {
            return Ok(*hash);
        }
        let hash = compute_hash(bytecode)?;
        tracing::debug!(contract, hash = %hash, "Computed bytecode hash");
        self.cache.insert(contract.to_string(), hash);
        Ok(hash)
    }

    /// Check the code deployed at the recorded address against `expected`.
    ///
    /// Vacuously true for standard dialects. Returns `false` on mismatch; the
    /// caller decides whether a mismatch aborts the run.
    pub async fn verify_deployed_hash(
        &self,
        config: &TargetConfig,
        contract: &str,
        expected: BytecodeHash,
    ) -> Result<bool> {
        if !config.dialect.requires_hash_verification() {
            return Ok(true);
        }

        let record = self
            .ledger
            .lookup(config.target, contract)?
            .ok_or_else(|| DeployError::NotDeployed {
                target: config.target.to_string(),
                contract: contract.to_string(),
            })?;

        let code = self.rpc.read_code(record.address).await?;
        let actual = match compute_hash(&code) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::error!(
                    network = %config.target,
                    contract,
                    address = %record.address,
                    code_len = code.len(),
                    error = %e,
                    "Deployed code cannot be hashed"
                );
                return Ok(false);
            }
        };

        if actual != expected {
            tracing::error!(
                network = %config.target,
                contract,
                address = %record.address,
                expected = %expected,
                actual = %actual,
                "Deployed bytecode hash mismatch"
            );
            return Ok(false);
        }

        tracing::info!(
            network = %config.target,
            contract,
            address = %record.address,
            hash = %actual,
            "Deployed bytecode hash verified"
        );
        Ok(true)
    }

    /// Hash of the code currently deployed for a recorded contract.
    ///
    /// Fails with `NotDeployed` when the ledger has no record and with
    /// `InvalidBytecode` when the deployed code cannot be hashed.
    pub async fn deployed_hash(
        &self,
        config: &TargetConfig,
        contract: &str,
    ) -> Result<BytecodeHash> {
        let record = self
            .ledger
            .lookup(config.target, contract)?
            .ok_or_else(|| DeployError::NotDeployed {
                target: config.target.to_string(),
                contract: contract.to_string(),
            })?;

        let code = self.rpc.read_code(record.address).await?;
        compute_hash(&code).map_err(|e| match e {
            DeployError::InvalidBytecode { reason } => DeployError::InvalidBytecode {
                reason: format!("code at {} ({} bytes): {reason}", record.address, code.len()),
            },
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chain::{Confirmation, TxId},
        target::TargetRegistry,
    };
    use alloy_core::primitives::{Address, Bytes};
    use tempdir::TempDir;

    /// Serves the same code at every address.
    struct FixedCode(Bytes);

    impl ChainRpc for FixedCode {
        async fn await_confirmation(&self, _tx_id: TxId) -> Result<Confirmation> {
            unimplemented!("not used by the verifier")
        }

        async fn read_code(&self, _address: Address) -> Result<Bytes> {
            Ok(self.0.clone())
        }
    }

    fn bytecode(words: usize, fill: u8) -> Vec<u8> {
        vec![fill; words * WORD_SIZE]
    }

    #[test]
    fn test_hash_determinism() {
        let code = bytecode(3, 0xab);
        let hash1 = compute_hash(&code).unwrap();
        let hash2 = compute_hash(&code.clone()).unwrap();
        assert_eq!(hash1, hash2, "Hash should be deterministic");
    }

    #[test]
    fn test_hash_changes_with_single_byte() {
        let code = bytecode(5, 0x11);
        let mut other = code.clone();
        other[77] ^= 0x01;

        assert_ne!(compute_hash(&code).unwrap(), compute_hash(&other).unwrap());
    }

    #[test]
    fn test_hash_layout() {
        let code = bytecode(3, 0x00);
        let hash = compute_hash(&code).unwrap();
        let sha: [u8; 32] = Sha256::digest(&code).into();

        assert_eq!(hash[0], BYTECODE_HASH_VERSION);
        assert_eq!(hash[1], 0);
        assert_eq!(hash.word_count(), 3);
        assert_eq!(&hash[4..], &sha[4..]);
    }

    #[test]
    fn test_word_count_big_endian() {
        let hash = compute_hash(&bytecode(257, 0x60)).unwrap();
        assert_eq!(hash[2], 0x01);
        assert_eq!(hash[3], 0x01);
        assert_eq!(hash.word_count(), 257);
    }

    #[test]
    fn test_rejects_unaligned_bytecode() {
        assert!(matches!(
            compute_hash(&[0u8; 33]),
            Err(DeployError::InvalidBytecode { .. })
        ));
        assert!(compute_hash(&[]).is_err());
    }

    #[test]
    fn test_rejects_even_word_count() {
        assert!(compute_hash(&bytecode(2, 0x01)).is_err());
    }

    #[test]
    fn test_rejects_oversized_bytecode() {
        assert!(compute_hash(&bytecode(MAX_BYTECODE_WORDS + 1, 0x01)).is_err());
        assert!(compute_hash(&bytecode(MAX_BYTECODE_WORDS - 1, 0x01)).is_ok());
    }

    #[test]
    fn test_display_is_hex() {
        let hash = compute_hash(&bytecode(1, 0x00)).unwrap();
        let rendered = hash.to_string();
        assert!(rendered.starts_with("0x01000001"));
        assert_eq!(rendered.len(), 66);
    }

    #[tokio::test]
    async fn test_deployed_hash_reports_why_code_is_unhashable() {
        let dir = TempDir::new("magicswap-bytecode").expect("Failed to create temp dir");
        let ledger = Ledger::new(dir.path());
        let config = TargetRegistry::default().resolve("abstract").unwrap();
        ledger
            .record(
                config.target,
                "UniswapV2Pair",
                Address::with_last_byte(7),
                TxId::with_last_byte(7),
            )
            .unwrap();

        let rpc = FixedCode(Bytes::from(vec![0u8; 33]));
        let verifier = BytecodeVerifier::new(&ledger, &rpc);

        match verifier.deployed_hash(&config, "UniswapV2Pair").await {
            Err(DeployError::InvalidBytecode { reason }) => {
                assert!(reason.contains("33 bytes"), "reason: {reason}");
                assert!(reason.contains("not a multiple of 32"), "reason: {reason}");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let expected = compute_hash(&bytecode(1, 0x00)).unwrap();
        assert!(
            !verifier
                .verify_deployed_hash(&config, "UniswapV2Pair", expected)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_deployed_hash_requires_record() {
        let dir = TempDir::new("magicswap-bytecode").expect("Failed to create temp dir");
        let ledger = Ledger::new(dir.path());
        let config = TargetRegistry::default().resolve("abstract").unwrap();
        let rpc = FixedCode(Bytes::from(bytecode(1, 0x00)));

        let err = BytecodeVerifier::new(&ledger, &rpc)
            .deployed_hash(&config, "UniswapV2Pair")
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::NotDeployed { .. }));
    }
}
