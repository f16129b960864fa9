//! Collaborator interfaces: the signer that authorizes transactions and the RPC
//! endpoint that confirms them and serves deployed code.

use std::future::Future;

use alloy_core::primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

use crate::{error::Result, target::TargetConfig};

/// Identifier of a submitted transaction.
pub type TxId = B256;

/// An unsigned contract creation transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTx {
    /// Contract being deployed, for collaborator-side logging.
    pub contract: String,
    pub chain_id: u64,
    /// Bytecode followed by the ABI-encoded constructor arguments.
    pub data: Bytes,
}

/// Outcome of an awaited transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Success { deployed_address: Address },
    Reverted { reason: String },
}

/// Authorizes and broadcasts transactions on behalf of a key.
pub trait Signer: Send + Sync {
    /// Sign `tx` with the key named by `key_id` and submit it.
    ///
    /// Fails with `Authorization` when the key refuses, `Network` on transport
    /// failure.
    fn sign_and_submit(
        &self,
        key_id: &str,
        tx: &DeploymentTx,
    ) -> impl Future<Output = Result<TxId>> + Send;
}

/// Read access to a target chain.
pub trait ChainRpc: Send + Sync {
    /// Wait until `tx_id` is included and report its outcome.
    fn await_confirmation(&self, tx_id: TxId) -> impl Future<Output = Result<Confirmation>> + Send;

    /// The code deployed at `address`, empty when there is none.
    fn read_code(&self, address: Address) -> impl Future<Output = Result<Bytes>> + Send;
}

/// Opens collaborators for a resolved target.
pub trait Connector {
    type Chain: Signer + ChainRpc;

    fn connect(&self, config: &TargetConfig) -> Result<Self::Chain>;
}
