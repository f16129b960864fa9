//! magicswap-deploy - Deployment library for the MagicSwap contract suite.
//!
//! This crate deploys an ordered plan of contracts on one or more EVM targets,
//! records every deployed address in a per-target ledger so reruns are
//! idempotent, and verifies deployed bytecode on content-addressed VMs.

mod artifact;
pub use artifact::{Artifact, ArtifactSet, ArtifactStore};

mod bytecode;
pub use bytecode::{
    BYTECODE_HASH_VERSION, BytecodeHash, BytecodeVerifier, MAX_BYTECODE_WORDS, WORD_SIZE,
    compute_hash,
};

mod chain;
pub use chain::{ChainRpc, Confirmation, Connector, DeploymentTx, Signer, TxId};

mod config;
pub use config::{CONFIG_FILENAME, DeployConfig, ENV_PREFIX, HashCheck};

mod deployer;
pub use deployer::{
    ContractOutcome, ContractState, DEFAULT_CONFIRMATION_TIMEOUT, Deployer, Deployment, SettleCheck,
};

mod error;
pub use error::{DeployError, Result};

mod ledger;
pub use ledger::{DeploymentRecord, Ledger, LedgerLock, PendingTx};

mod orchestrator;
pub use orchestrator::{Orchestrator, Verification};

pub mod plan;
pub use plan::{ArgResolver, ArgValue, ConfigField, ContractSpec, DeploymentPlan};

mod report;
pub use report::{SUMMARY_FILENAME, Summary, SummaryEntry};

mod rpc;
pub use rpc::{CallError, JsonRpcClient, JsonRpcConnector, create_client, json_rpc_call};

mod target;
pub use target::{
    DEFAULT_LP_FEE, DEFAULT_PROTOCOL_FEE, DEV_KMS_KEY, MAX_FEE_BPS, PROD_KMS_KEY, Target,
    TargetConfig, TargetParams, TargetRegistry, VmDialect,
};
