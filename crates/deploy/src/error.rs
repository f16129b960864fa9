//! Error taxonomy for deployment runs.

use derive_more::{Display, Error};

/// Result alias used throughout the deployment library.
pub type Result<T, E = DeployError> = std::result::Result<T, E>;

/// Every failure a deployment run can surface.
///
/// All variants are fatal for the current target. The run is safe to re-invoke
/// afterwards because the ledger short-circuits already recorded contracts.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum DeployError {
    /// The target identifier is not part of the static target set.
    #[display("unsupported target `{target}`")]
    UnsupportedTarget { target: String },

    /// A target parameter is missing or malformed.
    #[display("invalid configuration for target `{target}`: `{field}` {reason}")]
    ConfigValidation {
        target: String,
        field: String,
        reason: String,
    },

    /// The deployment plan itself is inconsistent (programming error).
    #[display("invalid deployment plan: {reason}")]
    InvalidPlan { reason: String },

    /// No compiled artifact could be found for a contract.
    #[display("artifact for `{contract}` not found under {dir}")]
    ArtifactNotFound { contract: String, dir: String },

    /// A compiled artifact could not be parsed.
    #[display("invalid artifact for `{contract}`: {reason}")]
    InvalidArtifact { contract: String, reason: String },

    /// The bytecode cannot be hashed for a content-addressed VM.
    #[display("invalid bytecode: {reason}")]
    InvalidBytecode { reason: String },

    /// A ledger key was recorded twice with different addresses.
    #[display(
        "ledger already records `{contract}` on `{target}` at {existing}, refusing to record {attempted}"
    )]
    DuplicateRecord {
        target: String,
        contract: String,
        existing: String,
        attempted: String,
    },

    /// Reading or writing the ledger failed.
    #[display("ledger I/O failure at {path}: {reason}")]
    LedgerIo { path: String, reason: String },

    /// Another run holds the ledger lock for this target.
    #[display("ledger for `{target}` is locked by another run")]
    LedgerLocked { target: String },

    /// The transaction was rejected, reverted, or could not be sent.
    #[display("deployment of `{contract}` on `{target}` failed: {reason}")]
    DeploymentFailed {
        target: String,
        contract: String,
        reason: String,
    },

    /// Confirmation did not arrive in time, the outcome is unknown.
    #[display(
        "confirmation of `{contract}` on `{target}` timed out (tx {tx_id}); outcome unknown, reconcile the ledger against chain state before retrying"
    )]
    ConfirmationTimeout {
        target: String,
        contract: String,
        tx_id: String,
    },

    /// Verification was requested for a contract the ledger does not know.
    #[display("`{contract}` has no deployment record on `{target}`")]
    NotDeployed { target: String, contract: String },

    /// Deployed code hash disagrees with the compiled artifact.
    #[display(
        "bytecode hash mismatch for `{contract}` on `{target}`: expected {expected}, found {actual}"
    )]
    HashMismatch {
        target: String,
        contract: String,
        expected: String,
        actual: String,
    },

    /// Transport failure talking to a collaborator.
    #[display("network error: {reason}")]
    Network { reason: String },

    /// The signer refused to authorize the transaction.
    #[display("authorization error: {reason}")]
    Authorization { reason: String },
}

impl DeployError {
    pub(crate) fn network(reason: impl ToString) -> Self {
        Self::Network {
            reason: reason.to_string(),
        }
    }

    pub(crate) fn ledger_io(path: &std::path::Path, reason: impl ToString) -> Self {
        Self::LedgerIo {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid_plan(reason: impl ToString) -> Self {
        Self::InvalidPlan {
            reason: reason.to_string(),
        }
    }
}
