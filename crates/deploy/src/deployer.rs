use std::{collections::BTreeMap, future::Future, time::Duration};

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::{
    artifact::{Artifact, ArtifactSet},
    chain::{ChainRpc, Confirmation, DeploymentTx, Signer, TxId},
    error::{DeployError, Result},
    ledger::Ledger,
    plan::{ArgValue, ContractSpec, DeploymentPlan, deployment_payload},
    target::{Target, TargetConfig},
};

/// Default time to wait for a transaction confirmation.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Lifecycle of one contract within a run.
///
/// `Pending -> Reused` or `Pending -> Deploying -> Deployed | Failed`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ContractState {
    Pending,
    Reused,
    Deploying,
    Deployed,
    Failed,
}

/// Terminal, successful state of one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractOutcome {
    pub contract: String,
    pub address: Address,
    /// Either [`ContractState::Reused`] or [`ContractState::Deployed`].
    pub state: ContractState,
    pub tx_id: TxId,
    /// Constructor arguments as resolved during this run.
    pub args: Vec<ArgValue>,
}

/// Result of a [`Deployer::deploy_all`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub target: Target,
    /// Outcomes in plan order.
    pub outcomes: Vec<ContractOutcome>,
    /// Number of transactions submitted during this call.
    pub submitted: usize,
}

impl Deployment {
    pub fn addresses(&self) -> BTreeMap<String, Address> {
        self.outcomes
            .iter()
            .map(|outcome| (outcome.contract.clone(), outcome.address))
            .collect()
    }

    pub fn address_of(&self, contract: &str) -> Option<Address> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.contract == contract)
            .map(|outcome| outcome.address)
    }
}

/// Hook run on each contract as soon as it settles.
pub trait SettleCheck: Send {
    fn settled(
        &mut self,
        config: &TargetConfig,
        outcome: &ContractOutcome,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl SettleCheck for () {
    async fn settled(&mut self, _config: &TargetConfig, _outcome: &ContractOutcome) -> Result<()> {
        Ok(())
    }
}

/// Walks a deployment plan in order, reusing what the ledger already records and
/// deploying the rest one transaction at a time.
pub struct Deployer<'a, C> {
    chain: &'a C,
    ledger: &'a Ledger,
    confirmation_timeout: Duration,
}

impl<'a, C> Deployer<'a, C>
where
    C: Signer + ChainRpc,
{
    pub fn new(chain: &'a C, ledger: &'a Ledger) -> Self {
        Self {
            chain,
            ledger,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }

    pub fn confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Deploy every contract of `plan` on the target, in order.
    ///
    /// Contracts already recorded in the ledger are reused without submitting a
    /// transaction. The first failure aborts the run; contracts after it are not
    /// attempted.
    pub async fn deploy_all(
        &self,
        config: &TargetConfig,
        plan: &DeploymentPlan,
        artifacts: &ArtifactSet,
    ) -> Result<Deployment> {
        self.deploy_all_checked(config, plan, artifacts, &mut ())
            .await
    }

    /// Like [`Deployer::deploy_all`], running `check` on every contract once it is
    /// deployed or reused and before the next one is attempted. A failing check
    /// aborts the run like a failed transaction.
    pub async fn deploy_all_checked<K: SettleCheck>(
        &self,
        config: &TargetConfig,
        plan: &DeploymentPlan,
        artifacts: &ArtifactSet,
        check: &mut K,
    ) -> Result<Deployment> {
        self.preflight(config, plan, artifacts)?;

        let _lock = self.ledger.lock(config.target)?;

        tracing::info!(
            network = %config.target,
            chain_id = config.chain_id,
            contracts = plan.contracts.len(),
            "Starting deployment"
        );

        let mut deployed = BTreeMap::new();
        let mut outcomes = Vec::with_capacity(plan.contracts.len());
        let mut submitted = 0;

        for spec in &plan.contracts {
            let artifact = &artifacts[&spec.name];
            let settled = async {
                let (outcome, sent) = self
                    .deploy_contract(config, spec, artifact, &deployed)
                    .await?;
                check.settled(config, &outcome).await?;
                Ok::<_, DeployError>((outcome, sent))
            };
            let (outcome, sent) = settled
                .await
                .inspect_err(|e| {
                    tracing::error!(
                        network = %config.target,
                        contract = %spec.name,
                        state = %ContractState::Failed,
                        error = %e,
                        "Deployment aborted"
                    );
                })?;

            submitted += sent;
            deployed.insert(spec.name.clone(), outcome.address);
            outcomes.push(outcome);
        }

        tracing::info!(
            network = %config.target,
            submitted,
            reused = outcomes.len() - outcomes.iter().filter(|o| o.state == ContractState::Deployed).count(),
            "Deployment complete"
        );

        Ok(Deployment {
            target: config.target,
            outcomes,
            submitted,
        })
    }

    /// Reject an invalid plan before any transaction is sent.
    fn preflight(
        &self,
        config: &TargetConfig,
        plan: &DeploymentPlan,
        artifacts: &ArtifactSet,
    ) -> Result<()> {
        plan.validate()?;

        // Every address reference resolves to an address-typed value, so placeholder
        // addresses are enough to check argument kinds against the constructors.
        let placeholders: BTreeMap<String, Address> = plan
            .names()
            .map(|name| (name.to_string(), Address::ZERO))
            .collect();

        for spec in &plan.contracts {
            let artifact = artifacts
                .get(&spec.name)
                .ok_or_else(|| DeployError::ArtifactNotFound {
                    contract: spec.name.clone(),
                    dir: "the loaded artifact set".to_string(),
                })?;
            let args = spec.resolve_args(config, &placeholders)?;
            spec.check_signature(artifact, &args)?;
        }
        Ok(())
    }

    /// Returns the outcome and the number of transactions submitted for it.
    async fn deploy_contract(
        &self,
        config: &TargetConfig,
        spec: &ContractSpec,
        artifact: &Artifact,
        deployed: &BTreeMap<String, Address>,
    ) -> Result<(ContractOutcome, usize)> {
        let target = config.target;
        let contract = spec.name.as_str();
        tracing::debug!(network = %target, contract, state = %ContractState::Pending, "Resolving arguments");

        let args = spec.resolve_args(config, deployed)?;

        if let Some(record) = self.ledger.lookup(target, contract)? {
            self.ledger.clear_pending(target, contract)?;
            tracing::info!(
                network = %target,
                contract,
                address = %record.address,
                state = %ContractState::Reused,
                "Already deployed, reusing"
            );
            return Ok((
                ContractOutcome {
                    contract: contract.to_string(),
                    address: record.address,
                    state: ContractState::Reused,
                    tx_id: record.tx_id,
                    args,
                },
                0,
            ));
        }

        if let Some(pending) = self.ledger.pending(target, contract)? {
            tracing::warn!(
                network = %target,
                contract,
                tx_id = %pending.tx_id,
                "Reconciling transaction left pending by a previous run"
            );
            match self.confirm(config, contract, pending.tx_id).await? {
                Confirmation::Success { deployed_address } => {
                    let outcome =
                        self.record(config, contract, deployed_address, pending.tx_id, args)?;
                    return Ok((outcome, 0));
                }
                Confirmation::Reverted { reason } => {
                    tracing::warn!(
                        network = %target,
                        contract,
                        tx_id = %pending.tx_id,
                        reason = %reason,
                        "Previous transaction reverted, deploying again"
                    );
                    self.ledger.clear_pending(target, contract)?;
                }
            }
        }

        tracing::info!(
            network = %target,
            contract,
            args = ?args,
            state = %ContractState::Deploying,
            "Deploying contract"
        );

        let tx = DeploymentTx {
            contract: contract.to_string(),
            chain_id: config.chain_id,
            data: deployment_payload(&artifact.bytecode, &args).into(),
        };

        let tx_id = self
            .chain
            .sign_and_submit(&config.signer_key_id, &tx)
            .await
            .map_err(|e| failed(config, contract, e.to_string()))?;

        self.ledger.mark_pending(target, contract, tx_id)?;
        tracing::debug!(network = %target, contract, tx_id = %tx_id, "Transaction submitted");

        match self.confirm(config, contract, tx_id).await? {
            Confirmation::Success { deployed_address } => {
                let outcome = self.record(config, contract, deployed_address, tx_id, args)?;
                Ok((outcome, 1))
            }
            Confirmation::Reverted { reason } => {
                self.ledger.clear_pending(target, contract)?;
                Err(failed(
                    config,
                    contract,
                    format!("transaction {tx_id} reverted: {reason}"),
                ))
            }
        }
    }

    /// Await a confirmation under the configured timeout.
    ///
    /// A timeout or a transport failure leaves the pending marker in place: the
    /// outcome is unknown and is reconciled on the next run.
    async fn confirm(&self, config: &TargetConfig, contract: &str, tx_id: TxId) -> Result<Confirmation> {
        match tokio::time::timeout(self.confirmation_timeout, self.chain.await_confirmation(tx_id))
            .await
        {
            Ok(Ok(confirmation)) => Ok(confirmation),
            Ok(Err(e)) => Err(failed(
                config,
                contract,
                format!("awaiting confirmation of {tx_id}: {e}"),
            )),
            Err(_) => Err(DeployError::ConfirmationTimeout {
                target: config.target.to_string(),
                contract: contract.to_string(),
                tx_id: tx_id.to_string(),
            }),
        }
    }

    fn record(
        &self,
        config: &TargetConfig,
        contract: &str,
        address: Address,
        tx_id: TxId,
        args: Vec<ArgValue>,
    ) -> Result<ContractOutcome> {
        self.ledger.record(config.target, contract, address, tx_id)?;
        self.ledger.clear_pending(config.target, contract)?;

        tracing::info!(
            network = %config.target,
            contract,
            %address,
            tx_id = %tx_id,
            state = %ContractState::Deployed,
            "Contract deployed"
        );

        Ok(ContractOutcome {
            contract: contract.to_string(),
            address,
            state: ContractState::Deployed,
            tx_id,
            args,
        })
    }
}

fn failed(config: &TargetConfig, contract: &str, reason: String) -> DeployError {
    DeployError::DeploymentFailed {
        target: config.target.to_string(),
        contract: contract.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ContractState::Reused.to_string(), "reused");
        assert_eq!(ContractState::Deployed.to_string(), "deployed");
        assert_eq!(ContractState::Failed.to_string(), "failed");
    }

    #[test]
    fn test_deployment_addresses() {
        let deployment = Deployment {
            target: Target::Abstract,
            outcomes: vec![
                ContractOutcome {
                    contract: "A".to_string(),
                    address: Address::with_last_byte(1),
                    state: ContractState::Reused,
                    tx_id: TxId::with_last_byte(1),
                    args: Vec::new(),
                },
                ContractOutcome {
                    contract: "B".to_string(),
                    address: Address::with_last_byte(2),
                    state: ContractState::Deployed,
                    tx_id: TxId::with_last_byte(2),
                    args: vec![ArgValue::Address(Address::with_last_byte(1))],
                },
            ],
            submitted: 1,
        };

        let addresses = deployment.addresses();
        assert_eq!(addresses.len(), 2);
        assert_eq!(addresses["B"], Address::with_last_byte(2));
        assert_eq!(deployment.address_of("A"), Some(Address::with_last_byte(1)));
        assert_eq!(deployment.address_of("C"), None);
    }
}
