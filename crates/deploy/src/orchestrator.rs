//! Top-level procedure for one target: resolve, hash, deploy, verify, report.

use std::collections::BTreeMap;

use crate::{
    artifact::{ArtifactSet, ArtifactStore},
    bytecode::{BytecodeHash, BytecodeVerifier, compute_hash},
    chain::{ChainRpc, Connector},
    config::{DeployConfig, HashCheck},
    deployer::{ContractOutcome, Deployer, SettleCheck},
    error::{DeployError, Result},
    ledger::Ledger,
    plan::DeploymentPlan,
    report::{Summary, SummaryEntry},
    target::{TargetConfig, TargetRegistry},
};

/// Result of checking one recorded contract against its artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub contract: String,
    pub expected: BytecodeHash,
    pub actual: Option<BytecodeHash>,
    /// Why the deployed code could not be hashed, when it could not.
    pub error: Option<String>,
    pub matches: bool,
}

/// Drives deployments using a configuration, a plan and a way to reach targets.
pub struct Orchestrator<C> {
    config: DeployConfig,
    registry: TargetRegistry,
    ledger: Ledger,
    artifacts: ArtifactStore,
    plan: DeploymentPlan,
    connector: C,
}

impl<C: Connector> Orchestrator<C> {
    pub fn new(config: DeployConfig, connector: C) -> Result<Self> {
        Ok(Self {
            registry: config.registry()?,
            ledger: Ledger::new(&config.ledger_dir),
            artifacts: ArtifactStore::new(&config.artifacts_dir),
            plan: DeploymentPlan::magicswap(),
            config,
            connector,
        })
    }

    pub fn with_plan(mut self, plan: DeploymentPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn plan(&self) -> &DeploymentPlan {
        &self.plan
    }

    /// Deploy the full plan on one target.
    ///
    /// Configuration and artifacts are resolved before any network access. On
    /// content-addressed targets the artifact hashes are computed up front and
    /// each contract's deployed code is checked before the next contract is
    /// attempted.
    pub async fn run(&self, target_id: &str) -> Result<Summary> {
        let config = self.registry.resolve(target_id)?;
        let artifacts = self.artifacts.load_all(self.plan.names())?;
        let chain = self.connector.connect(&config)?;

        tracing::info!(
            network = %config.target,
            chain_id = config.chain_id,
            dialect = %config.dialect,
            rpc_url = %config.rpc_url,
            "Starting orchestration"
        );

        let mut verifier = BytecodeVerifier::new(&self.ledger, &chain);
        let expected = expected_hashes(&config, &artifacts, &mut verifier)?;
        let mut gate = HashGate {
            verifier: &verifier,
            expected: &expected,
            policy: self.config.hash_check,
            verified: BTreeMap::new(),
        };

        let deployment = Deployer::new(&chain, &self.ledger)
            .confirmation_timeout(self.config.confirmation_timeout())
            .deploy_all_checked(&config, &self.plan, &artifacts, &mut gate)
            .await?;

        let mut summary = Summary::new(&config);
        for outcome in deployment.outcomes {
            let code_hash = expected.get(&outcome.contract).copied();
            let verified = gate.verified.get(&outcome.contract).copied();
            summary.push(SummaryEntry::from_outcome(
                config.target,
                outcome,
                code_hash,
                verified,
            ));
        }

        let dir = self.ledger.target_dir(config.target);
        summary
            .save(&dir)
            .map_err(|e| DeployError::ledger_io(&dir, format!("{e:#}")))?;

        tracing::info!(
            network = %config.target,
            deployed = summary.deployed_count(),
            reused = summary.reused_count(),
            "Orchestration complete"
        );
        Ok(summary)
    }

    /// Compare the code deployed for every recorded contract of the plan with the
    /// hash of its artifact, without deploying anything.
    pub async fn verify(&self, target_id: &str) -> Result<Vec<Verification>> {
        let config = self.registry.resolve(target_id)?;
        if !config.dialect.requires_hash_verification() {
            tracing::info!(
                network = %config.target,
                dialect = %config.dialect,
                "Dialect does not derive addresses from code, nothing to verify"
            );
            return Ok(Vec::new());
        }

        let artifacts = self.artifacts.load_all(self.plan.names())?;
        let chain = self.connector.connect(&config)?;
        let mut verifier = BytecodeVerifier::new(&self.ledger, &chain);
        let expected = expected_hashes(&config, &artifacts, &mut verifier)?;

        let mut results = Vec::new();
        for contract in self.plan.names() {
            if self.ledger.lookup(config.target, contract)?.is_none() {
                tracing::warn!(network = %config.target, contract, "Not deployed, skipping");
                continue;
            }
            let hash = expected[contract];
            let (actual, error) = match verifier.deployed_hash(&config, contract).await {
                Ok(actual) => (Some(actual), None),
                Err(DeployError::InvalidBytecode { reason }) => {
                    tracing::error!(
                        network = %config.target,
                        contract,
                        reason = %reason,
                        "Deployed code cannot be hashed"
                    );
                    (None, Some(reason))
                }
                Err(e) => return Err(e),
            };
            results.push(Verification {
                contract: contract.to_string(),
                expected: hash,
                matches: actual == Some(hash),
                actual,
                error,
            });
        }
        Ok(results)
    }

    /// Hash of a contract artifact, as used for content-addressed deployments.
    pub fn bytecode_hash(&self, contract: &str) -> Result<BytecodeHash> {
        let artifact = self.artifacts.load(contract)?;
        compute_hash(&artifact.bytecode)
    }
}

fn expected_hashes<R: ChainRpc>(
    config: &TargetConfig,
    artifacts: &ArtifactSet,
    verifier: &mut BytecodeVerifier<'_, R>,
) -> Result<BTreeMap<String, BytecodeHash>> {
    if !config.dialect.requires_hash_verification() {
        return Ok(BTreeMap::new());
    }
    artifacts
        .iter()
        .map(|(name, artifact)| {
            verifier
                .expected_hash(name, &artifact.bytecode)
                .map(|hash| (name.clone(), hash))
        })
        .collect()
}

/// Checks each settled contract's deployed code, applying the mismatch policy.
struct HashGate<'a, R> {
    verifier: &'a BytecodeVerifier<'a, R>,
    expected: &'a BTreeMap<String, BytecodeHash>,
    policy: HashCheck,
    verified: BTreeMap<String, bool>,
}

impl<R: ChainRpc> SettleCheck for HashGate<'_, R> {
    async fn settled(&mut self, config: &TargetConfig, outcome: &ContractOutcome) -> Result<()> {
        let contract = outcome.contract.as_str();
        let Some(&expected) = self.expected.get(contract) else {
            return Ok(());
        };

        let matches = self
            .verifier
            .verify_deployed_hash(config, contract, expected)
            .await?;
        if !matches {
            match self.policy {
                HashCheck::Enforce => {
                    let actual = match self.verifier.deployed_hash(config, contract).await {
                        Ok(actual) => actual.to_string(),
                        Err(DeployError::InvalidBytecode { reason }) => {
                            format!("<unhashable code: {reason}>")
                        }
                        Err(e) => return Err(e),
                    };
                    return Err(DeployError::HashMismatch {
                        target: config.target.to_string(),
                        contract: contract.to_string(),
                        expected: expected.to_string(),
                        actual,
                    });
                }
                HashCheck::Report => {
                    tracing::error!(
                        network = %config.target,
                        contract,
                        "Bytecode hash mismatch reported, continuing as configured"
                    );
                }
            }
        }

        self.verified.insert(contract.to_string(), matches);
        Ok(())
    }
}
