//! magicswap deploys the MagicSwap exchange contracts across Treasure, Abstract and Arbitrum chains.

mod cli;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::{Cli, Command};
use magicswap_deploy::{CONFIG_FILENAME, DeployConfig, JsonRpcConnector, Orchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    // Fall back to the config file of the working directory, if any.
    let config_path = cli.config.clone().or_else(|| {
        let path = PathBuf::from(CONFIG_FILENAME);
        path.exists().then_some(path)
    });
    let mut config =
        DeployConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Deploy {
            targets,
            hash_check,
        } => {
            if let Some(hash_check) = hash_check {
                config.hash_check = hash_check;
            }
            let orchestrator = orchestrator(config)?;

            for target in &targets {
                let summary = orchestrator
                    .run(target)
                    .await
                    .with_context(|| format!("Deployment on '{target}' failed"))?;

                println!("{}", summary.render());
                if summary.mismatches().next().is_some() {
                    tracing::warn!(
                        network = %summary.target,
                        mismatches = summary.mismatches().count(),
                        "Deployed with bytecode hash mismatches"
                    );
                }
            }
        }

        Command::Verify { target } => {
            let orchestrator = orchestrator(config)?;
            let results = orchestrator
                .verify(&target)
                .await
                .with_context(|| format!("Verification on '{target}' failed"))?;

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["Contract", "Expected", "Deployed", "Match"]);
            for result in &results {
                table.add_row(vec![
                    result.contract.clone(),
                    result.expected.to_string(),
                    match (&result.actual, &result.error) {
                        (Some(hash), _) => hash.to_string(),
                        (None, Some(error)) => format!("unhashable: {error}"),
                        (None, None) => "-".to_string(),
                    },
                    if result.matches { "yes" } else { "NO" }.to_string(),
                ]);
            }
            println!("{table}");

            let mismatches = results.iter().filter(|r| !r.matches).count();
            if mismatches > 0 {
                anyhow::bail!("{mismatches} contract(s) on '{target}' do not match their artifacts");
            }
        }

        Command::Hash { contract, target } => {
            if let Some(target) = target {
                let target_config = config.registry()?.resolve(&target)?;
                if !target_config.dialect.requires_hash_verification() {
                    tracing::warn!(
                        network = %target_config.target,
                        dialect = %target_config.dialect,
                        "Target does not address contracts by bytecode hash"
                    );
                }
            }

            let hash = orchestrator(config)?
                .bytecode_hash(&contract)
                .with_context(|| format!("Failed to hash '{contract}'"))?;
            println!("{hash}");
        }

        Command::Targets => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL).set_header(vec![
                "Target", "Chain id", "Dialect", "RPC", "Signer key",
            ]);
            for (target, params) in config.registry()?.targets() {
                table.add_row(vec![
                    target.to_string(),
                    target.chain_id().to_string(),
                    params.dialect.to_string(),
                    params.rpc_url.clone(),
                    params.signer_key_id.clone(),
                ]);
            }
            println!("{table}");
        }

        Command::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn orchestrator(config: DeployConfig) -> Result<Orchestrator<JsonRpcConnector>> {
    let connector = JsonRpcConnector {
        poll_interval: config.poll_interval(),
    };
    Orchestrator::new(config, connector).context("Invalid configuration")
}
