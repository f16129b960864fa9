use std::path::PathBuf;

use clap::{Parser, Subcommand};
use magicswap_deploy::{HashCheck, plan::UNISWAP_V2_PAIR};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "magicswap")]
#[command(
    version,
    about = "Deploy the MagicSwap contracts on Treasure, Abstract and Arbitrum chains"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "MAGICSWAP_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a configuration file.
    ///
    /// Defaults to `magicswap.toml` in the current directory when it exists.
    #[arg(short, long, global = true, alias = "conf", env = "MAGICSWAP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy the contracts on one or more targets, one target at a time.
    ///
    /// Contracts already recorded in the ledger are reused. The first failing
    /// target stops the command.
    Deploy {
        /// Target names or chain ids.
        #[arg(required = true)]
        targets: Vec<String>,

        /// What to do when deployed code does not match the artifact.
        #[arg(long)]
        hash_check: Option<HashCheck>,
    },

    /// Check deployed bytecode against the local artifacts.
    Verify {
        /// Target name or chain id.
        target: String,
    },

    /// Print the bytecode hash of a compiled contract.
    Hash {
        /// Contract name.
        #[arg(default_value = UNISWAP_V2_PAIR)]
        contract: String,

        /// Warn when this target does not address contracts by code hash.
        #[arg(long)]
        target: Option<String>,
    },

    /// List the configured targets.
    Targets,

    /// Print the resolved configuration as TOML.
    Config,
}
