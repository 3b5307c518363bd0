//! Command-line interface for the `pw-repl` binary.

use crate::config::ReplConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// `pw-repl` arguments. Flags override values from the config file.
#[derive(Debug, Parser)]
#[command(name = "pw-repl")]
#[command(about = "pinwarden pin replication daemon", long_about = None)]
pub struct Cli {
    /// Path to a `.toml` or `.json` config file.
    #[arg(short, long, default_value = "/etc/pinwarden/repl.toml")]
    pub config: PathBuf,

    /// Ethereum JSON-RPC endpoint.
    #[arg(long, env = "PW_ETH_RPC_URL")]
    pub eth_rpc_url: Option<String>,

    /// Kubo RPC API endpoint.
    #[arg(long, env = "PW_IPFS_API_URL")]
    pub ipfs_api_url: Option<String>,

    /// Pin-storage contract address.
    #[arg(long, env = "PW_CONTRACT_ADDRESS")]
    pub contract_address: Option<String>,

    /// Directory indices sampled per cycle.
    #[arg(long)]
    pub sample_width: Option<u64>,

    /// What to run; defaults to `serve`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run reconciliation cycles on a timer until interrupted.
    Serve,
    /// Refresh the pin cache, run one cycle, print its report and exit.
    Once,
}

impl Cli {
    /// Selected subcommand.
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Serve)
    }

    /// Load the config file (defaults if it does not exist) and apply flag overrides.
    pub fn load_config(&self) -> anyhow::Result<ReplConfig> {
        let mut config = if self.config.exists() {
            ReplConfig::from_file(&self.config)?
        } else {
            tracing::warn!(
                "Config file not found, using defaults: {}",
                self.config.display()
            );
            ReplConfig::default()
        };
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Overwrite `config` with any values given on the command line.
    pub fn apply_overrides(&self, config: &mut ReplConfig) {
        if let Some(url) = &self.eth_rpc_url {
            config.eth_rpc_url = url.clone();
        }
        if let Some(url) = &self.ipfs_api_url {
            config.ipfs_api_url = url.clone();
        }
        if let Some(address) = &self.contract_address {
            config.contract_address = address.clone();
        }
        if let Some(width) = self.sample_width {
            config.sample_width = width;
        }
    }
}
