use anyhow::Result;
use clap::Parser;
use pinwarden_repl::chain::EthRpcContract;
use pinwarden_repl::cli::{Cli, Command};
use pinwarden_repl::kubo::KuboStore;
use pinwarden_repl::ReplicationDaemon;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;

    tracing::info!(
        eth_rpc_url = %config.eth_rpc_url,
        ipfs_api_url = %config.ipfs_api_url,
        "pinwarden replication daemon starting..."
    );

    let contract = Arc::new(EthRpcContract::new(
        &config.eth_rpc_url,
        &config.contract_address,
        config.timeouts().contract,
    )?);
    tracing::info!(contract = contract.address(), "reading pin directory");
    let store = Arc::new(KuboStore::new(&config.ipfs_api_url, config.max_providers)?);
    let daemon = ReplicationDaemon::new(&config, contract, store);

    match cli.command() {
        Command::Once => {
            daemon.run_single().await?;
            if let Some(report) = daemon.orchestrator().last_report() {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        Command::Serve => {
            let (tx, rx) = watch::channel(false);
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for shutdown signal: {}", e);
                }
                let _ = tx.send(true);
            });
            daemon.run(rx).await;
        }
    }

    Ok(())
}
