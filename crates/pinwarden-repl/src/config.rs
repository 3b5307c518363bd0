//! Daemon configuration.

use crate::error::{ReplError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the replication daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
    /// Ethereum JSON-RPC endpoint.
    pub eth_rpc_url: String,
    /// Address of the pin-storage contract.
    pub contract_address: String,
    /// Kubo RPC API endpoint.
    pub ipfs_api_url: String,
    /// Directory indices sampled per cycle.
    pub sample_width: u64,
    /// Seconds between cycle triggers.
    pub cycle_interval_secs: u64,
    /// Seconds between local pin cache refreshes.
    pub pin_refresh_interval_secs: u64,
    /// Deadline for each contract read (ms).
    pub contract_timeout_ms: u64,
    /// Deadline for fetching a directory entry (ms).
    pub fetch_timeout_ms: u64,
    /// Deadline for listing local pins (ms).
    pub list_timeout_ms: u64,
    /// Deadline for a provider-count query (ms).
    pub query_timeout_ms: u64,
    /// Deadline for a pin add or remove (ms).
    pub pin_timeout_ms: u64,
    /// Upper bound on providers counted per query.
    pub max_providers: u64,
    /// Seconds to wait for an in-flight cycle on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            eth_rpc_url: "http://127.0.0.1:8545".to_string(),
            contract_address: "0xD3b80c611999D46895109d75322494F7A49D742F".to_string(),
            ipfs_api_url: "http://127.0.0.1:5001".to_string(),
            sample_width: 10,
            cycle_interval_secs: 60,
            pin_refresh_interval_secs: 300,
            contract_timeout_ms: 15_000,
            fetch_timeout_ms: 15_000,
            list_timeout_ms: 30_000,
            query_timeout_ms: 30_000,
            pin_timeout_ms: 30_000,
            max_providers: 100,
            shutdown_grace_secs: 30,
        }
    }
}

impl ReplConfig {
    /// Load from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: ReplConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the daemon cannot run with.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("sample_width", self.sample_width),
            ("cycle_interval_secs", self.cycle_interval_secs),
            ("pin_refresh_interval_secs", self.pin_refresh_interval_secs),
            ("contract_timeout_ms", self.contract_timeout_ms),
            ("fetch_timeout_ms", self.fetch_timeout_ms),
            ("list_timeout_ms", self.list_timeout_ms),
            ("query_timeout_ms", self.query_timeout_ms),
            ("pin_timeout_ms", self.pin_timeout_ms),
            ("max_providers", self.max_providers),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(ReplError::Config {
                    msg: format!("{} must be greater than zero", name),
                });
            }
        }
        Ok(())
    }

    /// Timeouts as durations.
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            contract: Duration::from_millis(self.contract_timeout_ms),
            fetch: Duration::from_millis(self.fetch_timeout_ms),
            list: Duration::from_millis(self.list_timeout_ms),
            query: Duration::from_millis(self.query_timeout_ms),
            pin: Duration::from_millis(self.pin_timeout_ms),
        }
    }
}

/// Per-call deadlines for external operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Contract reads.
    pub contract: Duration,
    /// Directory-entry fetches.
    pub fetch: Duration,
    /// Local pin listing.
    pub list: Duration,
    /// Provider-count queries.
    pub query: Duration,
    /// Pin add and remove.
    pub pin: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        ReplConfig::default().timeouts()
    }
}
