#![warn(missing_docs)]

//! pinwarden replication subsystem: Contract-directed pin replication maintenance for IPFS nodes

pub mod chain;
pub mod cli;
pub mod config;
pub mod contract;
pub mod cycle;
pub mod daemon;
pub mod decision;
pub mod error;
pub mod kubo;
pub mod memory;
pub mod pin_cache;
pub mod resolver;
pub mod sample;
pub mod scan;
pub mod stats;
pub mod store;

pub use config::ReplConfig;
pub use cycle::CycleOrchestrator;
pub use daemon::ReplicationDaemon;
pub use error::{ReplError, Result};
