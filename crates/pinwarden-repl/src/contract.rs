//! Read-only view of the on-chain pin directory.

use crate::error::Result;
use async_trait::async_trait;

/// The blockchain side of reconciliation.
///
/// Implementations read the pin-storage contract: its replication factor,
/// the number of directory entries, and the CID stored at each index.
#[async_trait]
pub trait ContractReader: Send + Sync + 'static {
    /// Network-wide target number of providers per embedded pin.
    async fn replication_factor(&self) -> Result<u64>;

    /// Number of entries in the directory.
    async fn directory_size(&self) -> Result<u64>;

    /// The directory-entry CID stored at `index`.
    async fn directory_entry(&self, index: u64) -> Result<String>;
}
