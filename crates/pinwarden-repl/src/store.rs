//! Content-store operations consumed by the reconciliation engine.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// A resolvable path into the content store, e.g. `/ipfs/<cid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentPath {
    cid: Cid,
}

impl ContentPath {
    /// Immutable path addressing `cid`.
    pub fn ipfs(cid: Cid) -> Self {
        Self { cid }
    }

    /// The identifier this path resolves to.
    pub fn cid(&self) -> &Cid {
        &self.cid
    }
}

impl fmt::Display for ContentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/ipfs/{}", self.cid)
    }
}

/// Local pin listing: CID string to pin type (direct, recursive, indirect).
pub type PinListing = HashMap<String, String>;

/// The IPFS side of reconciliation.
#[async_trait]
pub trait ContentStore: Send + Sync + 'static {
    /// Retrieve the full payload at `path`, giving up after `timeout`.
    async fn fetch(&self, path: &ContentPath, timeout: Duration) -> Result<Bytes>;

    /// List every locally pinned CID with its pin type.
    async fn list_local_pins(&self, timeout: Duration) -> Result<PinListing>;

    /// Number of network providers currently announcing `cid`.
    async fn provider_count(&self, cid: &Cid) -> Result<u64>;

    /// Provider count capped at `limit`. Stores that can stop searching
    /// once `limit` providers are found should override this.
    async fn provider_count_up_to(&self, cid: &Cid, limit: u64) -> Result<u64> {
        Ok(self.provider_count(cid).await?.min(limit))
    }

    /// Recursively pin `cid` on the local node.
    async fn pin_add(&self, cid: &Cid) -> Result<()>;

    /// Recursively unpin `cid` from the local node.
    async fn pin_remove(&self, cid: &Cid) -> Result<()>;
}
