//! Resolution of directory entries into the pins they govern.

use crate::error::{ReplError, Result};
use crate::scan::CidScanner;
use crate::store::{ContentPath, ContentStore};
use cid::Cid;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Parse a directory-entry identifier into a [`Cid`].
pub fn parse_cid(input: &str) -> Result<Cid> {
    Cid::try_from(input.trim()).map_err(|e| ReplError::Decode {
        input: input.to_string(),
        msg: e.to_string(),
    })
}

/// Fetches a directory entry's payload and extracts its embedded pins.
pub struct PinListResolver {
    store: Arc<dyn ContentStore>,
    fetch_timeout: Duration,
}

impl PinListResolver {
    /// Create a resolver that fetches through `store`.
    pub fn new(store: Arc<dyn ContentStore>, fetch_timeout: Duration) -> Self {
        Self {
            store,
            fetch_timeout,
        }
    }

    /// Deadline applied to every content fetch.
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Resolve the entry identified by `entry` into its embedded pins.
    ///
    /// Fails with `Decode` if `entry` is not a CID, `Fetch`/`Timeout` if the
    /// payload cannot be retrieved, and `EmptyContent` if it is empty.
    pub async fn resolve(&self, entry: &str) -> Result<Vec<Cid>> {
        let path = ContentPath::ipfs(parse_cid(entry)?);
        let payload = self.store.fetch(&path, self.fetch_timeout).await?;
        if payload.is_empty() {
            return Err(ReplError::EmptyContent {
                path: path.to_string(),
            });
        }
        let pins: Vec<Cid> = CidScanner::new(&payload).collect();
        debug!(path = %path, bytes = payload.len(), pins = pins.len(), "resolved pin list");
        Ok(pins)
    }
}
