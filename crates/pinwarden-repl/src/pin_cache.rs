//! Local Pin Cache.
//!
//! Holds the most recent listing of CIDs pinned on the local node. Workers
//! read it concurrently; a refresh builds a complete new listing and swaps the
//! shared pointer, so readers see either the old or the new snapshot and never
//! a partial one. Empty or failed listings never replace a snapshot.

use crate::error::{with_deadline, ReplError, Result};
use crate::store::{ContentStore, PinListing};
use cid::Cid;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Point-in-time statistics for the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinCacheStats {
    /// Number of pins in the current snapshot.
    pub pins: usize,
    /// Successful refreshes.
    pub refreshes: u64,
    /// Refreshes that left the snapshot stale.
    pub failed_refreshes: u64,
    /// Unix time (ms) of the last successful refresh, if any.
    pub last_refresh_ms: Option<u64>,
}

/// Refreshable snapshot of local pins.
pub struct LocalPinCache {
    store: Arc<dyn ContentStore>,
    list_timeout: Duration,
    snapshot: RwLock<Arc<PinListing>>,
    refreshes: AtomicU64,
    failed_refreshes: AtomicU64,
    last_refresh_ms: AtomicU64,
}

impl LocalPinCache {
    /// Create an empty cache backed by `store`.
    pub fn new(store: Arc<dyn ContentStore>, list_timeout: Duration) -> Self {
        Self {
            store,
            list_timeout,
            snapshot: RwLock::new(Arc::new(PinListing::new())),
            refreshes: AtomicU64::new(0),
            failed_refreshes: AtomicU64::new(0),
            last_refresh_ms: AtomicU64::new(0),
        }
    }

    /// Replace the snapshot with a fresh listing of local pins.
    ///
    /// Returns the new pin count. On a listing error, a timeout or an empty
    /// listing, the previous snapshot stays in place and the error is returned.
    pub async fn refresh(&self) -> Result<usize> {
        let listing = with_deadline(
            "pin listing",
            self.list_timeout,
            self.store.list_local_pins(self.list_timeout),
        )
        .await;

        match listing {
            Ok(pins) if pins.is_empty() => {
                self.failed_refreshes.fetch_add(1, Ordering::Relaxed);
                warn!(kept = self.len(), "local pin listing was empty, keeping previous snapshot");
                Err(ReplError::EmptyPinList)
            }
            Ok(pins) => {
                let count = pins.len();
                *self.snapshot.write() = Arc::new(pins);
                self.refreshes.fetch_add(1, Ordering::Relaxed);
                self.last_refresh_ms.store(now_ms(), Ordering::Relaxed);
                info!(pin_count = count, "local pin mapping complete");
                Ok(count)
            }
            Err(e) => {
                self.failed_refreshes.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, kept = self.len(), "local pin mapping failure");
                Err(e)
            }
        }
    }

    /// The current snapshot. Holding it does not block refreshes.
    pub fn snapshot(&self) -> Arc<PinListing> {
        Arc::clone(&self.snapshot.read())
    }

    /// True when `cid` is pinned according to the current snapshot.
    pub fn lookup(&self, cid: &Cid) -> bool {
        self.snapshot.read().contains_key(&cid.to_string())
    }

    /// Pin type recorded for `cid`, if pinned.
    pub fn pin_type(&self, cid: &Cid) -> Option<String> {
        self.snapshot.read().get(&cid.to_string()).cloned()
    }

    /// Number of pins in the current snapshot.
    pub fn len(&self) -> usize {
        self.snapshot.read().len()
    }

    /// True when no snapshot has been loaded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cache statistics.
    pub fn stats(&self) -> PinCacheStats {
        let last = self.last_refresh_ms.load(Ordering::Relaxed);
        PinCacheStats {
            pins: self.len(),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            failed_refreshes: self.failed_refreshes.load(Ordering::Relaxed),
            last_refresh_ms: (last != 0).then_some(last),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
