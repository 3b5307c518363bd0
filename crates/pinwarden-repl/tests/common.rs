//! Common test utilities and fixtures for integration tests.

#![allow(dead_code)]

use cid::Cid;
use pinwarden_repl::config::Timeouts;
use pinwarden_repl::memory::{cid_v0_for, MemoryContract, MemoryStore};
use pinwarden_repl::pin_cache::LocalPinCache;
use pinwarden_repl::CycleOrchestrator;
use std::sync::Arc;
use std::time::Duration;

/// Deterministic pin identifier for a test label.
pub fn pin(label: &str) -> Cid {
    cid_v0_for(label.as_bytes())
}

/// Renders a pin list the way directory entries embed them: CIDs separated
/// by punctuation and whitespace.
pub fn pin_list_text(pins: &[Cid]) -> String {
    pins.iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(",\n")
}

/// An in-process directory, content store and orchestrator.
pub struct Fixture {
    /// Identifiers of the stored pin lists, by directory index.
    pub entry_ids: Vec<Cid>,
    pub contract: Arc<MemoryContract>,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<LocalPinCache>,
    pub orchestrator: Arc<CycleOrchestrator>,
}

impl Fixture {
    /// Build a directory whose entry `i` is a stored pin list holding `entries[i]`.
    pub fn new(factor: u64, entries: &[Vec<Cid>], sample_width: u64) -> Self {
        Self::with_timeouts(factor, entries, sample_width, fast_timeouts())
    }

    pub fn with_timeouts(
        factor: u64,
        entries: &[Vec<Cid>],
        sample_width: u64,
        timeouts: Timeouts,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let entry_ids: Vec<Cid> = entries
            .iter()
            .map(|pins| store.put(pin_list_text(pins)))
            .collect();
        let ids = entry_ids.iter().map(|c| c.to_string()).collect();
        let contract = Arc::new(MemoryContract::new(factor, ids));
        let cache = Arc::new(LocalPinCache::new(store.clone(), timeouts.list));
        let orchestrator = Arc::new(
            CycleOrchestrator::new(
                contract.clone(),
                store.clone(),
                cache.clone(),
                sample_width,
                timeouts,
            )
            .with_seed(7),
        );
        Self {
            entry_ids,
            contract,
            store,
            cache,
            orchestrator,
        }
    }

    /// Pin `cid` locally and refresh the cache so workers see it.
    pub async fn pin_locally(&self, cid: &Cid) {
        self.store.pin_local(cid, "recursive");
        self.cache.refresh().await.unwrap();
    }
}

/// Short deadlines for tests that exercise timeouts.
pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        contract: Duration::from_millis(500),
        fetch: Duration::from_millis(500),
        list: Duration::from_millis(500),
        query: Duration::from_millis(500),
        pin: Duration::from_millis(500),
    }
}
