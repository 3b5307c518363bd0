//! In-process collaborators for tests and dry runs.
//!
//! `MemoryContract` and `MemoryStore` hold the directory, content, pins and
//! provider counts in memory, and can be told to fail specific operations so
//! the reconciliation engine's isolation rules can be exercised without a
//! chain node or an IPFS daemon.

use crate::contract::ContractReader;
use crate::error::{with_deadline, ReplError, Result};
use crate::store::{ContentPath, ContentStore, PinListing};
use async_trait::async_trait;
use bytes::Bytes;
use cid::multihash::Multihash;
use cid::Cid;
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

const SHA2_256: u64 = 0x12;
const RAW_CODEC: u64 = 0x55;

fn sha2_multihash(data: &[u8]) -> Multihash<64> {
    Multihash::wrap(SHA2_256, &Sha256::digest(data)).expect("32-byte digest fits a multihash")
}

/// CIDv0 (dag-pb, base58btc) of the SHA2-256 digest of `data`.
pub fn cid_v0_for(data: &[u8]) -> Cid {
    Cid::new_v0(sha2_multihash(data)).expect("sha2-256 multihash is a valid CIDv0")
}

/// CIDv1 (raw codec) of the SHA2-256 digest of `data`.
pub fn cid_v1_for(data: &[u8]) -> Cid {
    Cid::new_v1(RAW_CODEC, sha2_multihash(data))
}

#[derive(Debug, Default)]
struct ContractState {
    replication_factor: u64,
    entries: Vec<String>,
    failing_indices: HashSet<u64>,
    fail_header: bool,
    header_delay: Option<Duration>,
}

/// In-memory pin directory.
#[derive(Debug, Default)]
pub struct MemoryContract {
    state: RwLock<ContractState>,
    entry_reads: AtomicU64,
}

impl MemoryContract {
    /// Directory with the given factor and entry CIDs.
    pub fn new(replication_factor: u64, entries: Vec<String>) -> Self {
        Self {
            state: RwLock::new(ContractState {
                replication_factor,
                entries,
                ..Default::default()
            }),
            entry_reads: AtomicU64::new(0),
        }
    }

    /// Change the replication factor seen by later reads.
    pub fn set_replication_factor(&self, factor: u64) {
        self.state.write().replication_factor = factor;
    }

    /// Append an entry, returning its index.
    pub fn push_entry(&self, entry: impl Into<String>) -> u64 {
        let mut state = self.state.write();
        state.entries.push(entry.into());
        (state.entries.len() - 1) as u64
    }

    /// Make `directory_entry(index)` fail.
    pub fn fail_index(&self, index: u64) {
        self.state.write().failing_indices.insert(index);
    }

    /// Make the factor and size reads fail (or succeed again).
    pub fn set_header_failure(&self, fail: bool) {
        self.state.write().fail_header = fail;
    }

    /// Delay every replication factor read by `delay`.
    pub fn set_header_delay(&self, delay: Option<Duration>) {
        self.state.write().header_delay = delay;
    }

    /// Number of `directory_entry` calls served so far.
    pub fn entry_reads(&self) -> u64 {
        self.entry_reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ContractReader for MemoryContract {
    async fn replication_factor(&self) -> Result<u64> {
        let delay = self.state.read().header_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.read();
        if state.fail_header {
            return Err(ReplError::ContractRead {
                msg: "replicationFactor unavailable".to_string(),
            });
        }
        Ok(state.replication_factor)
    }

    async fn directory_size(&self) -> Result<u64> {
        let state = self.state.read();
        if state.fail_header {
            return Err(ReplError::ContractRead {
                msg: "pinCount unavailable".to_string(),
            });
        }
        Ok(state.entries.len() as u64)
    }

    async fn directory_entry(&self, index: u64) -> Result<String> {
        self.entry_reads.fetch_add(1, Ordering::Relaxed);
        let state = self.state.read();
        if state.failing_indices.contains(&index) {
            return Err(ReplError::ContractRead {
                msg: format!("pins({}) reverted", index),
            });
        }
        state
            .entries
            .get(index as usize)
            .cloned()
            .ok_or_else(|| ReplError::ContractRead {
                msg: format!("index {} out of range", index),
            })
    }
}

/// A pin action applied to a [`MemoryStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinEvent {
    /// `pin_add` succeeded.
    Added(Cid),
    /// `pin_remove` succeeded.
    Removed(Cid),
}

/// In-memory content store with failure injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    content: RwLock<HashMap<Cid, Bytes>>,
    pins: RwLock<PinListing>,
    providers: RwLock<HashMap<Cid, u64>>,
    failing_fetches: RwLock<HashSet<Cid>>,
    failing_queries: RwLock<HashSet<Cid>>,
    failing_pin_ops: RwLock<HashSet<Cid>>,
    fetch_delay: RwLock<Option<Duration>>,
    fail_listing: AtomicBool,
    events: Mutex<Vec<PinEvent>>,
    query_limits: Mutex<Vec<u64>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` under its CIDv1 and return the identifier.
    pub fn put(&self, data: impl Into<Bytes>) -> Cid {
        let data = data.into();
        let cid = cid_v1_for(&data);
        self.content.write().insert(cid, data);
        cid
    }

    /// Store `data` under an explicit identifier.
    pub fn put_at(&self, cid: Cid, data: impl Into<Bytes>) {
        self.content.write().insert(cid, data.into());
    }

    /// Mark `cid` as locally pinned with the given type.
    pub fn pin_local(&self, cid: &Cid, pin_type: &str) {
        self.pins.write().insert(cid.to_string(), pin_type.to_string());
    }

    /// Set the provider count reported for `cid`.
    pub fn set_providers(&self, cid: &Cid, count: u64) {
        self.providers.write().insert(*cid, count);
    }

    /// Make fetches of `cid` fail.
    pub fn fail_fetch(&self, cid: &Cid) {
        self.failing_fetches.write().insert(*cid);
    }

    /// Make provider queries for `cid` fail.
    pub fn fail_query(&self, cid: &Cid) {
        self.failing_queries.write().insert(*cid);
    }

    /// Make pin add/remove for `cid` fail.
    pub fn fail_pin_op(&self, cid: &Cid) {
        self.failing_pin_ops.write().insert(*cid);
    }

    /// Make the local pin listing fail (or succeed again).
    pub fn set_listing_failure(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::Relaxed);
    }

    /// Delay every fetch by `delay`.
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        *self.fetch_delay.write() = delay;
    }

    /// Remove every local pin.
    pub fn clear_pins(&self) {
        self.pins.write().clear();
    }

    /// True when `cid` is currently pinned.
    pub fn is_pinned(&self, cid: &Cid) -> bool {
        self.pins.read().contains_key(&cid.to_string())
    }

    /// Pin actions applied so far, in completion order.
    pub fn events(&self) -> Vec<PinEvent> {
        self.events.lock().clone()
    }

    /// Limits passed to `provider_count_up_to`, in call order.
    pub fn query_limits(&self) -> Vec<u64> {
        self.query_limits.lock().clone()
    }

    fn check_pin_op(&self, op: &'static str, cid: &Cid) -> Result<()> {
        if self.failing_pin_ops.read().contains(cid) {
            return Err(ReplError::PinOp {
                op,
                cid: cid.to_string(),
                msg: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn fetch(&self, path: &ContentPath, timeout: Duration) -> Result<Bytes> {
        let delay = *self.fetch_delay.read();
        with_deadline("fetch", timeout, async {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing_fetches.read().contains(path.cid()) {
                return Err(ReplError::Fetch {
                    path: path.to_string(),
                    msg: "injected failure".to_string(),
                });
            }
            self.content
                .read()
                .get(path.cid())
                .cloned()
                .ok_or_else(|| ReplError::Fetch {
                    path: path.to_string(),
                    msg: "not found".to_string(),
                })
        })
        .await
    }

    async fn list_local_pins(&self, _timeout: Duration) -> Result<PinListing> {
        if self.fail_listing.load(Ordering::Relaxed) {
            return Err(ReplError::List {
                msg: "injected failure".to_string(),
            });
        }
        Ok(self.pins.read().clone())
    }

    async fn provider_count(&self, cid: &Cid) -> Result<u64> {
        if self.failing_queries.read().contains(cid) {
            return Err(ReplError::Query {
                cid: cid.to_string(),
                msg: "injected failure".to_string(),
            });
        }
        Ok(self.providers.read().get(cid).copied().unwrap_or(0))
    }

    async fn provider_count_up_to(&self, cid: &Cid, limit: u64) -> Result<u64> {
        self.query_limits.lock().push(limit);
        Ok(self.provider_count(cid).await?.min(limit))
    }

    async fn pin_add(&self, cid: &Cid) -> Result<()> {
        self.check_pin_op("pin add", cid)?;
        self.pins
            .write()
            .insert(cid.to_string(), "recursive".to_string());
        self.events.lock().push(PinEvent::Added(*cid));
        Ok(())
    }

    async fn pin_remove(&self, cid: &Cid) -> Result<()> {
        self.check_pin_op("pin remove", cid)?;
        self.pins.write().remove(&cid.to_string());
        self.events.lock().push(PinEvent::Removed(*cid));
        Ok(())
    }
}
