//! Reconciliation cycle orchestration.
//!
//! A cycle reads the replication factor and directory size from the
//! contract, samples a circular window of directory indices, and spawns one
//! worker per index. Each worker resolves its entry's pin list and applies the
//! hysteresis policy to every embedded pin. At most one cycle is in flight:
//! the trigger arms the state with a compare-and-swap, and the last worker to
//! finish clears it.

use crate::config::Timeouts;
use crate::contract::ContractReader;
use crate::decision::{ReplicationAction, ReplicationBand};
use crate::error::{with_deadline, Result};
use crate::pin_cache::LocalPinCache;
use crate::resolver::PinListResolver;
use crate::sample::SampleWindow;
use crate::stats::{CycleReport, CycleTally, ReplStats, ReplStatsSnapshot};
use crate::store::ContentStore;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Parameters fixed when a cycle is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTicket {
    /// Monotonic cycle identifier.
    pub cycle_id: u64,
    /// Replication factor every worker of this cycle uses.
    pub replication_factor: u64,
    /// Indices sampled for this cycle.
    pub window: SampleWindow,
}

#[derive(Debug)]
struct ActiveCycle {
    ticket: CycleTicket,
    started: Instant,
}

/// In-flight flag and completion accounting shared by a cycle's workers.
#[derive(Debug, Default)]
pub struct CycleState {
    running: AtomicBool,
    expected: AtomicUsize,
    completed: AtomicUsize,
    next_cycle_id: AtomicU64,
    active: Mutex<Option<ActiveCycle>>,
    last_report: Mutex<Option<CycleReport>>,
    tally: CycleTally,
    totals: ReplStats,
    idle: Notify,
}

impl CycleState {
    /// True while a cycle is in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Workers of the current (or last) cycle that have signalled completion.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    /// Workers dispatched for the current (or last) cycle.
    pub fn expected(&self) -> usize {
        self.expected.load(Ordering::Acquire)
    }

    /// Wait until no cycle is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }

    fn try_begin(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn arm(&self, replication_factor: u64, window: SampleWindow) -> CycleTicket {
        let ticket = CycleTicket {
            cycle_id: self.next_cycle_id.fetch_add(1, Ordering::Relaxed) + 1,
            replication_factor,
            window,
        };
        self.tally.reset();
        self.completed.store(0, Ordering::Release);
        self.expected.store(window.len(), Ordering::Release);
        *self.active.lock() = Some(ActiveCycle {
            ticket,
            started: Instant::now(),
        });
        self.totals.cycles_started.fetch_add(1, Ordering::Relaxed);
        ticket
    }

    fn abort(&self) {
        self.totals.cycles_aborted.fetch_add(1, Ordering::Relaxed);
        self.running.store(false, Ordering::Release);
        self.idle.notify_waiters();
    }

    fn complete_one(&self) {
        let done = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        if done == self.expected.load(Ordering::Acquire) {
            self.finish();
        }
    }

    fn finish(&self) {
        let mut report = CycleReport::default();
        if let Some(active) = self.active.lock().take() {
            report.cycle_id = active.ticket.cycle_id;
            report.replication_factor = active.ticket.replication_factor;
            report.directory_size = active.ticket.window.directory_size();
            report.offset = active.ticket.window.offset();
            report.workers = active.ticket.window.len();
            report.elapsed_ms = active.started.elapsed().as_millis() as u64;
        }
        self.tally.fill(&mut report);
        self.totals.absorb(&report);
        info!(
            cycle_id = report.cycle_id,
            workers = report.workers,
            entries_resolved = report.entries_resolved,
            entries_failed = report.entries_failed,
            pins_examined = report.pins_examined,
            pins_added = report.pins_added,
            pins_removed = report.pins_removed,
            elapsed_ms = report.elapsed_ms,
            "replication cycle complete"
        );
        *self.last_report.lock() = Some(report);
        self.running.store(false, Ordering::Release);
        self.idle.notify_waiters();
    }
}

/// Signals one worker's completion when dropped, so early returns and
/// panics are counted exactly once.
struct CompletionGuard {
    state: Arc<CycleState>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.state.complete_one();
    }
}

/// Holds a claimed in-flight flag until the cycle is armed. Dropping it
/// before then (a header read error, or the trigger future being cancelled)
/// returns the state to idle.
struct ClaimGuard<'a> {
    state: &'a CycleState,
    handed_off: bool,
}

impl ClaimGuard<'_> {
    fn hand_off(mut self) {
        self.handed_off = true;
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if !self.handed_off {
            self.state.abort();
        }
    }
}

struct WorkerShared {
    contract: Arc<dyn ContractReader>,
    store: Arc<dyn ContentStore>,
    pin_cache: Arc<LocalPinCache>,
    resolver: PinListResolver,
    state: Arc<CycleState>,
    timeouts: Timeouts,
}

/// Drives reconciliation cycles.
pub struct CycleOrchestrator {
    shared: Arc<WorkerShared>,
    rng: Mutex<StdRng>,
    sample_width: u64,
}

impl CycleOrchestrator {
    /// Create an orchestrator sampling `sample_width` indices per cycle.
    ///
    /// The sampling RNG is seeded once from OS entropy.
    pub fn new(
        contract: Arc<dyn ContractReader>,
        store: Arc<dyn ContentStore>,
        pin_cache: Arc<LocalPinCache>,
        sample_width: u64,
        timeouts: Timeouts,
    ) -> Self {
        let resolver = PinListResolver::new(store.clone(), timeouts.fetch);
        Self {
            shared: Arc::new(WorkerShared {
                contract,
                store,
                pin_cache,
                resolver,
                state: Arc::new(CycleState::default()),
                timeouts,
            }),
            rng: Mutex::new(StdRng::from_entropy()),
            sample_width,
        }
    }

    /// Replace the sampling RNG with one seeded from `seed`.
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    /// Shared cycle state.
    pub fn state(&self) -> &Arc<CycleState> {
        &self.shared.state
    }

    /// The pin cache workers consult.
    pub fn pin_cache(&self) -> &Arc<LocalPinCache> {
        &self.shared.pin_cache
    }

    /// Report of the most recently completed cycle.
    pub fn last_report(&self) -> Option<CycleReport> {
        self.shared.state.last_report.lock().clone()
    }

    /// Cumulative counters.
    pub fn stats(&self) -> ReplStatsSnapshot {
        self.shared.state.totals.snapshot()
    }

    /// Wait until the in-flight cycle, if any, has completed.
    pub async fn wait_idle(&self) {
        self.shared.state.wait_idle().await
    }

    /// Start a cycle unless one is already in flight.
    ///
    /// Returns `Ok(None)` when a cycle is running, `Ok(Some(ticket))` once
    /// workers are dispatched (without waiting for them), and an error if the
    /// contract header could not be read, in which case the state is idle
    /// again. Dropping the future while the header is being read also
    /// leaves the state idle.
    pub async fn trigger(&self) -> Result<Option<CycleTicket>> {
        let state = &self.shared.state;
        if !state.try_begin() {
            state.totals.cycles_skipped.fetch_add(1, Ordering::Relaxed);
            debug!("replication cycle still in flight, skipping trigger");
            return Ok(None);
        }

        let claim = ClaimGuard {
            state: state.as_ref(),
            handed_off: false,
        };
        let (factor, size) = match self.read_header().await {
            Ok(header) => header,
            Err(e) => {
                warn!(error = %e, "contract connection error, cycle not started");
                return Err(e);
            }
        };

        let window = SampleWindow::random(&mut *self.rng.lock(), self.sample_width, size);
        let ticket = state.arm(factor, window);
        claim.hand_off();
        info!(
            cycle_id = ticket.cycle_id,
            replication_factor = factor,
            directory_size = size,
            offset = window.offset(),
            workers = window.len(),
            "starting replication cycle"
        );

        if window.is_empty() {
            state.finish();
            return Ok(Some(ticket));
        }

        for index in window.indices() {
            let guard = CompletionGuard {
                state: state.clone(),
            };
            let shared = self.shared.clone();
            tokio::spawn(async move {
                let _guard = guard;
                run_worker(&shared, index, factor).await;
            });
        }
        Ok(Some(ticket))
    }

    /// Trigger a cycle and wait for it to finish.
    ///
    /// Returns the cycle's report, or `None` if another cycle was in flight.
    pub async fn run_once(&self) -> Result<Option<CycleReport>> {
        match self.trigger().await? {
            Some(_) => {
                self.wait_idle().await;
                Ok(self.last_report())
            }
            None => Ok(None),
        }
    }

    async fn read_header(&self) -> Result<(u64, u64)> {
        let timeout = self.shared.timeouts.contract;
        let contract = &self.shared.contract;
        let factor = with_deadline(
            "replication factor read",
            timeout,
            contract.replication_factor(),
        )
        .await?;
        let size = with_deadline("directory size read", timeout, contract.directory_size()).await?;
        Ok((factor, size))
    }
}

async fn run_worker(shared: &WorkerShared, index: u64, factor: u64) {
    let tally = &shared.state.tally;

    let entry = match with_deadline(
        "directory entry read",
        shared.timeouts.contract,
        shared.contract.directory_entry(index),
    )
    .await
    {
        Ok(entry) => entry,
        Err(e) => {
            CycleTally::bump(&tally.entries_failed);
            debug!(index, error = %e, "contract pin read failed");
            return;
        }
    };

    let pins = match shared.resolver.resolve(&entry).await {
        Ok(pins) => pins,
        Err(e) => {
            CycleTally::bump(&tally.entries_failed);
            debug!(index, entry = %entry, error = %e, "pin list retrieval failed");
            return;
        }
    };
    CycleTally::bump(&tally.entries_resolved);

    let band = ReplicationBand::for_factor(factor);
    for pin in pins {
        CycleTally::bump(&tally.pins_examined);
        let pinned = shared.pin_cache.lookup(&pin);
        debug!(index, cid = %pin, pinned, "pin request detail");

        let providers = match with_deadline(
            "provider query",
            shared.timeouts.query,
            shared.store.provider_count_up_to(&pin, band.upper.saturating_add(1)),
        )
        .await
        {
            Ok(n) => n,
            Err(e) => {
                CycleTally::bump(&tally.query_failures);
                debug!(cid = %pin, error = %e, "provider search error");
                continue;
            }
        };

        match band.decide(pinned, providers) {
            ReplicationAction::None => {}
            ReplicationAction::Add => {
                match with_deadline("pin add", shared.timeouts.pin, shared.store.pin_add(&pin)).await {
                    Ok(()) => {
                        CycleTally::bump(&tally.pins_added);
                        info!(cid = %pin, providers, replication_factor = factor, "pin added");
                    }
                    Err(e) => {
                        CycleTally::bump(&tally.action_failures);
                        debug!(cid = %pin, error = %e, "pin add error");
                    }
                }
            }
            ReplicationAction::Remove => {
                match with_deadline("pin remove", shared.timeouts.pin, shared.store.pin_remove(&pin))
                    .await
                {
                    Ok(()) => {
                        CycleTally::bump(&tally.pins_removed);
                        info!(cid = %pin, providers, replication_factor = factor, "pin removed");
                    }
                    Err(e) => {
                        CycleTally::bump(&tally.action_failures);
                        debug!(cid = %pin, error = %e, "pin removal error");
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for CycleOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleOrchestrator")
            .field("sample_width", &self.sample_width)
            .field("running", &self.shared.state.is_running())
            .finish()
    }
}
