//! Per-cycle reports and cumulative reconciliation counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome summary of one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Monotonic cycle identifier.
    pub cycle_id: u64,
    /// Replication factor read at cycle start.
    pub replication_factor: u64,
    /// Directory size read at cycle start.
    pub directory_size: u64,
    /// First sampled index.
    pub offset: u64,
    /// Workers dispatched (one per sampled index).
    pub workers: usize,
    /// Entries whose pin list was resolved.
    pub entries_resolved: u64,
    /// Entries abandoned on a contract, fetch or decode failure.
    pub entries_failed: u64,
    /// Embedded pins looked at.
    pub pins_examined: u64,
    /// Pins added locally.
    pub pins_added: u64,
    /// Pins removed locally.
    pub pins_removed: u64,
    /// Pins skipped because the provider query failed.
    pub query_failures: u64,
    /// Pin add/remove calls that failed.
    pub action_failures: u64,
    /// Wall time from dispatch to last completion (ms).
    pub elapsed_ms: u64,
}

/// Live counters for the cycle in flight.
#[derive(Debug, Default)]
pub(crate) struct CycleTally {
    pub(crate) entries_resolved: AtomicU64,
    pub(crate) entries_failed: AtomicU64,
    pub(crate) pins_examined: AtomicU64,
    pub(crate) pins_added: AtomicU64,
    pub(crate) pins_removed: AtomicU64,
    pub(crate) query_failures: AtomicU64,
    pub(crate) action_failures: AtomicU64,
}

impl CycleTally {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        for c in self.counters() {
            c.store(0, Ordering::Relaxed);
        }
    }

    fn counters(&self) -> [&AtomicU64; 7] {
        [
            &self.entries_resolved,
            &self.entries_failed,
            &self.pins_examined,
            &self.pins_added,
            &self.pins_removed,
            &self.query_failures,
            &self.action_failures,
        ]
    }

    /// Copy the counters into `report`.
    pub(crate) fn fill(&self, report: &mut CycleReport) {
        report.entries_resolved = self.entries_resolved.load(Ordering::Relaxed);
        report.entries_failed = self.entries_failed.load(Ordering::Relaxed);
        report.pins_examined = self.pins_examined.load(Ordering::Relaxed);
        report.pins_added = self.pins_added.load(Ordering::Relaxed);
        report.pins_removed = self.pins_removed.load(Ordering::Relaxed);
        report.query_failures = self.query_failures.load(Ordering::Relaxed);
        report.action_failures = self.action_failures.load(Ordering::Relaxed);
    }
}

/// Cumulative counters since process start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplStatsSnapshot {
    /// Cycles dispatched.
    pub cycles_started: u64,
    /// Cycles whose workers all completed.
    pub cycles_completed: u64,
    /// Triggers ignored because a cycle was in flight.
    pub cycles_skipped: u64,
    /// Triggers that failed reading the contract header.
    pub cycles_aborted: u64,
    /// Pins added across all cycles.
    pub pins_added: u64,
    /// Pins removed across all cycles.
    pub pins_removed: u64,
    /// Entries abandoned across all cycles.
    pub entries_failed: u64,
}

#[derive(Debug, Default)]
pub(crate) struct ReplStats {
    pub(crate) cycles_started: AtomicU64,
    pub(crate) cycles_completed: AtomicU64,
    pub(crate) cycles_skipped: AtomicU64,
    pub(crate) cycles_aborted: AtomicU64,
    pins_added: AtomicU64,
    pins_removed: AtomicU64,
    entries_failed: AtomicU64,
}

impl ReplStats {
    pub(crate) fn absorb(&self, report: &CycleReport) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.pins_added.fetch_add(report.pins_added, Ordering::Relaxed);
        self.pins_removed.fetch_add(report.pins_removed, Ordering::Relaxed);
        self.entries_failed
            .fetch_add(report.entries_failed, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ReplStatsSnapshot {
        ReplStatsSnapshot {
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            cycles_aborted: self.cycles_aborted.load(Ordering::Relaxed),
            pins_added: self.pins_added.load(Ordering::Relaxed),
            pins_removed: self.pins_removed.load(Ordering::Relaxed),
            entries_failed: self.entries_failed.load(Ordering::Relaxed),
        }
    }
}
