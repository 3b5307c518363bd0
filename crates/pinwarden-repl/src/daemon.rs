//! Timer-driven replication daemon.
//!
//! Triggers a reconciliation cycle every `cycle_interval_secs` and refreshes
//! the local pin cache every `pin_refresh_interval_secs` until told to stop.

use crate::config::ReplConfig;
use crate::contract::ContractReader;
use crate::cycle::CycleOrchestrator;
use crate::pin_cache::LocalPinCache;
use crate::store::ContentStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Owns the orchestrator and pin cache and runs them on timers.
pub struct ReplicationDaemon {
    orchestrator: Arc<CycleOrchestrator>,
    pin_cache: Arc<LocalPinCache>,
    cycle_interval: Duration,
    refresh_interval: Duration,
    shutdown_grace: Duration,
}

impl ReplicationDaemon {
    /// Build a daemon from configuration and collaborators.
    pub fn new(
        config: &ReplConfig,
        contract: Arc<dyn ContractReader>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        let timeouts = config.timeouts();
        let pin_cache = Arc::new(LocalPinCache::new(store.clone(), timeouts.list));
        let orchestrator = Arc::new(CycleOrchestrator::new(
            contract,
            store,
            pin_cache.clone(),
            config.sample_width,
            timeouts,
        ));
        Self::from_parts(orchestrator, config)
    }

    /// Build a daemon around an existing orchestrator.
    pub fn from_parts(orchestrator: Arc<CycleOrchestrator>, config: &ReplConfig) -> Self {
        Self {
            pin_cache: orchestrator.pin_cache().clone(),
            orchestrator,
            cycle_interval: Duration::from_secs(config.cycle_interval_secs),
            refresh_interval: Duration::from_secs(config.pin_refresh_interval_secs),
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
        }
    }

    /// The orchestrator driven by this daemon.
    pub fn orchestrator(&self) -> &Arc<CycleOrchestrator> {
        &self.orchestrator
    }

    /// Refresh the pin cache once and run a single cycle to completion.
    pub async fn run_single(&self) -> crate::error::Result<()> {
        if let Err(e) = self.pin_cache.refresh().await {
            warn!(error = %e, "initial pin mapping failed, continuing with empty cache");
        }
        self.orchestrator.run_once().await?;
        Ok(())
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            cycle_interval_secs = self.cycle_interval.as_secs(),
            refresh_interval_secs = self.refresh_interval.as_secs(),
            "replication daemon starting"
        );

        if let Err(e) = self.pin_cache.refresh().await {
            warn!(error = %e, "initial pin mapping failed, continuing with empty cache");
        }

        let mut cycle_tick = tokio::time::interval(self.cycle_interval);
        cycle_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let first_refresh = tokio::time::Instant::now() + self.refresh_interval;
        let mut refresh_tick = tokio::time::interval_at(first_refresh, self.refresh_interval);
        refresh_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cycle_tick.tick() => {
                    // header reads run off the loop so shutdown stays responsive
                    let orchestrator = self.orchestrator.clone();
                    tokio::spawn(async move {
                        match orchestrator.trigger().await {
                            Ok(Some(ticket)) => debug!(cycle_id = ticket.cycle_id, "cycle dispatched"),
                            Ok(None) => {}
                            Err(e) => debug!(error = %e, "cycle trigger failed"),
                        }
                    });
                }
                _ = refresh_tick.tick() => {
                    let cache = self.pin_cache.clone();
                    tokio::spawn(async move {
                        let _ = cache.refresh().await;
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("replication daemon stopping, draining in-flight cycle");
        if tokio::time::timeout(self.shutdown_grace, self.orchestrator.wait_idle())
            .await
            .is_err()
        {
            warn!(
                grace_secs = self.shutdown_grace.as_secs(),
                "in-flight cycle did not drain before shutdown"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{cid_v0_for, MemoryContract, MemoryStore};

    fn setup(entries: usize) -> (Arc<MemoryContract>, Arc<MemoryStore>, ReplConfig) {
        let store = Arc::new(MemoryStore::new());
        let mut ids = Vec::new();
        for i in 0..entries {
            let pin = cid_v0_for(format!("daemon-{}", i).as_bytes());
            ids.push(store.put(pin.to_string()).to_string());
        }
        store.pin_local(&cid_v0_for(b"already-local"), "recursive");
        let contract = Arc::new(MemoryContract::new(10, ids));
        let config = ReplConfig {
            sample_width: 2,
            cycle_interval_secs: 60,
            pin_refresh_interval_secs: 120,
            ..Default::default()
        };
        (contract, store, config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_daemon_runs_cycles_until_shutdown() {
        let (contract, store, config) = setup(4);
        let daemon = Arc::new(ReplicationDaemon::new(&config, contract, store.clone()));
        let (tx, rx) = watch::channel(false);

        let runner = {
            let daemon = daemon.clone();
            tokio::spawn(async move { daemon.run(rx).await })
        };

        tokio::time::sleep(Duration::from_secs(150)).await;
        tx.send(true).unwrap();
        runner.await.unwrap();

        let stats = daemon.orchestrator().stats();
        assert!(stats.cycles_started >= 3, "started {}", stats.cycles_started);
        assert_eq!(stats.cycles_started, stats.cycles_completed);
        assert!(!daemon.orchestrator().state().is_running());
        assert!(daemon.pin_cache.stats().refreshes >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_not_blocked_by_slow_header_read() {
        let (contract, store, mut config) = setup(2);
        config.shutdown_grace_secs = 1;
        contract.set_header_delay(Some(Duration::from_secs(600)));
        let daemon = Arc::new(ReplicationDaemon::new(&config, contract, store));
        let (tx, rx) = watch::channel(false);

        let started = tokio::time::Instant::now();
        let runner = {
            let daemon = daemon.clone();
            tokio::spawn(async move { daemon.run(rx).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(daemon.orchestrator().state().is_running());

        tx.send(true).unwrap();
        runner.await.unwrap();
        // the header read is bounded by contract_timeout_ms (15s); shutdown
        // only waits for the 1s grace
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sender_stops_daemon() {
        let (contract, store, config) = setup(1);
        let daemon = ReplicationDaemon::new(&config, contract, store);
        let (tx, rx) = watch::channel(false);
        drop(tx);
        daemon.run(rx).await;
        assert!(!daemon.orchestrator().state().is_running());
    }

    #[tokio::test]
    async fn test_run_single() {
        let (contract, store, config) = setup(2);
        let daemon = ReplicationDaemon::new(&config, contract, store.clone());
        daemon.run_single().await.unwrap();
        let report = daemon.orchestrator().last_report().unwrap();
        assert_eq!(report.workers, 2);
        assert_eq!(report.pins_added, 2);
        assert_eq!(daemon.pin_cache.len(), 1);
    }

    #[tokio::test]
    async fn test_run_single_reports_header_failure() {
        let (contract, store, config) = setup(2);
        contract.set_header_failure(true);
        let daemon = ReplicationDaemon::new(&config, contract, store);
        assert!(daemon.run_single().await.is_err());
    }
}
