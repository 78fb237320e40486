// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Staleness Sweeper - Background task failing silent swarms
//!
//! Periodically marks swarms `FAILED` when their controller has produced no
//! status event inside the staleness window. The same cycle expires
//! idempotency records, removed-swarm markers and suppressed journal counts
//! past the idempotency TTL, and compacts the journal limiter.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Detect controllers that stopped reporting

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::lifecycle::SwarmLifecycleService;
use crate::application::status_reconciler::StatusReconciler;
use crate::domain::errors::ControlPlaneError;
use crate::domain::lifecycle::SwarmLifecycleStatus;
use crate::domain::repository::IdempotencyStore;
use crate::infrastructure::journal::ControlPlaneJournal;

#[derive(Debug, Clone)]
pub struct StalenessSweeperConfig {
    /// Maximum silence before a swarm is failed
    pub staleness_window: Duration,
    /// How often to run a sweep
    pub interval: Duration,
    /// Age after which idempotency records are forgotten
    pub idempotency_ttl: Duration,
}

impl Default for StalenessSweeperConfig {
    fn default() -> Self {
        Self {
            staleness_window: Duration::from_secs(30),
            interval: Duration::from_secs(5),
            idempotency_ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub marked_failed: Vec<String>,
    pub expired_idempotency_records: usize,
    pub expired_removed_swarms: usize,
    pub expired_journal_keys: usize,
}

pub struct StalenessSweeper {
    lifecycle: Arc<dyn SwarmLifecycleService>,
    idempotency: Arc<dyn IdempotencyStore>,
    reconciler: Arc<StatusReconciler>,
    journal: Arc<ControlPlaneJournal>,
    config: StalenessSweeperConfig,
    shutdown_token: CancellationToken,
}

impl StalenessSweeper {
    pub fn new(
        lifecycle: Arc<dyn SwarmLifecycleService>,
        idempotency: Arc<dyn IdempotencyStore>,
        reconciler: Arc<StatusReconciler>,
        journal: Arc<ControlPlaneJournal>,
        config: StalenessSweeperConfig,
    ) -> Self {
        Self {
            lifecycle,
            idempotency,
            reconciler,
            journal,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            staleness_ms = self.config.staleness_window.as_millis() as u64,
            "Starting staleness sweeper"
        );

        let mut tick = interval(self.config.interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match self.sweep(Utc::now()).await {
                        Ok(report) if !report.marked_failed.is_empty() => {
                            info!(swarms = ?report.marked_failed, "Marked silent swarms FAILED");
                        }
                        Ok(report) => {
                            debug!(expired = report.expired_idempotency_records, "Staleness sweep completed");
                        }
                        Err(e) => {
                            warn!("Staleness sweep failed: {}", e);
                        }
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping staleness sweeper");
                    break;
                }
            }
        }
    }

    /// Run one sweep as of `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, ControlPlaneError> {
        let window = chrono::Duration::from_std(self.config.staleness_window)
            .unwrap_or(chrono::Duration::MAX);
        let mut report = SweepReport::default();

        if let Some(cutoff) = now.checked_sub_signed(window) {
            for record in self.lifecycle.list().await? {
                if record.status == SwarmLifecycleStatus::Failed {
                    continue;
                }
                let last_heard = record.last_status_at.unwrap_or(record.created_at);
                if last_heard >= cutoff {
                    continue;
                }

                // The listing may be out of date; the lifecycle re-checks under the lock.
                match self.lifecycle.fail_if_silent(&record.swarm_id, cutoff).await {
                    Ok(true) => {
                        warn!(
                            swarm_id = %record.swarm_id,
                            last_heard = %last_heard,
                            "No status from controller inside the staleness window"
                        );
                        metrics::counter!("swarmctl_swarms_marked_stale_total").increment(1);
                        report.marked_failed.push(record.swarm_id);
                    }
                    Ok(false) => {
                        debug!(swarm_id = %record.swarm_id, "Swarm reported during the sweep, keeping it");
                    }
                    // Removed between list and transition.
                    Err(ControlPlaneError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        let ttl = chrono::Duration::from_std(self.config.idempotency_ttl)
            .unwrap_or(chrono::Duration::MAX);
        if let Some(cutoff) = now.checked_sub_signed(ttl) {
            report.expired_idempotency_records = self.idempotency.purge_older_than(cutoff).await?;
            report.expired_removed_swarms = self.reconciler.purge_removed_before(cutoff);
            report.expired_journal_keys = self.journal.purge_suppressed_before(cutoff);
        }
        self.journal.compact();

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::lifecycle::StandardSwarmLifecycleService;
    use crate::application::status_reconciler::StatusRequester;
    use crate::domain::journal::{DropKey, DropReason};
    use crate::domain::lifecycle::SwarmRecord;
    use crate::domain::repository::IdempotencyKey;
    use crate::domain::scope::ControlScope;
    use crate::domain::signal::SignalType;
    use crate::infrastructure::idempotency::InMemoryIdempotencyStore;
    use crate::infrastructure::repositories::InMemorySwarmRepository;
    use async_trait::async_trait;

    struct NoResync;

    #[async_trait]
    impl StatusRequester for NoResync {
        async fn request_status(&self, swarm_id: &str) -> Result<String, ControlPlaneError> {
            Ok(format!("resync-{}", swarm_id))
        }
    }

    /// Lifecycle whose listing is a snapshot taken before later status events.
    struct SnapshotListing {
        inner: Arc<StandardSwarmLifecycleService>,
        snapshot: Vec<SwarmRecord>,
    }

    #[async_trait]
    impl SwarmLifecycleService for SnapshotListing {
        async fn register(&self, record: SwarmRecord) -> Result<SwarmRecord, ControlPlaneError> {
            self.inner.register(record).await
        }

        async fn get(&self, swarm_id: &str) -> Result<SwarmRecord, ControlPlaneError> {
            self.inner.get(swarm_id).await
        }

        async fn list(&self) -> Result<Vec<SwarmRecord>, ControlPlaneError> {
            Ok(self.snapshot.clone())
        }

        async fn transition(
            &self,
            swarm_id: &str,
            target: SwarmLifecycleStatus,
        ) -> Result<SwarmRecord, ControlPlaneError> {
            self.inner.transition(swarm_id, target).await
        }

        async fn reconcile_runtime(
            &self,
            swarm_id: &str,
            reported: SwarmLifecycleStatus,
            workloads_enabled: Option<bool>,
            reported_at: DateTime<Utc>,
        ) -> Result<Vec<SwarmLifecycleStatus>, ControlPlaneError> {
            self.inner
                .reconcile_runtime(swarm_id, reported, workloads_enabled, reported_at)
                .await
        }

        async fn record_status_seen(
            &self,
            swarm_id: &str,
            seen_at: DateTime<Utc>,
        ) -> Result<(), ControlPlaneError> {
            self.inner.record_status_seen(swarm_id, seen_at).await
        }

        async fn fail_if_silent(&self, swarm_id: &str, cutoff: DateTime<Utc>) -> Result<bool, ControlPlaneError> {
            self.inner.fail_if_silent(swarm_id, cutoff).await
        }

        async fn assign_controller(
            &self,
            swarm_id: &str,
            controller_instance: String,
        ) -> Result<(), ControlPlaneError> {
            self.inner.assign_controller(swarm_id, controller_instance).await
        }

        async fn remove(&self, swarm_id: &str) -> Result<(), ControlPlaneError> {
            self.inner.remove(swarm_id).await
        }
    }

    struct Fixture {
        sweeper: StalenessSweeper,
        lifecycle: Arc<StandardSwarmLifecycleService>,
        idempotency: Arc<InMemoryIdempotencyStore>,
        reconciler: Arc<StatusReconciler>,
        journal: Arc<ControlPlaneJournal>,
    }

    fn sweeper_over(
        lifecycle: Arc<StandardSwarmLifecycleService>,
        listing: Arc<dyn SwarmLifecycleService>,
    ) -> Fixture {
        let idempotency = Arc::new(InMemoryIdempotencyStore::new());
        let journal = Arc::new(ControlPlaneJournal::tracing(
            Duration::from_secs(5),
            Duration::from_secs(30),
        ));
        let reconciler = Arc::new(StatusReconciler::new(
            lifecycle.clone(),
            Arc::new(NoResync),
            journal.clone(),
        ));
        let sweeper = StalenessSweeper::new(
            listing,
            idempotency.clone(),
            reconciler.clone(),
            journal.clone(),
            StalenessSweeperConfig::default(),
        );
        Fixture {
            sweeper,
            lifecycle,
            idempotency,
            reconciler,
            journal,
        }
    }

    fn sweeper() -> Fixture {
        let lifecycle = Arc::new(StandardSwarmLifecycleService::new(Arc::new(
            InMemorySwarmRepository::new(),
        )));
        sweeper_over(lifecycle.clone(), lifecycle)
    }

    #[tokio::test]
    async fn test_silent_swarm_is_failed() {
        let Fixture { sweeper, lifecycle, .. } = sweeper();
        lifecycle.register(SwarmRecord::new("quiet")).await.unwrap();
        lifecycle.register(SwarmRecord::new("chatty")).await.unwrap();

        let now = Utc::now() + chrono::Duration::seconds(60);
        lifecycle.record_status_seen("chatty", now).await.unwrap();

        let report = sweeper.sweep(now).await.unwrap();
        assert_eq!(report.marked_failed, vec!["quiet".to_string()]);
        assert_eq!(
            lifecycle.get("quiet").await.unwrap().status,
            SwarmLifecycleStatus::Failed
        );
        assert_eq!(
            lifecycle.get("chatty").await.unwrap().status,
            SwarmLifecycleStatus::Creating
        );

        // Already failed swarms are left alone on the next pass.
        let again = sweeper.sweep(now).await.unwrap();
        assert!(again.marked_failed.is_empty());
    }

    #[tokio::test]
    async fn test_status_seen_after_listing_keeps_swarm_alive() {
        let lifecycle = Arc::new(StandardSwarmLifecycleService::new(Arc::new(
            InMemorySwarmRepository::new(),
        )));
        lifecycle.register(SwarmRecord::new("sw1")).await.unwrap();
        let listing = Arc::new(SnapshotListing {
            inner: lifecycle.clone(),
            snapshot: lifecycle.list().await.unwrap(),
        });
        let Fixture { sweeper, .. } = sweeper_over(lifecycle.clone(), listing);

        // Status arrives after the listing was taken but before the sweep acts on it.
        let now = Utc::now() + chrono::Duration::seconds(60);
        lifecycle.record_status_seen("sw1", now).await.unwrap();

        let report = sweeper.sweep(now).await.unwrap();
        assert!(report.marked_failed.is_empty());
        assert_eq!(
            lifecycle.get("sw1").await.unwrap().status,
            SwarmLifecycleStatus::Creating
        );
    }

    #[tokio::test]
    async fn test_expired_idempotency_records_are_purged() {
        let Fixture { sweeper, idempotency, .. } = sweeper();
        let key = IdempotencyKey::new(
            ControlScope::controller("sw1").unwrap(),
            SignalType::SwarmStart,
            "idem-1",
        );
        idempotency.reserve(&key, "corr-1").await.unwrap();

        let report = sweeper.sweep(Utc::now()).await.unwrap();
        assert_eq!(report.expired_idempotency_records, 0);

        let later = Utc::now() + chrono::Duration::hours(2);
        let report = sweeper.sweep(later).await.unwrap();
        assert_eq!(report.expired_idempotency_records, 1);
        assert!(idempotency.is_empty());
    }

    #[tokio::test]
    async fn test_removed_markers_and_suppressed_counts_expire() {
        let Fixture {
            sweeper,
            reconciler,
            journal,
            ..
        } = sweeper();
        reconciler.forget("gone");
        let key = DropKey::new(
            "gone",
            "status-delta",
            "event.metric.status-delta.gone.swarm-controller.ctrl-1",
            DropReason::RemovedSwarm,
        );
        journal.record_drop(key.clone(), "late");
        journal.record_drop(key.clone(), "late");
        assert_eq!(journal.pending_suppressed(&key), 1);

        let report = sweeper.sweep(Utc::now()).await.unwrap();
        assert_eq!(report.expired_removed_swarms, 0);
        assert_eq!(report.expired_journal_keys, 0);

        let later = Utc::now() + chrono::Duration::hours(2);
        let report = sweeper.sweep(later).await.unwrap();
        assert_eq!(report.expired_removed_swarms, 1);
        assert_eq!(report.expired_journal_keys, 1);
        assert_eq!(journal.pending_suppressed(&key), 0);
        assert_eq!(reconciler.purge_removed_before(later), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let Fixture { sweeper, .. } = sweeper();
        let sweeper = Arc::new(sweeper);
        let token = sweeper.shutdown_token();
        let handle = sweeper.start();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
