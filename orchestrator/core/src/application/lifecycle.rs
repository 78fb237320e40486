// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Swarm Lifecycle Service
//!
//! Sole writer of [`SwarmRecord::status`]. Two entry points feed it:
//!
//! - explicit transitions requested by command handling
//!   ([`SwarmLifecycleService::transition`]), and
//! - status inferred from controller telemetry
//!   ([`SwarmLifecycleService::reconcile_runtime`]), which walks every
//!   intermediate state so a restarted orchestrator can rebuild a
//!   consistent record without tripping illegal transitions.
//!
//! Read-modify-write cycles are serialized per swarm id; different swarms
//! never contend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::errors::ControlPlaneError;
use crate::domain::lifecycle::{SwarmLifecycleStatus, SwarmRecord};
use crate::domain::repository::{RepositoryError, SwarmRepository};

#[async_trait]
pub trait SwarmLifecycleService: Send + Sync {
    /// Register a new swarm in `CREATING`. A `FAILED` swarm may be registered
    /// again; anything else is a conflict.
    async fn register(&self, record: SwarmRecord) -> Result<SwarmRecord, ControlPlaneError>;

    async fn get(&self, swarm_id: &str) -> Result<SwarmRecord, ControlPlaneError>;

    async fn list(&self) -> Result<Vec<SwarmRecord>, ControlPlaneError>;

    /// Apply one explicit legal transition (self-transitions are no-ops).
    async fn transition(
        &self,
        swarm_id: &str,
        target: SwarmLifecycleStatus,
    ) -> Result<SwarmRecord, ControlPlaneError>;

    /// Walk the state machine towards a status reported by the controller.
    /// Unknown swarms are registered first. Reports produced before the
    /// record was registered describe an earlier incarnation and are
    /// ignored. Returns the statuses visited.
    async fn reconcile_runtime(
        &self,
        swarm_id: &str,
        reported: SwarmLifecycleStatus,
        workloads_enabled: Option<bool>,
        reported_at: DateTime<Utc>,
    ) -> Result<Vec<SwarmLifecycleStatus>, ControlPlaneError>;

    /// Record that the controller produced a status event at `seen_at`.
    async fn record_status_seen(
        &self,
        swarm_id: &str,
        seen_at: DateTime<Utc>,
    ) -> Result<(), ControlPlaneError>;

    /// Mark the swarm `FAILED` if nothing was heard from its controller since
    /// `cutoff`. The check and the transition happen under the swarm's lock,
    /// so a status event recorded concurrently wins. Returns whether the
    /// swarm was failed.
    async fn fail_if_silent(&self, swarm_id: &str, cutoff: DateTime<Utc>) -> Result<bool, ControlPlaneError>;

    /// Attach the compute-assigned controller instance id.
    async fn assign_controller(
        &self,
        swarm_id: &str,
        controller_instance: String,
    ) -> Result<(), ControlPlaneError>;

    async fn remove(&self, swarm_id: &str) -> Result<(), ControlPlaneError>;
}

pub struct StandardSwarmLifecycleService {
    repository: Arc<dyn SwarmRepository>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl StandardSwarmLifecycleService {
    pub fn new(repository: Arc<dyn SwarmRepository>) -> Self {
        Self {
            repository,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, swarm_id: &str) -> Arc<Mutex<()>> {
        self.locks.entry(swarm_id.to_string()).or_default().clone()
    }

    async fn load(&self, swarm_id: &str) -> Result<SwarmRecord, ControlPlaneError> {
        self.repository
            .find_by_id(swarm_id)
            .await?
            .ok_or_else(|| ControlPlaneError::NotFound(swarm_id.to_string()))
    }

    fn record_transitions(swarm_id: &str, from: SwarmLifecycleStatus, steps: &[SwarmLifecycleStatus]) {
        let mut previous = from;
        for step in steps {
            info!(swarm_id = %swarm_id, from = %previous, to = %step, "Swarm lifecycle transition");
            metrics::counter!("swarmctl_lifecycle_transitions_total", "to" => step.as_str())
                .increment(1);
            previous = *step;
        }
    }
}

/// Reports that predate an in-flight explicit command. Applying them would
/// walk the swarm around the whole cycle instead of waiting for the
/// controller to catch up.
fn superseded(current: SwarmLifecycleStatus, reported: SwarmLifecycleStatus) -> bool {
    use SwarmLifecycleStatus::*;
    matches!(
        (current, reported),
        (Starting, Ready | Stopped | Creating) | (Stopping, Running | Starting)
    )
}

#[async_trait]
impl SwarmLifecycleService for StandardSwarmLifecycleService {
    async fn register(&self, record: SwarmRecord) -> Result<SwarmRecord, ControlPlaneError> {
        let lock = self.lock_for(&record.swarm_id);
        let _guard = lock.lock().await;

        match self.repository.create(&record).await {
            Ok(()) => {}
            Err(RepositoryError::AlreadyExists(_)) => {
                let existing = self.load(&record.swarm_id).await?;
                if existing.status != SwarmLifecycleStatus::Failed {
                    return Err(ControlPlaneError::Conflict(format!(
                        "swarm {} already exists in {}",
                        record.swarm_id, existing.status
                    )));
                }
                self.repository.save(&record).await?;
            }
            Err(e) => return Err(e.into()),
        }
        info!(swarm_id = %record.swarm_id, "Swarm registered in CREATING");
        Ok(record)
    }

    async fn get(&self, swarm_id: &str) -> Result<SwarmRecord, ControlPlaneError> {
        self.load(swarm_id).await
    }

    async fn list(&self) -> Result<Vec<SwarmRecord>, ControlPlaneError> {
        Ok(self.repository.list_all().await?)
    }

    async fn transition(
        &self,
        swarm_id: &str,
        target: SwarmLifecycleStatus,
    ) -> Result<SwarmRecord, ControlPlaneError> {
        let lock = self.lock_for(swarm_id);
        let _guard = lock.lock().await;

        let mut record = self.load(swarm_id).await?;
        let from = record.status;
        if record.apply(target)? {
            self.repository.save(&record).await?;
            Self::record_transitions(swarm_id, from, &[target]);
        }
        Ok(record)
    }

    async fn reconcile_runtime(
        &self,
        swarm_id: &str,
        reported: SwarmLifecycleStatus,
        workloads_enabled: Option<bool>,
        reported_at: DateTime<Utc>,
    ) -> Result<Vec<SwarmLifecycleStatus>, ControlPlaneError> {
        if reported == SwarmLifecycleStatus::Running && workloads_enabled == Some(false) {
            debug!(swarm_id = %swarm_id, "RUNNING reported with workloads disabled, not inferring");
            return Ok(Vec::new());
        }

        let lock = self.lock_for(swarm_id);
        let _guard = lock.lock().await;

        let mut record = match self.repository.find_by_id(swarm_id).await? {
            Some(record) if reported_at < record.created_at => {
                debug!(
                    swarm_id = %swarm_id,
                    reported = %reported,
                    reported_at = %reported_at,
                    registered_at = %record.created_at,
                    "Ignoring status report older than the swarm record"
                );
                return Ok(Vec::new());
            }
            Some(record) => record,
            None => {
                let record = SwarmRecord::new(swarm_id);
                self.repository.save(&record).await?;
                info!(swarm_id = %swarm_id, "Registered unknown swarm from status telemetry");
                record
            }
        };

        let from = record.status;
        if superseded(from, reported) {
            debug!(swarm_id = %swarm_id, current = %from, reported = %reported, "Ignoring superseded status report");
            return Ok(Vec::new());
        }
        let Some(path) = from.path_to(reported) else {
            debug!(swarm_id = %swarm_id, current = %from, reported = %reported, "Reported status unreachable, not inferring");
            return Ok(Vec::new());
        };
        if path.is_empty() {
            return Ok(path);
        }

        record.walk_to(reported)?;
        self.repository.save(&record).await?;
        Self::record_transitions(swarm_id, from, &path);
        Ok(path)
    }

    async fn record_status_seen(
        &self,
        swarm_id: &str,
        seen_at: DateTime<Utc>,
    ) -> Result<(), ControlPlaneError> {
        let lock = self.lock_for(swarm_id);
        let _guard = lock.lock().await;

        if let Some(mut record) = self.repository.find_by_id(swarm_id).await? {
            if record.last_status_at.map_or(true, |last| last < seen_at) {
                record.last_status_at = Some(seen_at);
                self.repository.save(&record).await?;
            }
        }
        Ok(())
    }

    async fn fail_if_silent(&self, swarm_id: &str, cutoff: DateTime<Utc>) -> Result<bool, ControlPlaneError> {
        let lock = self.lock_for(swarm_id);
        let _guard = lock.lock().await;

        let mut record = self.load(swarm_id).await?;
        let last_heard = record.last_status_at.unwrap_or(record.created_at);
        if record.status == SwarmLifecycleStatus::Failed || last_heard >= cutoff {
            return Ok(false);
        }

        let from = record.status;
        record.apply(SwarmLifecycleStatus::Failed)?;
        self.repository.save(&record).await?;
        Self::record_transitions(swarm_id, from, &[SwarmLifecycleStatus::Failed]);
        Ok(true)
    }

    async fn assign_controller(
        &self,
        swarm_id: &str,
        controller_instance: String,
    ) -> Result<(), ControlPlaneError> {
        let lock = self.lock_for(swarm_id);
        let _guard = lock.lock().await;

        let mut record = self.load(swarm_id).await?;
        record.controller_instance = Some(controller_instance);
        record.updated_at = Utc::now();
        self.repository.save(&record).await?;
        Ok(())
    }

    async fn remove(&self, swarm_id: &str) -> Result<(), ControlPlaneError> {
        {
            let lock = self.lock_for(swarm_id);
            let _guard = lock.lock().await;
            self.repository.delete(swarm_id).await?;
        }
        self.locks.remove(swarm_id);
        info!(swarm_id = %swarm_id, "Swarm removed");
        Ok(())
    }
}
