// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Status Reconciler
//!
//! Folds controller status events into a cached per-swarm [`StatusView`] and
//! drives inferred lifecycle transitions from it.
//!
//! | Event | Cached baseline | Action |
//! |-------|-----------------|--------|
//! | status-full | any | replace baseline wholesale, infer lifecycle |
//! | status-delta | absent | drop, publish one `status-request` (resync) |
//! | status-delta with full-only fields | any | drop and journal |
//! | status-delta with stale sequence | present | drop and journal |
//! | status-delta | present | merge declared fields, infer lifecycle |
//!
//! The cache is a `DashMap` keyed by swarm id. Guards are released before
//! any await so a slow lifecycle write for one swarm never blocks another.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::application::dispatcher::CommandDispatcher;
use crate::application::lifecycle::SwarmLifecycleService;
use crate::domain::errors::ControlPlaneError;
use crate::domain::journal::{DropKey, DropReason};
use crate::domain::lifecycle::SwarmLifecycleStatus;
use crate::domain::status::{IoHealth, StatusEvent, StatusKind};
use crate::infrastructure::journal::ControlPlaneJournal;

/// Issues a resync request to a swarm's controller.
#[async_trait]
pub trait StatusRequester: Send + Sync {
    async fn request_status(&self, swarm_id: &str) -> Result<String, ControlPlaneError>;
}

#[async_trait]
impl StatusRequester for CommandDispatcher {
    async fn request_status(&self, swarm_id: &str) -> Result<String, ControlPlaneError> {
        CommandDispatcher::request_status(self, swarm_id).await
    }
}

/// Orchestrator's cached projection of one swarm's runtime.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub swarm_id: String,
    /// Data of the last status-full with every later delta merged in.
    pub baseline: Option<Map<String, Value>>,
    pub last_applied_delta_seq: Option<u64>,
    pub swarm_status: Option<SwarmLifecycleStatus>,
    pub enabled: Option<bool>,
    pub workloads_enabled: Option<bool>,
    pub io_state: BTreeMap<String, IoHealth>,
    pub processed_totals: Option<Value>,
    pub last_seen: DateTime<Utc>,
}

impl StatusView {
    fn empty(swarm_id: &str) -> Self {
        Self {
            swarm_id: swarm_id.to_string(),
            baseline: None,
            last_applied_delta_seq: None,
            swarm_status: None,
            enabled: None,
            workloads_enabled: None,
            io_state: BTreeMap::new(),
            processed_totals: None,
            last_seen: Utc::now(),
        }
    }

    /// Copy the derived fields out of the (merged) baseline.
    fn refresh_derived(&mut self, event: &StatusEvent) -> Result<(), ControlPlaneError> {
        let Some(baseline) = &self.baseline else {
            return Ok(());
        };
        let merged = StatusEvent {
            data: baseline.clone(),
            ..event.clone()
        };
        self.swarm_status = merged.swarm_status()?;
        self.enabled = merged.enabled();
        self.workloads_enabled = merged.workloads_enabled();
        self.io_state = merged.io_state();
        self.processed_totals = baseline.get("processedTotals").cloned();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    BaselineReplaced {
        transitions: Vec<SwarmLifecycleStatus>,
    },
    DeltaApplied {
        transitions: Vec<SwarmLifecycleStatus>,
    },
    ResyncRequested {
        correlation_id: String,
    },
    Dropped(DropReason),
}

pub struct StatusReconciler {
    views: DashMap<String, StatusView>,
    /// Swarms removed by a confirmed `swarm-remove`; late events are ignored
    /// until the swarm is created again.
    removed: DashMap<String, DateTime<Utc>>,
    lifecycle: Arc<dyn SwarmLifecycleService>,
    requester: Arc<dyn StatusRequester>,
    journal: Arc<ControlPlaneJournal>,
}

impl StatusReconciler {
    pub fn new(
        lifecycle: Arc<dyn SwarmLifecycleService>,
        requester: Arc<dyn StatusRequester>,
        journal: Arc<ControlPlaneJournal>,
    ) -> Self {
        Self {
            views: DashMap::new(),
            removed: DashMap::new(),
            lifecycle,
            requester,
            journal,
        }
    }

    pub fn view(&self, swarm_id: &str) -> Option<StatusView> {
        self.views.get(swarm_id).map(|v| v.clone())
    }

    /// Drop the cached view of a removed swarm.
    pub fn forget(&self, swarm_id: &str) {
        self.views.remove(swarm_id);
        self.removed.insert(swarm_id.to_string(), Utc::now());
    }

    /// Stop remembering swarms removed before `cutoff`. Returns how many
    /// entries were dropped.
    pub fn purge_removed_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut purged = 0;
        self.removed.retain(|_, removed_at| {
            let keep = *removed_at >= cutoff;
            if !keep {
                purged += 1;
            }
            keep
        });
        purged
    }

    pub async fn handle(
        &self,
        routing_key: &str,
        event: StatusEvent,
    ) -> Result<ReconcileOutcome, ControlPlaneError> {
        let Some(swarm_id) = event.scope.swarm().map(str::to_string) else {
            return Ok(self.drop_event(
                "ALL",
                routing_key,
                &event,
                DropReason::SchemaViolation,
                "status event scope names no swarm".to_string(),
            ));
        };

        if let Err(e) = event.validate() {
            let reason = if event.kind == StatusKind::Delta && !event.full_only_fields().is_empty() {
                DropReason::FullOnlyFieldInDelta
            } else {
                DropReason::SchemaViolation
            };
            return Ok(self.drop_event(&swarm_id, routing_key, &event, reason, e.to_string()));
        }

        if self.removed.contains_key(&swarm_id) {
            match self.lifecycle.get(&swarm_id).await {
                Err(ControlPlaneError::NotFound(_)) => {
                    return Ok(self.drop_event(
                        &swarm_id,
                        routing_key,
                        &event,
                        DropReason::RemovedSwarm,
                        "status for a removed swarm".to_string(),
                    ))
                }
                Err(e) => return Err(e),
                Ok(_) => {
                    self.removed.remove(&swarm_id);
                }
            }
        }

        metrics::counter!("swarmctl_status_events_total", "kind" => event.kind.event_type().as_str())
            .increment(1);

        match event.kind {
            StatusKind::Full => self.apply_full(&swarm_id, &event)?,
            StatusKind::Delta => match self.apply_delta(&swarm_id, &event)? {
                DeltaResult::Applied => {}
                DeltaResult::MissingBaseline => {
                    self.journal.record_drop(
                        DropKey::new(
                            &swarm_id,
                            event.kind.to_string(),
                            routing_key,
                            DropReason::MissingBaseline,
                        ),
                        "status-delta before any status-full, requesting resync",
                    );
                    let correlation_id = self.requester.request_status(&swarm_id).await?;
                    info!(swarm_id = %swarm_id, correlation_id = %correlation_id, "Missing status baseline, requested resync");
                    return Ok(ReconcileOutcome::ResyncRequested { correlation_id });
                }
                DeltaResult::Stale { last, received } => {
                    return Ok(self.drop_event(
                        &swarm_id,
                        routing_key,
                        &event,
                        DropReason::StaleSequence,
                        format!("sequence {} is not after {}", received, last),
                    ))
                }
            },
        }

        self.lifecycle.record_status_seen(&swarm_id, Utc::now()).await?;

        let (status, workloads) = match self.views.get(&swarm_id) {
            Some(view) => (view.swarm_status, view.workloads_enabled),
            None => (None, None),
        };
        let transitions = match status {
            Some(status) => {
                self.lifecycle
                    .reconcile_runtime(&swarm_id, status, workloads, event.timestamp)
                    .await?
            }
            None => Vec::new(),
        };

        Ok(match event.kind {
            StatusKind::Full => ReconcileOutcome::BaselineReplaced { transitions },
            StatusKind::Delta => ReconcileOutcome::DeltaApplied { transitions },
        })
    }

    fn apply_full(&self, swarm_id: &str, event: &StatusEvent) -> Result<(), ControlPlaneError> {
        let mut view = StatusView::empty(swarm_id);
        view.baseline = Some(event.data.clone());
        view.last_applied_delta_seq = event.sequence;
        view.refresh_derived(event)?;
        debug!(swarm_id = %swarm_id, origin = %event.origin, "Status baseline replaced");
        self.views.insert(swarm_id.to_string(), view);
        Ok(())
    }

    fn apply_delta(&self, swarm_id: &str, event: &StatusEvent) -> Result<DeltaResult, ControlPlaneError> {
        let Some(mut view) = self.views.get_mut(swarm_id) else {
            return Ok(DeltaResult::MissingBaseline);
        };
        if view.baseline.is_none() {
            return Ok(DeltaResult::MissingBaseline);
        }
        if let (Some(last), Some(received)) = (view.last_applied_delta_seq, event.sequence) {
            if received <= last {
                return Ok(DeltaResult::Stale { last, received });
            }
        }

        let mut merged = view.baseline.clone().unwrap_or_default();
        for (field, value) in &event.data {
            merged.insert(field.clone(), value.clone());
        }
        let mut next = view.clone();
        next.baseline = Some(merged);
        next.refresh_derived(event)?;
        if event.sequence.is_some() {
            next.last_applied_delta_seq = event.sequence;
        }
        next.last_seen = Utc::now();
        *view = next;
        Ok(DeltaResult::Applied)
    }

    fn drop_event(
        &self,
        swarm_id: &str,
        routing_key: &str,
        event: &StatusEvent,
        reason: DropReason,
        detail: String,
    ) -> ReconcileOutcome {
        self.journal.record_drop(
            DropKey::new(swarm_id, event.kind.to_string(), routing_key, reason),
            detail,
        );
        ReconcileOutcome::Dropped(reason)
    }
}

enum DeltaResult {
    Applied,
    MissingBaseline,
    Stale { last: u64, received: u64 },
}
