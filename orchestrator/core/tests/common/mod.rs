// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixtures for the orchestrator integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use swarmctl_core::application::{
    CommandDispatcher, ConfirmationHandler, DispatcherSettings, StandardSwarmLifecycleService,
    StatusReconciler,
};
use swarmctl_core::domain::bus::{BusError, ControlPlanePublisher, MessageEnvelope};
use swarmctl_core::domain::compute::{ComputeError, ControllerCompute};
use swarmctl_core::domain::repository::{
    IdempotencyKey, IdempotencyRecord, IdempotencyStore, RepositoryError,
};
use swarmctl_core::domain::scope::ControlScope;
use swarmctl_core::domain::status::{StatusEvent, StatusKind};
use swarmctl_core::infrastructure::{
    ControlPlaneJournal, InMemoryIdempotencyStore, InMemorySwarmRepository,
};

/// Publisher that records every envelope and can be told to fail.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<MessageEnvelope>>,
    failing: AtomicBool,
}

impl RecordingPublisher {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn envelopes(&self) -> Vec<MessageEnvelope> {
        self.published.lock().clone()
    }

    pub fn count(&self, routing_key: &str) -> usize {
        self.published
            .lock()
            .iter()
            .filter(|e| e.routing_key == routing_key)
            .count()
    }
}

#[async_trait]
impl ControlPlanePublisher for RecordingPublisher {
    async fn publish(&self, envelope: MessageEnvelope) -> Result<(), BusError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BusError::Rejected("broker unavailable".to_string()));
        }
        self.published.lock().push(envelope);
        Ok(())
    }
}

/// Controller compute whose launches can be scripted to fail.
#[derive(Default)]
pub struct ScriptedCompute {
    fail_launch: AtomicBool,
    pub removed: Mutex<Vec<String>>,
}

impl ScriptedCompute {
    pub fn set_fail_launch(&self, fail: bool) {
        self.fail_launch.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ControllerCompute for ScriptedCompute {
    async fn launch_controller(
        &self,
        swarm_id: &str,
        _template: Option<&Value>,
    ) -> Result<String, ComputeError> {
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(ComputeError::Unavailable {
                message: "no capacity".to_string(),
                hint: "scale the controller pool".to_string(),
            });
        }
        Ok(format!("{}-ctrl", swarm_id))
    }

    async fn remove_controller(&self, swarm_id: &str) -> Result<(), ComputeError> {
        self.removed.lock().push(swarm_id.to_string());
        Ok(())
    }
}

/// Idempotency store whose lookups lag behind reservations, widening the
/// window between the duplicate check and the reservation.
pub struct SlowLookupIdempotencyStore {
    inner: InMemoryIdempotencyStore,
    lookup_delay: Duration,
}

impl SlowLookupIdempotencyStore {
    pub fn new(lookup_delay: Duration) -> Self {
        Self {
            inner: InMemoryIdempotencyStore::new(),
            lookup_delay,
        }
    }
}

#[async_trait]
impl IdempotencyStore for SlowLookupIdempotencyStore {
    async fn reserve(
        &self,
        key: &IdempotencyKey,
        candidate: &str,
    ) -> Result<Option<String>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.reserve(key, candidate).await
    }

    async fn rollback(&self, key: &IdempotencyKey, candidate: &str) -> Result<bool, RepositoryError> {
        self.inner.rollback(key, candidate).await
    }

    async fn mark_published(
        &self,
        key: &IdempotencyKey,
        correlation_id: &str,
    ) -> Result<(), RepositoryError> {
        self.inner.mark_published(key, correlation_id).await
    }

    async fn find(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>, RepositoryError> {
        let found = self.inner.find(key).await;
        tokio::time::sleep(self.lookup_delay).await;
        found
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, RepositoryError> {
        self.inner.purge_older_than(cutoff).await
    }
}

pub struct Harness {
    pub lifecycle: Arc<StandardSwarmLifecycleService>,
    pub idempotency: Arc<InMemoryIdempotencyStore>,
    pub publisher: Arc<RecordingPublisher>,
    pub compute: Arc<ScriptedCompute>,
    pub journal: Arc<ControlPlaneJournal>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub reconciler: Arc<StatusReconciler>,
    pub handler: Arc<ConfirmationHandler>,
}

impl Harness {
    pub fn new() -> Self {
        let lifecycle = Arc::new(StandardSwarmLifecycleService::new(Arc::new(
            InMemorySwarmRepository::new(),
        )));
        let idempotency = Arc::new(InMemoryIdempotencyStore::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let compute = Arc::new(ScriptedCompute::default());
        let journal = Arc::new(ControlPlaneJournal::tracing(
            Duration::from_secs(5),
            Duration::from_secs(30),
        ));
        let dispatcher = Arc::new(CommandDispatcher::new(
            lifecycle.clone(),
            idempotency.clone(),
            publisher.clone(),
            compute.clone(),
            DispatcherSettings {
                origin: "orch-1".to_string(),
                command_timeout_ms: 60_000,
            },
        ));
        let reconciler = Arc::new(StatusReconciler::new(
            lifecycle.clone(),
            dispatcher.clone(),
            journal.clone(),
        ));
        let handler = Arc::new(ConfirmationHandler::new(
            lifecycle.clone(),
            reconciler.clone(),
            compute.clone(),
        ));

        Self {
            lifecycle,
            idempotency,
            publisher,
            compute,
            journal,
            dispatcher,
            reconciler,
            handler,
        }
    }
}

pub fn controller_scope(swarm_id: &str) -> ControlScope {
    ControlScope::new(swarm_id, "swarm-controller", "ctrl-1").unwrap()
}

pub fn full_data(swarm_status: &str) -> Map<String, Value> {
    let value = json!({
        "enabled": true,
        "workloadsEnabled": true,
        "swarmStatus": swarm_status,
        "ioState": { "work": "ok" },
        "queueStats": { "depth": 0 },
        "workers": [],
        "io": { "inputs": ["work"] },
        "startedAt": "2026-01-01T00:00:00Z",
        "version": "1.0.0",
        "config": {},
    });
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

pub fn status_full(swarm_id: &str, swarm_status: &str) -> StatusEvent {
    StatusEvent::new(
        StatusKind::Full,
        "ctrl-1",
        controller_scope(swarm_id),
        full_data(swarm_status),
    )
    .with_sequence(1)
}

pub fn status_delta(swarm_id: &str, sequence: u64, data: Value) -> StatusEvent {
    let data = match data {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    StatusEvent::new(StatusKind::Delta, "ctrl-1", controller_scope(swarm_id), data)
        .with_sequence(sequence)
}
