// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixtures for the swarm controller integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use swarmctl_core::domain::bus::{BusError, ControlPlanePublisher, MessageEnvelope};
use swarmctl_core::domain::compute::ComputeError;
use swarmctl_core::domain::scope::{CommandTarget, ControlScope};
use swarmctl_core::domain::signal::{ControlSignal, SignalType};
use swarmctl_core::domain::status::{StatusEvent, StatusKind};
use swarmctl_core::infrastructure::ControlPlaneJournal;
use swarmctl_swarm::application::{SwarmController, SwarmControllerConfig};
use swarmctl_swarm::domain::{ControllerIdentity, WorkerCompute, WorkerKey};

pub const SWARM: &str = "sw1";
pub const INSTANCE: &str = "ctrl-1";

#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<MessageEnvelope>>,
}

impl RecordingPublisher {
    pub fn envelopes(&self) -> Vec<MessageEnvelope> {
        self.published.lock().clone()
    }

    pub fn with_key(&self, routing_key: &str) -> Vec<MessageEnvelope> {
        self.published
            .lock()
            .iter()
            .filter(|e| e.routing_key == routing_key)
            .cloned()
            .collect()
    }

    pub fn count(&self, routing_key: &str) -> usize {
        self.with_key(routing_key).len()
    }

    /// Outcome events (`ready`/`error`) answering `correlation_id`.
    pub fn confirmations(&self, correlation_id: &str) -> Vec<MessageEnvelope> {
        self.published
            .lock()
            .iter()
            .filter(|e| e.routing_key.starts_with("event.outcome."))
            .filter(|e| e.body["correlationId"] == correlation_id)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.published.lock().clear();
    }
}

#[async_trait]
impl ControlPlanePublisher for RecordingPublisher {
    async fn publish(&self, envelope: MessageEnvelope) -> Result<(), BusError> {
        self.published.lock().push(envelope);
        Ok(())
    }
}

/// Worker compute that records calls and can be told to fail.
#[derive(Default)]
pub struct ScriptedWorkers {
    fail: AtomicBool,
    pub started: Mutex<Vec<WorkerKey>>,
    pub stopped: Mutex<Vec<WorkerKey>>,
    pub removed: Mutex<Vec<WorkerKey>>,
}

impl ScriptedWorkers {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ComputeError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ComputeError::Unavailable {
                message: "worker pool exhausted".to_string(),
                hint: "add capacity to the worker pool".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl WorkerCompute for ScriptedWorkers {
    async fn start_workers(
        &self,
        _swarm_id: &str,
        workers: &[WorkerKey],
        _template: Option<&Value>,
    ) -> Result<(), ComputeError> {
        self.check()?;
        self.started.lock().extend(workers.iter().cloned());
        Ok(())
    }

    async fn stop_workers(&self, _swarm_id: &str, workers: &[WorkerKey]) -> Result<(), ComputeError> {
        self.check()?;
        self.stopped.lock().extend(workers.iter().cloned());
        Ok(())
    }

    async fn remove_workers(&self, _swarm_id: &str, workers: &[WorkerKey]) -> Result<(), ComputeError> {
        self.check()?;
        self.removed.lock().extend(workers.iter().cloned());
        Ok(())
    }
}

pub struct Fixture {
    pub controller: SwarmController,
    pub publisher: Arc<RecordingPublisher>,
    pub workers: Arc<ScriptedWorkers>,
}

impl Fixture {
    pub fn new() -> Self {
        let publisher = Arc::new(RecordingPublisher::default());
        let workers = Arc::new(ScriptedWorkers::default());
        let journal = Arc::new(ControlPlaneJournal::tracing(
            Duration::from_millis(1),
            Duration::from_secs(1),
        ));
        let controller = SwarmController::new(
            ControllerIdentity::new(SWARM, INSTANCE).unwrap(),
            publisher.clone(),
            workers.clone(),
            journal,
            SwarmControllerConfig::default(),
        )
        .unwrap();
        Self {
            controller,
            publisher,
            workers,
        }
    }

    /// Deliver an orchestrator signal on the controller's command key.
    pub async fn signal(&mut self, signal: ControlSignal) {
        let key = controller_key(signal.signal);
        self.controller.handle_signal(&key, signal).await.unwrap();
    }

    /// Worker status event with the given `enabled` flag.
    pub async fn worker_status(&mut self, role: &str, instance: &str, enabled: bool) {
        let mut data = Map::new();
        data.insert("enabled".to_string(), Value::Bool(enabled));
        let event = StatusEvent::new(
            StatusKind::Delta,
            instance,
            ControlScope::new(SWARM, role, instance).unwrap(),
            data,
        );
        self.controller.handle_worker_status(event).await.unwrap();
    }

    /// Apply a template with the given workers and report them ready.
    pub async fn ready_with(&mut self, workers: &[(&str, &str)]) {
        self.signal(template("tmpl-corr", workers)).await;
        for (role, instance) in workers {
            self.worker_status(role, instance, false).await;
        }
    }
}

pub fn controller_key(signal: SignalType) -> String {
    format!("signal.{}.{}.swarm-controller.ALL", signal.as_str(), SWARM)
}

pub fn orchestrator_signal(signal: SignalType, correlation_id: &str) -> ControlSignal {
    ControlSignal::new(
        signal,
        ControlScope::controller(SWARM).unwrap(),
        correlation_id,
        format!("idem-{}", correlation_id),
    )
    .with_origin("orch-1")
}

pub fn template(correlation_id: &str, workers: &[(&str, &str)]) -> ControlSignal {
    let workers: Vec<Value> = workers
        .iter()
        .map(|(role, instance)| json!({ "role": role, "instance": instance }))
        .collect();
    let mut data = Map::new();
    data.insert("templateId".to_string(), json!("pipeline-v1"));
    data.insert(
        "template".to_string(),
        json!({ "workers": workers, "config": { "batchSize": 10 } }),
    );
    orchestrator_signal(SignalType::SwarmTemplate, correlation_id).with_data(data)
}

pub fn config_update(
    role: &str,
    instance: &str,
    target: CommandTarget,
    correlation_id: &str,
    patch: Value,
) -> ControlSignal {
    let data = patch.as_object().cloned().unwrap_or_default();
    ControlSignal::new(
        SignalType::ConfigUpdate,
        ControlScope::new(SWARM, role, instance).unwrap(),
        correlation_id,
        format!("idem-{}", correlation_id),
    )
    .with_target(target)
    .with_origin("orch-1")
    .with_data(data)
}
