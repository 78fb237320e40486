// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Swarm Controller
//!
//! Per-swarm command executor. Receives orchestrator signals and worker
//! traffic for exactly one swarm, drives the worker compute port, and answers
//! every lifecycle signal with exactly one Ready or Error confirmation.
//!
//! Template and start confirmations are gated on worker readiness: the
//! command is parked in a single pending slot (a newer one replaces it) and
//! confirmed once [`ReadinessTracker::is_ready_for_work`] holds.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Serialized handling of everything addressed to one swarm

use serde_json::{json, Map, Value};
use std::sync::Arc;
use swarmctl_core::domain::bus::{BusError, ControlPlanePublisher, MessageEnvelope};
use swarmctl_core::domain::config_merge::ConfigDiff;
use swarmctl_core::domain::confirmation::{Confirmation, ConfirmationState, ErrorConfirmation};
use swarmctl_core::domain::errors::ControlPlaneError;
use swarmctl_core::domain::journal::{DropKey, DropReason};
use swarmctl_core::domain::scope::{CommandTarget, ControlScope};
use swarmctl_core::domain::signal::{ControlSignal, SignalType};
use swarmctl_core::domain::status::{StatusEvent, StatusKind};
use swarmctl_core::infrastructure::journal::ControlPlaneJournal;
use tracing::{debug, info, warn};

use crate::application::io_state::IoStateAggregator;
use crate::application::readiness::ReadinessTracker;
use crate::application::router::{CommandRouter, LocalEffect};
use crate::domain::compute::WorkerCompute;
use crate::domain::controller::{ControllerIdentity, ControllerPhase, ControllerState};
use crate::domain::worker::{expected_workers, WorkerKey};

/// Status reported in the Ready confirmation of `swarm-remove`.
pub const REMOVED_STATUS: &str = "REMOVED";

#[derive(Debug, Clone)]
pub struct SwarmControllerConfig {
    /// How many `(origin, correlationId)` pairs are remembered for loop suppression
    pub seen_capacity: usize,
}

impl Default for SwarmControllerConfig {
    fn default() -> Self {
        Self { seen_capacity: 1024 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Template,
    Start,
}

impl PendingKind {
    fn phase(&self) -> &'static str {
        match self {
            PendingKind::Template => "template",
            PendingKind::Start => "start",
        }
    }
}

#[derive(Debug, Clone)]
struct PendingCommand {
    kind: PendingKind,
    signal: ControlSignal,
}

pub struct SwarmController {
    identity: ControllerIdentity,
    state: ControllerState,
    readiness: ReadinessTracker,
    io: IoStateAggregator,
    router: CommandRouter,
    pending: Option<PendingCommand>,
    template_correlation: Option<String>,
    sequence: u64,
    publisher: Arc<dyn ControlPlanePublisher>,
    compute: Arc<dyn WorkerCompute>,
    journal: Arc<ControlPlaneJournal>,
}

impl SwarmController {
    pub fn new(
        identity: ControllerIdentity,
        publisher: Arc<dyn ControlPlanePublisher>,
        compute: Arc<dyn WorkerCompute>,
        journal: Arc<ControlPlaneJournal>,
        config: SwarmControllerConfig,
    ) -> Result<Self, ControlPlaneError> {
        let router = CommandRouter::new(identity.clone(), config.seen_capacity)?;
        Ok(Self {
            identity,
            state: ControllerState::new(),
            readiness: ReadinessTracker::new(),
            io: IoStateAggregator::new(),
            router,
            pending: None,
            template_correlation: None,
            sequence: 0,
            publisher,
            compute,
            journal,
        })
    }

    pub fn identity(&self) -> &ControllerIdentity {
        &self.identity
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn readiness(&self) -> &ReadinessTracker {
        &self.readiness
    }

    pub fn io(&self) -> &IoStateAggregator {
        &self.io
    }

    pub fn is_removed(&self) -> bool {
        self.state.removed
    }

    /// Correlation id of the command waiting on worker readiness, if any.
    pub fn pending_correlation(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.signal.correlation_id.as_str())
    }

    /// Handle one signal that arrived on `routing_key`.
    pub async fn handle_signal(
        &mut self,
        routing_key: &str,
        signal: ControlSignal,
    ) -> Result<(), ControlPlaneError> {
        signal.validate()?;
        if signal.scope.swarm() != Some(self.identity.swarm_id.as_str()) {
            return Err(ControlPlaneError::Validation(format!(
                "signal for swarm {} delivered to controller {}",
                signal.scope.swarm_id, self.identity
            )));
        }
        if self.state.removed {
            debug!(controller = %self.identity, signal = %signal.signal, "Controller removed, ignoring signal");
            return Ok(());
        }

        debug!(
            controller = %self.identity,
            signal = %signal.signal,
            correlation_id = %signal.correlation_id,
            "Handling signal"
        );
        match signal.signal {
            SignalType::SwarmTemplate => self.on_template(signal).await,
            SignalType::SwarmStart => self.on_start(signal).await,
            SignalType::SwarmStop => self.on_stop(signal).await,
            SignalType::SwarmRemove => self.on_remove(signal).await,
            SignalType::ConfigUpdate => self.on_config_update(routing_key, signal).await,
            SignalType::StatusRequest => {
                self.publish_status(StatusKind::Full).await;
                let status = self.state.swarm_status();
                self.confirm_ready(&signal, status.as_str(), None).await;
            }
        }
        Ok(())
    }

    /// Fold a worker status event into readiness and IO state.
    pub async fn handle_worker_status(&mut self, event: StatusEvent) -> Result<(), ControlPlaneError> {
        let Some(worker) = WorkerKey::from_scope(&event.scope) else {
            return Ok(());
        };
        if event.scope.swarm() != Some(self.identity.swarm_id.as_str()) {
            return Ok(());
        }
        if event.kind == StatusKind::Delta {
            let offending = event.full_only_fields();
            if !offending.is_empty() {
                return Err(ControlPlaneError::SchemaViolation(format!(
                    "status-delta from {} redefines full-only fields {:?}",
                    worker, offending
                )));
            }
        }
        let enabled = match event.data.get("enabled") {
            None => None,
            Some(Value::Bool(enabled)) => Some(*enabled),
            Some(_) => {
                return Err(ControlPlaneError::SchemaViolation(format!(
                    "'enabled' from {} must be a boolean",
                    worker
                )))
            }
        };

        if self
            .readiness
            .observe(&worker, enabled, event.timestamp.timestamp_millis())
        {
            info!(controller = %self.identity, worker = %worker, "Worker ready");
        }
        if let Some(io_state) = event.data.get("ioState") {
            self.io.record(&worker, io_state);
        }
        self.evaluate_pending().await;
        Ok(())
    }

    /// A worker rejected a config-update. While a template or start is
    /// pending the swarm cannot become ready, so that command fails.
    pub async fn handle_worker_error(&mut self, error: ErrorConfirmation) {
        let Some(worker) = WorkerKey::from_scope(&error.scope) else {
            return;
        };
        warn!(
            controller = %self.identity,
            worker = %worker,
            signal = %error.signal,
            code = %error.code,
            "Worker reported an error: {}",
            error.message
        );
        if error.signal != SignalType::ConfigUpdate {
            return;
        }
        if let Some(pending) = self.pending.take() {
            self.state.phase = ControllerPhase::Failed;
            self.emit_error(
                &pending.signal,
                pending.kind.phase(),
                "worker-error",
                format!("{}: {}", worker, error.message),
            )
            .await;
            self.publish_status(StatusKind::Delta).await;
        }
    }

    async fn on_template(&mut self, signal: ControlSignal) {
        if self.pending_correlation() == Some(signal.correlation_id.as_str()) {
            debug!(correlation_id = %signal.correlation_id, "Template already pending");
            return;
        }
        match self.state.phase {
            ControllerPhase::Creating | ControllerPhase::Failed => {}
            _ if self.template_correlation.as_deref() == Some(signal.correlation_id.as_str()) => {
                // Redelivery of the template we already confirmed.
                let status = self.state.swarm_status();
                self.confirm_ready(&signal, status.as_str(), None).await;
                return;
            }
            phase => {
                let message = format!("template already applied, controller is {:?}", phase);
                self.emit_error(&signal, "template", "conflict", message).await;
                return;
            }
        }

        let template = signal.data.get("template").cloned().unwrap_or(Value::Null);
        let expected = match expected_workers(&template) {
            Ok(expected) => expected,
            Err(e) => {
                self.fail_pending_phase(&signal, "template", &e).await;
                return;
            }
        };

        let workers: Vec<WorkerKey> = expected.iter().cloned().collect();
        if let Err(e) = self
            .compute
            .start_workers(&self.identity.swarm_id, &workers, Some(&template))
            .await
        {
            self.fail_pending_phase(&signal, "template", &e.into()).await;
            return;
        }

        self.state.template_id = signal
            .data
            .get("templateId")
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(config) = template.get("config").filter(|c| c.is_object()) {
            self.state.effective_config = config.clone();
        }
        self.readiness.expect(expected.clone());
        self.state.expected_workers = Some(expected);
        self.state.phase = ControllerPhase::Creating;
        self.template_correlation = Some(signal.correlation_id.clone());

        info!(
            controller = %self.identity,
            workers = workers.len(),
            "Template applied, waiting for workers"
        );
        self.park(PendingKind::Template, signal);
        self.evaluate_pending().await;
    }

    async fn on_start(&mut self, signal: ControlSignal) {
        match self.state.phase {
            ControllerPhase::Active if self.state.workloads_enabled => {
                let status = self.state.swarm_status();
                self.confirm_ready(&signal, status.as_str(), None).await;
            }
            ControllerPhase::Ready | ControllerPhase::Active | ControllerPhase::Starting => {
                self.state.phase = ControllerPhase::Starting;
                self.broadcast_enablement(&signal, true).await;
                self.park(PendingKind::Start, signal);
                self.publish_status(StatusKind::Delta).await;
                self.evaluate_pending().await;
            }
            ControllerPhase::Creating | ControllerPhase::Failed => {
                let message = format!(
                    "cannot start before the template is confirmed (controller is {:?})",
                    self.state.phase
                );
                self.emit_error(&signal, "start", "conflict", message).await;
            }
        }
    }

    async fn on_stop(&mut self, signal: ControlSignal) {
        match self.state.phase {
            ControllerPhase::Creating => {
                self.emit_error(&signal, "stop", "conflict", "swarm has not been created yet")
                    .await;
                return;
            }
            ControllerPhase::Failed if self.state.expected_workers.is_none() => {
                self.emit_error(&signal, "stop", "conflict", "swarm has no template to stop")
                    .await;
                return;
            }
            ControllerPhase::Ready => {
                let status = self.state.swarm_status();
                self.confirm_ready(&signal, status.as_str(), None).await;
                return;
            }
            ControllerPhase::Active if !self.state.workloads_enabled => {
                let status = self.state.swarm_status();
                self.confirm_ready(&signal, status.as_str(), None).await;
                return;
            }
            _ => {}
        }

        // A stop supersedes a start still waiting for workers.
        if let Some(pending) = self.pending.take() {
            debug!(correlation_id = %pending.signal.correlation_id, "Pending command superseded by stop");
        }
        self.state.workloads_enabled = false;
        self.state.phase = ControllerPhase::Active;
        self.broadcast_enablement(&signal, false).await;
        let status = self.state.swarm_status();
        self.confirm_ready(&signal, status.as_str(), None).await;
        self.publish_status(StatusKind::Delta).await;
    }

    async fn on_remove(&mut self, signal: ControlSignal) {
        let workers: Vec<WorkerKey> = self.readiness.known_workers().into_iter().collect();
        let swarm_id = self.identity.swarm_id.clone();

        if let Err(e) = self.compute.stop_workers(&swarm_id, &workers).await {
            let e: ControlPlaneError = e.into();
            self.emit_error(&signal, "remove", e.code(), e.to_string()).await;
            return;
        }
        if let Err(e) = self.compute.remove_workers(&swarm_id, &workers).await {
            let e: ControlPlaneError = e.into();
            self.emit_error(&signal, "remove", e.code(), e.to_string()).await;
            return;
        }

        self.pending = None;
        self.state.workloads_enabled = false;
        self.state.removed = true;
        info!(controller = %self.identity, workers = workers.len(), "Swarm removed");
        self.confirm_ready(&signal, REMOVED_STATUS, None).await;
    }

    async fn on_config_update(&mut self, routing_key: &str, signal: ControlSignal) {
        let plan = match self.router.resolve(routing_key, &signal, &self.readiness) {
            Ok(plan) => plan,
            Err(e) => {
                if matches!(e, ControlPlaneError::NotFound(_)) {
                    self.journal.record_drop(
                        DropKey::new(
                            self.identity.swarm_id.as_str(),
                            signal.signal.as_str(),
                            routing_key,
                            DropReason::UnknownWorker,
                        ),
                        e.to_string(),
                    );
                }
                self.emit_error(&signal, "config-update", e.code(), e.to_string())
                    .await;
                return;
            }
        };

        if plan.echo {
            debug!(correlation_id = %signal.correlation_id, "Ignoring echo of own broadcast");
            return;
        }
        if plan.duplicate {
            let details = self.enablement_details(None, &[]);
            let status = self.state.swarm_status();
            self.confirm_ready(&signal, status.as_str(), Some(details)).await;
            return;
        }

        for key in &plan.forwards {
            self.emit(
                signal.signal.as_str(),
                MessageEnvelope::forwarded(&signal, key.clone()),
            )
            .await;
        }

        let diff = match plan.local {
            LocalEffect::None => None,
            LocalEffect::Controller => Some(self.apply_local(&signal, false)),
            LocalEffect::ControllerAndWorkloads => Some(self.apply_local(&signal, true)),
        };

        let details = self.enablement_details(diff, &plan.forwards);
        let status = self.state.swarm_status();
        self.confirm_ready(&signal, status.as_str(), Some(details)).await;
        self.publish_status(StatusKind::Delta).await;
    }

    /// Apply the patch (minus routing hints) to the controller's effective
    /// config and toggle enablement.
    fn apply_local(&mut self, signal: &ControlSignal, workloads: bool) -> ConfigDiff {
        let mut patch = signal.data.clone();
        patch.remove("worker");
        let diff = ConfigDiff::apply(&self.state.effective_config, &Value::Object(patch));
        self.state.effective_config = diff.after.clone();

        if let Some(enabled) = signal.enabled_flag() {
            self.state.controller_enabled = enabled;
            if workloads {
                self.state.workloads_enabled = enabled;
            }
        }
        diff
    }

    fn enablement_details(&self, diff: Option<ConfigDiff>, forwards: &[String]) -> Value {
        let mut details = self.state.enablement();
        if !forwards.is_empty() {
            details["forwardedTo"] = json!(forwards);
        }
        if let Some(diff) = diff {
            let changed = !diff.is_noop();
            details["configChanged"] = Value::Bool(changed);
            if changed {
                details["configDiff"] = json!({ "before": diff.before, "after": diff.after });
            }
        }
        details
    }

    /// Tell every worker to enable or disable its workload, tagged with our
    /// own origin so the copy we receive back is recognised.
    async fn broadcast_enablement(&mut self, cause: &ControlSignal, enabled: bool) {
        let scope = match ControlScope::swarm_wide(&self.identity.swarm_id) {
            Ok(scope) => scope,
            Err(e) => {
                warn!(controller = %self.identity, "Cannot build broadcast scope: {}", e);
                return;
            }
        };
        let mut data = Map::new();
        data.insert("enabled".to_string(), Value::Bool(enabled));
        let broadcast = ControlSignal::new(
            SignalType::ConfigUpdate,
            scope,
            cause.correlation_id.clone(),
            cause.idempotency_key.clone(),
        )
        .with_target(CommandTarget::All)
        .with_origin(self.identity.instance.clone())
        .with_data(data);

        self.router.remember(&broadcast);
        self.emit(broadcast.signal.as_str(), MessageEnvelope::signal(&broadcast))
            .await;
    }

    /// Replace the pending slot; the superseded command gets no confirmation.
    fn park(&mut self, kind: PendingKind, signal: ControlSignal) {
        if let Some(old) = self.pending.replace(PendingCommand { kind, signal }) {
            debug!(
                controller = %self.identity,
                superseded = %old.signal.correlation_id,
                kind = old.kind.phase(),
                "Pending command superseded"
            );
        }
    }

    /// Confirm the pending command if the swarm is ready for work.
    async fn evaluate_pending(&mut self) {
        if self.pending.is_none() || !self.readiness.is_ready_for_work() {
            return;
        }
        let Some(pending) = self.pending.take() else {
            return;
        };
        match pending.kind {
            PendingKind::Template => self.state.phase = ControllerPhase::Ready,
            PendingKind::Start => {
                self.state.phase = ControllerPhase::Active;
                self.state.workloads_enabled = true;
            }
        }
        let details = json!({ "workers": self.readiness.known_workers().len() });
        let status = self.state.swarm_status();
        self.confirm_ready(&pending.signal, status.as_str(), Some(details))
            .await;
        self.publish_status(StatusKind::Delta).await;
    }

    async fn fail_pending_phase(&mut self, signal: &ControlSignal, phase: &str, e: &ControlPlaneError) {
        self.pending = None;
        self.state.phase = ControllerPhase::Failed;
        self.emit_error(signal, phase, e.code(), e.to_string()).await;
        self.publish_status(StatusKind::Delta).await;
    }

    async fn confirm_ready(&mut self, signal: &ControlSignal, status: &str, details: Option<Value>) {
        metrics::counter!("swarmctl_controller_confirmations_total", "outcome" => "ready")
            .increment(1);
        let confirmation = Confirmation::ready(signal, self.identity.scope().clone(), status, details);
        self.emit(signal.signal.as_str(), MessageEnvelope::confirmation(&confirmation))
            .await;
    }

    async fn emit_error(
        &mut self,
        signal: &ControlSignal,
        phase: &str,
        code: &str,
        message: impl Into<String>,
    ) {
        let message = message.into();
        warn!(
            controller = %self.identity,
            signal = %signal.signal,
            correlation_id = %signal.correlation_id,
            phase = phase,
            code = code,
            "Command failed: {}",
            message
        );
        metrics::counter!("swarmctl_controller_confirmations_total", "outcome" => "error")
            .increment(1);
        let mut confirmation = Confirmation::error(
            signal,
            self.identity.scope().clone(),
            phase,
            code,
            message,
        );
        if let Confirmation::Error(error) = &mut confirmation {
            error.state = Some(ConfirmationState {
                status: self.state.swarm_status().as_str().to_string(),
                details: None,
            });
        }
        self.emit(signal.signal.as_str(), MessageEnvelope::confirmation(&confirmation))
            .await;
    }

    /// Publish a status event. Full and delta events share one sequence.
    pub async fn publish_status(&mut self, kind: StatusKind) {
        self.sequence += 1;
        let mut data = Map::new();
        data.insert("enabled".to_string(), Value::Bool(self.state.controller_enabled));
        data.insert(
            "workloadsEnabled".to_string(),
            Value::Bool(self.state.workloads_enabled),
        );
        data.insert(
            "swarmStatus".to_string(),
            Value::String(self.state.swarm_status().as_str().to_string()),
        );
        data.insert("ioState".to_string(), self.io.to_json());
        data.insert("queueStats".to_string(), Value::Object(Map::new()));
        let workers: Vec<Value> = self
            .readiness
            .snapshot()
            .into_iter()
            .map(|(key, state)| {
                json!({
                    "role": key.role,
                    "instance": key.instance,
                    "ready": state.ready,
                    "lastSnapshotAt": state.last_snapshot_at_millis,
                })
            })
            .collect();
        data.insert("workers".to_string(), Value::Array(workers));

        if kind == StatusKind::Full {
            let channels: Vec<String> = self.io.aggregate().into_keys().collect();
            data.insert("io".to_string(), json!({ "channels": channels }));
            data.insert("startedAt".to_string(), json!(self.state.started_at));
            data.insert(
                "version".to_string(),
                Value::String(env!("CARGO_PKG_VERSION").to_string()),
            );
            data.insert("config".to_string(), self.state.effective_config.clone());
            if let Some(template_id) = &self.state.template_id {
                data.insert("templateId".to_string(), Value::String(template_id.clone()));
            }
        }

        let event = StatusEvent::new(
            kind,
            self.identity.instance.clone(),
            self.identity.scope().clone(),
            data,
        )
        .with_sequence(self.sequence);
        self.emit(kind.event_type().as_str(), MessageEnvelope::status(&event))
            .await;
    }

    /// Publish, journaling failures instead of propagating them.
    async fn emit(&self, message_type: &str, envelope: Result<MessageEnvelope, BusError>) {
        let result = match envelope {
            Ok(envelope) => {
                let routing_key = envelope.routing_key.clone();
                self.publisher
                    .publish(envelope)
                    .await
                    .map_err(|e| (routing_key, e))
            }
            Err(e) => Err((String::new(), e)),
        };
        if let Err((routing_key, e)) = result {
            self.journal.record_drop(
                DropKey::new(
                    self.identity.swarm_id.as_str(),
                    message_type,
                    routing_key,
                    DropReason::PublishFailed,
                ),
                e.to_string(),
            );
        }
    }
}
