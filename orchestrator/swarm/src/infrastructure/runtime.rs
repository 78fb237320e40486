// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Controller Runtime - Background task driving one [`SwarmController`]
//!
//! Owns the controller and its bus subscription. Messages are handled one at
//! a time, so all mutation of a swarm's controller state is serialized. A
//! status-full is published on start, then status-delta heartbeats on every
//! interval. The task exits after a successful remove or on shutdown.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use swarmctl_core::domain::bus::MessageEnvelope;
use swarmctl_core::domain::confirmation::ErrorConfirmation;
use swarmctl_core::domain::errors::ControlPlaneError;
use swarmctl_core::domain::journal::{DropKey, DropReason};
use swarmctl_core::domain::routing::{self, EventType, ParsedRoutingKey};
use swarmctl_core::domain::scope::{ALL, CONTROLLER_ROLE};
use swarmctl_core::domain::signal::ControlSignal;
use swarmctl_core::domain::status::{StatusEvent, StatusKind};
use swarmctl_core::infrastructure::event_bus::{BusReceiver, ControlBusError, InMemoryControlBus};
use swarmctl_core::infrastructure::journal::ControlPlaneJournal;

use crate::application::controller::SwarmController;
use crate::domain::controller::ControllerIdentity;

#[derive(Debug, Clone)]
pub struct ControllerRuntimeConfig {
    /// Interval between status-delta heartbeats
    pub status_interval: Duration,
}

impl Default for ControllerRuntimeConfig {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_secs(5),
        }
    }
}

/// Bindings a controller consumes for its swarm.
pub fn controller_bindings(identity: &ControllerIdentity) -> Vec<String> {
    let swarm = &identity.swarm_id;
    vec![
        format!("signal.*.{}.{}.*", swarm, CONTROLLER_ROLE),
        format!("signal.config-update.{}.{}.{}", swarm, ALL, ALL),
        format!("event.metric.*.{}.*.*", swarm),
        format!("event.outcome.error.{}.*.*", swarm),
    ]
}

pub struct ControllerRuntime {
    controller: SwarmController,
    receiver: BusReceiver,
    journal: Arc<ControlPlaneJournal>,
    config: ControllerRuntimeConfig,
    shutdown_token: CancellationToken,
}

impl ControllerRuntime {
    /// Subscribes immediately, so signals published after this returns are
    /// delivered even if the task has not been spawned yet.
    pub fn new(
        controller: SwarmController,
        bus: &InMemoryControlBus,
        journal: Arc<ControlPlaneJournal>,
        config: ControllerRuntimeConfig,
    ) -> Self {
        let receiver = bus.subscribe(controller_bindings(controller.identity()));
        Self {
            controller,
            receiver,
            journal,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn controller(&self) -> &SwarmController {
        &self.controller
    }

    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(mut self) {
        info!(
            controller = %self.controller.identity(),
            bindings = ?self.receiver.bindings(),
            "Swarm controller started"
        );
        self.controller.publish_status(StatusKind::Full).await;

        let period = self.config.status_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                received = self.receiver.recv() => match received {
                    Ok(envelope) => {
                        self.dispatch(envelope).await;
                        if self.controller.is_removed() {
                            info!(controller = %self.controller.identity(), "Swarm removed, stopping controller");
                            break;
                        }
                    }
                    Err(ControlBusError::Lagged(_)) => continue,
                    Err(e) => {
                        warn!("Swarm controller stopping: {}", e);
                        break;
                    }
                },
                _ = heartbeat.tick() => {
                    self.controller.publish_status(StatusKind::Delta).await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!(controller = %self.controller.identity(), "Shutdown signal received, stopping swarm controller");
                    break;
                }
            }
        }
    }

    /// Handle a single message. Never fails; errors go to the journal.
    pub async fn dispatch(&mut self, envelope: MessageEnvelope) {
        let parsed = match routing::parse(&envelope.routing_key) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.journal.record_drop(
                    DropKey::new(
                        self.controller.identity().swarm_id.as_str(),
                        "unknown",
                        &envelope.routing_key,
                        DropReason::MalformedRoutingKey,
                    ),
                    e.to_string(),
                );
                return;
            }
        };

        let (message_type, result) = match parsed {
            ParsedRoutingKey::Signal { signal, .. } => (
                signal.as_str(),
                self.on_signal(&envelope).await,
            ),
            ParsedRoutingKey::Event { event, .. } => match event {
                EventType::StatusFull | EventType::StatusDelta => {
                    (event.as_str(), self.on_worker_status(&envelope).await)
                }
                EventType::Error => (event.as_str(), self.on_worker_error(&envelope).await),
                other => {
                    debug!(event = %other, "Ignoring event on controller queue");
                    return;
                }
            },
        };

        if let Err(e) = result {
            let reason = match &e {
                ControlPlaneError::SchemaViolation(_)
                | ControlPlaneError::Routing(_)
                | ControlPlaneError::Validation(_) => DropReason::SchemaViolation,
                _ => DropReason::HandlerFailed,
            };
            self.journal.record_drop(
                DropKey::new(
                    self.controller.identity().swarm_id.as_str(),
                    message_type,
                    &envelope.routing_key,
                    reason,
                ),
                e.to_string(),
            );
        }
    }

    async fn on_signal(&mut self, envelope: &MessageEnvelope) -> Result<(), ControlPlaneError> {
        let signal: ControlSignal = serde_json::from_value(envelope.body.clone())
            .map_err(|e| ControlPlaneError::SchemaViolation(format!("malformed signal: {}", e)))?;
        self.controller
            .handle_signal(&envelope.routing_key, signal)
            .await
    }

    /// Worker status is taken as reported; only the delta shape is enforced.
    async fn on_worker_status(&mut self, envelope: &MessageEnvelope) -> Result<(), ControlPlaneError> {
        let event: StatusEvent = serde_json::from_value(envelope.body.clone()).map_err(|e| {
            ControlPlaneError::SchemaViolation(format!("malformed status event: {}", e))
        })?;
        if event.kind == StatusKind::Delta && !event.full_only_fields().is_empty() {
            self.journal.record_drop(
                DropKey::new(
                    self.controller.identity().swarm_id.as_str(),
                    event.kind.event_type().as_str(),
                    &envelope.routing_key,
                    DropReason::FullOnlyFieldInDelta,
                ),
                format!("full-only fields {:?} from {}", event.full_only_fields(), event.origin),
            );
            return Ok(());
        }
        self.controller.handle_worker_status(event).await
    }

    async fn on_worker_error(&mut self, envelope: &MessageEnvelope) -> Result<(), ControlPlaneError> {
        let error: ErrorConfirmation = serde_json::from_value(envelope.body.clone()).map_err(|e| {
            ControlPlaneError::SchemaViolation(format!("malformed error confirmation: {}", e))
        })?;
        self.controller.handle_worker_error(error).await;
        Ok(())
    }
}
