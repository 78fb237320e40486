// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Orchestrator Listener
//!
//! Consumes controller outcomes, status metrics and alerts from the control
//! bus and routes them to the [`ConfirmationHandler`] or the
//! [`StatusReconciler`]. Every message is consumed exactly once regardless of
//! what its handler returns; failures go to the journal.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::confirmation_handler::ConfirmationHandler;
use crate::application::status_reconciler::StatusReconciler;
use crate::domain::bus::MessageEnvelope;
use crate::domain::confirmation::Confirmation;
use crate::domain::errors::ControlPlaneError;
use crate::domain::journal::{DropKey, DropReason};
use crate::domain::routing::{self, EventKind, ParsedRoutingKey};
use crate::domain::scope::{ALL, CONTROLLER_ROLE};
use crate::domain::status::StatusEvent;
use crate::infrastructure::event_bus::{BusReceiver, ControlBusError, InMemoryControlBus};
use crate::infrastructure::journal::ControlPlaneJournal;

/// Bindings the orchestrator consumes.
pub fn orchestrator_bindings() -> Vec<String> {
    vec![
        format!("event.outcome.*.*.{}.*", CONTROLLER_ROLE),
        format!("event.metric.*.*.{}.*", CONTROLLER_ROLE),
        "event.alert.#".to_string(),
    ]
}

pub struct OrchestratorListener {
    handler: Arc<ConfirmationHandler>,
    reconciler: Arc<StatusReconciler>,
    journal: Arc<ControlPlaneJournal>,
    shutdown_token: CancellationToken,
}

impl OrchestratorListener {
    pub fn new(
        handler: Arc<ConfirmationHandler>,
        reconciler: Arc<StatusReconciler>,
        journal: Arc<ControlPlaneJournal>,
    ) -> Self {
        Self {
            handler,
            reconciler,
            journal,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Subscribe before spawning so nothing published after this call is missed.
    pub fn start(self: Arc<Self>, bus: &InMemoryControlBus) -> tokio::task::JoinHandle<()> {
        let receiver = bus.subscribe(orchestrator_bindings());
        tokio::spawn(async move {
            self.run(receiver).await;
        })
    }

    async fn run(&self, mut receiver: BusReceiver) {
        info!(bindings = ?receiver.bindings(), "Orchestrator listener started");
        loop {
            tokio::select! {
                received = receiver.recv() => match received {
                    Ok(envelope) => self.dispatch(envelope).await,
                    Err(ControlBusError::Lagged(_)) => continue,
                    Err(e) => {
                        warn!("Orchestrator listener stopping: {}", e);
                        break;
                    }
                },
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping orchestrator listener");
                    break;
                }
            }
        }
    }

    /// Handle a single message. Never fails.
    pub async fn dispatch(&self, envelope: MessageEnvelope) {
        let parsed = match routing::parse(&envelope.routing_key) {
            Ok(ParsedRoutingKey::Event { event, scope }) => (event, scope),
            Ok(ParsedRoutingKey::Signal { .. }) => {
                debug!(routing_key = %envelope.routing_key, "Ignoring signal on orchestrator queue");
                return;
            }
            Err(e) => {
                self.journal.record_drop(
                    DropKey::new(ALL, "unknown", &envelope.routing_key, DropReason::MalformedRoutingKey),
                    e.to_string(),
                );
                return;
            }
        };
        let (event, scope) = parsed;
        let swarm_id = scope.swarm_id.as_str().to_string();

        let result = match event.kind() {
            EventKind::Outcome => self.on_outcome(&envelope).await,
            EventKind::Metric => self.on_status(&envelope).await,
            EventKind::Alert => {
                warn!(
                    routing_key = %envelope.routing_key,
                    alert = %envelope.body,
                    "Control-plane alert"
                );
                Ok(())
            }
        };

        if let Err(e) = result {
            let reason = match &e {
                ControlPlaneError::SchemaViolation(_) | ControlPlaneError::Routing(_) => {
                    DropReason::SchemaViolation
                }
                _ => DropReason::HandlerFailed,
            };
            let signal_type = envelope
                .body
                .get("signal")
                .or_else(|| envelope.body.get("type"))
                .and_then(|v| v.as_str())
                .unwrap_or(event.as_str())
                .to_string();
            self.journal.record_drop(
                DropKey::new(swarm_id, signal_type, &envelope.routing_key, reason),
                e.to_string(),
            );
        }
    }

    async fn on_outcome(&self, envelope: &MessageEnvelope) -> Result<(), ControlPlaneError> {
        let confirmation = Confirmation::from_message(&envelope.routing_key, &envelope.body)?;
        let outcome = self.handler.handle(&confirmation).await?;
        debug!(
            correlation_id = %confirmation.correlation_id(),
            outcome = ?outcome,
            "Confirmation applied"
        );
        Ok(())
    }

    async fn on_status(&self, envelope: &MessageEnvelope) -> Result<(), ControlPlaneError> {
        let event = StatusEvent::decode(&envelope.body)?;
        let outcome = self.reconciler.handle(&envelope.routing_key, event).await?;
        debug!(routing_key = %envelope.routing_key, outcome = ?outcome, "Status event reconciled");
        Ok(())
    }
}
