// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Command Dispatcher
//!
//! Turns REST commands into control-plane signals with at-most-one
//! effective publish per logical command.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Validate, reserve idempotency, publish, roll back on failure
//!
//! ## Flow
//!
//! 1. Validate identifiers (never published on failure).
//! 2. A known idempotency key short-circuits to the original correlation id.
//! 3. Check the lifecycle action is legal for the current status. Creates
//!    reserve the key first and release it if the swarm already exists.
//! 4. Reserve the key; a lost race also returns the winner's correlation id.
//! 5. Publish on the swarm controller's command key. A publish failure rolls
//!    the reservation back so a retry can succeed.
//! 6. Mark published, then apply the planned lifecycle transition.
//!
//! Handlers return immediately with [`CommandAccepted`]; outcomes arrive as
//! confirmations on the returned watch topics.

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::lifecycle::SwarmLifecycleService;
use crate::domain::bus::{ControlPlanePublisher, MessageEnvelope};
use crate::domain::compute::ControllerCompute;
use crate::domain::errors::ControlPlaneError;
use crate::domain::lifecycle::{LifecycleAction, SwarmLifecycleStatus, SwarmRecord};
use crate::domain::repository::{IdempotencyKey, IdempotencyStore};
use crate::domain::routing::{self, WatchTopics};
use crate::domain::scope::{CommandTarget, ControlScope, Segment};
use crate::domain::signal::{ControlSignal, SignalType};

/// Response envelope for every accepted command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandAccepted {
    pub correlation_id: String,
    pub idempotency_key: String,
    pub watch: WatchTopics,
    pub timeout_ms: u64,
    /// True when an earlier identical command already produced the publish.
    #[serde(skip)]
    pub duplicate: bool,
}

#[derive(Debug, Clone)]
pub struct CreateSwarmCommand {
    pub swarm_id: String,
    pub idempotency_key: String,
    pub template_id: Option<String>,
    pub template: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct ConfigUpdateCommand {
    pub swarm_id: String,
    pub role: String,
    pub instance: String,
    pub idempotency_key: String,
    pub patch: Map<String, Value>,
    pub command_target: CommandTarget,
}

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Orchestrator instance id, stamped as `origin` on every signal.
    pub origin: String,
    pub command_timeout_ms: u64,
}

pub struct CommandDispatcher {
    lifecycle: Arc<dyn SwarmLifecycleService>,
    idempotency: Arc<dyn IdempotencyStore>,
    publisher: Arc<dyn ControlPlanePublisher>,
    compute: Arc<dyn ControllerCompute>,
    settings: DispatcherSettings,
}

/// Outcome of the reserve-and-publish step.
enum Dispatched {
    Published(CommandAccepted),
    Duplicate(CommandAccepted),
}

impl CommandDispatcher {
    pub fn new(
        lifecycle: Arc<dyn SwarmLifecycleService>,
        idempotency: Arc<dyn IdempotencyStore>,
        publisher: Arc<dyn ControlPlanePublisher>,
        compute: Arc<dyn ControllerCompute>,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            lifecycle,
            idempotency,
            publisher,
            compute,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    /// Register the swarm, launch its controller and publish `swarm-template`.
    pub async fn create_swarm(
        &self,
        command: CreateSwarmCommand,
    ) -> Result<CommandAccepted, ControlPlaneError> {
        let scope = ControlScope::controller(&command.swarm_id).map_err(validation)?;
        let mut data = Map::new();
        if let Some(template_id) = &command.template_id {
            data.insert("templateId".to_string(), Value::String(template_id.clone()));
        }
        if let Some(template) = &command.template {
            data.insert("template".to_string(), template.clone());
        }
        let signal = self
            .new_signal(SignalType::SwarmTemplate, scope, &command.idempotency_key)
            .with_data(data);
        signal.validate()?;

        let key = idempotency_key(&signal);
        if let Some(accepted) = self.existing(&key, &signal).await? {
            return Ok(accepted);
        }
        // Reserve before looking at the lifecycle: a concurrent create with the
        // same key must see the reservation, not the record it registers.
        if let Some(winner) = self.idempotency.reserve(&key, &signal.correlation_id).await? {
            return Ok(self.duplicate(&signal, winner));
        }

        if let Ok(existing) = self.lifecycle.get(&command.swarm_id).await {
            if existing.status != SwarmLifecycleStatus::Failed {
                self.rollback(&key, &signal).await;
                return Err(ControlPlaneError::Conflict(format!(
                    "swarm {} already exists in {}",
                    command.swarm_id, existing.status
                )));
            }
            // A controller left over from the failed attempt would keep
            // reporting FAILED against the new record.
            if let Err(e) = self.compute.remove_controller(&command.swarm_id).await {
                warn!(swarm_id = %command.swarm_id, error = %e, "Stale controller cleanup failed");
            }
        }

        let mut record = SwarmRecord::new(&command.swarm_id);
        record.template_id = command.template_id.clone();
        if let Err(e) = self.lifecycle.register(record).await {
            self.rollback(&key, &signal).await;
            return Err(e);
        }

        // Compute may be slow; nothing is locked while it runs.
        let controller = match self
            .compute
            .launch_controller(&command.swarm_id, command.template.as_ref())
            .await
        {
            Ok(controller) => controller,
            Err(e) => {
                warn!(swarm_id = %command.swarm_id, error = %e, "Controller launch failed");
                self.rollback(&key, &signal).await;
                if let Err(mark) = self
                    .lifecycle
                    .transition(&command.swarm_id, SwarmLifecycleStatus::Failed)
                    .await
                {
                    warn!(swarm_id = %command.swarm_id, error = %mark, "Failed to mark swarm FAILED");
                }
                return Err(e.into());
            }
        };
        self.lifecycle
            .assign_controller(&command.swarm_id, controller.clone())
            .await?;

        match self.publish(&key, &signal).await {
            Ok(accepted) => {
                info!(
                    swarm_id = %command.swarm_id,
                    controller = %controller,
                    correlation_id = %accepted.correlation_id,
                    "Swarm create accepted"
                );
                Ok(accepted)
            }
            Err(e) => {
                // Undo the registration so a retry with the same key starts clean.
                if let Err(remove) = self.compute.remove_controller(&command.swarm_id).await {
                    warn!(swarm_id = %command.swarm_id, error = %remove, "Controller cleanup failed");
                }
                if let Err(remove) = self.lifecycle.remove(&command.swarm_id).await {
                    warn!(swarm_id = %command.swarm_id, error = %remove, "Swarm record cleanup failed");
                }
                Err(e)
            }
        }
    }

    pub async fn start_swarm(
        &self,
        swarm_id: &str,
        idempotency_key: &str,
    ) -> Result<CommandAccepted, ControlPlaneError> {
        self.lifecycle_command(swarm_id, idempotency_key, LifecycleAction::Start)
            .await
    }

    pub async fn stop_swarm(
        &self,
        swarm_id: &str,
        idempotency_key: &str,
    ) -> Result<CommandAccepted, ControlPlaneError> {
        self.lifecycle_command(swarm_id, idempotency_key, LifecycleAction::Stop)
            .await
    }

    pub async fn remove_swarm(
        &self,
        swarm_id: &str,
        idempotency_key: &str,
    ) -> Result<CommandAccepted, ControlPlaneError> {
        self.lifecycle_command(swarm_id, idempotency_key, LifecycleAction::Remove)
            .await
    }

    async fn lifecycle_command(
        &self,
        swarm_id: &str,
        idempotency_key_raw: &str,
        action: LifecycleAction,
    ) -> Result<CommandAccepted, ControlPlaneError> {
        let signal_type = match action {
            LifecycleAction::Start => SignalType::SwarmStart,
            LifecycleAction::Stop => SignalType::SwarmStop,
            LifecycleAction::Remove => SignalType::SwarmRemove,
        };
        let scope = ControlScope::controller(swarm_id).map_err(validation)?;
        let signal = self.new_signal(signal_type, scope, idempotency_key_raw);
        signal.validate()?;

        let key = idempotency_key(&signal);
        if let Some(accepted) = self.existing(&key, &signal).await? {
            return Ok(accepted);
        }

        let record = self.lifecycle.get(swarm_id).await?;
        let planned = action.planned_transition(record.status)?;

        match self.reserve_and_publish(&key, &signal).await? {
            Dispatched::Duplicate(accepted) => Ok(accepted),
            Dispatched::Published(accepted) => {
                if let Some(target) = planned {
                    // Published already; a concurrent status change must not
                    // turn an accepted command into an error.
                    if let Err(e) = self.lifecycle.transition(swarm_id, target).await {
                        warn!(swarm_id = %swarm_id, target = %target, error = %e, "Post-publish transition rejected");
                    }
                }
                info!(
                    swarm_id = %swarm_id,
                    signal = %signal_type,
                    correlation_id = %accepted.correlation_id,
                    "Swarm command accepted"
                );
                Ok(accepted)
            }
        }
    }

    /// Publish a `config-update` addressed to `{swarmId, role, instance}`.
    /// The swarm controller receives it and resolves the fan-out.
    pub async fn update_config(
        &self,
        command: ConfigUpdateCommand,
    ) -> Result<CommandAccepted, ControlPlaneError> {
        let scope = ControlScope {
            swarm_id: Segment::named(&command.swarm_id).map_err(validation)?,
            role: Segment::parse(&command.role).map_err(validation)?,
            instance: Segment::parse(&command.instance).map_err(validation)?,
        };
        let signal = self
            .new_signal(SignalType::ConfigUpdate, scope, &command.idempotency_key)
            .with_target(command.command_target)
            .with_data(command.patch);
        signal.validate()?;

        let key = idempotency_key(&signal);
        if let Some(accepted) = self.existing(&key, &signal).await? {
            return Ok(accepted);
        }
        self.lifecycle.get(&command.swarm_id).await?;

        match self.reserve_and_publish(&key, &signal).await? {
            Dispatched::Duplicate(accepted) | Dispatched::Published(accepted) => Ok(accepted),
        }
    }

    /// Ask a swarm controller for a fresh status-full. Not deduplicated:
    /// every resync request is a new command.
    pub async fn request_status(&self, swarm_id: &str) -> Result<String, ControlPlaneError> {
        let scope = ControlScope::controller(swarm_id).map_err(validation)?;
        let idempotency_key = format!("status-request-{}", Uuid::new_v4());
        let signal = self.new_signal(SignalType::StatusRequest, scope, &idempotency_key);
        let envelope = MessageEnvelope::signal(&signal).map_err(|source| {
            ControlPlaneError::PublishFailure {
                routing_key: signal.routing_key(),
                source,
            }
        })?;
        let routing_key = envelope.routing_key.clone();
        self.publisher
            .publish(envelope)
            .await
            .map_err(|source| ControlPlaneError::PublishFailure {
                routing_key,
                source,
            })?;
        metrics::counter!("swarmctl_signals_published_total", "signal" => SignalType::StatusRequest.as_str())
            .increment(1);
        Ok(signal.correlation_id)
    }

    fn new_signal(&self, signal: SignalType, scope: ControlScope, idempotency_key: &str) -> ControlSignal {
        ControlSignal::new(
            signal,
            scope,
            Uuid::new_v4().to_string(),
            idempotency_key.trim(),
        )
        .with_origin(self.settings.origin.clone())
    }

    fn accepted(&self, signal: &ControlSignal, correlation_id: String, duplicate: bool) -> CommandAccepted {
        let swarm = signal.scope.swarm().unwrap_or_default();
        let watch_scope = ControlScope::controller(swarm).unwrap_or_else(|_| signal.scope.clone());
        CommandAccepted {
            correlation_id,
            idempotency_key: signal.idempotency_key.clone(),
            watch: WatchTopics::for_scope(&watch_scope),
            timeout_ms: self.settings.command_timeout_ms,
            duplicate,
        }
    }

    fn duplicate(&self, signal: &ControlSignal, correlation_id: String) -> CommandAccepted {
        info!(
            signal = %signal.signal,
            scope = %signal.scope,
            idempotency_key = %signal.idempotency_key,
            correlation_id = %correlation_id,
            "Duplicate command resolved to original correlation id"
        );
        metrics::counter!("swarmctl_signals_deduplicated_total", "signal" => signal.signal.as_str())
            .increment(1);
        self.accepted(signal, correlation_id, true)
    }

    async fn existing(
        &self,
        key: &IdempotencyKey,
        signal: &ControlSignal,
    ) -> Result<Option<CommandAccepted>, ControlPlaneError> {
        Ok(self
            .idempotency
            .find(key)
            .await?
            .map(|record| self.duplicate(signal, record.correlation_id)))
    }

    async fn reserve_and_publish(
        &self,
        key: &IdempotencyKey,
        signal: &ControlSignal,
    ) -> Result<Dispatched, ControlPlaneError> {
        if let Some(winner) = self.idempotency.reserve(key, &signal.correlation_id).await? {
            return Ok(Dispatched::Duplicate(self.duplicate(signal, winner)));
        }
        self.publish(key, signal).await.map(Dispatched::Published)
    }

    /// Publish a signal whose reservation this caller already holds.
    async fn publish(
        &self,
        key: &IdempotencyKey,
        signal: &ControlSignal,
    ) -> Result<CommandAccepted, ControlPlaneError> {
        // Every command goes to the swarm controller, which resolves fan-out.
        let swarm = signal.scope.swarm().unwrap_or_default();
        let routing_key = routing::signal_key(signal.signal, &ControlScope::controller(swarm)?);

        let published = match MessageEnvelope::forwarded(signal, routing_key.clone()) {
            Ok(envelope) => self.publisher.publish(envelope).await,
            Err(e) => Err(e),
        };
        if let Err(source) = published {
            warn!(routing_key = %routing_key, error = %source, "Publish failed, rolling back reservation");
            self.rollback(key, signal).await;
            return Err(ControlPlaneError::PublishFailure {
                routing_key,
                source,
            });
        }

        if let Err(e) = self
            .idempotency
            .mark_published(key, &signal.correlation_id)
            .await
        {
            warn!(key = %key, error = %e, "Failed to mark idempotency record published");
        }
        metrics::counter!("swarmctl_signals_published_total", "signal" => signal.signal.as_str())
            .increment(1);
        Ok(self.accepted(signal, signal.correlation_id.clone(), false))
    }

    async fn rollback(&self, key: &IdempotencyKey, signal: &ControlSignal) {
        match self.idempotency.rollback(key, &signal.correlation_id).await {
            Ok(true) => {}
            Ok(false) => warn!(key = %key, "Idempotency rollback skipped, record no longer ours"),
            Err(e) => warn!(key = %key, error = %e, "Idempotency rollback failed"),
        }
    }
}

fn idempotency_key(signal: &ControlSignal) -> IdempotencyKey {
    IdempotencyKey::new(
        signal.scope.clone(),
        signal.signal,
        signal.idempotency_key.clone(),
    )
}

fn validation(err: crate::domain::routing::RoutingError) -> ControlPlaneError {
    ControlPlaneError::Validation(err.to_string())
}
