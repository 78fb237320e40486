// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Applies controller confirmations to the orchestrator's lifecycle records.
//!
//! | Confirmation | Effect |
//! |--------------|--------|
//! | Ready `swarm-template` | `READY` |
//! | Ready `swarm-start` | `RUNNING` |
//! | Ready `swarm-stop` | `STOPPED` |
//! | Ready `swarm-remove` | controller removed, record and cached view deleted |
//! | Error on a lifecycle signal | `FAILED` |
//! | Ready that the current status cannot reach | observed only |
//! | anything else | observed only |

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::lifecycle::SwarmLifecycleService;
use crate::application::status_reconciler::StatusReconciler;
use crate::domain::compute::ControllerCompute;
use crate::domain::confirmation::Confirmation;
use crate::domain::errors::ControlPlaneError;
use crate::domain::lifecycle::SwarmLifecycleStatus;
use crate::domain::signal::SignalType;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmationOutcome {
    Transitioned(SwarmLifecycleStatus),
    Removed,
    Observed,
}

pub struct ConfirmationHandler {
    lifecycle: Arc<dyn SwarmLifecycleService>,
    reconciler: Arc<StatusReconciler>,
    compute: Arc<dyn ControllerCompute>,
}

impl ConfirmationHandler {
    pub fn new(
        lifecycle: Arc<dyn SwarmLifecycleService>,
        reconciler: Arc<StatusReconciler>,
        compute: Arc<dyn ControllerCompute>,
    ) -> Self {
        Self {
            lifecycle,
            reconciler,
            compute,
        }
    }

    pub async fn handle(
        &self,
        confirmation: &Confirmation,
    ) -> Result<ConfirmationOutcome, ControlPlaneError> {
        confirmation.validate()?;
        let swarm_id = confirmation.scope().swarm().ok_or_else(|| {
            ControlPlaneError::SchemaViolation(format!(
                "confirmation {} names no swarm",
                confirmation.correlation_id()
            ))
        })?;

        match confirmation {
            Confirmation::Ready(ready) => {
                info!(
                    swarm_id = %swarm_id,
                    signal = %ready.signal,
                    correlation_id = %ready.correlation_id,
                    status = %ready.state.status,
                    "Ready confirmation received"
                );
                let target = match ready.signal {
                    SignalType::SwarmTemplate => SwarmLifecycleStatus::Ready,
                    SignalType::SwarmStart => SwarmLifecycleStatus::Running,
                    SignalType::SwarmStop => SwarmLifecycleStatus::Stopped,
                    SignalType::SwarmRemove => {
                        self.remove(swarm_id).await?;
                        return Ok(ConfirmationOutcome::Removed);
                    }
                    SignalType::ConfigUpdate | SignalType::StatusRequest => {
                        return Ok(ConfirmationOutcome::Observed)
                    }
                };
                // e.g. a stop confirmed for a swarm that was never started.
                let current = self.lifecycle.get(swarm_id).await?.status;
                if !current.can_transition_to(target) {
                    debug!(swarm_id = %swarm_id, current = %current, target = %target, "Confirmation does not move the lifecycle");
                    return Ok(ConfirmationOutcome::Observed);
                }
                let record = self.lifecycle.transition(swarm_id, target).await?;
                Ok(ConfirmationOutcome::Transitioned(record.status))
            }
            Confirmation::Error(error) => {
                warn!(
                    swarm_id = %swarm_id,
                    signal = %error.signal,
                    correlation_id = %error.correlation_id,
                    phase = %error.phase,
                    code = %error.code,
                    retryable = error.retryable,
                    "Error confirmation received: {}",
                    error.message
                );
                if !error.signal.is_lifecycle() {
                    return Ok(ConfirmationOutcome::Observed);
                }
                let record = self
                    .lifecycle
                    .transition(swarm_id, SwarmLifecycleStatus::Failed)
                    .await?;
                Ok(ConfirmationOutcome::Transitioned(record.status))
            }
        }
    }

    async fn remove(&self, swarm_id: &str) -> Result<(), ControlPlaneError> {
        self.compute.remove_controller(swarm_id).await?;
        self.lifecycle.remove(swarm_id).await?;
        self.reconciler.forget(swarm_id);
        Ok(())
    }
}
