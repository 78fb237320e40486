// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Confirmations
//!
//! Outcome events emitted by the entity that handled a signal. Always carry
//! the triggering `correlationId` and `idempotencyKey`, plus the scope of the
//! *confirming* entity (not the original fan-out target).
//!
//! The variant travels in the routing key (`event.outcome.ready.*` vs.
//! `event.outcome.error.*`), so decoding goes through
//! [`Confirmation::from_message`] rather than an untagged deserializer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::errors::ControlPlaneError;
use crate::domain::routing::{self, EventType, ParsedRoutingKey};
use crate::domain::scope::ConfirmationScope;
use crate::domain::signal::{ControlSignal, SignalType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationState {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyConfirmation {
    pub correlation_id: String,
    pub idempotency_key: String,
    pub signal: SignalType,
    pub scope: ConfirmationScope,
    pub state: ConfirmationState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorConfirmation {
    pub correlation_id: String,
    pub idempotency_key: String,
    pub signal: SignalType,
    pub scope: ConfirmationScope,
    /// Processing step that failed, e.g. `template`, `start-workers`.
    pub phase: String,
    pub code: String,
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ConfirmationState>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Confirmation {
    Ready(ReadyConfirmation),
    Error(ErrorConfirmation),
}

impl Confirmation {
    /// Ready confirmation answering `signal`, emitted from `scope`.
    pub fn ready(
        signal: &ControlSignal,
        scope: ConfirmationScope,
        status: impl Into<String>,
        details: Option<Value>,
    ) -> Self {
        Confirmation::Ready(ReadyConfirmation {
            correlation_id: signal.correlation_id.clone(),
            idempotency_key: signal.idempotency_key.clone(),
            signal: signal.signal,
            scope,
            state: ConfirmationState {
                status: status.into(),
                details,
            },
        })
    }

    /// Error confirmation answering `signal`; `retryable` defaults to false.
    pub fn error(
        signal: &ControlSignal,
        scope: ConfirmationScope,
        phase: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Confirmation::Error(ErrorConfirmation {
            correlation_id: signal.correlation_id.clone(),
            idempotency_key: signal.idempotency_key.clone(),
            signal: signal.signal,
            scope,
            phase: phase.into(),
            code: code.into(),
            message: message.into(),
            retryable: false,
            state: None,
        })
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Confirmation::Ready(c) => &c.correlation_id,
            Confirmation::Error(c) => &c.correlation_id,
        }
    }

    pub fn idempotency_key(&self) -> &str {
        match self {
            Confirmation::Ready(c) => &c.idempotency_key,
            Confirmation::Error(c) => &c.idempotency_key,
        }
    }

    pub fn signal(&self) -> SignalType {
        match self {
            Confirmation::Ready(c) => c.signal,
            Confirmation::Error(c) => c.signal,
        }
    }

    pub fn scope(&self) -> &ConfirmationScope {
        match self {
            Confirmation::Ready(c) => &c.scope,
            Confirmation::Error(c) => &c.scope,
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            Confirmation::Ready(_) => EventType::Ready,
            Confirmation::Error(_) => EventType::Error,
        }
    }

    pub fn routing_key(&self) -> String {
        routing::event_key(self.event_type(), self.scope())
    }

    /// A confirmation without a resolvable correlation id is never accepted.
    pub fn validate(&self) -> Result<(), ControlPlaneError> {
        if self.correlation_id().trim().is_empty() {
            return Err(ControlPlaneError::SchemaViolation(format!(
                "{} confirmation for {} has no correlationId",
                self.event_type().as_str(),
                self.signal()
            )));
        }
        Ok(())
    }

    /// Decode a confirmation from its routing key and JSON body.
    pub fn from_message(routing_key: &str, body: &Value) -> Result<Self, ControlPlaneError> {
        let event = match routing::parse(routing_key)? {
            ParsedRoutingKey::Event { event, .. } => event,
            ParsedRoutingKey::Signal { .. } => {
                return Err(ControlPlaneError::SchemaViolation(format!(
                    "'{}' is a signal key, not a confirmation",
                    routing_key
                )))
            }
        };

        let schema = |e: serde_json::Error| {
            ControlPlaneError::SchemaViolation(format!("malformed confirmation: {}", e))
        };
        let confirmation = match event {
            EventType::Ready => {
                Confirmation::Ready(serde_json::from_value(body.clone()).map_err(schema)?)
            }
            EventType::Error => {
                Confirmation::Error(serde_json::from_value(body.clone()).map_err(schema)?)
            }
            other => {
                return Err(ControlPlaneError::SchemaViolation(format!(
                    "'{}' is not a confirmation event",
                    other
                )))
            }
        };
        confirmation.validate()?;
        Ok(confirmation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scope::ControlScope;
    use serde_json::json;

    fn start_signal() -> ControlSignal {
        ControlSignal::new(
            SignalType::SwarmStart,
            ControlScope::controller("sw1").unwrap(),
            "corr-1",
            "idem-1",
        )
    }

    fn controller_scope() -> ControlScope {
        ControlScope::new("sw1", "swarm-controller", "ctrl-1").unwrap()
    }

    #[test]
    fn test_ready_wire_shape() {
        let confirmation = Confirmation::ready(
            &start_signal(),
            controller_scope(),
            "RUNNING",
            Some(json!({"workloadsEnabled": true})),
        );
        assert_eq!(
            confirmation.routing_key(),
            "event.outcome.ready.sw1.swarm-controller.ctrl-1"
        );
        let body = serde_json::to_value(&confirmation).unwrap();
        assert_eq!(body["correlationId"], "corr-1");
        assert_eq!(body["signal"], "swarm-start");
        assert_eq!(body["scope"]["instance"], "ctrl-1");
        assert_eq!(body["state"]["status"], "RUNNING");
        assert_eq!(body["state"]["details"]["workloadsEnabled"], true);
    }

    #[test]
    fn test_from_message_picks_variant_from_key() {
        let error = Confirmation::error(
            &start_signal(),
            controller_scope(),
            "start-workers",
            "downstream-unavailable",
            "docker unreachable",
        );
        let body = serde_json::to_value(&error).unwrap();
        assert_eq!(body["retryable"], false);

        let decoded = Confirmation::from_message(&error.routing_key(), &body).unwrap();
        assert_eq!(decoded, error);
    }

    #[test]
    fn test_blank_correlation_id_fails_loudly() {
        let body = json!({
            "correlationId": "",
            "idempotencyKey": "idem-1",
            "signal": "swarm-start",
            "scope": {"swarmId": "sw1", "role": "swarm-controller", "instance": "ctrl-1"},
            "state": {"status": "RUNNING"}
        });
        let result = Confirmation::from_message(
            "event.outcome.ready.sw1.swarm-controller.ctrl-1",
            &body,
        );
        assert!(matches!(result, Err(ControlPlaneError::SchemaViolation(_))));
    }

    #[test]
    fn test_status_key_is_not_a_confirmation() {
        let result = Confirmation::from_message(
            "event.metric.status-full.sw1.swarm-controller.ctrl-1",
            &json!({}),
        );
        assert!(matches!(result, Err(ControlPlaneError::SchemaViolation(_))));
    }
}
