// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Control Signals
//!
//! A [`ControlSignal`] is the command envelope published on the bus. Its
//! `correlationId` and `idempotencyKey` are caller-supplied and drive
//! deduplication and confirmation correlation; they are unrelated to any
//! bus-level delivery identifier.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::ControlPlaneError;
use crate::domain::routing::{self, RoutingError};
use crate::domain::scope::{CommandTarget, ControlScope};

/// Fixed vocabulary of control-plane commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalType {
    SwarmTemplate,
    SwarmStart,
    SwarmStop,
    SwarmRemove,
    ConfigUpdate,
    StatusRequest,
}

impl SignalType {
    pub const ALL: [SignalType; 6] = [
        SignalType::SwarmTemplate,
        SignalType::SwarmStart,
        SignalType::SwarmStop,
        SignalType::SwarmRemove,
        SignalType::ConfigUpdate,
        SignalType::StatusRequest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::SwarmTemplate => "swarm-template",
            SignalType::SwarmStart => "swarm-start",
            SignalType::SwarmStop => "swarm-stop",
            SignalType::SwarmRemove => "swarm-remove",
            SignalType::ConfigUpdate => "config-update",
            SignalType::StatusRequest => "status-request",
        }
    }

    /// Signals that move a swarm through its lifecycle.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            SignalType::SwarmTemplate
                | SignalType::SwarmStart
                | SignalType::SwarmStop
                | SignalType::SwarmRemove
        )
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SignalType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| RoutingError::UnknownSignal(s.to_string()))
    }
}

/// Command envelope published on `signal.<type>.<swarmId>.<role>.<instance>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlSignal {
    #[serde(alias = "type")]
    pub signal: SignalType,
    pub scope: ControlScope,
    pub correlation_id: String,
    pub idempotency_key: String,
    #[serde(default)]
    pub command_target: CommandTarget,
    /// Instance id of the publisher; used for loop suppression on re-broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

impl ControlSignal {
    pub fn new(
        signal: SignalType,
        scope: ControlScope,
        correlation_id: impl Into<String>,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            signal,
            scope,
            correlation_id: correlation_id.into(),
            idempotency_key: idempotency_key.into(),
            command_target: CommandTarget::default(),
            origin: None,
            data: Map::new(),
        }
    }

    pub fn with_target(mut self, target: CommandTarget) -> Self {
        self.command_target = target;
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// Reject blank identifiers before anything is reserved or published.
    pub fn validate(&self) -> Result<(), ControlPlaneError> {
        if self.correlation_id.trim().is_empty() {
            return Err(ControlPlaneError::Validation(
                "correlationId must not be blank".to_string(),
            ));
        }
        if self.idempotency_key.trim().is_empty() {
            return Err(ControlPlaneError::Validation(
                "idempotencyKey must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    pub fn routing_key(&self) -> String {
        routing::signal_key(self.signal, &self.scope)
    }

    /// `data.enabled`, when the command carries an enablement toggle.
    pub fn enabled_flag(&self) -> Option<bool> {
        self.data.get("enabled").and_then(Value::as_bool)
    }

    /// `data.worker`, when a config-update names a single worker.
    pub fn worker_hint(&self) -> Option<&str> {
        self.data
            .get("worker")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|w| !w.is_empty())
    }
}
