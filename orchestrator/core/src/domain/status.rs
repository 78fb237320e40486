// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Status Events
//!
//! Controllers and workers report their runtime state with two event shapes:
//!
//! - **status-full**: a complete baseline, every field present.
//! - **status-delta**: a partial update that must never redefine the
//!   identity / queue-topology fields listed in [`FULL_ONLY_FIELDS`].
//!
//! Both share the envelope `{type, origin, scope, runtime?, sequence?, data}`.
//! [`StatusEvent::validate`] enforces the shape at the boundary, including
//! that `data.swarmStatus` names a known lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::errors::ControlPlaneError;
use crate::domain::lifecycle::SwarmLifecycleStatus;
use crate::domain::routing::{self, EventType};
use crate::domain::scope::ControlScope;

/// Fields every status event may carry; all required in a status-full.
pub const COMMON_FIELDS: [&str; 5] = ["enabled", "swarmStatus", "ioState", "queueStats", "workers"];

/// Fields only a status-full may define.
pub const FULL_ONLY_FIELDS: [&str; 4] = ["io", "startedAt", "version", "config"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusKind {
    #[serde(rename = "status-full")]
    Full,
    #[serde(rename = "status-delta")]
    Delta,
}

impl StatusKind {
    pub fn event_type(&self) -> EventType {
        match self {
            StatusKind::Full => EventType::StatusFull,
            StatusKind::Delta => EventType::StatusDelta,
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_type().as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    #[serde(rename = "type")]
    pub kind: StatusKind,
    pub origin: String,
    pub scope: ControlScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<Value>,
    /// Monotonic per-origin counter; older deltas are discarded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl StatusEvent {
    pub fn new(
        kind: StatusKind,
        origin: impl Into<String>,
        scope: ControlScope,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            kind,
            origin: origin.into(),
            scope,
            runtime: None,
            sequence: None,
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn routing_key(&self) -> String {
        routing::event_key(self.kind.event_type(), &self.scope)
    }

    /// Decode a status event body without checking its field set; the
    /// reconciler validates and classifies what it receives.
    pub fn decode(body: &Value) -> Result<Self, ControlPlaneError> {
        serde_json::from_value(body.clone()).map_err(|e| {
            ControlPlaneError::SchemaViolation(format!("malformed status event: {}", e))
        })
    }

    /// Decode and validate a status event body.
    pub fn from_message(body: &Value) -> Result<Self, ControlPlaneError> {
        let event = Self::decode(body)?;
        event.validate()?;
        Ok(event)
    }

    pub fn validate(&self) -> Result<(), ControlPlaneError> {
        match self.kind {
            StatusKind::Full => {
                if let Some(missing) = COMMON_FIELDS
                    .iter()
                    .chain(FULL_ONLY_FIELDS.iter())
                    .find(|field| !self.data.contains_key(**field))
                {
                    return Err(ControlPlaneError::SchemaViolation(format!(
                        "status-full from '{}' is missing '{}'",
                        self.origin, missing
                    )));
                }
            }
            StatusKind::Delta => {
                let offending = self.full_only_fields();
                if !offending.is_empty() {
                    return Err(ControlPlaneError::SchemaViolation(format!(
                        "status-delta from '{}' redefines full-only fields {:?}",
                        self.origin, offending
                    )));
                }
            }
        }

        if let Some(value) = self.data.get("enabled") {
            if !value.is_boolean() {
                return Err(ControlPlaneError::SchemaViolation(
                    "'enabled' must be a boolean".to_string(),
                ));
            }
        }
        self.swarm_status()?;
        Ok(())
    }

    /// Full-only fields present in this event's data.
    pub fn full_only_fields(&self) -> Vec<&'static str> {
        FULL_ONLY_FIELDS
            .into_iter()
            .filter(|field| self.data.contains_key(*field))
            .collect()
    }

    pub fn enabled(&self) -> Option<bool> {
        self.data.get("enabled").and_then(Value::as_bool)
    }

    pub fn workloads_enabled(&self) -> Option<bool> {
        self.data.get("workloadsEnabled").and_then(Value::as_bool)
    }

    /// `data.swarmStatus`, validated against the lifecycle enum.
    pub fn swarm_status(&self) -> Result<Option<SwarmLifecycleStatus>, ControlPlaneError> {
        match self.data.get("swarmStatus") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(raw)) => raw
                .parse()
                .map(Some)
                .map_err(|e| ControlPlaneError::SchemaViolation(format!("swarmStatus: {}", e))),
            Some(other) => Err(ControlPlaneError::SchemaViolation(format!(
                "swarmStatus must be a string, got {}",
                other
            ))),
        }
    }

    /// `data.ioState` as `channel -> state`, skipping unrecognised states.
    pub fn io_state(&self) -> BTreeMap<String, IoHealth> {
        self.data
            .get("ioState")
            .and_then(Value::as_object)
            .map(|channels| {
                channels
                    .iter()
                    .filter_map(|(channel, state)| {
                        state
                            .as_str()
                            .and_then(IoHealth::parse)
                            .map(|health| (channel.clone(), health))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Health of one logical IO channel, ordered best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IoHealth {
    Ok,
    OutOfData,
    UpstreamError,
}

impl IoHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            IoHealth::Ok => "ok",
            IoHealth::OutOfData => "out-of-data",
            IoHealth::UpstreamError => "upstream-error",
        }
    }

    /// `None` for anything unrecognised; callers ignore such reports.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ok" => Some(IoHealth::Ok),
            "out-of-data" => Some(IoHealth::OutOfData),
            "upstream-error" => Some(IoHealth::UpstreamError),
            _ => None,
        }
    }
}
