// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Worker Identity and Readiness
//!
//! - [`WorkerKey`]: `(role, instance)` of one worker inside a swarm.
//! - [`ReadinessState`]: whether the worker completed its start-up handshake.
//! - [`expected_workers`]: the worker set declared by a swarm template.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use swarmctl_core::domain::errors::ControlPlaneError;
use swarmctl_core::domain::scope::{ControlScope, Segment, CONTROLLER_ROLE};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerKey {
    pub role: String,
    pub instance: String,
}

impl WorkerKey {
    pub fn new(role: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            instance: instance.into(),
        }
    }

    /// Worker identity of an event emitted from `scope`. `None` for the
    /// controller itself and for scopes with an `ALL` axis.
    pub fn from_scope(scope: &ControlScope) -> Option<Self> {
        match (&scope.role, &scope.instance) {
            (Segment::Named(role), Segment::Named(instance)) if role != CONTROLLER_ROLE => {
                Some(Self::new(role.clone(), instance.clone()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for WorkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.role, self.instance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessState {
    pub ready: bool,
    pub last_snapshot_at_millis: i64,
}

/// Workers declared by a template of the form
/// `{"workers": [{"role": "generator", "instance": "gen-1"}, ...]}`.
///
/// A missing or null `workers` list declares none.
pub fn expected_workers(template: &Value) -> Result<BTreeSet<WorkerKey>, ControlPlaneError> {
    let invalid = |reason: String| ControlPlaneError::SchemaViolation(format!("template: {}", reason));

    let entries = match template.get("workers") {
        None | Some(Value::Null) => return Ok(BTreeSet::new()),
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(invalid("'workers' must be an array".to_string())),
    };

    let mut workers = BTreeSet::new();
    for (index, entry) in entries.iter().enumerate() {
        let field = |name: &str| {
            entry
                .get(name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| invalid(format!("workers[{}].{} is required", index, name)))
        };
        let role = field("role")?;
        let instance = field("instance")?;
        // Both end up as routing-key segments.
        Segment::named(role).map_err(|e| invalid(e.to_string()))?;
        Segment::named(instance).map_err(|e| invalid(e.to_string()))?;
        if role == CONTROLLER_ROLE {
            return Err(invalid(format!("workers[{}] uses the reserved controller role", index)));
        }
        if !workers.insert(WorkerKey::new(role, instance)) {
            return Err(invalid(format!("duplicate worker {}.{}", role, instance)));
        }
    }
    Ok(workers)
}
