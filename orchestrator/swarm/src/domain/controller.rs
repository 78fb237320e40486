// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Controller State
//!
//! The per-swarm state owned by exactly one controller task. Nothing outside
//! that task mutates it, which keeps handling serialized per swarm.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use swarmctl_core::domain::lifecycle::SwarmLifecycleStatus;
use swarmctl_core::domain::routing::RoutingError;
use swarmctl_core::domain::scope::{ControlScope, CONTROLLER_ROLE};

use crate::domain::worker::WorkerKey;

/// Who a controller is: the swarm it owns and its own instance id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControllerIdentity {
    pub swarm_id: String,
    pub instance: String,
    scope: ControlScope,
}

impl ControllerIdentity {
    pub fn new(swarm_id: &str, instance: &str) -> Result<Self, RoutingError> {
        let scope = ControlScope::new(swarm_id, CONTROLLER_ROLE, instance)?;
        // ControlScope::new accepts ALL on every axis; a controller is concrete.
        if scope.swarm().is_none() || scope.instance.is_all() {
            return Err(RoutingError::WildcardNotAllowed(format!(
                "{}.{}",
                swarm_id, instance
            )));
        }
        Ok(Self {
            swarm_id: swarm_id.trim().to_string(),
            instance: instance.trim().to_string(),
            scope,
        })
    }

    /// Scope stamped on everything this controller emits.
    pub fn scope(&self) -> &ControlScope {
        &self.scope
    }
}

impl fmt::Display for ControllerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scope)
    }
}

/// Where the controller is in its own lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControllerPhase {
    /// Waiting for a template, or for its workers to become ready.
    Creating,
    /// Template confirmed, workloads never started.
    Ready,
    /// Start accepted, waiting for workers.
    Starting,
    /// Started at least once; workload enablement decides running vs stopped.
    Active,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerState {
    pub phase: ControllerPhase,
    pub controller_enabled: bool,
    pub workloads_enabled: bool,
    pub template_id: Option<String>,
    /// `None` until a template has been accepted.
    pub expected_workers: Option<BTreeSet<WorkerKey>>,
    pub effective_config: Value,
    pub started_at: DateTime<Utc>,
    pub removed: bool,
}

impl ControllerState {
    pub fn new() -> Self {
        Self {
            phase: ControllerPhase::Creating,
            controller_enabled: true,
            workloads_enabled: false,
            template_id: None,
            expected_workers: None,
            effective_config: Value::Object(Map::new()),
            started_at: Utc::now(),
            removed: false,
        }
    }

    /// Lifecycle status reported to the orchestrator as `swarmStatus`.
    pub fn swarm_status(&self) -> SwarmLifecycleStatus {
        match self.phase {
            ControllerPhase::Creating => SwarmLifecycleStatus::Creating,
            ControllerPhase::Ready => SwarmLifecycleStatus::Ready,
            ControllerPhase::Starting => SwarmLifecycleStatus::Starting,
            ControllerPhase::Active if self.workloads_enabled => SwarmLifecycleStatus::Running,
            ControllerPhase::Active => SwarmLifecycleStatus::Stopped,
            ControllerPhase::Failed => SwarmLifecycleStatus::Failed,
        }
    }

    /// Enablement snapshot embedded in confirmations and status events.
    pub fn enablement(&self) -> Value {
        serde_json::json!({
            "enabled": self.controller_enabled,
            "workloadsEnabled": self.workloads_enabled,
            "swarmStatus": self.swarm_status().as_str(),
        })
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_must_be_concrete() {
        let identity = ControllerIdentity::new("sw1", "ctrl-1").unwrap();
        assert_eq!(identity.to_string(), "sw1.swarm-controller.ctrl-1");
        assert!(ControllerIdentity::new("ALL", "ctrl-1").is_err());
        assert!(ControllerIdentity::new("sw1", "ALL").is_err());
        assert!(ControllerIdentity::new("sw1", "").is_err());
    }

    #[test]
    fn test_swarm_status_follows_workloads_once_active() {
        let mut state = ControllerState::new();
        assert_eq!(state.swarm_status(), SwarmLifecycleStatus::Creating);

        state.phase = ControllerPhase::Active;
        assert_eq!(state.swarm_status(), SwarmLifecycleStatus::Stopped);
        state.workloads_enabled = true;
        assert_eq!(state.swarm_status(), SwarmLifecycleStatus::Running);
        assert_eq!(state.enablement()["swarmStatus"], "RUNNING");
    }
}
