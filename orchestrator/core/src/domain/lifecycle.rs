// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Lifecycle State Machine
//!
//! Orchestrator-owned status of each swarm and its restricted transition
//! table:
//!
//! ```text
//! CREATING -> READY | FAILED
//! READY    -> STARTING | FAILED
//! STARTING -> RUNNING | FAILED
//! RUNNING  -> STOPPING | FAILED
//! STOPPING -> STOPPED | FAILED
//! STOPPED  -> STARTING | FAILED
//! FAILED   -> STOPPED
//! ```
//!
//! Self-transitions are accepted as no-ops. Status inferred from controller
//! telemetry is applied by walking the shortest legal path
//! ([`SwarmLifecycleStatus::path_to`]) instead of jumping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwarmLifecycleStatus {
    Creating,
    Ready,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("Illegal lifecycle transition {from} -> {to}")]
    InvalidTransition {
        from: SwarmLifecycleStatus,
        to: SwarmLifecycleStatus,
    },

    #[error("Unknown swarm status '{0}'")]
    UnknownStatus(String),
}

impl SwarmLifecycleStatus {
    pub const ALL: [SwarmLifecycleStatus; 7] = [
        SwarmLifecycleStatus::Creating,
        SwarmLifecycleStatus::Ready,
        SwarmLifecycleStatus::Starting,
        SwarmLifecycleStatus::Running,
        SwarmLifecycleStatus::Stopping,
        SwarmLifecycleStatus::Stopped,
        SwarmLifecycleStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SwarmLifecycleStatus::Creating => "CREATING",
            SwarmLifecycleStatus::Ready => "READY",
            SwarmLifecycleStatus::Starting => "STARTING",
            SwarmLifecycleStatus::Running => "RUNNING",
            SwarmLifecycleStatus::Stopping => "STOPPING",
            SwarmLifecycleStatus::Stopped => "STOPPED",
            SwarmLifecycleStatus::Failed => "FAILED",
        }
    }

    /// Direct successors, excluding the implicit self-transition.
    pub fn successors(&self) -> &'static [SwarmLifecycleStatus] {
        use SwarmLifecycleStatus::*;
        match self {
            Creating => &[Ready, Failed],
            Ready => &[Starting, Failed],
            Starting => &[Running, Failed],
            Running => &[Stopping, Failed],
            Stopping => &[Stopped, Failed],
            Stopped => &[Starting, Failed],
            Failed => &[Stopped],
        }
    }

    pub fn can_transition_to(&self, target: SwarmLifecycleStatus) -> bool {
        *self == target || self.successors().contains(&target)
    }

    /// Validate one step. Returns the new status (unchanged for a no-op).
    pub fn transition(self, target: SwarmLifecycleStatus) -> Result<Self, LifecycleError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(LifecycleError::InvalidTransition {
                from: self,
                to: target,
            })
        }
    }

    /// Shortest legal walk from `self` to `target`, excluding `self`.
    ///
    /// `FAILED` is only ever the final step of a walk, never an intermediate
    /// one. Returns an empty path when already at `target` and `None` when
    /// the target is unreachable.
    pub fn path_to(self, target: SwarmLifecycleStatus) -> Option<Vec<SwarmLifecycleStatus>> {
        if self == target {
            return Some(Vec::new());
        }

        let mut previous: HashMap<SwarmLifecycleStatus, SwarmLifecycleStatus> = HashMap::new();
        let mut queue = VecDeque::from([self]);

        while let Some(current) = queue.pop_front() {
            for &next in current.successors() {
                if next == self || previous.contains_key(&next) {
                    continue;
                }
                if next == SwarmLifecycleStatus::Failed && target != SwarmLifecycleStatus::Failed {
                    continue;
                }
                previous.insert(next, current);
                if next == target {
                    let mut path = vec![target];
                    let mut cursor = target;
                    while let Some(&step) = previous.get(&cursor) {
                        if step == self {
                            break;
                        }
                        path.push(step);
                        cursor = step;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }
        None
    }
}

impl fmt::Display for SwarmLifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwarmLifecycleStatus {
    type Err = LifecycleError;

    /// Case-insensitive; anything outside the enum is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        SwarmLifecycleStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| LifecycleError::UnknownStatus(s.to_string()))
    }
}

/// REST lifecycle actions checked against the current status before any
/// idempotency reservation is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Start,
    Stop,
    Remove,
}

impl LifecycleAction {
    /// The transition to apply once the signal is published, `None` when the
    /// swarm is already where the action would take it.
    pub fn planned_transition(
        self,
        current: SwarmLifecycleStatus,
    ) -> Result<Option<SwarmLifecycleStatus>, LifecycleError> {
        use SwarmLifecycleStatus::*;
        match (self, current) {
            (LifecycleAction::Start, Starting | Running) => Ok(None),
            (LifecycleAction::Start, Ready | Stopped) => Ok(Some(Starting)),
            (LifecycleAction::Start, from) => Err(LifecycleError::InvalidTransition {
                from,
                to: Starting,
            }),
            (LifecycleAction::Stop, Stopping | Stopped | Ready) => Ok(None),
            (LifecycleAction::Stop, Running) => Ok(Some(Stopping)),
            (LifecycleAction::Stop, Failed) => Ok(Some(Stopped)),
            (LifecycleAction::Stop, from) => Err(LifecycleError::InvalidTransition {
                from,
                to: Stopping,
            }),
            (LifecycleAction::Remove, _) => Ok(None),
        }
    }
}

/// Per-swarm record owned by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmRecord {
    pub swarm_id: String,
    pub status: SwarmLifecycleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_instance: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status_at: Option<DateTime<Utc>>,
}

impl SwarmRecord {
    pub fn new(swarm_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            swarm_id: swarm_id.into(),
            status: SwarmLifecycleStatus::Creating,
            template_id: None,
            controller_instance: None,
            created_at: now,
            updated_at: now,
            last_status_at: None,
        }
    }

    /// Apply one legal step. Returns whether the status changed.
    pub fn apply(&mut self, target: SwarmLifecycleStatus) -> Result<bool, LifecycleError> {
        let next = self.status.transition(target)?;
        if next == self.status {
            return Ok(false);
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(true)
    }

    /// Walk through every intermediate state to reach `target`.
    /// Returns the statuses visited, empty for a no-op.
    pub fn walk_to(
        &mut self,
        target: SwarmLifecycleStatus,
    ) -> Result<Vec<SwarmLifecycleStatus>, LifecycleError> {
        let path = self
            .status
            .path_to(target)
            .ok_or(LifecycleError::InvalidTransition {
                from: self.status,
                to: target,
            })?;
        for &step in &path {
            self.apply(step)?;
        }
        Ok(path)
    }
}
