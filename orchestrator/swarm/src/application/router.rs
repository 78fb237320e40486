// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Command Router
//!
//! Resolves where a `config-update` goes: the controller itself, one or more
//! forward routing keys, or both.
//!
//! | Target | Local effect | Forwards |
//! |--------|--------------|----------|
//! | `data.worker` set | none | that worker's key |
//! | `ALL` | controller, if the scope covers it | one re-broadcast, first sighting only |
//! | `SWARM` | controller and workloads | none |
//! | `ROLE` | controller, if the role is the controller's | `<role>.ALL` otherwise |
//! | `INSTANCE` | controller, if the instance is this controller | `<role>.<instance>` otherwise |
//!
//! `ALL` commands are remembered by `(origin, correlationId)` in a bounded
//! set. A second sighting is a duplicate; the controller's own re-broadcast
//! coming back on the broadcast key is an echo and is ignored.

use std::collections::{HashSet, VecDeque};
use swarmctl_core::domain::errors::ControlPlaneError;
use swarmctl_core::domain::routing::signal_key;
use swarmctl_core::domain::scope::{CommandTarget, ControlScope, Segment, CONTROLLER_ROLE};
use swarmctl_core::domain::signal::{ControlSignal, SignalType};

use crate::application::readiness::ReadinessTracker;
use crate::domain::controller::ControllerIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalEffect {
    None,
    /// Toggle controller enablement only.
    Controller,
    /// Toggle controller and workload enablement.
    ControllerAndWorkloads,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePlan {
    pub local: LocalEffect,
    /// Routing keys on which the signal is re-published unmodified.
    pub forwards: Vec<String>,
    /// Already processed; acknowledge without side effects.
    pub duplicate: bool,
    /// Our own re-broadcast arriving back; ignore entirely.
    pub echo: bool,
}

impl RoutePlan {
    fn act(local: LocalEffect, forwards: Vec<String>) -> Self {
        Self {
            local,
            forwards,
            duplicate: false,
            echo: false,
        }
    }

    fn duplicate() -> Self {
        Self {
            duplicate: true,
            ..Self::act(LocalEffect::None, Vec::new())
        }
    }

    fn echo() -> Self {
        Self {
            echo: true,
            ..Self::act(LocalEffect::None, Vec::new())
        }
    }
}

/// Insertion-ordered set that forgets its oldest entries past `capacity`.
#[derive(Debug)]
struct SeenSet {
    order: VecDeque<(String, String)>,
    members: HashSet<(String, String)>,
    capacity: usize,
}

impl SeenSet {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// True if the entry was not present.
    fn insert(&mut self, entry: (String, String)) -> bool {
        if self.members.contains(&entry) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.order.push_back(entry.clone());
        self.members.insert(entry);
        true
    }
}

#[derive(Debug)]
pub struct CommandRouter {
    identity: ControllerIdentity,
    broadcast_key: String,
    seen: SeenSet,
}

impl CommandRouter {
    pub fn new(identity: ControllerIdentity, seen_capacity: usize) -> Result<Self, ControlPlaneError> {
        let broadcast_key = signal_key(
            SignalType::ConfigUpdate,
            &ControlScope::swarm_wide(&identity.swarm_id)?,
        );
        Ok(Self {
            identity,
            broadcast_key,
            seen: SeenSet::new(seen_capacity),
        })
    }

    /// Key every worker of the swarm is bound to.
    pub fn broadcast_key(&self) -> &str {
        &self.broadcast_key
    }

    /// Remember a broadcast this controller is about to publish itself.
    pub fn remember(&mut self, signal: &ControlSignal) {
        self.seen.insert(seen_key(signal));
    }

    pub fn resolve(
        &mut self,
        routing_key: &str,
        signal: &ControlSignal,
        readiness: &ReadinessTracker,
    ) -> Result<RoutePlan, ControlPlaneError> {
        if signal.signal != SignalType::ConfigUpdate {
            return Err(ControlPlaneError::Validation(format!(
                "{} is not routed by target",
                signal.signal
            )));
        }

        if let Some(worker) = signal.worker_hint() {
            let key = readiness
                .find_instance(worker)
                .ok_or_else(|| ControlPlaneError::NotFound(format!("worker {}", worker)))?;
            let scope = signal
                .scope
                .with_role_instance(Segment::named(&key.role)?, Segment::named(&key.instance)?);
            return Ok(RoutePlan::act(
                LocalEffect::None,
                vec![signal_key(SignalType::ConfigUpdate, &scope)],
            ));
        }

        let own = self.identity.scope();
        match signal.command_target {
            CommandTarget::All => {
                let first = self.seen.insert(seen_key(signal));
                let on_broadcast_key = routing_key == self.broadcast_key;
                if !first {
                    return Ok(if on_broadcast_key {
                        RoutePlan::echo()
                    } else {
                        RoutePlan::duplicate()
                    });
                }
                let local = if signal.scope.applies_to(own) {
                    LocalEffect::Controller
                } else {
                    LocalEffect::None
                };
                // Something that arrived on the broadcast key already reached every worker.
                let forwards = if on_broadcast_key {
                    Vec::new()
                } else {
                    vec![self.broadcast_key.clone()]
                };
                Ok(RoutePlan::act(local, forwards))
            }
            CommandTarget::Swarm => Ok(RoutePlan::act(LocalEffect::ControllerAndWorkloads, Vec::new())),
            CommandTarget::Role => {
                let role = match &signal.scope.role {
                    Segment::Named(role) => role,
                    Segment::All => {
                        return Err(ControlPlaneError::Validation(
                            "ROLE target requires a named role".to_string(),
                        ))
                    }
                };
                if role == CONTROLLER_ROLE {
                    return Ok(RoutePlan::act(LocalEffect::Controller, Vec::new()));
                }
                let scope = signal
                    .scope
                    .with_role_instance(signal.scope.role.clone(), Segment::All);
                Ok(RoutePlan::act(
                    LocalEffect::None,
                    vec![signal_key(SignalType::ConfigUpdate, &scope)],
                ))
            }
            CommandTarget::Instance => {
                if signal.scope.instance == own.instance && signal.scope.role.covers(&own.role) {
                    return Ok(RoutePlan::act(LocalEffect::Controller, Vec::new()));
                }
                if signal.scope.role.is_all() || signal.scope.instance.is_all() {
                    return Err(ControlPlaneError::Validation(
                        "INSTANCE target requires a named role and instance".to_string(),
                    ));
                }
                Ok(RoutePlan::act(
                    LocalEffect::None,
                    vec![signal_key(SignalType::ConfigUpdate, &signal.scope)],
                ))
            }
        }
    }
}

fn seen_key(signal: &ControlSignal) -> (String, String) {
    (
        signal.origin.clone().unwrap_or_default(),
        signal.correlation_id.clone(),
    )
}
