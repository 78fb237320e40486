// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Control Scope Value Objects
//!
//! Every signal and confirmation on the control plane is addressed by a
//! `(swarmId, role, instance)` triple. Each axis is either a concrete name or
//! the broadcast sentinel `ALL`.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Segment`] | One validated axis of a scope (`ALL` or a name) |
//! | [`ControlScope`] | Addressee of a signal / origin of a confirmation |
//! | [`CommandTarget`] | Declared fan-out breadth of a `config-update` |
//!
//! Segments are validated on construction so that a scope can always be
//! rendered into a routing key: names are never blank and never contain the
//! `.` separator or the topic wildcards `*` / `#`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::routing::RoutingError;

/// Broadcast sentinel recognised on every scope axis.
pub const ALL: &str = "ALL";

/// Role name under which every swarm controller is addressed.
pub const CONTROLLER_ROLE: &str = "swarm-controller";

/// Role name used by the orchestrator when it originates signals.
pub const ORCHESTRATOR_ROLE: &str = "orchestrator";

/// One axis of a [`ControlScope`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Segment {
    /// Broadcast along this axis.
    All,
    /// A concrete swarm id, role name or instance id.
    Named(String),
}

impl Segment {
    /// Parse a raw segment, mapping the literal `ALL` to [`Segment::All`].
    pub fn parse(raw: &str) -> Result<Self, RoutingError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RoutingError::EmptySegment);
        }
        if trimmed.contains(['.', '*', '#']) || trimmed.chars().any(char::is_whitespace) {
            return Err(RoutingError::InvalidSegment(raw.to_string()));
        }
        if trimmed == ALL {
            return Ok(Segment::All);
        }
        Ok(Segment::Named(trimmed.to_string()))
    }

    /// Parse a segment that must name something concrete (no `ALL`).
    pub fn named(raw: &str) -> Result<Self, RoutingError> {
        match Self::parse(raw)? {
            Segment::All => Err(RoutingError::WildcardNotAllowed(raw.to_string())),
            named => Ok(named),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Segment::All)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Segment::All => ALL,
            Segment::Named(name) => name,
        }
    }

    /// `ALL` on either side matches anything; otherwise names must be equal.
    pub fn covers(&self, other: &Segment) -> bool {
        match (self, other) {
            (Segment::All, _) | (_, Segment::All) => true,
            (Segment::Named(a), Segment::Named(b)) => a == b,
        }
    }
}

impl TryFrom<String> for Segment {
    type Error = RoutingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Segment::parse(&value)
    }
}

impl From<Segment> for String {
    fn from(value: Segment) -> Self {
        match value {
            Segment::All => ALL.to_string(),
            Segment::Named(name) => name,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Addressee of a signal, or the originator of a confirmation.
///
/// Immutable once built; all constructors validate every axis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlScope {
    pub swarm_id: Segment,
    pub role: Segment,
    pub instance: Segment,
}

/// Confirmations carry the same shape, scoped to the confirming entity.
pub type ConfirmationScope = ControlScope;

impl ControlScope {
    pub fn new(swarm_id: &str, role: &str, instance: &str) -> Result<Self, RoutingError> {
        Ok(Self {
            swarm_id: Segment::parse(swarm_id)?,
            role: Segment::parse(role)?,
            instance: Segment::parse(instance)?,
        })
    }

    /// Scope addressing every controller instance of one swarm.
    pub fn controller(swarm_id: &str) -> Result<Self, RoutingError> {
        Ok(Self {
            swarm_id: Segment::named(swarm_id)?,
            role: Segment::Named(CONTROLLER_ROLE.to_string()),
            instance: Segment::All,
        })
    }

    /// Scope broadcasting to every role and instance of one swarm.
    pub fn swarm_wide(swarm_id: &str) -> Result<Self, RoutingError> {
        Ok(Self {
            swarm_id: Segment::named(swarm_id)?,
            role: Segment::All,
            instance: Segment::All,
        })
    }

    /// Identity of an orchestrator instance; not bound to any swarm.
    pub fn orchestrator(instance_id: &str) -> Result<Self, RoutingError> {
        Ok(Self {
            swarm_id: Segment::All,
            role: Segment::Named(ORCHESTRATOR_ROLE.to_string()),
            instance: Segment::named(instance_id)?,
        })
    }

    /// Copy of this scope with the role and instance axes replaced.
    pub fn with_role_instance(&self, role: Segment, instance: Segment) -> Self {
        Self {
            swarm_id: self.swarm_id.clone(),
            role,
            instance,
        }
    }

    /// Concrete swarm id, if this scope names one.
    pub fn swarm(&self) -> Option<&str> {
        match &self.swarm_id {
            Segment::All => None,
            Segment::Named(id) => Some(id),
        }
    }

    /// True when a signal addressed to `self` reaches the entity at `other`.
    pub fn applies_to(&self, other: &ControlScope) -> bool {
        self.swarm_id.covers(&other.swarm_id)
            && self.role.covers(&other.role)
            && self.instance.covers(&other.instance)
    }

    pub fn is_controller(&self) -> bool {
        self.role.as_str() == CONTROLLER_ROLE
    }

    /// Topic binding that matches events from this scope, with `ALL` axes
    /// widened to single-word wildcards.
    pub fn binding_pattern(&self) -> String {
        let axis = |segment: &Segment| match segment {
            Segment::All => "*".to_string(),
            Segment::Named(name) => name.clone(),
        };
        format!(
            "{}.{}.{}",
            axis(&self.swarm_id),
            axis(&self.role),
            axis(&self.instance)
        )
    }
}

impl fmt::Display for ControlScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.swarm_id, self.role, self.instance)
    }
}

/// Fan-out breadth of a `config-update` command.
///
/// Independent of the scope naming the controller / role / instance that
/// receives the message. Absent on the wire means [`CommandTarget::Instance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandTarget {
    #[serde(alias = "all")]
    All,
    #[serde(alias = "swarm")]
    Swarm,
    #[serde(alias = "role")]
    Role,
    #[default]
    #[serde(alias = "instance")]
    Instance,
}

impl fmt::Display for CommandTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandTarget::All => "ALL",
            CommandTarget::Swarm => "SWARM",
            CommandTarget::Role => "ROLE",
            CommandTarget::Instance => "INSTANCE",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_parsing() {
        assert_eq!(Segment::parse("ALL").unwrap(), Segment::All);
        assert_eq!(
            Segment::parse(" processor ").unwrap(),
            Segment::Named("processor".to_string())
        );
        assert!(matches!(Segment::parse(""), Err(RoutingError::EmptySegment)));
        assert!(matches!(Segment::parse("   "), Err(RoutingError::EmptySegment)));
        assert!(Segment::parse("a.b").is_err());
        assert!(Segment::parse("a*").is_err());
        assert!(Segment::parse("has space").is_err());
        assert!(Segment::named("ALL").is_err());
    }

    #[test]
    fn test_scope_serializes_camel_case() {
        let scope = ControlScope::new("sw1", "processor", "ALL").unwrap();
        let json = serde_json::to_value(&scope).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"swarmId": "sw1", "role": "processor", "instance": "ALL"})
        );

        let parsed: ControlScope = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, scope);
        assert!(parsed.instance.is_all());
    }

    #[test]
    fn test_scope_rejects_blank_segment_on_deserialize() {
        let result: Result<ControlScope, _> = serde_json::from_value(
            serde_json::json!({"swarmId": "sw1", "role": "", "instance": "p1"}),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_applies_to() {
        let controller = ControlScope::new("sw1", CONTROLLER_ROLE, "ctrl-1").unwrap();
        assert!(ControlScope::swarm_wide("sw1").unwrap().applies_to(&controller));
        assert!(ControlScope::controller("sw1").unwrap().applies_to(&controller));
        assert!(!ControlScope::swarm_wide("sw2").unwrap().applies_to(&controller));
        assert!(!ControlScope::new("sw1", "processor", "ALL")
            .unwrap()
            .applies_to(&controller));
    }

    #[test]
    fn test_binding_pattern_widens_all() {
        let scope = ControlScope::controller("sw1").unwrap();
        assert_eq!(scope.binding_pattern(), "sw1.swarm-controller.*");
    }

    #[test]
    fn test_command_target_default_and_wire_names() {
        assert_eq!(CommandTarget::default(), CommandTarget::Instance);
        let target: CommandTarget = serde_json::from_str("\"SWARM\"").unwrap();
        assert_eq!(target, CommandTarget::Swarm);
        let target: CommandTarget = serde_json::from_str("\"role\"").unwrap();
        assert_eq!(target, CommandTarget::Role);
        assert_eq!(serde_json::to_string(&CommandTarget::All).unwrap(), "\"ALL\"");
    }
}
