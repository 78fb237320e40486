// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Routing Keys
//!
//! Pure, total mapping between `(type, scope)` and wire routing keys:
//!
//! ```text
//! signal.<type>.<swarmId>.<role>.<instance>
//! event.<kind>.<type>.<swarmId>.<role>.<instance>
//! ```
//!
//! | Event | Kind | Type token |
//! |-------|------|------------|
//! | ready confirmation | `outcome` | `ready` |
//! | error confirmation | `outcome` | `error` |
//! | status-full | `metric` | `status-full` |
//! | status-delta | `metric` | `status-delta` |
//! | alert | `alert` | `alert` |
//!
//! Parsing is strict: a key missing the role or instance segment is an
//! error, never silently defaulted. [`binding_matches`] implements topic
//! exchange semantics (`*` = one word, `#` = zero or more words) for
//! subscriptions.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::scope::{ControlScope, Segment};
use crate::domain::signal::SignalType;

pub const SIGNAL_PREFIX: &str = "signal";
pub const EVENT_PREFIX: &str = "event";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("Routing key segment must not be empty")]
    EmptySegment,

    #[error("Invalid routing key segment: '{0}'")]
    InvalidSegment(String),

    #[error("'{0}' must name a concrete entity, ALL is not allowed here")]
    WildcardNotAllowed(String),

    #[error("Unknown signal type: '{0}'")]
    UnknownSignal(String),

    #[error("Unknown event '{kind}.{event_type}'")]
    UnknownEvent { kind: String, event_type: String },

    #[error("Malformed routing key '{key}': {reason}")]
    Malformed { key: String, reason: String },
}

/// Second segment of an event routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Outcome,
    Alert,
    Metric,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Outcome => "outcome",
            EventKind::Alert => "alert",
            EventKind::Metric => "metric",
        }
    }
}

/// Event type token, which also fixes the [`EventKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Ready,
    Error,
    StatusFull,
    StatusDelta,
    Alert,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::Ready,
        EventType::Error,
        EventType::StatusFull,
        EventType::StatusDelta,
        EventType::Alert,
    ];

    pub fn kind(&self) -> EventKind {
        match self {
            EventType::Ready | EventType::Error => EventKind::Outcome,
            EventType::StatusFull | EventType::StatusDelta => EventKind::Metric,
            EventType::Alert => EventKind::Alert,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Ready => "ready",
            EventType::Error => "error",
            EventType::StatusFull => "status-full",
            EventType::StatusDelta => "status-delta",
            EventType::Alert => "alert",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind().as_str(), self.as_str())
    }
}

/// A routing key decoded back into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRoutingKey {
    Signal {
        signal: SignalType,
        scope: ControlScope,
    },
    Event {
        event: EventType,
        scope: ControlScope,
    },
}

impl ParsedRoutingKey {
    pub fn scope(&self) -> &ControlScope {
        match self {
            ParsedRoutingKey::Signal { scope, .. } | ParsedRoutingKey::Event { scope, .. } => scope,
        }
    }
}

/// `signal.<type>.<swarmId>.<role>.<instance>`
pub fn signal_key(signal: SignalType, scope: &ControlScope) -> String {
    format!("{}.{}.{}", SIGNAL_PREFIX, signal.as_str(), scope)
}

/// `event.<kind>.<type>.<swarmId>.<role>.<instance>`
pub fn event_key(event: EventType, scope: &ControlScope) -> String {
    format!(
        "{}.{}.{}.{}",
        EVENT_PREFIX,
        event.kind().as_str(),
        event.as_str(),
        scope
    )
}

/// Decode a routing key, failing fast on any missing or malformed segment.
pub fn parse(key: &str) -> Result<ParsedRoutingKey, RoutingError> {
    let malformed = |reason: &str| RoutingError::Malformed {
        key: key.to_string(),
        reason: reason.to_string(),
    };
    let parts: Vec<&str> = key.split('.').collect();

    match parts.first().copied() {
        Some(SIGNAL_PREFIX) => {
            if parts.len() != 5 {
                return Err(malformed(
                    "expected signal.<type>.<swarmId>.<role>.<instance>",
                ));
            }
            let signal: SignalType = parts[1].parse()?;
            let scope = scope_from(&parts[2..5]).map_err(|e| malformed(&e.to_string()))?;
            Ok(ParsedRoutingKey::Signal { signal, scope })
        }
        Some(EVENT_PREFIX) => {
            if parts.len() != 6 {
                return Err(malformed(
                    "expected event.<kind>.<type>.<swarmId>.<role>.<instance>",
                ));
            }
            let event = EventType::ALL
                .into_iter()
                .find(|e| e.kind().as_str() == parts[1] && e.as_str() == parts[2])
                .ok_or_else(|| RoutingError::UnknownEvent {
                    kind: parts[1].to_string(),
                    event_type: parts[2].to_string(),
                })?;
            let scope = scope_from(&parts[3..6]).map_err(|e| malformed(&e.to_string()))?;
            Ok(ParsedRoutingKey::Event { event, scope })
        }
        _ => Err(malformed("unknown prefix")),
    }
}

fn scope_from(parts: &[&str]) -> Result<ControlScope, RoutingError> {
    Ok(ControlScope {
        swarm_id: Segment::parse(parts[0])?,
        role: Segment::parse(parts[1])?,
        instance: Segment::parse(parts[2])?,
    })
}

/// Topic-exchange style binding match: `*` matches exactly one word,
/// `#` matches zero or more words.
pub fn binding_matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = key.split('.').collect();
    matches_from(&pattern, &key)
}

fn matches_from(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_from(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&head, tail)) if word == "*" || word == head => matches_from(rest, tail),
            _ => false,
        },
    }
}

/// Topics a caller can watch for the outcome of an accepted command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchTopics {
    pub success_topic: String,
    pub error_topic: String,
}

impl WatchTopics {
    /// Confirmations are emitted by the confirming controller, whose instance
    /// id is not known to the caller, so `ALL` axes become `*` bindings.
    pub fn for_scope(scope: &ControlScope) -> Self {
        let pattern = scope.binding_pattern();
        Self {
            success_topic: format!("{}.outcome.ready.{}", EVENT_PREFIX, pattern),
            error_topic: format!("{}.outcome.error.{}", EVENT_PREFIX, pattern),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_key_example() {
        let scope = ControlScope::new("sw1", "processor", "p1").unwrap();
        assert_eq!(
            signal_key(SignalType::ConfigUpdate, &scope),
            "signal.config-update.sw1.processor.p1"
        );
    }

    #[test]
    fn test_event_keys_use_expected_kind() {
        let scope = ControlScope::new("sw1", "swarm-controller", "ctrl-1").unwrap();
        assert_eq!(
            event_key(EventType::Ready, &scope),
            "event.outcome.ready.sw1.swarm-controller.ctrl-1"
        );
        assert_eq!(
            event_key(EventType::StatusDelta, &scope),
            "event.metric.status-delta.sw1.swarm-controller.ctrl-1"
        );
        assert_eq!(
            event_key(EventType::Alert, &scope),
            "event.alert.alert.sw1.swarm-controller.ctrl-1"
        );
    }

    #[test]
    fn test_parse_inverts_key_builders() {
        let scope = ControlScope::new("sw1", "ALL", "ALL").unwrap();
        let key = signal_key(SignalType::SwarmStart, &scope);
        assert_eq!(
            parse(&key).unwrap(),
            ParsedRoutingKey::Signal {
                signal: SignalType::SwarmStart,
                scope: scope.clone()
            }
        );

        let key = event_key(EventType::StatusFull, &scope);
        assert_eq!(
            parse(&key).unwrap(),
            ParsedRoutingKey::Event {
                event: EventType::StatusFull,
                scope
            }
        );
    }

    #[test]
    fn test_parse_rejects_missing_segments() {
        assert!(parse("signal.swarm-start.sw1.swarm-controller").is_err());
        assert!(parse("signal.swarm-start.sw1").is_err());
        assert!(parse("event.outcome.ready.sw1.processor").is_err());
        assert!(parse("signal.swarm-start.sw1..p1").is_err());
        assert!(parse("signal.swarm-start.sw1.processor.").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_vocabulary() {
        assert!(matches!(
            parse("signal.reboot.sw1.processor.p1"),
            Err(RoutingError::UnknownSignal(_))
        ));
        assert!(matches!(
            parse("event.metric.ready.sw1.processor.p1"),
            Err(RoutingError::UnknownEvent { .. })
        ));
        assert!(parse("command.swarm-start.sw1.processor.p1").is_err());
    }

    #[test]
    fn test_binding_matches() {
        assert!(binding_matches("event.outcome.#", "event.outcome.ready.sw1.a.b"));
        assert!(binding_matches("event.#", "event"));
        assert!(binding_matches(
            "signal.*.sw1.swarm-controller.*",
            "signal.swarm-start.sw1.swarm-controller.ALL"
        ));
        assert!(!binding_matches(
            "signal.*.sw1.swarm-controller.*",
            "signal.swarm-start.sw2.swarm-controller.ALL"
        ));
        assert!(!binding_matches("event.*", "event.outcome.ready"));
        assert!(binding_matches("#.ready.#", "event.outcome.ready.sw1.a.b"));
    }

    #[test]
    fn test_watch_topics_for_controller_scope() {
        let topics = WatchTopics::for_scope(&ControlScope::controller("sw1").unwrap());
        assert_eq!(topics.success_topic, "event.outcome.ready.sw1.swarm-controller.*");
        assert_eq!(topics.error_topic, "event.outcome.error.sw1.swarm-controller.*");
        assert!(binding_matches(
            &topics.success_topic,
            "event.outcome.ready.sw1.swarm-controller.ctrl-7"
        ));
    }
}
