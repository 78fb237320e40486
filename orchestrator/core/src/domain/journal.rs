// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Journal port for dropped or malformed control-plane messages.
//!
//! Entries are keyed by [`DropKey`] so the rate limiter in
//! `crate::infrastructure::journal` can enforce a quiet period per
//! `(swarm, signal type, routing key, reason)`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DropReason {
    MalformedRoutingKey,
    SchemaViolation,
    FullOnlyFieldInDelta,
    StaleSequence,
    MissingBaseline,
    UnknownWorker,
    RemovedSwarm,
    HandlerFailed,
    PublishFailed,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DropReason::MalformedRoutingKey => "malformed-routing-key",
            DropReason::SchemaViolation => "schema-violation",
            DropReason::FullOnlyFieldInDelta => "full-only-field-in-delta",
            DropReason::StaleSequence => "stale-sequence",
            DropReason::MissingBaseline => "missing-baseline",
            DropReason::UnknownWorker => "unknown-worker",
            DropReason::RemovedSwarm => "removed-swarm",
            DropReason::HandlerFailed => "handler-failed",
            DropReason::PublishFailed => "publish-failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropKey {
    pub swarm_id: String,
    pub signal_type: String,
    pub routing_key: String,
    pub reason: DropReason,
}

impl DropKey {
    pub fn new(
        swarm_id: impl Into<String>,
        signal_type: impl Into<String>,
        routing_key: impl Into<String>,
        reason: DropReason,
    ) -> Self {
        Self {
            swarm_id: swarm_id.into(),
            signal_type: signal_type.into(),
            routing_key: routing_key.into(),
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub key: DropKey,
    pub detail: String,
    /// Drops for the same key swallowed since the previous entry.
    pub suppressed: u64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JournalError {
    #[error("Journal sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for journal entries. Failures are reported, never retried
/// inline.
pub trait JournalSink: Send + Sync {
    fn write(&self, entry: &JournalEntry) -> Result<(), JournalError>;
}
