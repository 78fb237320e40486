// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Control-Plane Error Taxonomy
//!
//! | Variant | Handling |
//! |---------|----------|
//! | `Validation` | rejected synchronously, never published |
//! | `NotFound` / `Conflict` / `Lifecycle` | rejected synchronously |
//! | `PublishFailure` | idempotency reservation rolled back, caller may retry |
//! | `DownstreamUnavailable` | surfaced as a non-retryable `Error` confirmation with a hint |
//! | `SchemaViolation` | dropped with a rate-limited journal entry |
//! | `MissingBaseline` | not fatal, triggers a status-request resync |
//!
//! Duplicate commands are not errors: they resolve to the original
//! correlation id through the idempotency store.

use thiserror::Error;

use crate::domain::bus::BusError;
use crate::domain::lifecycle::LifecycleError;
use crate::domain::repository::RepositoryError;
use crate::domain::routing::RoutingError;

#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Swarm not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("Failed to publish '{routing_key}': {source}")]
    PublishFailure {
        routing_key: String,
        #[source]
        source: BusError,
    },

    #[error("{message} (hint: {hint})")]
    DownstreamUnavailable { message: String, hint: String },

    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    #[error("No status baseline cached for swarm {0}")]
    MissingBaseline(String),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ControlPlaneError {
    /// Stable machine-readable code used in confirmations and REST bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ControlPlaneError::Validation(_) => "validation",
            ControlPlaneError::NotFound(_) => "not-found",
            ControlPlaneError::Conflict(_) => "conflict",
            ControlPlaneError::Lifecycle(_) => "invalid-transition",
            ControlPlaneError::PublishFailure { .. } => "publish-failure",
            ControlPlaneError::DownstreamUnavailable { .. } => "downstream-unavailable",
            ControlPlaneError::SchemaViolation(_) => "schema-violation",
            ControlPlaneError::MissingBaseline(_) => "missing-baseline",
            ControlPlaneError::Routing(_) => "invalid-routing",
            ControlPlaneError::Repository(_) => "repository",
        }
    }

    /// Only publish failures are worth retrying with the same command.
    pub fn retryable(&self) -> bool {
        matches!(self, ControlPlaneError::PublishFailure { .. })
    }
}
