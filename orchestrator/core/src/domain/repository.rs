// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the orchestrator's control-plane state,
//! implemented in `crate::infrastructure`.
//!
//! | Trait | Holds | Implementations |
//! |-------|-------|----------------|
//! | `SwarmRepository` | `SwarmRecord` per swarm id | `InMemorySwarmRepository` |
//! | `IdempotencyStore` | `(scope, signal, key) -> correlationId` | `InMemoryIdempotencyStore` |
//!
//! Implementations must use per-key synchronization: operations on different
//! swarms or different idempotency keys never contend on a global lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::lifecycle::SwarmRecord;
use crate::domain::scope::ControlScope;
use crate::domain::signal::SignalType;

/// Repository interface for per-swarm lifecycle records.
#[async_trait]
pub trait SwarmRepository: Send + Sync {
    /// Insert a new record; fails with `AlreadyExists` if the id is taken.
    async fn create(&self, record: &SwarmRecord) -> Result<(), RepositoryError>;

    /// Save record (create or update)
    async fn save(&self, record: &SwarmRecord) -> Result<(), RepositoryError>;

    /// Find record by swarm id
    async fn find_by_id(&self, swarm_id: &str) -> Result<Option<SwarmRecord>, RepositoryError>;

    /// List all records
    async fn list_all(&self) -> Result<Vec<SwarmRecord>, RepositoryError>;

    /// Delete record by swarm id; deleting an unknown id is not an error.
    async fn delete(&self, swarm_id: &str) -> Result<(), RepositoryError>;
}

/// Deduplication key for a command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdempotencyKey {
    pub scope: ControlScope,
    pub signal: SignalType,
    pub idempotency_key: String,
}

impl IdempotencyKey {
    pub fn new(scope: ControlScope, signal: SignalType, idempotency_key: impl Into<String>) -> Self {
        Self {
            scope,
            signal,
            idempotency_key: idempotency_key.into(),
        }
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.scope, self.signal, self.idempotency_key)
    }
}

/// Stored mapping for an [`IdempotencyKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdempotencyRecord {
    pub correlation_id: String,
    pub published: bool,
    pub reserved_at: DateTime<Utc>,
}

/// Maps a command's key triple to the correlation id of the one publish it
/// is allowed to cause.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically bind `candidate` to `key` if unbound and return `None`
    /// (caller must publish). If bound, return the existing correlation id
    /// (caller must not publish again).
    async fn reserve(
        &self,
        key: &IdempotencyKey,
        candidate: &str,
    ) -> Result<Option<String>, RepositoryError>;

    /// Remove the binding only if it still maps to `candidate` and has not
    /// been marked published. Returns whether a record was removed.
    async fn rollback(&self, key: &IdempotencyKey, candidate: &str) -> Result<bool, RepositoryError>;

    /// Record that the publish for `correlation_id` succeeded.
    async fn mark_published(
        &self,
        key: &IdempotencyKey,
        correlation_id: &str,
    ) -> Result<(), RepositoryError>;

    /// Read-only lookup.
    async fn find(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>, RepositoryError>;

    /// Drop records reserved before `cutoff`. Returns how many were removed.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(String),
}
