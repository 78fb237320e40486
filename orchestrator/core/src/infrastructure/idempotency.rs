// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-memory [`IdempotencyStore`].
//!
//! Reservation goes through the `DashMap` entry API, which locks only the
//! shard owning the key: exactly one of any number of concurrent callers
//! with the same key inserts, and every other caller reads the winner's
//! correlation id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use crate::domain::repository::{
    IdempotencyKey, IdempotencyRecord, IdempotencyStore, RepositoryError,
};

#[derive(Clone, Default)]
pub struct InMemoryIdempotencyStore {
    records: Arc<DashMap<IdempotencyKey, IdempotencyRecord>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn reserve(
        &self,
        key: &IdempotencyKey,
        candidate: &str,
    ) -> Result<Option<String>, RepositoryError> {
        match self.records.entry(key.clone()) {
            Entry::Occupied(existing) => Ok(Some(existing.get().correlation_id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(IdempotencyRecord {
                    correlation_id: candidate.to_string(),
                    published: false,
                    reserved_at: Utc::now(),
                });
                Ok(None)
            }
        }
    }

    async fn rollback(&self, key: &IdempotencyKey, candidate: &str) -> Result<bool, RepositoryError> {
        let removed = self
            .records
            .remove_if(key, |_, record| {
                record.correlation_id == candidate && !record.published
            })
            .is_some();
        Ok(removed)
    }

    async fn mark_published(
        &self,
        key: &IdempotencyKey,
        correlation_id: &str,
    ) -> Result<(), RepositoryError> {
        match self.records.get_mut(key) {
            Some(mut record) if record.correlation_id == correlation_id => {
                record.published = true;
                Ok(())
            }
            Some(_) => Err(RepositoryError::Storage(format!(
                "idempotency record {} is bound to a different correlation id",
                key
            ))),
            None => Err(RepositoryError::NotFound(key.to_string())),
        }
    }

    async fn find(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>, RepositoryError> {
        Ok(self.records.get(key).map(|record| record.clone()))
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let before = self.records.len();
        self.records.retain(|_, record| record.reserved_at >= cutoff);
        Ok(before.saturating_sub(self.records.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scope::ControlScope;
    use crate::domain::signal::SignalType;

    fn key(idem: &str) -> IdempotencyKey {
        IdempotencyKey::new(
            ControlScope::swarm_wide("sw1").unwrap(),
            SignalType::ConfigUpdate,
            idem,
        )
    }

    #[tokio::test]
    async fn test_first_reservation_wins() {
        let store = InMemoryIdempotencyStore::new();
        assert_eq!(store.reserve(&key("idem-1"), "corrA").await.unwrap(), None);
        assert_eq!(
            store.reserve(&key("idem-1"), "corrB").await.unwrap(),
            Some("corrA".to_string())
        );
        assert_eq!(store.reserve(&key("idem-2"), "corrB").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rollback_only_removes_own_unpublished_record() {
        let store = InMemoryIdempotencyStore::new();
        store.reserve(&key("idem-1"), "corrA").await.unwrap();

        assert!(!store.rollback(&key("idem-1"), "corrB").await.unwrap());
        assert!(store.find(&key("idem-1")).await.unwrap().is_some());

        store.mark_published(&key("idem-1"), "corrA").await.unwrap();
        assert!(!store.rollback(&key("idem-1"), "corrA").await.unwrap());

        store.reserve(&key("idem-2"), "corrC").await.unwrap();
        assert!(store.rollback(&key("idem-2"), "corrC").await.unwrap());
        assert_eq!(store.reserve(&key("idem-2"), "corrD").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mark_published_checks_binding() {
        let store = InMemoryIdempotencyStore::new();
        assert!(matches!(
            store.mark_published(&key("missing"), "corr").await,
            Err(RepositoryError::NotFound(_))
        ));
        store.reserve(&key("idem-1"), "corrA").await.unwrap();
        assert!(store.mark_published(&key("idem-1"), "corrB").await.is_err());
    }

    #[tokio::test]
    async fn test_purge_older_than() {
        let store = InMemoryIdempotencyStore::new();
        store.reserve(&key("idem-1"), "corrA").await.unwrap();
        let removed = store
            .purge_older_than(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reservations_resolve_to_one_winner() {
        let store = InMemoryIdempotencyStore::new();
        let mut handles = Vec::new();
        for i in 0..64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let candidate = format!("corr-{}", i);
                let existing = store.reserve(&key("race"), &candidate).await.unwrap();
                (candidate, existing)
            }));
        }

        let mut winners = Vec::new();
        let mut observed = Vec::new();
        for handle in handles {
            let (candidate, existing) = handle.await.unwrap();
            match existing {
                None => winners.push(candidate),
                Some(id) => observed.push(id),
            }
        }

        assert_eq!(winners.len(), 1);
        assert!(observed.iter().all(|id| id == &winners[0]));
        assert_eq!(observed.len(), 63);
    }
}
