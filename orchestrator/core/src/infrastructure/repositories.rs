// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-memory [`SwarmRepository`] keyed by swarm id.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use crate::domain::lifecycle::SwarmRecord;
use crate::domain::repository::{RepositoryError, SwarmRepository};

#[derive(Clone, Default)]
pub struct InMemorySwarmRepository {
    swarms: Arc<DashMap<String, SwarmRecord>>,
}

impl InMemorySwarmRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SwarmRepository for InMemorySwarmRepository {
    async fn create(&self, record: &SwarmRecord) -> Result<(), RepositoryError> {
        match self.swarms.entry(record.swarm_id.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::AlreadyExists(record.swarm_id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn save(&self, record: &SwarmRecord) -> Result<(), RepositoryError> {
        self.swarms.insert(record.swarm_id.clone(), record.clone());
        Ok(())
    }

    async fn find_by_id(&self, swarm_id: &str) -> Result<Option<SwarmRecord>, RepositoryError> {
        Ok(self.swarms.get(swarm_id).map(|r| r.clone()))
    }

    async fn list_all(&self) -> Result<Vec<SwarmRecord>, RepositoryError> {
        let mut records: Vec<SwarmRecord> = self.swarms.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.swarm_id.cmp(&b.swarm_id));
        Ok(records)
    }

    async fn delete(&self, swarm_id: &str) -> Result<(), RepositoryError> {
        self.swarms.remove(swarm_id);
        Ok(())
    }
}
