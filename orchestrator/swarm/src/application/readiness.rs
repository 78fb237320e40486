// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Readiness Tracker
//!
//! Tracks per-worker readiness and snapshot freshness, and answers whether
//! the swarm as a whole is ready for work.
//!
//! A worker becomes ready the first time it reports `enabled=false`: workers
//! announce "up, not yet processing" as their start-up handshake. Readiness
//! is never revoked.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeSet;

use crate::domain::worker::{ReadinessState, WorkerKey};

#[derive(Debug, Default)]
pub struct ReadinessTracker {
    workers: DashMap<WorkerKey, ReadinessState>,
    /// Workers declared by the current template, if any.
    expected: RwLock<Option<BTreeSet<WorkerKey>>>,
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the expected worker set (a new template supersedes the old).
    pub fn expect(&self, workers: BTreeSet<WorkerKey>) {
        *self.expected.write() = Some(workers);
    }

    pub fn update_heartbeat(&self, key: &WorkerKey, at_millis: i64) {
        let mut entry = self.workers.entry(key.clone()).or_default();
        entry.last_snapshot_at_millis = entry.last_snapshot_at_millis.max(at_millis);
    }

    /// Returns true only for the call that moved the worker to ready.
    pub fn mark_ready(&self, key: &WorkerKey) -> bool {
        let mut entry = self.workers.entry(key.clone()).or_default();
        let transitioned = !entry.ready;
        entry.ready = true;
        transitioned
    }

    /// Apply one worker status event.
    pub fn observe(&self, key: &WorkerKey, enabled: Option<bool>, at_millis: i64) -> bool {
        self.update_heartbeat(key, at_millis);
        if enabled == Some(false) {
            self.mark_ready(key)
        } else {
            false
        }
    }

    /// Every known worker (expected plus observed) is ready. Without a
    /// template at least one observed worker is required; a template that
    /// declares no workers is ready immediately.
    pub fn is_ready_for_work(&self) -> bool {
        let expected = self.expected.read();
        let observed_ready = self.workers.iter().all(|entry| entry.ready);
        match expected.as_ref() {
            Some(expected) => {
                observed_ready
                    && expected
                        .iter()
                        .all(|key| self.workers.get(key).is_some_and(|state| state.ready))
            }
            None => !self.workers.is_empty() && observed_ready,
        }
    }

    pub fn state(&self, key: &WorkerKey) -> Option<ReadinessState> {
        self.workers.get(key).map(|state| *state)
    }

    /// Expected and observed workers, sorted.
    pub fn known_workers(&self) -> BTreeSet<WorkerKey> {
        let mut known: BTreeSet<WorkerKey> = self.workers.iter().map(|e| e.key().clone()).collect();
        if let Some(expected) = self.expected.read().as_ref() {
            known.extend(expected.iter().cloned());
        }
        known
    }

    /// Look a worker up by its instance id.
    pub fn find_instance(&self, instance: &str) -> Option<WorkerKey> {
        self.known_workers()
            .into_iter()
            .find(|key| key.instance == instance)
    }

    pub fn snapshot(&self) -> Vec<(WorkerKey, ReadinessState)> {
        self.known_workers()
            .into_iter()
            .map(|key| {
                let state = self.state(&key).unwrap_or_default();
                (key, state)
            })
            .collect()
    }
}
