// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Worker compute port. Implementations launch, stop and remove the worker
//! processes of one swarm; they may be slow and may fail.

use async_trait::async_trait;
use serde_json::Value;
use swarmctl_core::domain::compute::ComputeError;
use tracing::debug;

use crate::domain::worker::WorkerKey;

#[async_trait]
pub trait WorkerCompute: Send + Sync {
    async fn start_workers(
        &self,
        swarm_id: &str,
        workers: &[WorkerKey],
        template: Option<&Value>,
    ) -> Result<(), ComputeError>;

    async fn stop_workers(&self, swarm_id: &str, workers: &[WorkerKey]) -> Result<(), ComputeError>;

    async fn remove_workers(&self, swarm_id: &str, workers: &[WorkerKey]) -> Result<(), ComputeError>;
}

/// For workers managed outside this process.
#[derive(Debug, Default, Clone)]
pub struct NoopWorkerCompute;

#[async_trait]
impl WorkerCompute for NoopWorkerCompute {
    async fn start_workers(
        &self,
        swarm_id: &str,
        workers: &[WorkerKey],
        _template: Option<&Value>,
    ) -> Result<(), ComputeError> {
        debug!(swarm_id = %swarm_id, workers = workers.len(), "start_workers (noop)");
        Ok(())
    }

    async fn stop_workers(&self, swarm_id: &str, workers: &[WorkerKey]) -> Result<(), ComputeError> {
        debug!(swarm_id = %swarm_id, workers = workers.len(), "stop_workers (noop)");
        Ok(())
    }

    async fn remove_workers(&self, swarm_id: &str, workers: &[WorkerKey]) -> Result<(), ComputeError> {
        debug!(swarm_id = %swarm_id, workers = workers.len(), "remove_workers (noop)");
        Ok(())
    }
}
