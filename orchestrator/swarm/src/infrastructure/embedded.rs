// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedded controller compute
//!
//! Runs each swarm's controller as a task inside the orchestrator process,
//! attached to the same in-memory bus. Used by `swarmctl serve` when
//! `controllers.embedded` is set, and by integration tests.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use swarmctl_core::domain::compute::{ComputeError, ControllerCompute};
use swarmctl_core::infrastructure::event_bus::InMemoryControlBus;
use swarmctl_core::infrastructure::journal::ControlPlaneJournal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::controller::{SwarmController, SwarmControllerConfig};
use crate::domain::compute::WorkerCompute;
use crate::domain::controller::ControllerIdentity;
use crate::infrastructure::runtime::{ControllerRuntime, ControllerRuntimeConfig};

struct RunningController {
    instance: String,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl RunningController {
    /// Cancel the task and wait for it to exit.
    async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            warn!(instance = %self.instance, error = %e, "Embedded swarm controller task ended abnormally");
        }
    }
}

pub struct EmbeddedControllerCompute {
    bus: Arc<InMemoryControlBus>,
    workers: Arc<dyn WorkerCompute>,
    journal: Arc<ControlPlaneJournal>,
    controller_config: SwarmControllerConfig,
    runtime_config: ControllerRuntimeConfig,
    running: DashMap<String, RunningController>,
}

impl EmbeddedControllerCompute {
    pub fn new(
        bus: Arc<InMemoryControlBus>,
        workers: Arc<dyn WorkerCompute>,
        journal: Arc<ControlPlaneJournal>,
        controller_config: SwarmControllerConfig,
        runtime_config: ControllerRuntimeConfig,
    ) -> Self {
        Self {
            bus,
            workers,
            journal,
            controller_config,
            runtime_config,
            running: DashMap::new(),
        }
    }

    /// Instance id of the controller running for `swarm_id`.
    pub fn instance(&self, swarm_id: &str) -> Option<String> {
        self.running.get(swarm_id).map(|c| c.instance.clone())
    }

    pub fn running_count(&self) -> usize {
        self.running
            .iter()
            .filter(|entry| !entry.handle.is_finished())
            .count()
    }

    /// Cancel every controller task.
    pub fn shutdown(&self) {
        for entry in self.running.iter() {
            entry.shutdown.cancel();
        }
    }
}

#[async_trait]
impl ControllerCompute for EmbeddedControllerCompute {
    async fn launch_controller(
        &self,
        swarm_id: &str,
        _template: Option<&Value>,
    ) -> Result<String, ComputeError> {
        // A launch always starts a fresh controller for a freshly registered
        // swarm; anything left from an earlier attempt is stopped first.
        if let Some((_, previous)) = self.running.remove(swarm_id) {
            info!(swarm_id = %swarm_id, instance = %previous.instance, "Replacing embedded swarm controller");
            previous.stop().await;
        }

        let simple = Uuid::new_v4().simple().to_string();
        let instance = format!("{}-ctrl-{}", swarm_id, &simple[..8]);
        let identity = ControllerIdentity::new(swarm_id, &instance)
            .map_err(|e| ComputeError::Rejected(e.to_string()))?;
        let controller = SwarmController::new(
            identity,
            self.bus.clone(),
            self.workers.clone(),
            self.journal.clone(),
            self.controller_config.clone(),
        )
        .map_err(|e| ComputeError::Rejected(e.to_string()))?;

        let runtime = ControllerRuntime::new(
            controller,
            &self.bus,
            self.journal.clone(),
            self.runtime_config.clone(),
        );
        let shutdown = runtime.shutdown_token();
        let handle = runtime.start();

        info!(swarm_id = %swarm_id, instance = %instance, "Embedded swarm controller launched");
        self.running.insert(
            swarm_id.to_string(),
            RunningController {
                instance: instance.clone(),
                shutdown,
                handle,
            },
        );
        Ok(instance)
    }

    async fn remove_controller(&self, swarm_id: &str) -> Result<(), ComputeError> {
        match self.running.remove(swarm_id) {
            Some((_, controller)) => {
                let instance = controller.instance.clone();
                controller.stop().await;
                debug!(swarm_id = %swarm_id, instance = %instance, "Embedded swarm controller removed");
            }
            None => debug!(swarm_id = %swarm_id, "No embedded controller to remove"),
        }
        Ok(())
    }
}
