// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Control-plane node assembly
//!
//! Wires the in-memory bus, stores, dispatcher, reconciler, listener and
//! staleness sweeper from a [`ControlPlaneConfigManifest`]. With
//! `controller.embedded` set, swarm controllers run as tasks in this process
//! on the same bus; otherwise they are expected to be launched externally.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use swarmctl_core::application::{
    CommandDispatcher, ConfirmationHandler, DispatcherSettings, OrchestratorListener,
    StalenessSweeper, StalenessSweeperConfig, StandardSwarmLifecycleService, StatusReconciler,
};
use swarmctl_core::domain::compute::{ControllerCompute, ExternalControllerCompute};
use swarmctl_core::domain::node_config::ControlPlaneConfigManifest;
use swarmctl_core::infrastructure::{
    ControlPlaneJournal, InMemoryControlBus, InMemoryIdempotencyStore, InMemorySwarmRepository,
};
use swarmctl_core::presentation::AppState;
use swarmctl_swarm::application::SwarmControllerConfig;
use swarmctl_swarm::domain::NoopWorkerCompute;
use swarmctl_swarm::infrastructure::{ControllerRuntimeConfig, EmbeddedControllerCompute};

pub struct ControlPlaneNode {
    pub bus: Arc<InMemoryControlBus>,
    pub journal: Arc<ControlPlaneJournal>,
    pub lifecycle: Arc<StandardSwarmLifecycleService>,
    pub idempotency: Arc<InMemoryIdempotencyStore>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub reconciler: Arc<StatusReconciler>,
    pub listener: Arc<OrchestratorListener>,
    pub sweeper: Arc<StalenessSweeper>,
    /// Present when controllers run in-process.
    pub controllers: Option<Arc<EmbeddedControllerCompute>>,
}

/// Handles to the node's background tasks.
pub struct BackgroundTasks {
    listener: JoinHandle<()>,
    sweeper: JoinHandle<()>,
    listener_token: CancellationToken,
    sweeper_token: CancellationToken,
}

impl ControlPlaneNode {
    pub fn build(config: &ControlPlaneConfigManifest) -> Self {
        let spec = &config.spec;
        let bus = Arc::new(InMemoryControlBus::new(spec.control_plane.bus_capacity));
        let journal = Arc::new(ControlPlaneJournal::tracing(
            spec.journal.quiet_period(),
            spec.journal.failure_cooldown(),
        ));
        let lifecycle = Arc::new(StandardSwarmLifecycleService::new(Arc::new(
            InMemorySwarmRepository::new(),
        )));
        let idempotency = Arc::new(InMemoryIdempotencyStore::new());

        let controllers = spec.controller.embedded.then(|| {
            Arc::new(EmbeddedControllerCompute::new(
                bus.clone(),
                Arc::new(NoopWorkerCompute),
                journal.clone(),
                SwarmControllerConfig {
                    seen_capacity: spec.controller.seen_capacity,
                },
                ControllerRuntimeConfig {
                    status_interval: Duration::from_secs(spec.controller.status_interval_secs.max(1)),
                },
            ))
        });
        let compute: Arc<dyn ControllerCompute> = match &controllers {
            Some(embedded) => embedded.clone(),
            None => Arc::new(ExternalControllerCompute),
        };

        let dispatcher = Arc::new(CommandDispatcher::new(
            lifecycle.clone(),
            idempotency.clone(),
            bus.clone(),
            compute.clone(),
            DispatcherSettings {
                origin: spec.orchestrator.instance_id.clone(),
                command_timeout_ms: spec.control_plane.command_timeout_ms,
            },
        ));
        let reconciler = Arc::new(StatusReconciler::new(
            lifecycle.clone(),
            dispatcher.clone(),
            journal.clone(),
        ));
        let handler = Arc::new(ConfirmationHandler::new(
            lifecycle.clone(),
            reconciler.clone(),
            compute,
        ));
        let listener = Arc::new(OrchestratorListener::new(
            handler,
            reconciler.clone(),
            journal.clone(),
        ));
        let sweeper = Arc::new(StalenessSweeper::new(
            lifecycle.clone(),
            idempotency.clone(),
            reconciler.clone(),
            journal.clone(),
            StalenessSweeperConfig {
                staleness_window: spec.control_plane.status_staleness(),
                interval: spec.control_plane.sweep_interval(),
                idempotency_ttl: spec.control_plane.idempotency_ttl(),
            },
        ));

        info!(
            instance_id = %spec.orchestrator.instance_id,
            embedded_controllers = spec.controller.embedded,
            "Control-plane node assembled"
        );

        Self {
            bus,
            journal,
            lifecycle,
            idempotency,
            dispatcher,
            reconciler,
            listener,
            sweeper,
            controllers,
        }
    }

    pub fn app_state(&self) -> Arc<AppState> {
        Arc::new(AppState {
            dispatcher: self.dispatcher.clone(),
            lifecycle: self.lifecycle.clone(),
            reconciler: self.reconciler.clone(),
        })
    }

    /// Start the listener and the staleness sweeper. The listener subscribes
    /// before this returns.
    pub fn start(&self) -> BackgroundTasks {
        BackgroundTasks {
            listener_token: self.listener.shutdown_token(),
            sweeper_token: self.sweeper.shutdown_token(),
            listener: self.listener.clone().start(&self.bus),
            sweeper: self.sweeper.clone().start(),
        }
    }
}

impl BackgroundTasks {
    /// Cancel the background loops and wait for them to finish.
    pub async fn shutdown(self, node: &ControlPlaneNode) {
        if let Some(controllers) = &node.controllers {
            controllers.shutdown();
        }
        self.listener_token.cancel();
        self.sweeper_token.cancel();
        let _ = self.listener.await;
        let _ = self.sweeper.await;
        info!("Control-plane background tasks stopped");
    }
}
