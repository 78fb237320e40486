// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Application Layer (`swarmctl-core`)
//!
//! Orchestrator-side use cases. Every service depends only on domain ports
//! (`crate::domain`) so the in-memory adapters can be swapped for a broker or
//! a database without touching this layer.
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`lifecycle`] | Swarm records and the lifecycle state machine |
//! | [`dispatcher`] | Idempotent command publishing for REST callers |
//! | [`status_reconciler`] | Status baseline/delta cache and lifecycle inference |
//! | [`confirmation_handler`] | Applies controller `Ready`/`Error` outcomes |
//! | [`listener`] | Bus consumer feeding the two handlers above |
//! | [`staleness_sweeper`] | Fails swarms whose controller went silent |

pub mod confirmation_handler;
pub mod dispatcher;
pub mod lifecycle;
pub mod listener;
pub mod staleness_sweeper;
pub mod status_reconciler;

pub use confirmation_handler::{ConfirmationHandler, ConfirmationOutcome};
pub use dispatcher::{
    CommandAccepted, CommandDispatcher, ConfigUpdateCommand, CreateSwarmCommand, DispatcherSettings,
};
pub use lifecycle::{StandardSwarmLifecycleService, SwarmLifecycleService};
pub use listener::{orchestrator_bindings, OrchestratorListener};
pub use staleness_sweeper::{StalenessSweeper, StalenessSweeperConfig, SweepReport};
pub use status_reconciler::{ReconcileOutcome, StatusReconciler, StatusRequester, StatusView};
