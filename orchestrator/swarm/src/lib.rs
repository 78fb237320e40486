// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `swarmctl-swarm`: Swarm Controller
//!
//! One controller runs per swarm. It executes lifecycle signals against the
//! worker compute port, fans `config-update` commands out to workers, tracks
//! worker readiness and IO health, and reports back to the orchestrator with
//! confirmations and status events.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `ControllerIdentity`, `ControllerState`, `WorkerKey`, `WorkerCompute` |
//! | [`application`] | Application | `SwarmController`, `CommandRouter`, `ReadinessTracker`, `IoStateAggregator` |
//! | [`infrastructure`] | Infrastructure | `ControllerRuntime`, `EmbeddedControllerCompute` |
//!
//! ## Key Concepts
//!
//! - **Readiness gate**: template and start confirmations wait until every
//!   known worker has reported `enabled=false` at least once.
//! - **Loop suppression**: `ALL` broadcasts are remembered by
//!   `(origin, correlationId)`; a second sighting is never re-published.
//! - **Serialized handling**: a controller is owned by exactly one task.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
