// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Controller Domain Layer
//!
//! Pure controller-side types. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`controller`] | `ControllerIdentity`, `ControllerState`, `ControllerPhase` |
//! | [`worker`] | `WorkerKey`, `ReadinessState`, template parsing |
//! | [`compute`] | `WorkerCompute` port |

pub mod compute;
pub mod controller;
pub mod worker;

pub use compute::{NoopWorkerCompute, WorkerCompute};
pub use controller::{ControllerIdentity, ControllerPhase, ControllerState};
pub use worker::{expected_workers, ReadinessState, WorkerKey};
