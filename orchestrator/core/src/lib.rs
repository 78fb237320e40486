// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # swarmctl-core
//!
//! Orchestrator side of the swarm control plane: the wire protocol (scopes,
//! signals, routing keys, confirmations, status events), the swarm lifecycle
//! state machine, idempotent command dispatch and status reconciliation.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Shared protocol types plus the orchestrator services
//!
//! | Layer | Contents |
//! |-------|----------|
//! | [`domain`] | Pure protocol types and port traits |
//! | [`application`] | Dispatcher, reconciler, confirmation handling, sweeper |
//! | [`infrastructure`] | In-memory bus, stores and the rate-limited journal |
//! | [`presentation`] | Axum REST router |

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
