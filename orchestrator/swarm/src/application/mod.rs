// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Controller Application Layer
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`controller`] | `SwarmController`: signal handling, readiness gating, confirmations |
//! | [`router`] | `CommandRouter`: config-update fan-out and loop suppression |
//! | [`readiness`] | `ReadinessTracker` |
//! | [`io_state`] | `IoStateAggregator` |

pub mod controller;
pub mod io_state;
pub mod readiness;
pub mod router;

pub use controller::{SwarmController, SwarmControllerConfig, REMOVED_STATUS};
pub use io_state::IoStateAggregator;
pub use readiness::ReadinessTracker;
pub use router::{CommandRouter, LocalEffect, RoutePlan};
