// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! swarmctl CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Node assembly and command handlers behind the `swarmctl` binary

pub mod commands;
pub mod logging;
pub mod node;
