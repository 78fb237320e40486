// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`swarmctl-core`)
//!
//! HTTP surface that translates REST requests into [`crate::application`]
//! calls. No control-plane logic lives here.

pub mod api;

pub use api::{app, ApiError, AppState};
