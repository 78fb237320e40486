// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Controller runtime and in-process compute adapter.

pub mod embedded;
pub mod runtime;

pub use embedded::EmbeddedControllerCompute;
pub use runtime::{controller_bindings, ControllerRuntime, ControllerRuntimeConfig};
