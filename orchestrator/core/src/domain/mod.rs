// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Control-Plane Domain Layer
//!
//! Pure types and port traits. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`scope`] | `ControlScope`, `Segment`, `CommandTarget` |
//! | [`signal`] | `ControlSignal`, `SignalType` |
//! | [`routing`] | routing key builders / parser, `WatchTopics` |
//! | [`confirmation`] | `Confirmation` (Ready / Error) |
//! | [`status`] | `StatusEvent`, `IoHealth` |
//! | [`lifecycle`] | `SwarmLifecycleStatus`, `SwarmRecord` |
//! | [`repository`] | `SwarmRepository`, `IdempotencyStore` |
//! | [`bus`] | `ControlPlanePublisher`, `MessageEnvelope` |
//! | [`compute`] | `ControllerCompute` |
//! | [`journal`] | `JournalSink`, `DropKey` |
//! | [`config_merge`] | `deep_merge` |
//! | [`node_config`] | `ControlPlaneConfigManifest` |
//! | [`errors`] | `ControlPlaneError` |

pub mod bus;
pub mod compute;
pub mod config_merge;
pub mod confirmation;
pub mod errors;
pub mod journal;
pub mod lifecycle;
pub mod node_config;
pub mod repository;
pub mod routing;
pub mod scope;
pub mod signal;
pub mod status;
