// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod idempotency;
pub mod journal;
pub mod repositories;

pub use event_bus::{BusReceiver, ControlBusError, InMemoryControlBus};
pub use idempotency::InMemoryIdempotencyStore;
pub use journal::{ControlPlaneJournal, JournalOutcome, TracingJournalSink};
pub use repositories::InMemorySwarmRepository;
