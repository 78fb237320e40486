// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! IO State Aggregator
//!
//! Keeps the latest valid IO health each worker reported per channel and
//! reduces them to the worst value per channel on demand. Nothing derived is
//! cached, so a channel recovers as soon as the offending worker does.

use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use swarmctl_core::domain::status::IoHealth;

use crate::domain::worker::WorkerKey;

#[derive(Debug, Default)]
pub struct IoStateAggregator {
    reports: DashMap<WorkerKey, BTreeMap<String, IoHealth>>,
}

impl IoStateAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a worker's `ioState` object (`channel -> state`) into its last
    /// report. Unrecognised states leave that channel's previous value alone.
    pub fn record(&self, worker: &WorkerKey, io_state: &Value) {
        let Some(channels) = io_state.as_object() else {
            return;
        };
        let mut report = self.reports.entry(worker.clone()).or_default();
        for (channel, state) in channels {
            if let Some(health) = state.as_str().and_then(IoHealth::parse) {
                report.insert(channel.clone(), health);
            }
        }
    }

    pub fn aggregate(&self) -> BTreeMap<String, IoHealth> {
        let mut worst: BTreeMap<String, IoHealth> = BTreeMap::new();
        for report in self.reports.iter() {
            for (channel, health) in report.value() {
                worst
                    .entry(channel.clone())
                    .and_modify(|current| *current = (*current).max(*health))
                    .or_insert(*health);
            }
        }
        worst
    }

    /// `ioState` object for status events.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.aggregate()
                .into_iter()
                .map(|(channel, health)| (channel, Value::String(health.as_str().to_string())))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn health(io: &IoStateAggregator, channel: &str) -> Option<IoHealth> {
        io.aggregate().get(channel).copied()
    }

    #[test]
    fn test_worst_state_wins() {
        let io = IoStateAggregator::new();
        io.record(&WorkerKey::new("gen", "g1"), &json!({ "work": "ok", "results": "ok" }));
        io.record(&WorkerKey::new("proc", "p1"), &json!({ "work": "out-of-data" }));
        io.record(&WorkerKey::new("proc", "p2"), &json!({ "work": "upstream-error" }));

        assert_eq!(health(&io, "work"), Some(IoHealth::UpstreamError));
        assert_eq!(health(&io, "results"), Some(IoHealth::Ok));
        assert_eq!(health(&io, "missing"), None);
    }

    #[test]
    fn test_invalid_report_does_not_red_channel() {
        let io = IoStateAggregator::new();
        io.record(&WorkerKey::new("gen", "g1"), &json!({ "work": "ok" }));
        io.record(&WorkerKey::new("proc", "p1"), &json!({ "work": "on-fire" }));
        io.record(&WorkerKey::new("proc", "p2"), &json!("not-an-object"));

        assert_eq!(health(&io, "work"), Some(IoHealth::Ok));
    }

    #[test]
    fn test_recovery_clears_bad_reading() {
        let io = IoStateAggregator::new();
        let worker = WorkerKey::new("proc", "p1");
        io.record(&worker, &json!({ "work": "upstream-error" }));
        assert_eq!(health(&io, "work"), Some(IoHealth::UpstreamError));

        io.record(&worker, &json!({ "work": "ok" }));
        assert_eq!(health(&io, "work"), Some(IoHealth::Ok));
        assert_eq!(io.to_json(), json!({ "work": "ok" }));
    }
}
