// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Control-Plane Journal
//!
//! Rate-limited record of dropped or malformed control-plane messages.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Keep the journal readable under sustained delivery failure
//!
//! One `governor` keyed limiter enforces a quiet period per [`DropKey`].
//! Drops inside the quiet period are only counted; the next entry that gets
//! through carries the count as `suppressed`. A failing sink puts the
//! journal into a cooldown during which nothing is written.
//! [`ControlPlaneJournal::record_drop`] never returns an error, so message
//! acknowledgement can never depend on journaling.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use parking_lot::Mutex;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::domain::journal::{DropKey, JournalEntry, JournalError, JournalSink};

/// What happened to a single `record_drop` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalOutcome {
    Written,
    Suppressed,
    CoolingDown,
    SinkFailed,
}

/// Drops counted but not yet reported for one key.
#[derive(Debug, Clone, Copy)]
struct Pending {
    count: u64,
    last_at: DateTime<Utc>,
}

pub struct ControlPlaneJournal {
    limiter: DefaultKeyedRateLimiter<DropKey>,
    suppressed: DashMap<DropKey, Pending>,
    sink: Arc<dyn JournalSink>,
    failure_cooldown: Duration,
    cooldown_until: Mutex<Option<Instant>>,
}

impl ControlPlaneJournal {
    pub fn new(sink: Arc<dyn JournalSink>, quiet_period: Duration, failure_cooldown: Duration) -> Self {
        let quota = Quota::with_period(quiet_period)
            .map(|q| q.allow_burst(NonZeroU32::MIN))
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX));

        Self {
            limiter: RateLimiter::keyed(quota),
            suppressed: DashMap::new(),
            sink,
            failure_cooldown,
            cooldown_until: Mutex::new(None),
        }
    }

    /// Journal backed by the tracing subscriber.
    pub fn tracing(quiet_period: Duration, failure_cooldown: Duration) -> Self {
        Self::new(Arc::new(TracingJournalSink), quiet_period, failure_cooldown)
    }

    pub fn record_drop(&self, key: DropKey, detail: impl Into<String>) -> JournalOutcome {
        metrics::counter!("swarmctl_control_plane_drops_total", "reason" => key.reason.to_string())
            .increment(1);

        if self.limiter.check_key(&key).is_err() {
            self.add_pending(key, 1);
            metrics::counter!("swarmctl_journal_suppressed_total").increment(1);
            return JournalOutcome::Suppressed;
        }

        let suppressed = self
            .suppressed
            .remove(&key)
            .map(|(_, pending)| pending.count)
            .unwrap_or(0);

        if self.cooling_down() {
            // Keep the count for the first entry written after the cooldown.
            self.add_pending(key, suppressed + 1);
            return JournalOutcome::CoolingDown;
        }

        let entry = JournalEntry {
            key,
            detail: detail.into(),
            suppressed,
            recorded_at: Utc::now(),
        };

        match self.sink.write(&entry) {
            Ok(()) => JournalOutcome::Written,
            Err(e) => {
                *self.cooldown_until.lock() = Some(Instant::now() + self.failure_cooldown);
                debug!(
                    error = %e,
                    cooldown_ms = self.failure_cooldown.as_millis() as u64,
                    "Control-plane journal write failed, cooling down"
                );
                JournalOutcome::SinkFailed
            }
        }
    }

    /// Suppressed drops pending for `key`, not yet reported.
    pub fn pending_suppressed(&self, key: &DropKey) -> u64 {
        self.suppressed.get(key).map(|p| p.count).unwrap_or(0)
    }

    /// Forget suppressed counts whose key has not dropped anything since
    /// `cutoff`. Returns how many keys were forgotten.
    pub fn purge_suppressed_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut purged = 0;
        self.suppressed.retain(|_, pending| {
            let keep = pending.last_at >= cutoff;
            if !keep {
                purged += 1;
            }
            keep
        });
        purged
    }

    fn add_pending(&self, key: DropKey, count: u64) {
        let now = Utc::now();
        let mut pending = self.suppressed.entry(key).or_insert(Pending { count: 0, last_at: now });
        pending.count += count;
        pending.last_at = now;
    }

    /// Forget limiter state for keys idle longer than their quiet period.
    pub fn compact(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    fn cooling_down(&self) -> bool {
        let mut until = self.cooldown_until.lock();
        match *until {
            Some(deadline) if Instant::now() < deadline => true,
            Some(_) => {
                *until = None;
                false
            }
            None => false,
        }
    }
}

/// Writes journal entries as structured `warn` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingJournalSink;

impl JournalSink for TracingJournalSink {
    fn write(&self, entry: &JournalEntry) -> Result<(), JournalError> {
        warn!(
            swarm_id = %entry.key.swarm_id,
            signal_type = %entry.key.signal_type,
            routing_key = %entry.key.routing_key,
            reason = %entry.key.reason,
            suppressed = entry.suppressed,
            "Dropped control-plane message: {}",
            entry.detail
        );
        Ok(())
    }
}
