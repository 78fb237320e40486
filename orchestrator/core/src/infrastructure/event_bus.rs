// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Control Bus Implementation - Topic Pub/Sub for Control-Plane Messages
//
// Provides in-memory topic routing using tokio broadcast channels. Every
// subscriber declares topic bindings (`*` = one word, `#` = zero or more)
// and only sees envelopes whose routing key matches one of them.
//
// For single-process deployments and tests; a broker adapter implements the
// same `ControlPlanePublisher` port.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::bus::{BusError, ControlPlanePublisher, MessageEnvelope};
use crate::domain::routing::binding_matches;

/// Topic bus for control-plane envelopes
#[derive(Clone)]
pub struct InMemoryControlBus {
    sender: Arc<broadcast::Sender<MessageEnvelope>>,
}

impl InMemoryControlBus {
    /// Create a new bus with specified channel capacity
    /// Capacity determines how many envelopes can be buffered per subscriber
    /// before the slowest one starts lagging
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create bus with default capacity (1024)
    pub fn with_default_capacity() -> Self {
        Self::new(1024)
    }

    /// Subscribe with a set of topic bindings
    pub fn subscribe<I, S>(&self, bindings: I) -> BusReceiver
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BusReceiver {
            receiver: self.sender.subscribe(),
            bindings: bindings.into_iter().map(Into::into).collect(),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryControlBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[async_trait]
impl ControlPlanePublisher for InMemoryControlBus {
    async fn publish(&self, envelope: MessageEnvelope) -> Result<(), BusError> {
        debug!(routing_key = %envelope.routing_key, "Publishing control-plane message");

        // Unrouted messages are dropped, as on a topic exchange with no
        // matching queue.
        if self.sender.send(envelope).is_err() {
            debug!("No subscribers bound to control bus");
        }
        Ok(())
    }
}

/// Receiver filtered by topic bindings
pub struct BusReceiver {
    receiver: broadcast::Receiver<MessageEnvelope>,
    bindings: Vec<String>,
}

impl BusReceiver {
    pub fn bindings(&self) -> &[String] {
        &self.bindings
    }

    fn matches(&self, envelope: &MessageEnvelope) -> bool {
        self.bindings
            .iter()
            .any(|binding| binding_matches(binding, &envelope.routing_key))
    }

    /// Receive the next matching envelope, skipping everything else
    pub async fn recv(&mut self) -> Result<MessageEnvelope, ControlBusError> {
        loop {
            let envelope = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => ControlBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("Control bus receiver lagged by {} messages", n);
                    ControlBusError::Lagged(n)
                }
            })?;

            if self.matches(&envelope) {
                return Ok(envelope);
            }
        }
    }

    /// Try to receive a matching envelope without blocking
    pub fn try_recv(&mut self) -> Result<MessageEnvelope, ControlBusError> {
        loop {
            let envelope = self.receiver.try_recv().map_err(|e| match e {
                broadcast::error::TryRecvError::Empty => ControlBusError::Empty,
                broadcast::error::TryRecvError::Closed => ControlBusError::Closed,
                broadcast::error::TryRecvError::Lagged(n) => {
                    warn!("Control bus receiver lagged by {} messages", n);
                    ControlBusError::Lagged(n)
                }
            })?;

            if self.matches(&envelope) {
                return Ok(envelope);
            }
        }
    }

    /// Drain every matching envelope currently buffered
    pub fn drain(&mut self) -> Vec<MessageEnvelope> {
        let mut drained = Vec::new();
        loop {
            match self.try_recv() {
                Ok(envelope) => drained.push(envelope),
                Err(ControlBusError::Lagged(_)) => continue,
                Err(_) => return drained,
            }
        }
    }
}

/// Errors that can occur when receiving from the bus
#[derive(Debug, thiserror::Error)]
pub enum ControlBusError {
    #[error("Control bus is closed")]
    Closed,

    #[error("No messages available")]
    Empty,

    #[error("Receiver lagged by {0} messages (messages were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_bindings_filter_messages() {
        let bus = InMemoryControlBus::new(16);
        let mut outcomes = bus.subscribe(["event.outcome.#"]);
        let mut signals = bus.subscribe(["signal.*.sw1.#"]);
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(MessageEnvelope::new(
            "event.outcome.ready.sw1.swarm-controller.c1",
            json!({"n": 1}),
        ))
        .await
        .unwrap();
        bus.publish(MessageEnvelope::new(
            "signal.swarm-start.sw1.swarm-controller.ALL",
            json!({"n": 2}),
        ))
        .await
        .unwrap();
        bus.publish(MessageEnvelope::new(
            "signal.swarm-start.sw2.swarm-controller.ALL",
            json!({"n": 3}),
        ))
        .await
        .unwrap();

        let received = outcomes.recv().await.unwrap();
        assert_eq!(received.body["n"], 1);
        assert!(matches!(outcomes.try_recv(), Err(ControlBusError::Empty)));

        let received = signals.drain();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].body["n"], 2);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = InMemoryControlBus::default();
        assert!(bus
            .publish(MessageEnvelope::new("event.alert.alert.a.b.c", json!({})))
            .await
            .is_ok());
    }
}
