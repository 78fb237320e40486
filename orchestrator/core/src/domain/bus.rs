// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Message bus port.
//!
//! The control plane only needs to publish a JSON body under a routing key;
//! delivery, queues and bindings belong to the adapter.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::confirmation::Confirmation;
use crate::domain::signal::ControlSignal;
use crate::domain::status::StatusEvent;

#[derive(Debug, Clone, PartialEq)]
pub struct MessageEnvelope {
    pub routing_key: String,
    pub body: Value,
}

impl MessageEnvelope {
    pub fn new(routing_key: impl Into<String>, body: Value) -> Self {
        Self {
            routing_key: routing_key.into(),
            body,
        }
    }

    fn encode<T: Serialize>(routing_key: String, payload: &T) -> Result<Self, BusError> {
        let body =
            serde_json::to_value(payload).map_err(|e| BusError::Serialization(e.to_string()))?;
        Ok(Self { routing_key, body })
    }

    pub fn signal(signal: &ControlSignal) -> Result<Self, BusError> {
        Self::encode(signal.routing_key(), signal)
    }

    /// A signal body sent under a different key than its own scope implies.
    pub fn forwarded(signal: &ControlSignal, routing_key: String) -> Result<Self, BusError> {
        Self::encode(routing_key, signal)
    }

    pub fn confirmation(confirmation: &Confirmation) -> Result<Self, BusError> {
        Self::encode(confirmation.routing_key(), confirmation)
    }

    pub fn status(event: &StatusEvent) -> Result<Self, BusError> {
        Self::encode(event.routing_key(), event)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("Message bus is closed")]
    Closed,

    #[error("Publish rejected: {0}")]
    Rejected(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Outbound side of the control-plane bus.
#[async_trait]
pub trait ControlPlanePublisher: Send + Sync {
    async fn publish(&self, envelope: MessageEnvelope) -> Result<(), BusError>;
}
