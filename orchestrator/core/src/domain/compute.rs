// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Compute substrate port for swarm controllers.
//!
//! Adapters that actually start containers or services live outside this
//! crate. Calls may be slow or fail; callers never hold a lock across them.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::errors::ControlPlaneError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComputeError {
    #[error("Compute substrate unavailable: {message}")]
    Unavailable { message: String, hint: String },

    #[error("Compute request rejected: {0}")]
    Rejected(String),
}

impl ComputeError {
    pub fn hint(&self) -> &str {
        match self {
            ComputeError::Unavailable { hint, .. } => hint,
            ComputeError::Rejected(_) => "check the swarm template and retry with a new command",
        }
    }
}

impl From<ComputeError> for ControlPlaneError {
    fn from(err: ComputeError) -> Self {
        let hint = err.hint().to_string();
        ControlPlaneError::DownstreamUnavailable {
            message: err.to_string(),
            hint,
        }
    }
}

/// Launches and removes the per-swarm controller.
#[async_trait]
pub trait ControllerCompute: Send + Sync {
    /// Start a controller for `swarm_id`; returns its instance id.
    async fn launch_controller(
        &self,
        swarm_id: &str,
        template: Option<&Value>,
    ) -> Result<String, ComputeError>;

    async fn remove_controller(&self, swarm_id: &str) -> Result<(), ComputeError>;
}

/// Adapter for deployments where controllers are started out of band.
#[derive(Debug, Default, Clone)]
pub struct ExternalControllerCompute;

#[async_trait]
impl ControllerCompute for ExternalControllerCompute {
    async fn launch_controller(
        &self,
        swarm_id: &str,
        _template: Option<&Value>,
    ) -> Result<String, ComputeError> {
        tracing::debug!(swarm_id = %swarm_id, "Controller launch delegated to external runtime");
        Ok(format!("{}-controller", swarm_id))
    }

    async fn remove_controller(&self, swarm_id: &str) -> Result<(), ComputeError> {
        tracing::debug!(swarm_id = %swarm_id, "Controller removal delegated to external runtime");
        Ok(())
    }
}
