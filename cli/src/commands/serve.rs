// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `swarmctl serve` - run the orchestrator control plane
//!
//! Loads configuration, assembles the node, starts the bus listener and the
//! staleness sweeper, and serves the REST API until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use swarmctl_core::domain::node_config::ControlPlaneConfigManifest;
use swarmctl_core::presentation::app;

use crate::logging::init_metrics;
use crate::node::ControlPlaneNode;

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// HTTP API host (overrides spec.api.bind_address)
    #[arg(long, env = "SWARMCTL_HOST")]
    pub host: Option<String>,

    /// HTTP API port (overrides spec.api.port)
    #[arg(long, env = "SWARMCTL_PORT")]
    pub port: Option<u16>,
}

pub async fn run(args: ServeArgs, config: ControlPlaneConfigManifest) -> Result<()> {
    config
        .validate()
        .context("Configuration validation failed")?;

    if let Some(metrics) = config
        .spec
        .observability
        .as_ref()
        .and_then(|o| o.metrics.as_ref())
        .filter(|m| m.enabled)
    {
        init_metrics(metrics.port)?;
    }

    let node = ControlPlaneNode::build(&config);
    let tasks = node.start();

    let host = args.host.unwrap_or_else(|| config.spec.api.bind_address.clone());
    let port = args.port.unwrap_or(config.spec.api.port);
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(
        instance_id = %config.spec.orchestrator.instance_id,
        "swarmctl control plane listening on {}", addr
    );

    let served = axum::serve(listener, app(node.app_state()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed");

    tasks.shutdown(&node).await;
    info!("swarmctl control plane shut down");
    served
}

pub fn load_config(path: Option<PathBuf>) -> Result<ControlPlaneConfigManifest> {
    ControlPlaneConfigManifest::load_or_default(path).context("Failed to load configuration")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
