// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Logging and metrics initialization for the `swarmctl` binary.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Initialize tracing subscriber for logging.
///
/// `RUST_LOG` wins over `level` when set. `format` is `compact` or `json`.
pub fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let result = match format {
        "json" => builder.json().try_init(),
        _ => builder.compact().try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))
}

/// Install the Prometheus recorder with its own HTTP listener on `port`.
pub fn init_metrics(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!(%addr, "Prometheus metrics exporter listening");
    Ok(())
}
