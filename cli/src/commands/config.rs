// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use swarmctl_core::domain::node_config::ControlPlaneConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file with default values
    Generate {
        /// Output path (default: ./swarmctl-config.yaml)
        #[arg(short, long, default_value = "./swarmctl-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, force } => generate(output, force).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = ControlPlaneConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. SWARMCTL_CONFIG_PATH: {}",
            std::env::var("SWARMCTL_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./swarmctl-config.yaml");
        println!("  4. ~/.swarmctl/config.yaml");
        println!("  5. /etc/swarmctl/config.yaml");
        match ControlPlaneConfigManifest::discover_config() {
            Some(found) => println!("  Using: {}", found.display().to_string().green()),
            None => println!("  Using: {}", "(built-in defaults)".dimmed()),
        }
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Orchestrator:".bold());
    println!("  Instance ID: {}", spec.orchestrator.instance_id);
    println!();

    println!("{}", "Control Plane:".bold());
    println!("  Command timeout: {} ms", spec.control_plane.command_timeout_ms);
    println!(
        "  Status staleness: {} s",
        spec.control_plane.status_staleness_secs
    );
    println!("  Sweep interval: {} s", spec.control_plane.sweep_interval_secs);
    println!(
        "  Idempotency TTL: {} s",
        spec.control_plane.idempotency_ttl_secs
    );
    println!("  Bus capacity: {}", spec.control_plane.bus_capacity);
    println!();

    println!("{}", "Swarm Controllers:".bold());
    println!(
        "  Mode: {}",
        if spec.controller.embedded {
            "embedded"
        } else {
            "external"
        }
    );
    println!(
        "  Status interval: {} s",
        spec.controller.status_interval_secs
    );
    println!("  Seen-signal capacity: {}", spec.controller.seen_capacity);
    println!();

    println!("{}", "Journal:".bold());
    println!("  Quiet period: {} ms", spec.journal.quiet_period_ms);
    println!("  Failure cooldown: {} ms", spec.journal.failure_cooldown_ms);
    println!();

    println!("{}", "API:".bold());
    println!("  Listen: {}:{}", spec.api.bind_address, spec.api.port);
    println!();

    println!("{}", "Logging:".bold());
    println!("  Level: {}", spec.logging.level);
    println!("  Format: {}", spec.logging.format);
    if let Some(metrics) = spec
        .observability
        .as_ref()
        .and_then(|o| o.metrics.as_ref())
    {
        println!(
            "  Metrics: {} (port {})",
            if metrics.enabled { "enabled" } else { "disabled" },
            metrics.port
        );
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = ControlPlaneConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    ControlPlaneConfigManifest::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_writes_loadable_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swarmctl-config.yaml");

        generate(path.clone(), false).await.unwrap();
        let loaded = ControlPlaneConfigManifest::load_or_default(Some(path.clone())).unwrap();
        loaded.validate().unwrap();

        // Refuses to clobber without --force.
        assert!(generate(path.clone(), false).await.is_err());
        generate(path, true).await.unwrap();
    }
}
