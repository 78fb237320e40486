// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # swarmctl
//!
//! The `swarmctl` binary hosts the orchestrator side of the swarm control
//! plane: the command dispatcher, the status reconciler, the staleness
//! sweeper and the REST API. With `controller.embedded` enabled it also runs
//! one swarm controller task per swarm on the same in-process bus.
//!
//! ## Commands
//!
//! - `swarmctl serve` - Run the control plane until Ctrl+C / SIGTERM
//! - `swarmctl config show|validate|generate` - Configuration management

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;

use swarmctl::commands::{self, ConfigCommand, ServeArgs};
use swarmctl::logging::init_logging;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Compact,
    Json,
}

/// swarmctl - Swarm control-plane orchestrator
#[derive(Parser)]
#[command(name = "swarmctl")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "SWARMCTL_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to spec.logging.level
    #[arg(long, global = true, env = "SWARMCTL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log output format; defaults to spec.logging.format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the control plane
    #[command(name = "serve")]
    Serve(ServeArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve(args)) => {
            let config = commands::serve::load_config(cli.config)?;
            let level = cli
                .log_level
                .unwrap_or_else(|| config.spec.logging.level.clone());
            let format = match cli.log_format {
                Some(LogFormat::Json) => "json".to_string(),
                Some(LogFormat::Compact) => "compact".to_string(),
                None => config.spec.logging.format.clone(),
            };
            init_logging(&level, &format)?;
            commands::serve::run(args, config).await
        }
        Some(Commands::Config { command }) => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), "compact")?;
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}
