// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Control-Plane Configuration Types
//
// Defines the configuration schema for a swarmctl orchestrator node:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Orchestrator identity
// - Command timeouts, status staleness and sweep cadence
// - Journal rate limiting
// - Embedded controller settings
// - REST API, logging and metrics settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "swarmctl/v1";
pub const KIND: &str = "ControlPlaneConfig";

/// Top-level Kubernetes-style configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneConfigManifest {
    /// API version (must be "swarmctl/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "ControlPlaneConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: ControlPlaneConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable node name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Content under spec:
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneConfigSpec {
    pub orchestrator: OrchestratorIdentity,

    #[serde(default)]
    pub control_plane: ControlPlaneSettings,

    #[serde(default)]
    pub journal: JournalConfig,

    #[serde(default)]
    pub controller: ControllerSettings,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorIdentity {
    /// Instance id used as `origin` on every published signal
    pub instance_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneSettings {
    /// Advisory timeout returned to REST callers with each accepted command
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Swarms silent for longer than this are marked FAILED
    #[serde(default = "default_status_staleness_secs")]
    pub status_staleness_secs: u64,

    /// How often the staleness sweep runs
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Idempotency records older than this are purged by the sweep
    #[serde(default = "default_idempotency_ttl_secs")]
    pub idempotency_ttl_secs: u64,

    /// Buffered messages per subscriber on the in-memory bus
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Minimum gap between two journal entries for the same drop key
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,

    /// Pause after a journal sink failure before writing again
    #[serde(default = "default_failure_cooldown_ms")]
    pub failure_cooldown_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSettings {
    /// Run swarm controllers inside the orchestrator process
    #[serde(default = "default_true")]
    pub embedded: bool,

    /// Interval between status-delta heartbeats
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,

    /// How many (origin, correlationId) pairs are remembered for loop suppression
    #[serde(default = "default_seen_capacity")]
    pub seen_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (compact, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics exposition
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_command_timeout_ms() -> u64 {
    60_000
}

fn default_status_staleness_secs() -> u64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    5
}

fn default_idempotency_ttl_secs() -> u64 {
    3_600
}

fn default_bus_capacity() -> usize {
    1024
}

fn default_quiet_period_ms() -> u64 {
    5_000
}

fn default_failure_cooldown_ms() -> u64 {
    30_000
}

fn default_status_interval_secs() -> u64 {
    10
}

fn default_seen_capacity() -> usize {
    1024
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for ControlPlaneSettings {
    fn default() -> Self {
        Self {
            command_timeout_ms: default_command_timeout_ms(),
            status_staleness_secs: default_status_staleness_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            idempotency_ttl_secs: default_idempotency_ttl_secs(),
            bus_capacity: default_bus_capacity(),
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: default_quiet_period_ms(),
            failure_cooldown_ms: default_failure_cooldown_ms(),
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            embedded: true,
            status_interval_secs: default_status_interval_secs(),
            seen_capacity: default_seen_capacity(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for ControlPlaneConfigSpec {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorIdentity {
                instance_id: format!("orchestrator-{}", uuid::Uuid::new_v4().simple()),
            },
            control_plane: ControlPlaneSettings::default(),
            journal: JournalConfig::default(),
            controller: ControllerSettings::default(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
            observability: None,
        }
    }
}

impl Default for ControlPlaneConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "swarmctl-node".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: ControlPlaneConfigSpec::default(),
        }
    }
}

impl ControlPlaneSettings {
    pub fn status_staleness(&self) -> Duration {
        Duration::from_secs(self.status_staleness_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_secs)
    }
}

impl JournalConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn failure_cooldown(&self) -> Duration {
        Duration::from_millis(self.failure_cooldown_ms)
    }
}

impl ControlPlaneConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. SWARMCTL_CONFIG_PATH environment variable
    /// 2. ./swarmctl-config.yaml (working directory)
    /// 3. ~/.swarmctl/config.yaml (user home)
    /// 4. /etc/swarmctl/config.yaml (system, Unix) or C:\ProgramData\swarmctl\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("SWARMCTL_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./swarmctl-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".swarmctl").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/swarmctl/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\swarmctl\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load from an explicit path, else discovery, else defaults.
    /// Environment overrides are applied in every case.
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    /// This allows container deployments to override config via env vars
    pub fn apply_env_overrides(&mut self) {
        if let Some(value) = env_number("SWARMCTL_COMMAND_TIMEOUT_MS") {
            self.spec.control_plane.command_timeout_ms = value;
        }
        if let Some(value) = env_number("SWARMCTL_STATUS_STALENESS_SECS") {
            self.spec.control_plane.status_staleness_secs = value;
        }
        if let Some(value) = env_number("SWARMCTL_JOURNAL_QUIET_PERIOD_MS") {
            self.spec.journal.quiet_period_ms = value;
        }
        if let Ok(level) = std::env::var("SWARMCTL_LOG_LEVEL") {
            if !level.trim().is_empty() {
                tracing::info!("Environment override: SWARMCTL_LOG_LEVEL={}", level);
                self.spec.logging.level = level;
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let instance_id = &self.spec.orchestrator.instance_id;
        if instance_id.trim().is_empty() {
            anyhow::bail!("spec.orchestrator.instance_id cannot be empty");
        }
        if instance_id.contains(['.', '*', '#']) || instance_id == crate::domain::scope::ALL {
            anyhow::bail!(
                "spec.orchestrator.instance_id '{}' is not a valid routing key segment",
                instance_id
            );
        }

        let cp = &self.spec.control_plane;
        if cp.command_timeout_ms == 0 {
            anyhow::bail!("spec.control_plane.command_timeout_ms must be greater than zero");
        }
        if cp.status_staleness_secs == 0 || cp.sweep_interval_secs == 0 {
            anyhow::bail!("spec.control_plane staleness window and sweep interval must be greater than zero");
        }
        if cp.sweep_interval_secs > cp.status_staleness_secs {
            anyhow::bail!(
                "spec.control_plane.sweep_interval_secs ({}) cannot exceed status_staleness_secs ({})",
                cp.sweep_interval_secs,
                cp.status_staleness_secs
            );
        }
        if cp.bus_capacity == 0 {
            anyhow::bail!("spec.control_plane.bus_capacity must be greater than zero");
        }

        if self.spec.journal.quiet_period_ms == 0 {
            anyhow::bail!("spec.journal.quiet_period_ms must be greater than zero");
        }

        if self.spec.controller.status_interval_secs == 0 {
            anyhow::bail!("spec.controller.status_interval_secs must be greater than zero");
        }
        if self.spec.controller.status_interval_secs >= cp.status_staleness_secs {
            anyhow::bail!(
                "spec.controller.status_interval_secs must be shorter than the staleness window"
            );
        }

        match self.spec.logging.format.as_str() {
            "compact" | "json" => {}
            other => anyhow::bail!("Invalid logging format: '{}'. Expected compact or json", other),
        }

        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => {
            tracing::info!("Environment override: {}={}", name, raw);
            Some(value)
        }
        Err(_) => {
            tracing::warn!("Invalid value for {}: '{}'. Expected a number. Ignoring.", name, raw);
            None
        }
    }
}
