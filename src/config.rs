//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `monitor.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - BackendConfig: Database URL, auth token, document paths.
//!     - PollingConfig: How often the subscription refreshes documents.
//!     - HistoryConfig: Rolling window length per sensor.
//!     - ControlConfig: How long a toggle write may stay in flight.
//!     - ServerConfig: Where the JSON api listens.
//!     - LoggingConfig: Default log level when RUST_LOG is unset.
//!
//! ==============================================================================

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct MonitorConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BackendConfig {
    pub database_url: String,
    pub auth_token: Option<String>,
    pub sensors_path: String,
    pub control_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistoryConfig {
    pub capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ControlConfig {
    pub write_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            database_url: "http://127.0.0.1:9000".to_string(),
            auth_token: None,
            sensors_path: "sensors".to_string(),
            control_path: "control".to_string(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { capacity: crate::history::DEFAULT_CAPACITY }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self { write_timeout_ms: 5000 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:3000".to_string() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

impl PollingConfig {
    /// never zero, a zero interval would spin
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(50))
    }
}

impl ControlConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms.max(1))
    }
}

impl MonitorConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: MonitorConfig = toml::from_str(content).context("Failed to parse config")?;
        Ok(config)
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        let paths = [
            PathBuf::from("config").join("monitor.toml"),
            PathBuf::from("..").join("config").join("monitor.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        tracing::info!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("[CONFIG] Failed to load {}: {:#}", path.display(), e);
                    }
                }
            }
        }

        tracing::warn!("[CONFIG] No config file found - using defaults");
        Self::default()
    }

    /// Log configuration summary
    pub fn log_summary(&self) {
        tracing::info!(
            database = %self.backend.database_url,
            sensors = %self.backend.sensors_path,
            control = %self.backend.control_path,
            auth = self.backend.auth_token.as_deref().is_some_and(|t| !t.is_empty()),
            "backend"
        );
        tracing::info!(
            poll_ms = self.polling.interval_ms,
            history = self.history.capacity,
            write_timeout_ms = self.control.write_timeout_ms,
            bind = %self.server.bind,
            "runtime"
        );
    }
}
