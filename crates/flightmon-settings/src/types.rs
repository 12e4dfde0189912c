//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`: partial JSON
//! is accepted and missing fields keep their default.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Smallest accepted poll interval.
pub const MIN_POLL_INTERVAL_MS: u64 = 10;
/// Largest accepted poll interval.
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "monitor": { "defaultVariables": ["INDICATED ALTITUDE"] }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlightMonitorSettings {
    /// Network listener settings.
    pub server: ServerSettings,
    /// Poll loop and catalog settings.
    pub monitor: MonitorSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl FlightMonitorSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let poll = self.monitor.poll_interval_ms;
        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&poll) {
            return Err(SettingsError::InvalidValue(format!(
                "monitor.pollIntervalMs must be within {MIN_POLL_INTERVAL_MS}..={MAX_POLL_INTERVAL_MS}, got {poll}"
            )));
        }
        if self.server.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be at least 1".into(),
            ));
        }
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be at least 1".into(),
            ));
        }
        if self.monitor.catalog_path.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "monitor.catalogPath must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// WebSocket listener settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listener port (0 picks a free port).
    pub port: u16,
    /// Maximum concurrent client sessions.
    pub max_connections: usize,
    /// Largest accepted inbound frame in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per session before snapshots are dropped.
    pub send_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_connections: 64,
            max_message_size: 8192,
            send_queue_capacity: 1024,
        }
    }
}

/// Poll loop and catalog settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSettings {
    /// Period of the sample/broadcast tick.
    pub poll_interval_ms: u64,
    /// Path to the variable catalog file.
    pub catalog_path: String,
    /// Variables subscribed on every new telemetry connection.
    pub default_variables: Vec<String>,
    /// Connect to the telemetry source at startup.
    pub connect_on_start: bool,
    /// Entries kept in the status log.
    pub status_log_capacity: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            catalog_path: "data/variables.csv".to_string(),
            default_variables: Vec::new(),
            connect_on_start: true,
            status_log_capacity: 256,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (`RUST_LOG` wins when set).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
