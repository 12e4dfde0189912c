//! Server configuration.

use std::time::Duration;

use flightmon_settings::FlightMonitorSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the WebSocket listener.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket sessions.
    pub max_connections: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound frames queued per session.
    pub send_queue_capacity: usize,
    /// How long shutdown waits for background tasks.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 64,
            max_message_size: 8192,
            send_queue_capacity: 1024,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&FlightMonitorSettings> for ServerConfig {
    fn from(settings: &FlightMonitorSettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_connections: server.max_connections,
            max_message_size: server.max_message_size,
            send_queue_capacity: server.send_queue_capacity,
            ..Self::default()
        }
    }
}
