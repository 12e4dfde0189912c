//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

use crate::monitor::ConnectionStatus;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Telemetry source name.
    pub source: String,
    /// Telemetry connection state.
    pub source_status: ConnectionStatus,
    /// Open WebSocket sessions.
    pub sessions: usize,
    /// Variables in the active set.
    pub active_variables: usize,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    source: &str,
    source_status: ConnectionStatus,
    sessions: usize,
    active_variables: usize,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        source: source.to_string(),
        source_status,
        sessions,
        active_variables,
    }
}
