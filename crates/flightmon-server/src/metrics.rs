//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Build a recorder handle without installing it globally.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket sessions opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket sessions closed total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Upgrades refused at the connection cap (counter).
pub const WS_CONNECTIONS_REFUSED_TOTAL: &str = "ws_connections_refused_total";
/// Open WebSocket sessions (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Session lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Snapshots built (counter).
pub const SNAPSHOTS_TOTAL: &str = "snapshots_total";
/// Snapshot frames dropped on full or closed queues (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// `ERROR` replies sent (counter, labels: kind).
pub const PROTOCOL_ERRORS_TOTAL: &str = "protocol_errors_total";
/// Variables in the active set (gauge).
pub const ACTIVE_VARIABLES: &str = "active_variables";
/// Sample requests issued (counter).
pub const SAMPLE_REQUESTS_TOTAL: &str = "sample_requests_total";
/// Samples dropped by the codec (counter).
pub const SAMPLE_DECODE_ERRORS_TOTAL: &str = "sample_decode_errors_total";
