//! `FlightMonitorServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use flightmon_core::SessionId;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::health;
use crate::metrics::{WS_CONNECTIONS_REFUSED_TOTAL, render};
use crate::monitor::Monitor;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::manager::SessionManager;
use crate::websocket::session::{SessionContext, run_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Listener configuration.
    pub config: Arc<ServerConfig>,
    /// Registry, values and live sessions.
    pub monitor: Arc<Monitor>,
    /// Live-session membership.
    pub manager: Arc<SessionManager>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
    /// When the server started.
    pub start_time: Instant,
}

impl AppState {
    fn session_context(&self) -> SessionContext {
        SessionContext {
            monitor: Arc::clone(&self.monitor),
            manager: Arc::clone(&self.manager),
            shutdown: self.shutdown.token(),
            send_queue_capacity: self.config.send_queue_capacity,
        }
    }
}

/// The Flight Monitor server.
pub struct FlightMonitorServer {
    config: Arc<ServerConfig>,
    monitor: Arc<Monitor>,
    manager: Arc<SessionManager>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: PrometheusHandle,
    start_time: Instant,
}

impl FlightMonitorServer {
    /// Create a server over `monitor`.
    ///
    /// `shutdown` should own the token the monitor was built with so one
    /// cancellation stops sessions, the listener and the telemetry pump.
    pub fn new(
        config: ServerConfig,
        monitor: Arc<Monitor>,
        shutdown: Arc<ShutdownCoordinator>,
        metrics: PrometheusHandle,
    ) -> Self {
        let manager = Arc::new(SessionManager::new(
            Arc::clone(&monitor),
            config.max_connections,
        ));
        Self {
            config: Arc::new(config),
            monitor,
            manager,
            shutdown,
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            config: Arc::clone(&self.config),
            monitor: Arc::clone(&self.monitor),
            manager: Arc::clone(&self.manager),
            shutdown: Arc::clone(&self.shutdown),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the listener and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, source = self.monitor.source_name(), "flight monitor listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                warn!(error = %err, "server terminated with error");
            }
        });
        Ok((local_addr, handle))
    }

    /// Cancel everything, drop live sessions and wait for `handles`.
    pub async fn shutdown_gracefully(&self, handles: Vec<JoinHandle<()>>) {
        self.shutdown.shutdown();
        let closed = self.manager.close_all();
        let _ = self.monitor.disconnect();
        info!(closed_sessions = closed, "shutting down");
        self.shutdown
            .graceful_shutdown(handles, self.config.shutdown_timeout)
            .await;
    }

    /// Get the monitor.
    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// Get the session manager.
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /ws (and /): upgrade into a session.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() || !state.manager.has_capacity() {
        counter!(WS_CONNECTIONS_REFUSED_TOTAL).increment(1);
        warn!(
            sessions = state.manager.count(),
            max = state.config.max_connections,
            "refusing websocket upgrade"
        );
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let ctx = state.session_context();
    ws.max_message_size(state.config.max_message_size)
        .on_failed_upgrade(|err: axum::Error| warn!(error = %err, "websocket upgrade failed"))
        .on_upgrade(move |socket| run_session(socket, SessionId::new(), ctx))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Response {
    let resp = health::health_check(
        state.start_time,
        state.monitor.source_name(),
        state.monitor.connection_status(),
        state.manager.count(),
        state.monitor.active_count(),
    );
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(resp)).into_response();
    }
    Json(resp).into_response()
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        render(&state.metrics),
    )
}
