//! # flightmon-server
//!
//! Bridges one telemetry source to any number of WebSocket clients.
//!
//! - [`monitor::Monitor`]: active-variable registry, value store and live
//!   session set behind a single lock, plus the source connection lifecycle
//! - [`poll::PollScheduler`]: fixed-interval sample requests
//! - [`dispatcher::BroadcastDispatcher`]: `STATE_SNAPSHOT` fan-out
//! - [`websocket`]: session state machine and the JSON protocol
//! - [`server::FlightMonitorServer`]: axum router with `/ws`, `/health` and
//!   `/metrics`, graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod monitor;
pub mod poll;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::MonitorError;
pub use monitor::{ConnectionStatus, Monitor, MonitorConfig};
pub use server::FlightMonitorServer;
