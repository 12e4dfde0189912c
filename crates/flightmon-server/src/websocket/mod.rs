//! WebSocket session lifecycle, the live-session set and the Flight Monitor
//! protocol.

pub mod connection;
pub mod handler;
pub mod manager;
pub mod protocol;
pub mod session;
