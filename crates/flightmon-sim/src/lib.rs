//! # flightmon-sim
//!
//! The telemetry provider seam.
//!
//! - [`TelemetrySource`]: connect/disconnect, per-variable registration and
//!   sample requests
//! - [`SourceEvent`] / [`EventSink`]: the provider's callbacks, delivered as an
//!   ordered event stream instead of foreign-thread callbacks
//! - [`SimulatedSource`]: in-process provider with scripted values and fault
//!   injection

#![deny(unsafe_code)]

pub mod errors;
pub mod simulated;
pub mod source;

pub use errors::SourceError;
pub use simulated::SimulatedSource;
pub use source::{EventSink, SourceEvent, TelemetrySource, event_channel};
