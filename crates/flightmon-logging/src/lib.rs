//! # flightmon-logging
//!
//! Installs the process-wide `tracing` subscriber: an [`EnvFilter`] seeded
//! from the configured level (`RUST_LOG` wins when set) and a stdout fmt
//! layer, either human-readable or one JSON object per line.

#![deny(unsafe_code)]

use flightmon_settings::{LogFormat, LoggingSettings};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Failure to install the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The configured level is not a valid filter directive.
    #[error("invalid log filter {directive:?}: {reason}")]
    InvalidFilter {
        /// Directive that failed to parse.
        directive: String,
        /// Parser message.
        reason: String,
    },
    /// A global subscriber is already installed.
    #[error("tracing subscriber already installed")]
    AlreadyInstalled,
}

/// Build the filter: `RUST_LOG` when set and valid, otherwise `level`.
pub fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| LoggingError::InvalidFilter {
        directive: level.to_string(),
        reason: e.to_string(),
    })
}

/// Install the global subscriber. Call once at startup.
pub fn init_subscriber(settings: &LoggingSettings) -> Result<(), LoggingError> {
    let filter = build_filter(&settings.level)?;

    let fmt_layer = match settings.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInstalled)
}
