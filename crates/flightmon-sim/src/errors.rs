//! Telemetry source error types.

use thiserror::Error;

/// Errors returned by a [`TelemetrySource`](crate::TelemetrySource).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The operation needs a live connection.
    #[error("telemetry source is not connected")]
    NotConnected,
    /// The provider refused or failed the connection attempt.
    #[error("failed to connect to telemetry source: {0}")]
    ConnectFailed(String),
    /// A sample was requested for a variable never registered on this
    /// connection.
    #[error("variable {0} is not registered for sampling")]
    NotRegistered(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_failed_display() {
        let err = SourceError::ConnectFailed("simulator not running".into());
        assert_eq!(
            err.to_string(),
            "failed to connect to telemetry source: simulator not running"
        );
    }

    #[test]
    fn not_registered_display() {
        let err = SourceError::NotRegistered("ATC ID".into());
        assert!(err.to_string().contains("ATC ID"));
    }
}
