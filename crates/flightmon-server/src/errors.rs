//! Monitor error types.

use flightmon_sim::SourceError;
use thiserror::Error;

/// Errors returned by [`Monitor`](crate::Monitor) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    /// The requested name is not in the catalog.
    #[error("Cannot monitor unknown variable {0}.")]
    UnknownVariable(String),
    /// The telemetry source rejected an operation.
    #[error(transparent)]
    Source(#[from] SourceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_variable_is_wire_text() {
        let err = MonitorError::UnknownVariable("BOGUS".into());
        assert_eq!(err.to_string(), "Cannot monitor unknown variable BOGUS.");
    }

    #[test]
    fn source_error_passes_through() {
        let err: MonitorError = SourceError::NotConnected.into();
        assert_eq!(err.to_string(), "telemetry source is not connected");
    }
}
