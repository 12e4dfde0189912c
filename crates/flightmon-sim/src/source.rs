//! The telemetry source interface.
//!
//! A provider is a single connection to the live data feed. Its callbacks
//! (open, sample ready, exception, quit, fault) arrive on whatever thread the
//! provider chooses; here they are modelled as [`SourceEvent`]s pushed into an
//! [`EventSink`] handed over at connect time. The consumer drains the matching
//! receiver on its own task.

use flightmon_core::{VariableDef, VariableId};
use tokio::sync::mpsc;

use crate::errors::SourceError;

/// One callback from the provider.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceEvent {
    /// The connection is open; registrations now take effect.
    Open,
    /// A requested sample is ready. `raw` is the provider's fixed-layout
    /// encoding for the variable's kind.
    Sample {
        /// Variable the sample belongs to.
        id: VariableId,
        /// Raw sample bytes.
        raw: Vec<u8>,
    },
    /// The provider reported a recoverable exception.
    Exception {
        /// Provider exception code.
        code: u32,
        /// Human-readable detail.
        detail: String,
    },
    /// The provider closed the connection.
    Quit,
    /// The connection failed.
    Fault(String),
}

impl SourceEvent {
    /// Whether this event ends the connection.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Quit | Self::Fault(_))
    }
}

/// Sending half of a connection's event stream.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<SourceEvent>,
}

impl EventSink {
    /// Deliver an event. Returns `false` once the consumer has gone away.
    pub fn emit(&self, event: SourceEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Whether the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a fresh event stream for one connection.
pub fn event_channel() -> (EventSink, mpsc::UnboundedReceiver<SourceEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, rx)
}

/// A connection to a telemetry provider.
///
/// Implementations must be cheap to call from inside the monitor's lock:
/// none of these methods may block waiting on the provider.
pub trait TelemetrySource: Send + Sync {
    /// Short name used in logs and the health endpoint.
    fn name(&self) -> &str;

    /// Open the connection. On success the provider emits
    /// [`SourceEvent::Open`] into `sink` once it is ready.
    fn connect(&self, sink: EventSink) -> Result<(), SourceError>;

    /// Close the connection. No further events are emitted afterwards.
    fn disconnect(&self);

    /// Declare intent to sample `variable` on the current connection.
    fn register_for_sampling(&self, variable: &VariableDef) -> Result<(), SourceError>;

    /// Ask for one fresh reading. The value arrives later as a
    /// [`SourceEvent::Sample`].
    fn request_sample(&self, variable: &VariableDef) -> Result<(), SourceError>;
}
