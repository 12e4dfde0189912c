//! Status surface for an operator UI: the connection flag and a bounded log
//! of notable events.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Telemetry connection state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No connection.
    #[default]
    Disconnected,
    /// Connect succeeded, waiting for the provider's open callback.
    Connecting,
    /// Open: variables are registered and the poll loop runs.
    Connected,
}

/// Severity of a status entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    /// Routine event.
    Info,
    /// Something the operator may want to look at.
    Warn,
    /// A failure.
    Error,
}

/// One status log entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    /// Severity.
    pub level: StatusLevel,
    /// Human-readable text.
    pub text: String,
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Bounded status log with a pull accessor and a push subscription.
///
/// Every entry is also emitted as a `tracing` event at the matching level.
pub struct StatusLog {
    entries: Mutex<VecDeque<StatusEntry>>,
    capacity: usize,
    tx: broadcast::Sender<StatusEntry>,
}

impl StatusLog {
    /// Create a log keeping at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            tx,
        }
    }

    /// Record an entry, evicting the oldest when full.
    pub fn push(&self, level: StatusLevel, text: impl Into<String>) {
        let entry = StatusEntry {
            level,
            text: text.into(),
            timestamp: Utc::now(),
        };
        match level {
            StatusLevel::Info => info!(status = %entry.text, "status"),
            StatusLevel::Warn => warn!(status = %entry.text, "status"),
            StatusLevel::Error => error!(status = %entry.text, "status"),
        }
        {
            let mut entries = self.entries.lock();
            if entries.len() == self.capacity {
                let _ = entries.pop_front();
            }
            entries.push_back(entry.clone());
        }
        let _ = self.tx.send(entry);
    }

    /// Shorthand for an info entry.
    pub fn info(&self, text: impl Into<String>) {
        self.push(StatusLevel::Info, text);
    }

    /// Shorthand for a warning entry.
    pub fn warn(&self, text: impl Into<String>) {
        self.push(StatusLevel::Warn, text);
    }

    /// Shorthand for an error entry.
    pub fn error(&self, text: impl Into<String>) {
        self.push(StatusLevel::Error, text);
    }

    /// Current entries, oldest first.
    pub fn entries(&self) -> Vec<StatusEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Receive entries as they are recorded.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEntry> {
        self.tx.subscribe()
    }
}
