//! The live-session set.

use std::sync::Arc;

use flightmon_core::SessionId;
use metrics::{counter, gauge, histogram};
use tracing::{debug, info};

use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::monitor::Monitor;

use super::connection::ClientConnection;

/// Why a session could not join the live set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenRejection {
    /// `max_connections` sessions are already live.
    AtCapacity,
    /// The connection is no longer in `Connecting`.
    NotConnecting,
}

/// Owns membership of the live-session set, which lives under the monitor
/// lock alongside the registry so snapshots see a consistent view.
pub struct SessionManager {
    monitor: Arc<Monitor>,
    max_connections: usize,
}

impl SessionManager {
    /// Create a manager admitting at most `max_connections` sessions.
    pub fn new(monitor: Arc<Monitor>, max_connections: usize) -> Self {
        Self {
            monitor,
            max_connections,
        }
    }

    /// Whether another session would be admitted right now.
    pub fn has_capacity(&self) -> bool {
        self.count() < self.max_connections
    }

    /// Number of live sessions.
    pub fn count(&self) -> usize {
        self.monitor.session_count()
    }

    /// Move `conn` to `Open` and insert it into the live set.
    pub fn open(&self, conn: &Arc<ClientConnection>) -> Result<(), OpenRejection> {
        {
            let mut state = self.monitor.lock_state();
            if state.sessions.len() >= self.max_connections {
                return Err(OpenRejection::AtCapacity);
            }
            if !conn.mark_open() {
                return Err(OpenRejection::NotConnecting);
            }
            let _ = state.sessions.insert(conn.id.clone(), Arc::clone(conn));
        }
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        info!(session_id = %conn.id, "session opened");
        Ok(())
    }

    /// Remove a session from the live set.
    ///
    /// Safe to call from racing paths: the entry is removed by identity under
    /// the lock and only the first caller gets `true`.
    pub fn close(&self, id: &SessionId) -> bool {
        let removed = self.monitor.lock_state().sessions.remove(id);
        let Some(conn) = removed else {
            return false;
        };
        let _ = conn.mark_closed();
        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(conn.age().as_secs_f64());
        info!(
            session_id = %id,
            dropped_frames = conn.drop_count(),
            "session closed"
        );
        true
    }

    /// Close every live session. Returns how many were removed.
    pub fn close_all(&self) -> usize {
        let ids: Vec<SessionId> = self.monitor.lock_state().sessions.keys().cloned().collect();
        let closed = ids.iter().filter(|id| self.close(id)).count();
        debug!(closed, "closed all sessions");
        closed
    }
}
