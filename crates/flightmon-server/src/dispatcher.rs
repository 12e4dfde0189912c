//! `STATE_SNAPSHOT` fan-out.

use std::collections::BTreeMap;
use std::sync::Arc;

use flightmon_core::{SimValue, VariableId};
use metrics::counter;
use tracing::debug;

use crate::metrics::{SNAPSHOTS_TOTAL, WS_BROADCAST_DROPS_TOTAL};
use crate::monitor::Monitor;
use crate::websocket::protocol::ServerMessage;

/// Outcome of one broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions the snapshot was queued for.
    pub recipients: usize,
    /// Open sessions whose queue was full or closed.
    pub dropped: usize,
}

/// Builds one snapshot of the active set and queues it on every open session.
///
/// Delivery is fire-and-forget: a full send queue drops that session's frame
/// and nothing is retried. Every open session receives the whole active set.
pub struct BroadcastDispatcher {
    monitor: Arc<Monitor>,
}

impl BroadcastDispatcher {
    /// Create a dispatcher over `monitor`'s state.
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self { monitor }
    }

    /// Broadcast the current snapshot.
    pub fn dispatch(&self) -> BroadcastReport {
        let state = self.monitor.lock_state();
        if state.sessions.is_empty() {
            return BroadcastReport::default();
        }

        let snapshot: BTreeMap<VariableId, SimValue> = state
            .registry
            .iter()
            .map(|variable| (variable.id, state.value_of(variable)))
            .collect();
        let frame = Arc::new(ServerMessage::StateSnapshot { state: snapshot }.to_json());

        let mut report = BroadcastReport::default();
        for conn in state.sessions.values().filter(|c| c.is_open()) {
            if conn.send(Arc::clone(&frame)) {
                report.recipients += 1;
            } else {
                report.dropped += 1;
            }
        }
        drop(state);

        counter!(SNAPSHOTS_TOTAL).increment(1);
        if report.dropped > 0 {
            counter!(WS_BROADCAST_DROPS_TOTAL).increment(report.dropped as u64);
            debug!(dropped = report.dropped, "snapshot dropped for slow sessions");
        }
        report
    }
}
