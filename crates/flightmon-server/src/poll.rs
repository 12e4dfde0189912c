//! Fixed-interval sample requests and snapshot broadcasts.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::dispatcher::{BroadcastDispatcher, BroadcastReport};
use crate::monitor::Monitor;

/// Drives one telemetry connection's tick.
///
/// Each tick asks the source for a fresh sample of every active variable,
/// then broadcasts the values received so far. Samples requested on one tick
/// show up in the next tick's snapshot.
pub struct PollScheduler {
    monitor: Arc<Monitor>,
    dispatcher: BroadcastDispatcher,
    period: Duration,
}

impl PollScheduler {
    /// Create a scheduler ticking every `period`.
    pub fn new(monitor: Arc<Monitor>, period: Duration) -> Self {
        Self {
            dispatcher: BroadcastDispatcher::new(Arc::clone(&monitor)),
            monitor,
            period,
        }
    }

    /// Run one tick.
    pub fn tick(&self) -> BroadcastReport {
        let requested = self.monitor.request_samples();
        let report = self.dispatcher.dispatch();
        trace!(
            requested,
            recipients = report.recipients,
            dropped = report.dropped,
            "tick"
        );
        report
    }

    /// Tick until `token` is cancelled. The first tick fires one period
    /// after spawning.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the immediate first tick
            let _ = interval.tick().await;

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = interval.tick() => {
                        let _ = self.tick();
                    }
                }
            }
            debug!("poll scheduler stopped");
        })
    }
}
