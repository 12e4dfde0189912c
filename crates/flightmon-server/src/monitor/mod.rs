//! The monitor context: the single owner of all mutable shared state.
//!
//! One [`Mutex`] guards the active-variable registry, the value store, the
//! live-session set and the telemetry link. Snapshots are built while holding
//! it, so a broadcast never observes a half-applied subscription or sample.
//!
//! Telemetry callbacks arrive as [`SourceEvent`]s on a per-connection channel
//! drained by a pump task. Each connection carries a generation number and a
//! child cancellation token; events from a superseded connection are ignored.

mod registry;
mod status;

pub use registry::ActiveVariableRegistry;
pub use status::{ConnectionStatus, StatusEntry, StatusLevel, StatusLog};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use flightmon_core::{SessionId, SimValue, VariableCatalog, VariableDef, VariableId};
use flightmon_settings::FlightMonitorSettings;
use flightmon_sim::{SourceEvent, TelemetrySource, event_channel};
use metrics::{counter, gauge};
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::MonitorError;
use crate::metrics::{ACTIVE_VARIABLES, SAMPLE_DECODE_ERRORS_TOTAL, SAMPLE_REQUESTS_TOTAL};
use crate::poll::PollScheduler;
use crate::websocket::connection::ClientConnection;

/// Monitor tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Sample/broadcast tick period.
    pub poll_interval: Duration,
    /// Names added on every new telemetry connection.
    pub default_variables: Vec<String>,
    /// Status log size.
    pub status_log_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            default_variables: Vec::new(),
            status_log_capacity: 256,
        }
    }
}

impl From<&FlightMonitorSettings> for MonitorConfig {
    fn from(settings: &FlightMonitorSettings) -> Self {
        Self {
            poll_interval: Duration::from_millis(settings.monitor.poll_interval_ms),
            default_variables: settings.monitor.default_variables.clone(),
            status_log_capacity: settings.monitor.status_log_capacity,
        }
    }
}

enum Link {
    Down,
    Connecting { token: CancellationToken },
    Open { token: CancellationToken },
}

impl Link {
    fn token(&self) -> Option<&CancellationToken> {
        match self {
            Self::Down => None,
            Self::Connecting { token } | Self::Open { token } => Some(token),
        }
    }
}

/// State guarded by the monitor lock.
pub(crate) struct MonitorState {
    pub(crate) registry: ActiveVariableRegistry,
    pub(crate) values: HashMap<VariableId, SimValue>,
    pub(crate) sessions: HashMap<SessionId, Arc<ClientConnection>>,
    link: Link,
    generation: u64,
    warned_generation: u64,
}

impl MonitorState {
    fn is_open(&self) -> bool {
        matches!(self.link, Link::Open { .. })
    }

    /// Current value of `variable`, or its kind's zero before any sample.
    pub(crate) fn value_of(&self, variable: &VariableDef) -> SimValue {
        self.values
            .get(&variable.id)
            .cloned()
            .unwrap_or_else(|| variable.kind.zero())
    }
}

/// Shared monitor context.
pub struct Monitor {
    catalog: Arc<VariableCatalog>,
    source: Arc<dyn TelemetrySource>,
    config: MonitorConfig,
    state: Mutex<MonitorState>,
    status_log: StatusLog,
    status_tx: watch::Sender<ConnectionStatus>,
    shutdown: CancellationToken,
}

impl Monitor {
    /// Create a monitor. Telemetry tasks are children of `shutdown`.
    pub fn new(
        catalog: Arc<VariableCatalog>,
        source: Arc<dyn TelemetrySource>,
        config: MonitorConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            catalog,
            source,
            status_log: StatusLog::new(config.status_log_capacity),
            config,
            state: Mutex::new(MonitorState {
                registry: ActiveVariableRegistry::new(),
                values: HashMap::new(),
                sessions: HashMap::new(),
                link: Link::Down,
                generation: 0,
                warned_generation: 0,
            }),
            status_tx,
            shutdown,
        }
    }

    /// The variable catalog.
    pub fn catalog(&self) -> &VariableCatalog {
        &self.catalog
    }

    /// Telemetry source name.
    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Monitor configuration.
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Status log for the operator UI.
    pub fn status_log(&self) -> &StatusLog {
        &self.status_log
    }

    /// Current connection state.
    pub fn connection_status(&self) -> ConnectionStatus {
        *self.status_tx.borrow()
    }

    /// Watch connection state changes.
    pub fn subscribe_connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Active variables in subscription order.
    pub fn active_variables(&self) -> Vec<Arc<VariableDef>> {
        self.state.lock().registry.snapshot()
    }

    /// Number of active variables.
    pub fn active_count(&self) -> usize {
        self.state.lock().registry.len()
    }

    /// Last sampled value of `id`, if any sample arrived on this connection.
    pub fn value(&self, id: VariableId) -> Option<SimValue> {
        self.state.lock().values.get(&id).cloned()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock()
    }

    /// Subscribe to `name`.
    ///
    /// Unknown names fail without touching the active set. Adding an active
    /// variable again returns it unchanged. On a live connection the variable
    /// is registered with the source before it joins the active set.
    pub fn add_variable(&self, name: &str) -> Result<Arc<VariableDef>, MonitorError> {
        let Some(variable) = self.catalog.by_name(name) else {
            self.status_log
                .warn(format!("Cannot monitor nonexistent variable {name}."));
            return Err(MonitorError::UnknownVariable(name.to_string()));
        };

        let active = {
            let mut state = self.state.lock();
            if state.registry.contains(variable.id) {
                return Ok(Arc::clone(variable));
            }
            if state.is_open() {
                self.source.register_for_sampling(variable)?;
            }
            let _ = state.registry.insert(Arc::clone(variable));
            state.registry.len()
        };

        gauge!(ACTIVE_VARIABLES).set(active as f64);
        self.status_log
            .info(format!("Started monitoring variable {name}."));
        Ok(Arc::clone(variable))
    }

    /// Open a telemetry connection.
    ///
    /// A new connection starts from an empty active set and value store;
    /// configured default variables are added back. Calling this while a
    /// connection exists keeps the existing one.
    pub fn connect(self: &Arc<Self>) -> Result<(), MonitorError> {
        let mut state = self.state.lock();
        if !matches!(state.link, Link::Down) {
            drop(state);
            self.status_log.warn(
                "Attempted to establish simultaneous connections. Retaining existing connection.",
            );
            return Ok(());
        }

        let (sink, events) = event_channel();
        if let Err(err) = self.source.connect(sink) {
            drop(state);
            self.status_log
                .error(format!("Error occurred while connecting: {err}"));
            return Err(err.into());
        }

        state.registry.clear();
        state.values.clear();
        state.generation += 1;
        let generation = state.generation;
        let token = self.shutdown.child_token();
        state.link = Link::Connecting {
            token: token.clone(),
        };

        let mut skipped = Vec::new();
        for name in &self.config.default_variables {
            match self.catalog.by_name(name) {
                Some(variable) => {
                    let _ = state.registry.insert(Arc::clone(variable));
                }
                None => skipped.push(name.clone()),
            }
        }
        let active = state.registry.len();
        let _ = self.status_tx.send_replace(ConnectionStatus::Connecting);
        drop(state);

        self.status_log.clear();
        self.status_log
            .info(format!("Connected to {}.", self.source.name()));
        for name in skipped {
            self.status_log
                .warn(format!("Cannot monitor nonexistent variable {name}."));
        }
        gauge!(ACTIVE_VARIABLES).set(active as f64);

        let _ = tokio::spawn(Arc::clone(self).pump(events, token, generation));
        Ok(())
    }

    /// Close the telemetry connection, stop polling and clear the active set.
    /// Returns `false` if there was no connection.
    pub fn disconnect(&self) -> bool {
        self.teardown(None, "Disconnecting from telemetry source.")
    }

    /// Ask the source for a fresh sample of every active variable.
    /// Returns the number of requests issued.
    pub fn request_samples(&self) -> usize {
        let (active, generation) = {
            let state = self.state.lock();
            if !state.is_open() {
                return 0;
            }
            (state.registry.snapshot(), state.generation)
        };

        let mut issued = 0;
        let mut failure = None;
        for variable in &active {
            match self.source.request_sample(variable) {
                Ok(()) => issued += 1,
                Err(err) => {
                    debug!(variable = %variable.name, error = %err, "sample request failed");
                    let _ = failure.get_or_insert_with(|| format!("{}: {err}", variable.name));
                }
            }
        }
        counter!(SAMPLE_REQUESTS_TOTAL).increment(issued as u64);

        // Surface failures once per connection
        if let Some(failure) = failure {
            let first = {
                let mut state = self.state.lock();
                let first = state.warned_generation != generation;
                state.warned_generation = generation;
                first
            };
            if first {
                self.status_log
                    .warn(format!("Sample requests are failing ({failure})."));
            }
        }
        issued
    }

    #[instrument(skip_all, fields(generation = generation))]
    async fn pump(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<SourceEvent>,
        token: CancellationToken,
        generation: u64,
    ) {
        loop {
            let event = tokio::select! {
                biased;
                () = token.cancelled() => break,
                event = events.recv() => event,
            };
            let Some(event) = event else {
                let _ = self.teardown(Some(generation), "Telemetry event stream ended: disconnecting.");
                break;
            };
            let terminal = event.is_terminal();
            match event {
                SourceEvent::Open => self.on_open(generation, &token),
                SourceEvent::Sample { id, raw } => self.on_sample(generation, id, &raw),
                SourceEvent::Exception { code, detail } => {
                    self.status_log
                        .warn(format!("Received exception {code}: {detail}"));
                }
                SourceEvent::Quit => {
                    let _ = self.teardown(Some(generation), "Received quit message: disconnecting.");
                }
                SourceEvent::Fault(reason) => {
                    self.status_log.error(format!("Connection fault: {reason}"));
                    let _ = self.teardown(Some(generation), "Disconnecting after fault.");
                }
            }
            if terminal {
                break;
            }
        }
        debug!("telemetry pump stopped");
    }

    fn on_open(self: &Arc<Self>, generation: u64, token: &CancellationToken) {
        {
            let mut state = self.state.lock();
            if state.generation != generation || !matches!(state.link, Link::Connecting { .. }) {
                return;
            }
            for variable in state.registry.iter() {
                if let Err(err) = self.source.register_for_sampling(variable) {
                    warn!(variable = %variable.name, error = %err, "registration failed");
                }
            }
            state.link = Link::Open {
                token: token.clone(),
            };
            let _ = self.status_tx.send_replace(ConnectionStatus::Connected);
        }

        self.status_log
            .info("Received open message: variables registered, polling started.");
        let _ = PollScheduler::new(Arc::clone(self), self.config.poll_interval).spawn(token.clone());
    }

    fn on_sample(&self, generation: u64, id: VariableId, raw: &[u8]) {
        let Some(variable) = self.catalog.by_id(id) else {
            warn!(%id, "sample for unknown variable id");
            return;
        };
        let value = match variable.kind.decode(raw) {
            Ok(value) => value,
            Err(err) => {
                counter!(SAMPLE_DECODE_ERRORS_TOTAL).increment(1);
                warn!(variable = %variable.name, error = %err, "dropping undecodable sample");
                return;
            }
        };

        let mut state = self.state.lock();
        if state.generation == generation && state.is_open() && state.registry.contains(id) {
            let _ = state.values.insert(id, value);
        }
    }

    /// Tear the link down. With `Some(generation)`, only if that connection is
    /// still current.
    ///
    /// The source disconnect and the status change happen under the lock so a
    /// concurrent `connect` cannot be undone by a stale teardown.
    fn teardown(&self, generation: Option<u64>, message: &str) -> bool {
        {
            let mut state = self.state.lock();
            if generation.is_some_and(|g| g != state.generation) {
                return false;
            }
            let Some(token) = state.link.token() else {
                return false;
            };
            token.cancel();
            state.link = Link::Down;
            state.registry.clear();
            state.values.clear();
            self.source.disconnect();
            let _ = self.status_tx.send_replace(ConnectionStatus::Disconnected);
        }

        gauge!(ACTIVE_VARIABLES).set(0.0);
        self.status_log.info(message);
        info!(source = self.source.name(), "telemetry link down");
        true
    }
}
