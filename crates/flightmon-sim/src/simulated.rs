//! In-process telemetry provider.
//!
//! Behaves like a live provider: `connect` emits `Open`, each
//! `request_sample` answers with one `Sample` event carrying the provider's
//! raw layout. Values come from a per-name script when one is set, otherwise
//! from a synthetic waveform. Test hooks inject quit, fault and exception
//! callbacks and count sample requests per variable.

use std::collections::HashMap;

use flightmon_core::{SimValue, ValueKind, VariableDef, VariableId};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::errors::SourceError;
use crate::source::{EventSink, SourceEvent, TelemetrySource};

#[derive(Default)]
struct SimState {
    sink: Option<EventSink>,
    registered: HashMap<VariableId, VariableDef>,
    scripted: HashMap<String, SimValue>,
    requests: HashMap<VariableId, u64>,
    connects: u32,
    tick: u32,
    fail_connect: Option<String>,
}

/// Simulated provider.
pub struct SimulatedSource {
    name: String,
    auto_open: bool,
    state: Mutex<SimState>,
}

impl SimulatedSource {
    /// Create a provider that opens immediately on connect.
    pub fn new() -> Self {
        Self {
            name: "simulator".into(),
            auto_open: true,
            state: Mutex::new(SimState::default()),
        }
    }

    /// Create a provider that waits for [`open`](Self::open) before emitting
    /// `Open`.
    pub fn deferred() -> Self {
        Self {
            auto_open: false,
            ..Self::new()
        }
    }

    /// Script the value returned for `name` from now on.
    pub fn set_value(&self, name: &str, value: SimValue) {
        let _ = self.state.lock().scripted.insert(name.to_string(), value);
    }

    /// Make the next connect attempts fail with `reason` (`None` to clear).
    pub fn fail_connect(&self, reason: Option<&str>) {
        self.state.lock().fail_connect = reason.map(str::to_string);
    }

    /// Emit `Open` on a deferred connection.
    pub fn open(&self) -> bool {
        self.emit(SourceEvent::Open)
    }

    /// Simulate the provider quitting.
    pub fn inject_quit(&self) -> bool {
        self.emit(SourceEvent::Quit)
    }

    /// Simulate a connection fault.
    pub fn inject_fault(&self, reason: &str) -> bool {
        self.emit(SourceEvent::Fault(reason.to_string()))
    }

    /// Simulate a recoverable provider exception.
    pub fn inject_exception(&self, code: u32, detail: &str) -> bool {
        self.emit(SourceEvent::Exception {
            code,
            detail: detail.to_string(),
        })
    }

    /// Deliver a raw sample as if the provider had answered a request.
    pub fn inject_raw_sample(&self, id: VariableId, raw: Vec<u8>) -> bool {
        self.emit(SourceEvent::Sample { id, raw })
    }

    /// Number of sample requests seen for `id` across all connections.
    pub fn request_count(&self, id: VariableId) -> u64 {
        self.state.lock().requests.get(&id).copied().unwrap_or(0)
    }

    /// Whether `id` is registered on the current connection.
    pub fn is_registered(&self, id: VariableId) -> bool {
        self.state.lock().registered.contains_key(&id)
    }

    /// Number of successful connects so far.
    pub fn connect_count(&self) -> u32 {
        self.state.lock().connects
    }

    /// Whether a connection is open and its consumer is still listening.
    pub fn is_connected(&self) -> bool {
        self.state
            .lock()
            .sink
            .as_ref()
            .is_some_and(|sink| !sink.is_closed())
    }

    fn emit(&self, event: SourceEvent) -> bool {
        let sink = self.state.lock().sink.clone();
        match sink {
            Some(sink) => sink.emit(event),
            None => false,
        }
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySource for SimulatedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self, sink: EventSink) -> Result<(), SourceError> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.fail_connect {
            return Err(SourceError::ConnectFailed(reason.clone()));
        }
        state.registered.clear();
        state.connects += 1;
        if self.auto_open {
            let _ = sink.emit(SourceEvent::Open);
        }
        state.sink = Some(sink);
        info!(connects = state.connects, "simulator connected");
        Ok(())
    }

    fn disconnect(&self) {
        let mut state = self.state.lock();
        if state.sink.take().is_some() {
            state.registered.clear();
            info!("simulator disconnected");
        }
    }

    fn register_for_sampling(&self, variable: &VariableDef) -> Result<(), SourceError> {
        let mut state = self.state.lock();
        if state.sink.is_none() {
            return Err(SourceError::NotConnected);
        }
        debug!(
            variable = %variable.name,
            unit = variable.registration_unit(),
            "registered for sampling"
        );
        let _ = state.registered.insert(variable.id, variable.clone());
        Ok(())
    }

    fn request_sample(&self, variable: &VariableDef) -> Result<(), SourceError> {
        let mut state = self.state.lock();
        let Some(sink) = state.sink.clone().filter(|sink| !sink.is_closed()) else {
            return Err(SourceError::NotConnected);
        };
        if !state.registered.contains_key(&variable.id) {
            return Err(SourceError::NotRegistered(variable.name.clone()));
        }
        *state.requests.entry(variable.id).or_insert(0) += 1;
        state.tick = state.tick.wrapping_add(1);

        let value = state
            .scripted
            .get(&variable.name)
            .cloned()
            .unwrap_or_else(|| synthetic(variable, state.tick));
        let raw = match variable.kind.encode(&value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(variable = %variable.name, error = %err, "scripted value does not fit variable kind");
                variable.kind.encode(&variable.kind.zero()).unwrap_or_default()
            }
        };
        let _ = sink.emit(SourceEvent::Sample {
            id: variable.id,
            raw,
        });
        Ok(())
    }
}

/// Deterministic stand-in values for unscripted variables.
fn synthetic(variable: &VariableDef, tick: u32) -> SimValue {
    let id = variable.id.get();
    match variable.kind {
        ValueKind::Float64 => {
            let base = 1000.0 * f64::from(id + 1);
            SimValue::Float64(base + 100.0 * (f64::from(tick) / 10.0).sin())
        }
        ValueKind::Bool => SimValue::Bool(tick % 20 < 10),
        ValueKind::ShortString => SimValue::ShortString(format!("SIM{id}")),
        ValueKind::LongString => SimValue::LongString(format!("Simulated {}", variable.name)),
    }
}
