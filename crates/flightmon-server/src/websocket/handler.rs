//! Inbound message dispatch.

use metrics::counter;
use tracing::{debug, info};

use crate::errors::MonitorError;
use crate::metrics::PROTOCOL_ERRORS_TOTAL;
use crate::monitor::Monitor;

use super::protocol::{ClientRequest, ServerMessage};

/// Handle one inbound text frame and build the reply.
///
/// Every failure becomes an `ERROR` reply; nothing here ends the session.
pub fn handle_message(text: &str, monitor: &Monitor) -> ServerMessage {
    let request = match ClientRequest::parse(text) {
        Ok(request) => request,
        Err(err) => {
            counter!(PROTOCOL_ERRORS_TOTAL, "kind" => err.kind()).increment(1);
            debug!(error = %err, "rejected inbound message");
            return ServerMessage::error(&err);
        }
    };

    match request {
        ClientRequest::AddVariable { variable } => match monitor.add_variable(&variable) {
            Ok(def) => {
                info!(variable = %def.name, id = %def.id, "variable subscribed");
                ServerMessage::declare(&def)
            }
            Err(err) => {
                let kind = match err {
                    MonitorError::UnknownVariable(_) => "unknown_variable",
                    MonitorError::Source(_) => "source",
                };
                counter!(PROTOCOL_ERRORS_TOTAL, "kind" => kind).increment(1);
                ServerMessage::error(&err)
            }
        },
    }
}
