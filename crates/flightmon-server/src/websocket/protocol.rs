//! Flight Monitor wire protocol.
//!
//! | Direction | `type`             | Fields               |
//! |-----------|--------------------|----------------------|
//! | C→S       | `ADD_VARIABLE`     | `variable`           |
//! | S→C       | `DECLARE_VARIABLE` | `name`, `id`, `unit` |
//! | S→C       | `ERROR`            | `message`            |
//! | S→C       | `STATE_SNAPSHOT`   | `state: {id: value}` |

use std::collections::BTreeMap;

use flightmon_core::{SimValue, VariableDef, VariableId};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Server → client message.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Acknowledges a subscription.
    DeclareVariable {
        /// Catalog name.
        name: String,
        /// Catalog id, the key used in snapshots.
        id: VariableId,
        /// Catalog unit.
        unit: String,
    },
    /// A recoverable request failure.
    Error {
        /// Human-readable description.
        message: String,
    },
    /// Current values of the whole active set.
    StateSnapshot {
        /// Values keyed by variable id.
        state: BTreeMap<VariableId, SimValue>,
    },
}

impl ServerMessage {
    /// `DECLARE_VARIABLE` for `variable`.
    pub fn declare(variable: &VariableDef) -> Self {
        Self::DeclareVariable {
            name: variable.name.clone(),
            id: variable.id,
            unit: variable.unit.clone(),
        }
    }

    /// `ERROR` carrying `err`'s display text.
    pub fn error(err: &impl std::fmt::Display) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }

    /// Serialize to JSON text.
    pub fn to_json(&self) -> String {
        // Every variant is a string-keyed map of plain values
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Client → server request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientRequest {
    /// Start monitoring `variable`.
    AddVariable {
        /// Catalog name.
        variable: String,
    },
}

/// Inbound message rejected before dispatch. `Display` is the `ERROR` text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Not parseable as a JSON object.
    #[error("Malformed JSON message: {0}")]
    MalformedJson(String),
    /// No string `type` key.
    #[error("Malformed message: must contain a key \"type\".")]
    MissingType,
    /// `type` is not a known request.
    #[error("Cannot execute message of unknown type {0}.")]
    UnknownType(String),
    /// `ADD_VARIABLE` without a string `variable`.
    #[error("Malformed message: ADD_VARIABLE must contain a string key \"variable\".")]
    MissingVariable,
}

impl ProtocolError {
    /// Label for the protocol error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedJson(_) => "malformed_json",
            Self::MissingType => "missing_type",
            Self::UnknownType(_) => "unknown_type",
            Self::MissingVariable => "missing_variable",
        }
    }
}

impl ClientRequest {
    /// Parse one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;
        let Value::Object(fields) = value else {
            return Err(ProtocolError::MalformedJson(
                "expected a JSON object".to_string(),
            ));
        };
        let Some(kind) = fields.get("type").and_then(Value::as_str) else {
            return Err(ProtocolError::MissingType);
        };
        match kind {
            "ADD_VARIABLE" => {
                let variable = fields
                    .get("variable")
                    .and_then(Value::as_str)
                    .ok_or(ProtocolError::MissingVariable)?;
                Ok(Self::AddVariable {
                    variable: variable.to_string(),
                })
            }
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}
