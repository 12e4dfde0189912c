//! # flightmon-core
//!
//! Shared types for Flight Monitor: the variable catalog, value kinds with
//! their raw sample codec, and identifier types.

#![deny(unsafe_code)]

pub mod catalog;
pub mod errors;
pub mod ids;
pub mod value;

pub use catalog::{VariableCatalog, VariableDef};
pub use errors::{CatalogError, ValueError};
pub use ids::{SessionId, VariableId};
pub use value::{SimValue, ValueKind};
