//! Core error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::value::ValueKind;

/// Errors raised while loading the variable catalog. Any of these is fatal at
/// startup.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog file could not be read.
    #[error("failed to read catalog {path}: {source}")]
    Io {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// A line is not a valid `name,unit` pair.
    #[error("malformed catalog line {line}: {reason}")]
    Malformed {
        /// 1-based line number.
        line: usize,
        /// What is wrong with the line.
        reason: String,
    },
    /// A name appears twice.
    #[error("duplicate variable {name:?} on catalog line {line}")]
    DuplicateName {
        /// The repeated name.
        name: String,
        /// 1-based line number of the second occurrence.
        line: usize,
    },
    /// More entries than the id space can hold.
    #[error("catalog exceeds the maximum of {max} variables")]
    TooManyVariables {
        /// Largest supported catalog size.
        max: u64,
    },
}

/// Errors raised by the raw sample codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// Raw sample size does not match the kind's layout.
    #[error("{kind:?} sample must be {expected} bytes, got {actual}")]
    WrongLength {
        /// Kind being decoded.
        kind: ValueKind,
        /// Required size.
        expected: usize,
        /// Size received.
        actual: usize,
    },
    /// Value variant does not belong to the target kind.
    #[error("cannot encode a {found:?} value as {kind:?}")]
    KindMismatch {
        /// Target kind.
        kind: ValueKind,
        /// Kind of the value supplied.
        found: ValueKind,
    },
}
