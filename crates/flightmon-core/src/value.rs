//! Value kinds and the raw sample codec.
//!
//! The telemetry provider delivers samples as fixed-layout byte blocks whose
//! shape depends on the variable's kind. The kind is resolved once, at catalog
//! load, from the variable's unit string:
//!
//! | unit       | kind          | raw layout                      |
//! |------------|---------------|---------------------------------|
//! | `Bool`     | `Bool`        | 4-byte LE integer, non-zero = true |
//! | `String8`  | `ShortString` | 8 bytes, NUL padded             |
//! | `String64` | `LongString`  | 64 bytes, NUL padded            |
//! | other      | `Float64`     | 8-byte LE IEEE double           |

use serde::{Deserialize, Serialize};

use crate::errors::ValueError;

/// Closed set of value kinds a variable can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Double-precision number (any physical unit).
    Float64,
    /// Boolean flag.
    Bool,
    /// Text of at most 8 bytes.
    ShortString,
    /// Text of at most 64 bytes.
    LongString,
}

const SHORT_STRING_LEN: usize = 8;
const LONG_STRING_LEN: usize = 64;

impl ValueKind {
    /// Resolve the kind from a catalog unit string.
    pub fn from_unit(unit: &str) -> Self {
        match unit {
            "Bool" => Self::Bool,
            "String8" => Self::ShortString,
            "String64" => Self::LongString,
            _ => Self::Float64,
        }
    }

    /// Whether values of this kind are text.
    pub fn is_string(self) -> bool {
        matches!(self, Self::ShortString | Self::LongString)
    }

    /// Size in bytes of one raw sample.
    pub fn raw_len(self) -> usize {
        match self {
            Self::Float64 => 8,
            Self::Bool => 4,
            Self::ShortString => SHORT_STRING_LEN,
            Self::LongString => LONG_STRING_LEN,
        }
    }

    /// Value reported before the first sample arrives.
    pub fn zero(self) -> SimValue {
        match self {
            Self::Float64 => SimValue::Float64(0.0),
            Self::Bool => SimValue::Bool(false),
            Self::ShortString => SimValue::ShortString(String::new()),
            Self::LongString => SimValue::LongString(String::new()),
        }
    }

    /// Decode one raw sample.
    pub fn decode(self, raw: &[u8]) -> Result<SimValue, ValueError> {
        let expected = self.raw_len();
        if raw.len() != expected {
            return Err(ValueError::WrongLength {
                kind: self,
                expected,
                actual: raw.len(),
            });
        }
        let value = match self {
            Self::Float64 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(raw);
                SimValue::Float64(f64::from_le_bytes(buf))
            }
            Self::Bool => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(raw);
                SimValue::Bool(i32::from_le_bytes(buf) != 0)
            }
            Self::ShortString => SimValue::ShortString(decode_padded(raw)),
            Self::LongString => SimValue::LongString(decode_padded(raw)),
        };
        Ok(value)
    }

    /// Encode a value into this kind's raw layout.
    ///
    /// Strings longer than the slot are truncated at a char boundary.
    pub fn encode(self, value: &SimValue) -> Result<Vec<u8>, ValueError> {
        match (self, value) {
            (Self::Float64, SimValue::Float64(v)) => Ok(v.to_le_bytes().to_vec()),
            (Self::Bool, SimValue::Bool(v)) => Ok(i32::from(*v).to_le_bytes().to_vec()),
            (Self::ShortString, SimValue::ShortString(s))
            | (Self::LongString, SimValue::LongString(s)) => Ok(encode_padded(s, self.raw_len())),
            (kind, value) => Err(ValueError::KindMismatch {
                kind,
                found: value.kind(),
            }),
        }
    }
}

/// A decoded sample value.
///
/// Serializes as the bare JSON scalar: a number, a boolean or a string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SimValue {
    /// Numeric sample.
    Float64(f64),
    /// Boolean sample.
    Bool(bool),
    /// Short text sample.
    ShortString(String),
    /// Long text sample.
    LongString(String),
}

impl SimValue {
    /// The kind this value belongs to.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Float64(_) => ValueKind::Float64,
            Self::Bool(_) => ValueKind::Bool,
            Self::ShortString(_) => ValueKind::ShortString,
            Self::LongString(_) => ValueKind::LongString,
        }
    }
}

fn decode_padded(raw: &[u8]) -> String {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn encode_padded(s: &str, width: usize) -> Vec<u8> {
    let mut end = s.len().min(width);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut buf = vec![0u8; width];
    buf[..end].copy_from_slice(&s.as_bytes()[..end]);
    buf
}
