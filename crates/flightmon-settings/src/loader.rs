//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`FlightMonitorSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{FlightMonitorSettings, MAX_POLL_INTERVAL_MS, MIN_POLL_INTERVAL_MS};

/// Resolve the path to the settings file (`~/.flightmon/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".flightmon").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<FlightMonitorSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<FlightMonitorSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<FlightMonitorSettings> {
    let defaults = serde_json::to_value(FlightMonitorSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `FLIGHTMON_*` environment overrides.
///
/// Invalid values are ignored with a warning.
pub fn apply_env_overrides(settings: &mut FlightMonitorSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Keeps the parsing rules testable without touching the process
/// environment.
pub fn apply_overrides_from<F>(settings: &mut FlightMonitorSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("FLIGHTMON_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("FLIGHTMON_PORT") {
        match parse_u16_range(&v, 1, 65535) {
            Some(port) => settings.server.port = port,
            None => warn_invalid("FLIGHTMON_PORT", &v),
        }
    }
    if let Some(v) = read("FLIGHTMON_POLL_INTERVAL_MS") {
        match parse_u64_range(&v, MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS) {
            Some(ms) => settings.monitor.poll_interval_ms = ms,
            None => warn_invalid("FLIGHTMON_POLL_INTERVAL_MS", &v),
        }
    }
    if let Some(v) = read("FLIGHTMON_CATALOG") {
        settings.monitor.catalog_path = v;
    }
    if let Some(v) = read("FLIGHTMON_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("FLIGHTMON_CONNECT_ON_START") {
        match parse_bool(&v) {
            Some(b) => settings.monitor.connect_on_start = b,
            None => warn_invalid("FLIGHTMON_CONNECT_ON_START", &v),
        }
    }
}

fn warn_invalid(key: &str, value: &str) {
    tracing::warn!(key, value, "invalid env var, ignoring");
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
