//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::RelaySettings;

/// Environment variable naming an explicit settings file.
pub const SETTINGS_PATH_ENV: &str = "RELAY_SETTINGS_PATH";

/// Resolve the settings file: `$RELAY_SETTINGS_PATH`, else
/// `~/.relay/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(explicit) = std::env::var_os(SETTINGS_PATH_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(explicit);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".relay").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let mut settings = read_file_layer(path)?;
    apply_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;
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
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `RELAY_*` overrides read through `lookup`.
///
/// Out-of-range or unparsable values are ignored with a warning, leaving the
/// file/default value in place.
pub fn apply_overrides(settings: &mut RelaySettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = Overrides { lookup };
    let server = &mut settings.server;

    if let Some(v) = env.string("RELAY_HOST") {
        server.host = v;
    }
    if let Some(v) = env.parsed("RELAY_PORT", 0_u16, u16::MAX) {
        server.port = v;
    }
    // Empty is a valid namespace, so read it raw.
    if let Some(v) = (env.lookup)("RELAY_NAMESPACE") {
        server.namespace = v;
    }
    if let Some(v) = env.boolean("RELAY_STRICT_PATHS") {
        server.strict_paths = v;
    }
    if let Some(v) = env.parsed("RELAY_HEARTBEAT_INTERVAL_MS", 100_u64, 3_600_000) {
        server.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.parsed("RELAY_REQUEST_TIMEOUT_MS", 1_u64, 3_600_000) {
        server.request_timeout_ms = v;
    }
    if let Some(v) = env.parsed("RELAY_REFRESH_TIMEOUT_MS", 1_u64, 3_600_000) {
        server.refresh_timeout_ms = v;
    }

    if let Some(v) = env.string("RELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("RELAY_LOG_FORMAT") {
        match serde_json::from_value(Value::String(v.to_lowercase())) {
            Ok(format) => settings.logging.format = format,
            Err(_) => warn!(key = "RELAY_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
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

/// Parse a number within an inclusive range.
pub fn parse_in_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct Overrides<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Overrides<F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.is_empty())
    }

    fn boolean(&self, key: &str) -> Option<bool> {
        let val = self.string(key)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn parsed<T>(&self, key: &str, min: T, max: T) -> Option<T>
    where
        T: std::str::FromStr + PartialOrd,
    {
        let val = self.string(key)?;
        let result = parse_in_range(&val, min, max);
        if result.is_none() {
            warn!(key, value = %val, "invalid numeric env var, ignoring");
        }
        result
    }
}
