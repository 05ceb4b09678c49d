//! Store configuration loading with deep merge and environment overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`StoreConfig::default()`]
//! 2. If the given JSON file exists, deep-merge its values over the defaults
//! 3. Apply `METASTORE_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{JournalMode, StoreConfig, SyncMode};
use crate::errors::Result;

/// Load a config from `path` with env var overrides.
///
/// A missing file yields the defaults; a file with invalid JSON or values of
/// the wrong type is an error.
pub fn load_config_from_path(path: &Path) -> Result<StoreConfig> {
    let defaults = serde_json::to_value(StoreConfig::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading store config from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "store config file not found, using defaults");
        defaults
    };

    let mut config: StoreConfig = serde_json::from_value(merged)?;
    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
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

/// Apply `METASTORE_*` environment variable overrides.
pub fn apply_env_overrides(config: &mut StoreConfig) {
    apply_overrides(config, |key| std::env::var(key).ok());
}

/// Apply overrides from an arbitrary key lookup.
///
/// Invalid values are ignored with a warning and fall back to file/default.
pub fn apply_overrides<F>(config: &mut StoreConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(raw) = read("METASTORE_PAGE_SIZE") {
        match parse_u32_range(&raw, 512, 8192) {
            Some(v) => config.page_size = v,
            None => warn!(key = "METASTORE_PAGE_SIZE", value = %raw, "invalid page size, ignoring"),
        }
    }
    if let Some(raw) = read("METASTORE_CACHE_SIZE") {
        match parse_u32_range(&raw, 1, 1_000_000) {
            Some(v) => config.cache_size = v,
            None => warn!(key = "METASTORE_CACHE_SIZE", value = %raw, "invalid cache size, ignoring"),
        }
    }
    if let Some(raw) = read("METASTORE_BUSY_TIMEOUT_MS") {
        match parse_u32_range(&raw, 0, 600_000) {
            Some(v) => config.busy_timeout_ms = v,
            None => warn!(key = "METASTORE_BUSY_TIMEOUT_MS", value = %raw, "invalid busy timeout, ignoring"),
        }
    }
    if let Some(raw) = read("METASTORE_JOURNAL_MODE") {
        match parse_journal_mode(&raw) {
            Some(v) => config.journal_mode = v,
            None => warn!(key = "METASTORE_JOURNAL_MODE", value = %raw, "invalid journal mode, ignoring"),
        }
    }
    if let Some(raw) = read("METASTORE_SYNCHRONOUS") {
        match parse_sync_mode(&raw) {
            Some(v) => config.synchronous = v,
            None => warn!(key = "METASTORE_SYNCHRONOUS", value = %raw, "invalid synchronous mode, ignoring"),
        }
    }
    for (key, slot) in [
        ("METASTORE_EXCLUSIVE", &mut config.exclusive_on_open),
        ("METASTORE_PRELOAD", &mut config.preload),
        ("METASTORE_RAZE_IF_DEPRECATED", &mut config.raze_if_deprecated),
    ] {
        if let Some(raw) = read(key) {
            match parse_bool(&raw) {
                Some(v) => *slot = v,
                None => warn!(key, value = %raw, "invalid boolean env var, ignoring"),
            }
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

/// Parse a string as a `u32` within an inclusive range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a journal mode name.
pub fn parse_journal_mode(val: &str) -> Option<JournalMode> {
    serde_json::from_value(Value::String(val.to_lowercase())).ok()
}

/// Parse a synchronous mode name.
pub fn parse_sync_mode(val: &str) -> Option<SyncMode> {
    serde_json::from_value(Value::String(val.to_lowercase())).ok()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
