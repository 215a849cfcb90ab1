//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `CAMRELAY_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{InboundMode, RelaySettings};

/// Resolve the path to the settings file (`~/.camrelay/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".camrelay").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a failed
/// [`RelaySettings::validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let mut settings = merge_file(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn merge_file(path: &Path) -> Result<RelaySettings> {
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

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read_env_string("CAMRELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("CAMRELAY_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_string("CAMRELAY_STATIC_DIR") {
        settings.server.static_dir = Some(v);
    }
    if let Some(v) = read_env_usize("CAMRELAY_MAX_FRAME_BYTES", 1024, 1_073_741_824) {
        settings.server.max_frame_bytes = v;
    }
    if let Some(v) = read_env_u64("CAMRELAY_SHUTDOWN_GRACE_MS", 1, 600_000) {
        settings.server.shutdown_grace_ms = v;
    }

    // ── Pipeline ────────────────────────────────────────────────────
    if let Some(v) = read_env_string("CAMRELAY_FRAMES_ENDPOINT") {
        settings.pipeline.frames_endpoint = v;
    }
    if let Some(v) = read_env_u64("CAMRELAY_CONNECT_TIMEOUT_MS", 1, 600_000) {
        settings.pipeline.connect_timeout_ms = v;
    }
    if let Some(v) = read_env_string("CAMRELAY_INBOUND_MODE") {
        match parse_inbound_mode(&v) {
            Some(mode) => settings.pipeline.inbound.mode = mode,
            None => tracing::warn!(key = "CAMRELAY_INBOUND_MODE", value = %v, "invalid inbound mode, ignoring"),
        }
    }
    if let Some(v) = read_env_string("CAMRELAY_RESULTS_ENDPOINT") {
        settings.pipeline.inbound.fixed_endpoint = v;
    }
    if let Some(v) = read_env_string("CAMRELAY_EPHEMERAL_HOST") {
        settings.pipeline.inbound.ephemeral_host = v;
    }

    // ── Session ─────────────────────────────────────────────────────
    if let Some(v) = read_env_u64("CAMRELAY_CANCEL_GRACE_MS", 1, 600_000) {
        settings.session.cancel_grace_ms = v;
    }
    if let Some(v) = read_env_u64("CAMRELAY_IDLE_TIMEOUT_MS", 0, 86_400_000) {
        settings.session.idle_timeout_ms = (v > 0).then_some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("CAMRELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("CAMRELAY_LOG_JSON") {
        settings.logging.json = v;
    }

    // ── Worker ──────────────────────────────────────────────────────
    if let Some(v) = read_env_string("CAMRELAY_WORKER_FRAMES_ENDPOINT") {
        settings.worker.frames_endpoint = v;
    }
    if let Some(v) = read_env_string("CAMRELAY_WORKER_RESULTS_ENDPOINT") {
        settings.worker.results_endpoint = v;
    }
    if let Some(v) = read_env_string("CAMRELAY_WORKER_CAPTION") {
        settings.worker.caption = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

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

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse `ephemeral` / `fixed` (case-insensitive).
pub fn parse_inbound_mode(val: &str) -> Option<InboundMode> {
    match val.to_lowercase().as_str() {
        "ephemeral" => Some(InboundMode::Ephemeral),
        "fixed" => Some(InboundMode::Fixed),
        _ => None,
    }
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn deep_merge_objects_recursive() {
        let target = json!({"pipeline": {"framesEndpoint": "tcp://a:1", "connectTimeoutMs": 5000}});
        let source = json!({"pipeline": {"connectTimeoutMs": 250}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["pipeline"]["framesEndpoint"], "tcp://a:1");
        assert_eq!(merged["pipeline"]["connectTimeoutMs"], 250);
    }

    #[test]
    fn deep_merge_null_skipped() {
        let target = json!({"server": {"host": "0.0.0.0"}});
        let source = json!({"server": {"host": null}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn deep_merge_arrays_replaced() {
        let merged = deep_merge(json!({"a": [1, 2, 3]}), json!({"a": [9]}));
        assert_eq!(merged["a"], json!([9]));
    }

    #[test]
    fn deep_merge_new_keys_added() {
        let merged = deep_merge(json!({"a": 1}), json!({"b": 2}));
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn deep_merge_primitive_over_object() {
        let merged = deep_merge(json!({"a": {"b": 1}}), json!({"a": 5}));
        assert_eq!(merged["a"], 5);
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = merge_file(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings, RelaySettings::default());
    }

    #[test]
    fn partial_file_merged_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9100}, "pipeline": {"inbound": {"mode": "fixed"}}}"#,
        )
        .unwrap();

        let settings = merge_file(&path).unwrap();
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.pipeline.inbound.mode, InboundMode::Fixed);
        assert_eq!(settings.pipeline.frames_endpoint, "tcp://127.0.0.1:5555");
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = merge_file(&path).unwrap_err();
        assert!(matches!(err, crate::SettingsError::Json(_)));
    }

    #[test]
    fn invalid_value_rejected_by_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"session": {"cancelGraceMs": 0}}"#).unwrap();
        let err = load_settings_from_path(&path).unwrap_err();
        assert!(matches!(err, crate::SettingsError::InvalidValue(_)));
    }

    #[test]
    fn settings_path_under_home() {
        let path = settings_path();
        assert!(path.ends_with(".camrelay/settings.json"));
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "1", "YES", "On"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "no", "OFF"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn parse_u16_range_bounds() {
        assert_eq!(parse_u16_range("8000", 1, 65535), Some(8000));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
        assert_eq!(parse_u16_range("abc", 1, 65535), None);
    }

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("2000", 1, 600_000), Some(2000));
        assert_eq!(parse_u64_range("0", 1, 600_000), None);
        assert_eq!(parse_u64_range("-5", 0, 10), None);
    }

    #[test]
    fn parse_usize_range_bounds() {
        assert_eq!(parse_usize_range("4096", 1024, 1 << 30), Some(4096));
        assert_eq!(parse_usize_range("10", 1024, 1 << 30), None);
    }

    #[test]
    fn parse_inbound_mode_variants() {
        assert_eq!(parse_inbound_mode("Fixed"), Some(InboundMode::Fixed));
        assert_eq!(parse_inbound_mode("ephemeral"), Some(InboundMode::Ephemeral));
        assert_eq!(parse_inbound_mode("shared"), None);
    }
}
