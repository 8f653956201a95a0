//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`EngineSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. [`EngineSettings::validate`]
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{DEBOUNCE_RANGE_MS, EngineSettings, REQUEST_TIMEOUT_RANGE_MS};

/// Resolve the settings file path.
///
/// `$XDG_CONFIG_HOME/omo-switch/engine.json`, else
/// `$HOME/.config/omo-switch/engine.json`.
pub fn settings_path() -> PathBuf {
    let base = read_env_string("XDG_CONFIG_HOME").map_or_else(
        || {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        },
        PathBuf::from,
    );
    base.join("omo-switch").join("engine.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<EngineSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<EngineSettings> {
    let mut settings = read_layers(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_layers(path: &Path) -> Result<EngineSettings> {
    let defaults = serde_json::to_value(EngineSettings::default())?;

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

/// Apply `OMO_*` environment overrides.
///
/// Invalid values are ignored with a warning.
pub fn apply_env_overrides(settings: &mut EngineSettings) {
    if let Some(v) = read_env_u64("OMO_DEBOUNCE_MS", DEBOUNCE_RANGE_MS) {
        settings.detector.debounce_ms = v;
    }
    if let Some(v) = read_env_u64("OMO_REQUEST_TIMEOUT_MS", REQUEST_TIMEOUT_RANGE_MS) {
        settings.backend.request_timeout_ms = v;
    }
    if let Some(v) = read_env_string("OMO_BACKEND_COMMAND") {
        settings.backend.command = v;
    }
    if let Some(v) = read_env_string("OMO_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("OMO_LOG_JSON") {
        settings.logging.json = v;
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

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, (min, max): (u64, u64)) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

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

fn read_env_u64(name: &str, range: (u64, u64)) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, range);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"backend": {"command": "a", "args": []}});
        let source = serde_json::json!({"backend": {"command": "b"}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["backend"]["command"], "b");
        assert_eq!(merged["backend"]["args"], serde_json::json!([]));
    }

    #[test]
    fn merge_array_replace() {
        let merged = deep_merge(
            serde_json::json!({"args": ["a", "b"]}),
            serde_json::json!({"args": ["c"]}),
        );
        assert_eq!(merged["args"], serde_json::json!(["c"]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let merged = deep_merge(serde_json::json!({"a": {"b": 1}}), serde_json::json!({"a": 5}));
        assert_eq!(merged["a"], 5);
    }

    // ── loading ─────────────────────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = read_layers(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings, EngineSettings::default());
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(
            &path,
            r#"{"detector": {"debounceMs": 750}, "backend": {"args": ["--stdio"]}}"#,
        )
        .unwrap();
        let settings = read_layers(&path).unwrap();
        assert_eq!(settings.detector.debounce_ms, 750);
        assert_eq!(settings.backend.args, vec!["--stdio"]);
        assert_eq!(settings.backend.command, "omo-backend");
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(read_layers(&path), Err(SettingsError::Json(_))));
    }

    #[test]
    fn load_from_path_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"backend": {"command": ""}}"#).unwrap();
        let result = load_settings_from_path(&path);
        // OMO_BACKEND_COMMAND would mask the empty command
        if std::env::var("OMO_BACKEND_COMMAND").is_err() {
            assert!(matches!(result, Err(SettingsError::InvalidValue(_))));
        }
    }

    #[test]
    fn settings_path_ends_with_engine_json() {
        let path = settings_path();
        assert!(path.ends_with("omo-switch/engine.json"));
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "1", "YES", "on"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "no", "OFF"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u64_in_and_out_of_range() {
        assert_eq!(parse_u64_range("500", DEBOUNCE_RANGE_MS), Some(500));
        assert_eq!(parse_u64_range(" 10 ", DEBOUNCE_RANGE_MS), Some(10));
        assert_eq!(parse_u64_range("5", DEBOUNCE_RANGE_MS), None);
        assert_eq!(parse_u64_range("abc", DEBOUNCE_RANGE_MS), None);
    }
}
