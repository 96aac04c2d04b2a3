//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`CcmeSettings::default()`]
//! 2. If a settings file exists at the given path, deep-merge its values
//!    over the defaults
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
use crate::types::CcmeSettings;

/// Resolve the default settings file path (`~/.ccme/settings.json`).
#[must_use]
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".ccme").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<CcmeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<CcmeSettings> {
    let defaults = serde_json::to_value(CcmeSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: CcmeSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
#[must_use]
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
/// Each env var has strict parsing rules; invalid values are logged and
/// ignored (the file/default value is kept).
pub fn apply_env_overrides(settings: &mut CcmeSettings) {
    if let Some(v) = read_env_u64("CCME_CONTEXT_TARGET_SIZE", 1, 10_000_000) {
        settings.context.target_size = v;
    }
    if let Some(v) = read_env_u64("CCME_CONTEXT_MIN_SIZE", 1, 10_000_000) {
        settings.context.min_size = v;
    }
    if let Some(v) = read_env_u64("CCME_CONTEXT_MAX_SIZE", 1, 10_000_000) {
        settings.context.max_size = v;
    }
    if let Some(v) = read_env_bool("CCME_CONTEXT_AUTO_SIZE") {
        settings.context.auto_size = v;
    }
    if let Some(v) = read_env_bool("CCME_COMPRESSION_ENABLED") {
        settings.compression.enabled = v;
    }
    if let Some(v) = read_env_fraction("CCME_COMPRESSION_THRESHOLD") {
        settings.compression.threshold = v;
    }
    if let Some(v) = read_env_bool("CCME_SNAPSHOTS_ENABLED") {
        settings.snapshots.enabled = v;
    }
    if let Some(v) = read_env_fraction("CCME_SNAPSHOTS_AUTO_THRESHOLD") {
        settings.snapshots.auto_threshold = v;
    }
    if let Some(v) = read_env_u32("CCME_SNAPSHOTS_MAX_COUNT", 1, 10_000) {
        settings.snapshots.max_count = v;
    }
    if let Some(v) = read_env_fraction("CCME_MEMORY_GUARD_SOFT") {
        settings.memory_guard.thresholds.soft = v;
    }
    if let Some(v) = read_env_fraction("CCME_MEMORY_GUARD_HARD") {
        settings.memory_guard.thresholds.hard = v;
    }
    if let Some(v) = read_env_fraction("CCME_MEMORY_GUARD_CRITICAL") {
        settings.memory_guard.thresholds.critical = v;
    }
    if let Some(v) = read_env_u64("CCME_TOOL_SUPPORT_SESSION_TTL_SEC", 1, 86_400) {
        settings.tool_support.session_ttl_sec = v;
    }
    if let Some(v) = read_env_u64("CCME_TOOL_SUPPORT_PROMPT_DEBOUNCE_SEC", 0, 3_600) {
        settings.tool_support.prompt_debounce_sec = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
#[must_use]
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
#[must_use]
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u32` within a range.
#[must_use]
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a fraction in `0.0..=1.0`.
#[must_use]
pub fn parse_fraction(val: &str) -> Option<f64> {
    let n: f64 = val.parse().ok()?;
    (0.0..=1.0).contains(&n).then_some(n)
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
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

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}

fn read_env_fraction(name: &str) -> Option<f64> {
    let val = std::env::var(name).ok()?;
    let result = parse_fraction(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid fraction env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"context": {"targetSize": 32000, "minSize": 4000}});
        let source = serde_json::json!({"context": {"targetSize": 64000}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["context"]["targetSize"], 64000);
        assert_eq!(merged["context"]["minSize"], 4000);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4, 5]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4, 5]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let path = Path::new("/nonexistent/ccme-settings.json");
        let settings = load_settings_from_path(path).unwrap();
        assert_eq!(settings, CcmeSettings::default());
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"context": {"targetSize": 64000}}"#).unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.context.target_size, 64_000);
        assert_eq!(settings.context.min_size, CcmeSettings::default().context.min_size);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn load_rejects_invalid_merged_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"context": {"minSize": 999999999}}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::InvalidValue(_)));
    }

    #[test]
    fn parse_bool_variants() {
        for val in ["true", "1", "yes", "on", "TRUE"] {
            assert_eq!(parse_bool(val), Some(true));
        }
        for val in ["false", "0", "no", "off"] {
            assert_eq!(parse_bool(val), Some(false));
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_fraction_range() {
        assert_eq!(parse_fraction("0.5"), Some(0.5));
        assert_eq!(parse_fraction("1.5"), None);
        assert_eq!(parse_fraction("-0.1"), None);
    }
}
