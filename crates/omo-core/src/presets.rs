//! Preset metadata and accept-external results.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Configuration;
use crate::constants::{BUILTIN_PRESET_PREFIX, DEFAULT_PRESET};

/// Timestamps and schema version stored alongside a preset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetMeta {
    /// Creation time, Unix milliseconds.
    pub created_at: u64,
    /// Last re-persist time, Unix milliseconds.
    pub updated_at: u64,
    /// Metadata schema version.
    pub version: u32,
}

impl PresetMeta {
    /// Current metadata schema version.
    pub const CURRENT_VERSION: u32 = 1;

    /// Fresh metadata stamped with `now_ms`.
    pub fn new(now_ms: u64) -> Self {
        Self {
            created_at: now_ms,
            updated_at: now_ms,
            version: Self::CURRENT_VERSION,
        }
    }

    /// Mark as re-persisted at `now_ms`, keeping the creation time.
    pub fn touch(&mut self, now_ms: u64) {
        self.updated_at = now_ms.max(self.created_at);
    }

    /// Creation time as a UTC timestamp.
    pub fn created(&self) -> Option<DateTime<Utc>> {
        millis_to_utc(self.created_at)
    }

    /// Last update time as a UTC timestamp.
    pub fn updated(&self) -> Option<DateTime<Utc>> {
        millis_to_utc(self.updated_at)
    }
}

fn millis_to_utc(ms: u64) -> Option<DateTime<Utc>> {
    let ms = i64::try_from(ms).ok()?;
    Utc.timestamp_millis_opt(ms).single()
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Entry in the backend's read-only builtin preset catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltinPresetInfo {
    /// Stable identifier passed to apply.
    pub id: String,
    /// Display name.
    pub name: String,
    /// One-line description.
    pub description: String,
    /// Optional icon hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Outcome of the backend's accept-external unit of work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AcceptExternalResult {
    /// Adopted configuration, now equal to the snapshot.
    pub config: Configuration,
    /// Active preset after the accept, if any.
    #[serde(default)]
    pub active_preset: Option<String>,
    /// Whether the active preset was re-persisted.
    #[serde(default)]
    pub preset_synced: bool,
    /// Why re-persisting the active preset failed.
    #[serde(default)]
    pub preset_sync_error: Option<String>,
}

/// Map a backend active-preset pointer to a named preset.
///
/// The default configuration and legacy builtin markers both mean that no
/// named preset is active.
pub fn named_active(pointer: Option<&str>) -> Option<&str> {
    pointer
        .map(str::trim)
        .filter(|p| !p.is_empty() && *p != DEFAULT_PRESET && !p.starts_with(BUILTIN_PRESET_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn meta_new_sets_both_timestamps() {
        let meta = PresetMeta::new(1_700_000_000_000);
        assert_eq!(meta.created_at, meta.updated_at);
        assert_eq!(meta.version, 1);
    }

    #[test]
    fn meta_touch_keeps_created() {
        let mut meta = PresetMeta::new(1_000);
        meta.touch(5_000);
        assert_eq!(meta.created_at, 1_000);
        assert_eq!(meta.updated_at, 5_000);
        meta.touch(10);
        assert_eq!(meta.updated_at, 1_000);
    }

    #[test]
    fn meta_converts_to_datetime() {
        let meta = PresetMeta::new(1_700_000_000_000);
        assert_eq!(meta.created().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn now_ms_is_milliseconds() {
        assert!(now_ms() > 1_000_000_000_000);
    }

    #[test]
    fn accept_result_decodes() {
        let result: AcceptExternalResult = serde_json::from_value(json!({
            "config": {"agents": {"a": {"model": "m"}}, "categories": {}},
            "active_preset": "work",
            "preset_synced": false,
            "preset_sync_error": "disk full"
        }))
        .unwrap();
        assert_eq!(result.active_preset.as_deref(), Some("work"));
        assert!(!result.preset_synced);
        assert_eq!(result.config.agents["a"].model, "m");
    }

    #[test]
    fn named_active_filters_default_and_builtin() {
        assert_eq!(named_active(Some("work")), Some("work"));
        assert_eq!(named_active(Some("default")), None);
        assert_eq!(named_active(Some("__builtin__economy")), None);
        assert_eq!(named_active(Some("  ")), None);
        assert_eq!(named_active(None), None);
    }

    #[test]
    fn builtin_info_omits_missing_icon() {
        let info = BuiltinPresetInfo {
            id: "economy".into(),
            name: "Economy".into(),
            description: "Cheaper models".into(),
            icon: None,
        };
        let value = serde_json::to_value(info).unwrap();
        assert!(value.get("icon").is_none());
    }
}
