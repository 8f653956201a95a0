//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a partial
//! JSON file is valid: missing fields get their default value.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{Result, SettingsError};

/// Accepted range for `detector.debounceMs`.
pub const DEBOUNCE_RANGE_MS: (u64, u64) = (10, 60_000);

/// Accepted range for `backend.requestTimeoutMs`.
pub const REQUEST_TIMEOUT_RANGE_MS: (u64, u64) = (100, 600_000);

/// Root settings type for the synchronization engine.
///
/// ```json
/// {
///   "detector": { "debounceMs": 750 },
///   "backend": { "command": "omo-backend", "args": ["--stdio"] }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Change detector timing.
    pub detector: DetectorSettings,
    /// Backend process and request settings.
    pub backend: BackendSettings,
    /// Per-resource refresh policy.
    pub refresh: RefreshSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl EngineSettings {
    /// Clamp out-of-range numbers and reject unusable values.
    pub fn validate(&mut self) -> Result<()> {
        self.detector.debounce_ms = clamp_logged(
            "detector.debounceMs",
            self.detector.debounce_ms,
            DEBOUNCE_RANGE_MS,
        );
        self.backend.request_timeout_ms = clamp_logged(
            "backend.requestTimeoutMs",
            self.backend.request_timeout_ms,
            REQUEST_TIMEOUT_RANGE_MS,
        );
        if self.backend.command.trim().is_empty() {
            return Err(SettingsError::InvalidValue("backend.command is empty".into()));
        }
        Ok(())
    }
}

fn clamp_logged(key: &str, value: u64, (min, max): (u64, u64)) -> u64 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!(key, value, clamped, "settings value out of range, clamping");
    }
    clamped
}

/// Change detector timing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectorSettings {
    /// Quiet period after the last trigger, in milliseconds.
    pub debounce_ms: u64,
}

impl DetectorSettings {
    /// Debounce as a [`Duration`].
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            debounce_ms: u64::try_from(omo_core::constants::DEFAULT_DEBOUNCE.as_millis())
                .unwrap_or(500),
        }
    }
}

/// How to reach the backend process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSettings {
    /// Executable spawned with stdio pipes.
    pub command: String,
    /// Extra arguments.
    pub args: Vec<String>,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl BackendSettings {
    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            command: "omo-backend".to_string(),
            args: Vec::new(),
            request_timeout_ms: 30_000,
        }
    }
}

/// Whether warm resources are re-fetched on every unforced refresh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefreshSettings {
    /// Re-fetch the provider/model catalog on page entry.
    pub revalidate_catalog: bool,
    /// Re-fetch version info on page entry.
    pub revalidate_versions: bool,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            revalidate_catalog: true,
            revalidate_versions: true,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = EngineSettings::default();
        assert_eq!(s.detector.debounce_ms, 500);
        assert_eq!(s.backend.command, "omo-backend");
        assert_eq!(s.backend.request_timeout(), Duration::from_secs(30));
        assert!(s.refresh.revalidate_catalog);
        assert_eq!(s.logging.level, "warn");
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(EngineSettings::default()).unwrap();
        assert_eq!(json["detector"]["debounceMs"], 500);
        assert_eq!(json["backend"]["requestTimeoutMs"], 30_000);
        assert_eq!(json["refresh"]["revalidateVersions"], true);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: EngineSettings =
            serde_json::from_value(serde_json::json!({"backend": {"args": ["--stdio"]}})).unwrap();
        assert_eq!(s.backend.args, vec!["--stdio"]);
        assert_eq!(s.backend.command, "omo-backend");
        assert_eq!(s.detector.debounce_ms, 500);
    }

    #[test]
    fn validate_clamps_ranges() {
        let mut s = EngineSettings::default();
        s.detector.debounce_ms = 1;
        s.backend.request_timeout_ms = 10_000_000;
        s.validate().unwrap();
        assert_eq!(s.detector.debounce_ms, DEBOUNCE_RANGE_MS.0);
        assert_eq!(s.backend.request_timeout_ms, REQUEST_TIMEOUT_RANGE_MS.1);
    }

    #[test]
    fn validate_rejects_empty_command() {
        let mut s = EngineSettings::default();
        s.backend.command = "  ".into();
        assert!(matches!(s.validate(), Err(SettingsError::InvalidValue(_))));
    }
}
