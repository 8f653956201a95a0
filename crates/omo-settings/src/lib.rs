//! # omo-settings
//!
//! Engine settings loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`EngineSettings::default()`]
//! 2. **User file**: `$XDG_CONFIG_HOME/omo-switch/engine.json`, deep-merged
//! 3. **Environment variables**: `OMO_*` overrides
//!
//! There is no global instance. The application root loads settings once
//! and hands them to the store it constructs.
//!
//! ## Crate Position
//!
//! Depends on `omo-core`. Depended on by `omo-sync` and `omo-cli`.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = EngineSettings::default();
        let _path = settings_path();
    }

    #[test]
    fn deep_merge_re_exported() {
        let merged = deep_merge(serde_json::json!({"x": 1}), serde_json::json!({"y": 2}));
        assert_eq!(merged["x"], 1);
        assert_eq!(merged["y"], 2);
    }
}
