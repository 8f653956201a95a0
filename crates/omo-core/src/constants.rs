//! Package-level constants.

use std::time::Duration;

/// Current version of omo-switch (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "omo-switch";

/// Quiet period after the last change-check trigger before the backend is asked.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Name the backend uses for the unnamed default configuration.
pub const DEFAULT_PRESET: &str = "default";

/// Prefix of legacy active-preset markers left behind by builtin presets.
pub const BUILTIN_PRESET_PREFIX: &str = "__builtin__";

/// Characters that may never appear in a preset name.
pub const PATH_SEPARATORS: [char; 2] = ['/', '\\'];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_semver() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert_eq!(parts.len(), 3, "VERSION must be semver (MAJOR.MINOR.PATCH)");
        for part in parts {
            let _: u32 = part.parse().expect("each semver segment must be a number");
        }
    }

    #[test]
    fn debounce_is_half_a_second() {
        assert_eq!(DEFAULT_DEBOUNCE.as_millis(), 500);
    }

    #[test]
    fn default_preset_has_no_separator() {
        assert!(!DEFAULT_PRESET.contains(PATH_SEPARATORS));
    }
}
