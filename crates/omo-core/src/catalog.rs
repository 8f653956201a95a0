//! Provider/model catalog and tool version info.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `provider id -> model ids`.
pub type ModelMap = BTreeMap<String, Vec<String>>;

/// Models discovered per provider, connected providers, and the user's
/// custom model overlay. Derived entirely from backend queries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderModelCatalog {
    /// Backend-discovered models per provider.
    pub models: ModelMap,
    /// Provider ids with working credentials.
    pub connected: Vec<String>,
    /// User-added model ids per provider.
    pub custom: ModelMap,
}

impl ProviderModelCatalog {
    /// Discovered models followed by custom ones, without duplicates.
    pub fn models_for(&self, provider: &str) -> Vec<String> {
        let mut out: Vec<String> = self.models.get(provider).cloned().unwrap_or_default();
        if let Some(custom) = self.custom.get(provider) {
            for model in custom {
                if !out.contains(model) {
                    out.push(model.clone());
                }
            }
        }
        out
    }

    /// Whether a provider is connected.
    pub fn is_connected(&self, provider: &str) -> bool {
        self.connected.iter().any(|p| p == provider)
    }

    /// Whether `model_id` was added by the user.
    pub fn is_custom(&self, provider: &str, model_id: &str) -> bool {
        self.custom
            .get(provider)
            .is_some_and(|models| models.iter().any(|m| m == model_id))
    }

    /// Every provider id that has discovered or custom models.
    pub fn providers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .models
            .keys()
            .chain(self.custom.keys())
            .map(String::as_str)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Total distinct models across providers, custom overlay included.
    pub fn model_count(&self) -> usize {
        self.providers().iter().map(|p| self.models_for(p).len()).sum()
    }
}

/// Installed/latest version of one tool managed alongside the configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Tool name.
    pub name: String,
    /// Installed version, if detected.
    #[serde(default)]
    pub current_version: Option<String>,
    /// Latest published version, if known.
    #[serde(default)]
    pub latest_version: Option<String>,
    /// Whether `latest_version` is newer than `current_version`.
    #[serde(default)]
    pub has_update: bool,
    /// Shell command that performs the update.
    #[serde(default)]
    pub update_command: String,
    /// Human-readable update hint.
    #[serde(default)]
    pub update_hint: String,
    /// Whether the tool is installed at all.
    #[serde(default)]
    pub installed: bool,
}

/// Numeric dotted-version comparison; non-numeric segments are skipped.
pub fn is_newer_version(current: &str, latest: &str) -> bool {
    let parse = |v: &str| -> Vec<u32> {
        v.trim_start_matches('v')
            .split('.')
            .filter_map(|s| s.parse().ok())
            .collect()
    };
    parse(latest) > parse(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ProviderModelCatalog {
        let mut models = ModelMap::new();
        let _ = models.insert("openai".into(), vec!["gpt-4".into(), "gpt-4o".into()]);
        let mut custom = ModelMap::new();
        let _ = custom.insert("openai".into(), vec!["gpt-4".into(), "my-finetune".into()]);
        let _ = custom.insert("local".into(), vec!["llama".into()]);
        ProviderModelCatalog {
            models,
            connected: vec!["openai".into()],
            custom,
        }
    }

    #[test]
    fn models_for_merges_custom_without_duplicates() {
        assert_eq!(catalog().models_for("openai"), vec!["gpt-4", "gpt-4o", "my-finetune"]);
        assert_eq!(catalog().models_for("local"), vec!["llama"]);
        assert!(catalog().models_for("missing").is_empty());
    }

    #[test]
    fn providers_are_sorted_and_unique() {
        assert_eq!(catalog().providers(), vec!["local", "openai"]);
        assert_eq!(catalog().model_count(), 4);
    }

    #[test]
    fn connected_and_custom_lookups() {
        let c = catalog();
        assert!(c.is_connected("openai"));
        assert!(!c.is_connected("local"));
        assert!(c.is_custom("openai", "my-finetune"));
        assert!(!c.is_custom("openai", "gpt-4o"));
    }

    #[test]
    fn version_comparison() {
        assert!(is_newer_version("1.2.3", "1.10.0"));
        assert!(is_newer_version("v0.9", "1.0"));
        assert!(!is_newer_version("2.0.0", "2.0.0"));
        assert!(!is_newer_version("2.1.0", "2.0.9"));
    }

    #[test]
    fn version_info_tolerates_missing_fields() {
        let info: VersionInfo = serde_json::from_value(serde_json::json!({"name": "opencode"})).unwrap();
        assert!(!info.installed);
        assert!(info.current_version.is_none());
    }
}
