//! The backend contract consumed by the synchronization engine.
//!
//! One method per backend command. The backend owns every file: the live
//! configuration, the snapshot, preset files, and the catalogs. Nothing in
//! this trait implies how it stores them.

use async_trait::async_trait;
use omo_core::{
    AcceptExternalResult, AssignmentUpdate, BuiltinPresetInfo, ConfigChange, Configuration,
    ModelMap, PresetMeta, VersionInfo,
};

use crate::errors::Result;

/// Request/response operations offered by the backend process.
#[cfg_attr(any(test, feature = "testutil"), mockall::automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    // ── Configuration ───────────────────────────────────────────────

    /// Read the full live configuration.
    async fn read_config(&self) -> Result<Configuration>;

    /// Persist one assignment change and return the updated configuration.
    async fn update_assignment(&self, update: &AssignmentUpdate) -> Result<Configuration>;

    /// Persist several assignment changes in one write.
    async fn update_assignments(&self, updates: &[AssignmentUpdate]) -> Result<Configuration>;

    // ── Presets ─────────────────────────────────────────────────────

    /// Sorted preset names.
    async fn list_presets(&self) -> Result<Vec<String>>;

    /// Save the live configuration as `name`.
    async fn save_preset(&self, name: &str) -> Result<()>;

    /// Write preset `name` into the live configuration and mark it active.
    async fn load_preset(&self, name: &str) -> Result<()>;

    /// Delete preset `name`.
    async fn delete_preset(&self, name: &str) -> Result<()>;

    /// Rename preset `from` to `to`.
    async fn rename_preset(&self, from: &str, to: &str) -> Result<()>;

    /// Re-persist preset `name` from the live configuration.
    async fn update_preset(&self, name: &str) -> Result<()>;

    /// Configuration stored in preset `name`.
    async fn preset_config(&self, name: &str) -> Result<Configuration>;

    /// Metadata of preset `name`.
    async fn preset_meta(&self, name: &str) -> Result<PresetMeta>;

    /// Raw active-preset pointer as recorded by the backend.
    async fn active_preset(&self) -> Result<Option<String>>;

    // ── Snapshot & reconciliation ───────────────────────────────────

    /// Create the snapshot from the live file if absent. Returns whether it
    /// was created.
    async fn ensure_snapshot_exists(&self) -> Result<bool>;

    /// Ordered divergence between snapshot and live file.
    async fn compare_with_snapshot(&self) -> Result<Vec<ConfigChange>>;

    /// Overwrite the snapshot with the live file.
    async fn save_config_snapshot(&self) -> Result<()>;

    /// Merge the snapshot over the live file, persist, and return the result.
    async fn merge_and_save(&self) -> Result<Configuration>;

    /// Adopt the live file, resave the snapshot, and re-persist the active
    /// preset as one unit of work.
    async fn accept_external_changes(&self) -> Result<AcceptExternalResult>;

    // ── Builtin presets ─────────────────────────────────────────────

    /// Read-only builtin preset catalog.
    async fn builtin_presets(&self) -> Result<Vec<BuiltinPresetInfo>>;

    /// Apply builtin preset `id` to the live configuration.
    async fn apply_builtin_preset(&self, id: &str) -> Result<()>;

    // ── Catalog ─────────────────────────────────────────────────────

    /// Discovered models per provider.
    async fn available_models(&self) -> Result<ModelMap>;

    /// Providers with working credentials.
    async fn connected_providers(&self) -> Result<Vec<String>>;

    /// User-added models per provider.
    async fn custom_models(&self) -> Result<ModelMap>;

    /// Add a custom model. Adding an existing one is a no-op.
    async fn add_custom_model(&self, provider_id: &str, model_id: &str) -> Result<()>;

    /// Remove a custom model.
    async fn remove_custom_model(&self, provider_id: &str, model_id: &str) -> Result<()>;

    // ── Versions ────────────────────────────────────────────────────

    /// Per-tool version/update info.
    async fn check_versions(&self) -> Result<Vec<VersionInfo>>;
}
