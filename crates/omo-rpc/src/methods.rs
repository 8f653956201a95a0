//! Backend command names.

/// Read the live configuration.
pub const READ_CONFIG: &str = "read_omo_config";
/// Update one agent/category assignment.
pub const UPDATE_ASSIGNMENT: &str = "update_agent_model";
/// Update several assignments in one write.
pub const UPDATE_ASSIGNMENTS: &str = "update_agents_batch";

/// List preset names.
pub const LIST_PRESETS: &str = "list_presets";
/// Save the live configuration as a named preset.
pub const SAVE_PRESET: &str = "save_preset";
/// Write a preset into the live configuration.
pub const LOAD_PRESET: &str = "load_preset";
/// Delete a preset file.
pub const DELETE_PRESET: &str = "delete_preset";
/// Rename a preset file.
pub const RENAME_PRESET: &str = "rename_preset";
/// Re-persist a preset from the live configuration.
pub const UPDATE_PRESET: &str = "update_preset";
/// Read a preset's configuration.
pub const PRESET_CONFIG: &str = "get_preset_config";
/// Read a preset's metadata.
pub const PRESET_META: &str = "get_preset_meta";
/// Read the backend's active-preset pointer.
pub const ACTIVE_PRESET: &str = "get_active_preset";

/// Create the snapshot if absent.
pub const ENSURE_SNAPSHOT: &str = "ensure_snapshot_exists";
/// Diff the live file against the snapshot.
pub const COMPARE_WITH_SNAPSHOT: &str = "compare_with_snapshot";
/// Overwrite the snapshot with the live file.
pub const SAVE_SNAPSHOT: &str = "save_config_snapshot";
/// Merge the snapshot over the live file and persist.
pub const MERGE_AND_SAVE: &str = "merge_and_save";
/// Adopt the live file and resync snapshot and active preset.
pub const ACCEPT_EXTERNAL: &str = "accept_external_changes";

/// List builtin presets.
pub const BUILTIN_PRESETS: &str = "get_builtin_presets";
/// Apply a builtin preset.
pub const APPLY_BUILTIN_PRESET: &str = "apply_builtin_preset";

/// Discovered models per provider.
pub const AVAILABLE_MODELS: &str = "get_available_models";
/// Providers with credentials.
pub const CONNECTED_PROVIDERS: &str = "get_connected_providers";
/// User-added models per provider.
pub const CUSTOM_MODELS: &str = "get_custom_models";
/// Add a custom model.
pub const ADD_CUSTOM_MODEL: &str = "add_custom_model";
/// Remove a custom model.
pub const REMOVE_CUSTOM_MODEL: &str = "remove_custom_model";

/// Per-tool version/update info.
pub const CHECK_VERSIONS: &str = "check_versions";

/// Every command this client may send.
pub const ALL: &[&str] = &[
    READ_CONFIG,
    UPDATE_ASSIGNMENT,
    UPDATE_ASSIGNMENTS,
    LIST_PRESETS,
    SAVE_PRESET,
    LOAD_PRESET,
    DELETE_PRESET,
    RENAME_PRESET,
    UPDATE_PRESET,
    PRESET_CONFIG,
    PRESET_META,
    ACTIVE_PRESET,
    ENSURE_SNAPSHOT,
    COMPARE_WITH_SNAPSHOT,
    SAVE_SNAPSHOT,
    MERGE_AND_SAVE,
    ACCEPT_EXTERNAL,
    BUILTIN_PRESETS,
    APPLY_BUILTIN_PRESET,
    AVAILABLE_MODELS,
    CONNECTED_PROVIDERS,
    CUSTOM_MODELS,
    ADD_CUSTOM_MODEL,
    REMOVE_CUSTOM_MODEL,
    CHECK_VERSIONS,
];
