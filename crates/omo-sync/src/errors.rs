//! Engine error types.

use omo_rpc::RpcError;
use thiserror::Error;

/// Preset operations rejected before any backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresetError {
    /// Name is empty after trimming.
    #[error("preset name must not be empty")]
    EmptyName,
    /// Name contains a path separator.
    #[error("preset name '{0}' must not contain '/' or '\\'")]
    InvalidPath(String),
    /// Another preset already has this name.
    #[error("a preset named '{0}' already exists")]
    NameTaken(String),
    /// The preset is active and cannot be deleted.
    #[error("preset '{0}' is active and cannot be deleted")]
    ActivePreset(String),
    /// Deleting would leave no presets.
    #[error("cannot delete the last remaining preset")]
    LastPreset,
    /// The default configuration cannot be deleted or renamed.
    #[error("the default configuration cannot be deleted or renamed")]
    DefaultPreset,
    /// No preset with this name is known.
    #[error("unknown preset '{0}'")]
    UnknownPreset(String),
}

/// Errors surfaced by reconciliation and preset operations.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Rejected by local validation.
    #[error(transparent)]
    Preset(#[from] PresetError),
    /// The backend call failed.
    #[error(transparent)]
    Backend(#[from] RpcError),
}

impl SyncError {
    /// Whether the backend was never contacted.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Preset(_))
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
