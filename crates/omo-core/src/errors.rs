//! Core error types.

use thiserror::Error;

/// Errors raised while decoding or validating configuration data.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The configuration document does not have the required shape.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// An assignment carried a variant outside the known set.
    #[error("unknown variant: {0}")]
    UnknownVariant(String),
    /// JSON (de)serialization failed.
    #[error("configuration JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_display() {
        let err = CoreError::InvalidConfig("missing agents".into());
        assert_eq!(err.to_string(), "invalid configuration: missing agents");
    }

    #[test]
    fn json_error_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err: CoreError = json_err.into();
        assert!(matches!(err, CoreError::Json(_)));
    }
}
