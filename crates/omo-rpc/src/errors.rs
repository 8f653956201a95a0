//! RPC error codes and error type.

use std::time::Duration;

use crate::types::RpcErrorBody;

// ── Error code constants ────────────────────────────────────────────

/// Invalid or missing parameters.
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
/// Unexpected internal error.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
/// Method unknown to the backend.
pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
/// Resource or feature not available.
pub const NOT_AVAILABLE: &str = "NOT_AVAILABLE";
/// Generic not-found.
pub const NOT_FOUND: &str = "NOT_FOUND";
/// Preset does not exist.
pub const PRESET_NOT_FOUND: &str = "PRESET_NOT_FOUND";
/// Custom model does not exist.
pub const MODEL_NOT_FOUND: &str = "MODEL_NOT_FOUND";
/// Resource already exists.
pub const ALREADY_EXISTS: &str = "ALREADY_EXISTS";
/// Path is invalid or unsafe.
pub const INVALID_PATH: &str = "INVALID_PATH";
/// Configuration document failed validation.
pub const INVALID_CONFIG: &str = "INVALID_CONFIG";
/// The backend process or pipe failed.
pub const TRANSPORT_ERROR: &str = "TRANSPORT_ERROR";
/// No response within the request timeout.
pub const TIMEOUT: &str = "TIMEOUT";

/// Error returned by every backend operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RpcError {
    /// Required parameter missing or wrong type.
    #[error("{message}")]
    InvalidParams {
        /// Description of what is wrong.
        message: String,
    },

    /// Requested resource not found.
    #[error("{message}")]
    NotFound {
        /// Specific error code (e.g. `PRESET_NOT_FOUND`).
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// Backend-side failure.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },

    /// Feature or resource not available.
    #[error("{message}")]
    NotAvailable {
        /// Description.
        message: String,
    },

    /// The pipe to the backend broke or the process exited.
    #[error("backend transport failed: {message}")]
    Transport {
        /// Description.
        message: String,
    },

    /// The backend did not answer in time.
    #[error("{method} timed out after {}ms", .after.as_millis())]
    Timeout {
        /// Method that timed out.
        method: String,
        /// Timeout that elapsed.
        after: Duration,
    },

    /// Domain-specific error with arbitrary code.
    #[error("{message}")]
    Custom {
        /// Machine-readable code.
        code: String,
        /// Human-readable message.
        message: String,
        /// Optional structured details.
        details: Option<serde_json::Value>,
    },
}

impl RpcError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::NotFound { code, .. } | Self::Custom { code, .. } => code,
            Self::Internal { .. } => INTERNAL_ERROR,
            Self::NotAvailable { .. } => NOT_AVAILABLE,
            Self::Transport { .. } => TRANSPORT_ERROR,
            Self::Timeout { .. } => TIMEOUT,
        }
    }

    /// Shorthand for [`RpcError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Shorthand for [`RpcError::Transport`].
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Shorthand for [`RpcError::NotFound`].
    pub fn not_found(code: &str, message: impl Into<String>) -> Self {
        Self::NotFound {
            code: code.to_owned(),
            message: message.into(),
        }
    }

    /// Whether retrying the same call could succeed without user action.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }

    /// Convert to the wire-format error body.
    pub fn to_error_body(&self) -> RpcErrorBody {
        RpcErrorBody {
            code: self.code().to_owned(),
            message: self.to_string(),
            details: match self {
                Self::Custom { details, .. } => details.clone(),
                _ => None,
            },
        }
    }

    /// Rebuild a typed error from a backend error body.
    pub fn from_error_body(body: RpcErrorBody) -> Self {
        let RpcErrorBody {
            code,
            message,
            details,
        } = body;
        match code.as_str() {
            INVALID_PARAMS => Self::InvalidParams { message },
            INTERNAL_ERROR => Self::Internal { message },
            NOT_AVAILABLE => Self::NotAvailable { message },
            TRANSPORT_ERROR => Self::Transport { message },
            c if c == NOT_FOUND || c.ends_with("_NOT_FOUND") => Self::NotFound { code, message },
            _ => Self::Custom {
                code,
                message,
                details,
            },
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("malformed backend payload: {err}"))
    }
}

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn invalid_params_code() {
        let err = RpcError::InvalidParams { message: "bad".into() };
        assert_eq!(err.code(), INVALID_PARAMS);
        assert_eq!(err.to_string(), "bad");
    }

    #[test]
    fn timeout_display() {
        let err = RpcError::Timeout {
            method: "read_omo_config".into(),
            after: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "read_omo_config timed out after 250ms");
        assert_eq!(err.code(), TIMEOUT);
        assert!(err.is_transient());
    }

    #[test]
    fn error_body_round_trips_not_found() {
        let err = RpcError::not_found(PRESET_NOT_FOUND, "no preset 'x'");
        let back = RpcError::from_error_body(err.to_error_body());
        assert_matches!(back, RpcError::NotFound { code, .. } if code == PRESET_NOT_FOUND);
    }

    #[test]
    fn unknown_code_becomes_custom() {
        let back = RpcError::from_error_body(RpcErrorBody {
            code: ALREADY_EXISTS.into(),
            message: "exists".into(),
            details: Some(serde_json::json!({"name": "x"})),
        });
        assert_eq!(back.code(), ALREADY_EXISTS);
        assert!(back.to_error_body().details.is_some());
        assert!(!back.is_transient());
    }

    #[test]
    fn json_error_is_internal() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: RpcError = json_err.into();
        assert_eq!(err.code(), INTERNAL_ERROR);
        assert!(err.to_string().starts_with("malformed backend payload"));
    }
}
