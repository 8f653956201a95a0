//! Wire-format types for the JSON-lines backend protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{RpcError, Result};

/// Request written to the backend, one JSON object per line.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Unique request identifier (UUID v7).
    pub id: String,
    /// Backend command name (e.g. `read_omo_config`).
    pub method: String,
    /// Optional parameters object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Build a request with a fresh time-ordered id.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Response read back from the backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Echoed request identifier.
    pub id: String,
    /// Whether the call succeeded.
    pub success: bool,
    /// Result payload (present when `success == true`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload (present when `success == false`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

/// Structured error body inside an `RpcResponse`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// Machine-readable error code (e.g. `PRESET_NOT_FOUND`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl RpcResponse {
    /// Build a success response.
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn error(id: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error: Some(RpcErrorBody {
                code: code.into(),
                message: message.into(),
                details: None,
            }),
        }
    }

    /// Unwrap into the result payload or a typed error.
    ///
    /// A success with no `result` yields `Value::Null` (unit-returning
    /// commands).
    pub fn into_result(self) -> Result<Value> {
        if self.success {
            return Ok(self.result.unwrap_or(Value::Null));
        }
        Err(self.error.map_or_else(
            || RpcError::internal("backend reported failure without an error body"),
            RpcError::from_error_body,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_omits_missing_params() {
        let req = RpcRequest::new("list_presets", None);
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("params").is_none());
        assert_eq!(value["method"], "list_presets");
        assert_eq!(req.id.len(), 36);
    }

    #[test]
    fn request_ids_are_unique() {
        let a = RpcRequest::new("m", None);
        let b = RpcRequest::new("m", None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn success_without_result_is_null() {
        let resp: RpcResponse = serde_json::from_value(json!({"id": "1", "success": true})).unwrap();
        assert_eq!(resp.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn error_response_into_typed_error() {
        let resp = RpcResponse::error("1", "PRESET_NOT_FOUND", "missing");
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.code(), "PRESET_NOT_FOUND");
        assert_eq!(err.to_string(), "missing");
    }

    #[test]
    fn failure_without_body_is_internal() {
        let resp: RpcResponse = serde_json::from_value(json!({"id": "1", "success": false})).unwrap();
        assert_eq!(resp.into_result().unwrap_err().code(), "INTERNAL_ERROR");
    }
}
