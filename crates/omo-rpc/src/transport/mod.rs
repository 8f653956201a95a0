//! Wire transports to the backend process.

mod stdio;

pub use stdio::StdioTransport;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;

/// Sends one named request and waits for its response payload.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Invoke `method` with optional params and return the result payload.
    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value>;
}
