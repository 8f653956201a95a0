//! # omo-rpc
//!
//! The backend's single-shot request/response contract.
//!
//! - [`Backend`]: one async method per backend command
//! - [`RpcBackend`]: [`Backend`] over any [`Transport`], mapping methods to
//!   wire command names ([`methods`]) and decoding payloads
//! - [`StdioTransport`]: JSON lines over a spawned backend's stdin/stdout
//! - `testutil` (feature `testutil`): `MockBackend` and `InMemoryBackend`
//!
//! ## Crate Position
//!
//! Depends on `omo-core`. Depended on by `omo-sync` and `omo-cli`.

#![deny(unsafe_code)]

pub mod backend;
pub mod client;
pub mod errors;
pub mod methods;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use backend::Backend;
pub use client::RpcBackend;
pub use errors::{Result, RpcError};
pub use transport::{StdioTransport, Transport};
pub use types::{RpcErrorBody, RpcRequest, RpcResponse};
