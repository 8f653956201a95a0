//! # omo-core
//!
//! Shared vocabulary for the omo-switch configuration synchronization engine.
//!
//! - **Configuration**: [`Configuration`] with `agents` and `categories` maps of
//!   [`AgentAssignment`], plus the normalization rules the backend applies
//! - **Changes**: [`ConfigChange`] entries returned by compare-with-snapshot
//! - **Presets**: [`PresetMeta`], [`BuiltinPresetInfo`], [`AcceptExternalResult`]
//! - **Catalog**: [`ProviderModelCatalog`] and per-tool [`VersionInfo`]
//! - **Logging**: [`logging::init_subscriber`]
//!
//! ## Crate Position
//!
//! Leaf crate. Depended on by `omo-settings`, `omo-rpc`, `omo-sync`, `omo-cli`.

#![deny(unsafe_code)]

pub mod catalog;
pub mod changes;
pub mod config;
pub mod constants;
pub mod errors;
pub mod logging;
pub mod presets;

pub use catalog::{ModelMap, ProviderModelCatalog, VersionInfo};
pub use changes::{ChangeType, ConfigChange};
pub use config::{AgentAssignment, AssignmentUpdate, Configuration, Variant};
pub use errors::{CoreError, Result};
pub use presets::{AcceptExternalResult, BuiltinPresetInfo, PresetMeta};
