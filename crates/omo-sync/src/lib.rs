//! # omo-sync
//!
//! Client-side synchronization engine for a backend-owned configuration file.
//!
//! - [`ResourceCache`]: deduplicated, cold/warm aware cache of one backend
//!   resource (configuration, provider/model catalog, version info)
//! - [`Preloader`]: parallel first load that tolerates partial failure
//! - [`ChangeDetector`]: debounced compare-with-snapshot producing a diff
//! - [`Reconciler`]: restore-from-cache, restore-from-preset, accept-external
//! - [`PresetCoordinator`]: active preset tracking and lifecycle rules
//! - [`OptimisticMutations`]: assignment edits applied locally ahead of the
//!   backend
//! - [`SyncStore`]: root object wiring all of the above to one [`Backend`]
//!
//! ## Crate Position
//!
//! Depends on `omo-core`, `omo-rpc`, `omo-settings`. Depended on by `omo-cli`.
//!
//! [`Backend`]: omo_rpc::Backend

#![deny(unsafe_code)]

pub mod detector;
pub mod errors;
pub mod events;
pub mod mutation;
pub mod preload;
pub mod presets;
pub mod reconciler;
pub mod resource;
pub mod store;

pub use detector::{ChangeDetector, CheckOutcome, DetectorPhase, DetectorState};
pub use errors::{PresetError, Result, SyncError};
pub use events::{EventEmitter, SyncEvent};
pub use mutation::OptimisticMutations;
pub use preload::{PreloadReport, Preloader};
pub use presets::{PresetCoordinator, PresetState, validate_name};
pub use reconciler::{AcceptOutcome, Reconciler, Resolution};
pub use resource::{RefreshPolicy, ResourceCache, ResourceState};
pub use store::{StoreOptions, SyncStore};
