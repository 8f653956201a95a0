//! Root object wiring every engine component to one backend.

use std::sync::Arc;
use std::time::Duration;

use omo_core::constants::DEFAULT_DEBOUNCE;
use omo_core::{Configuration, ProviderModelCatalog, VersionInfo};
use omo_rpc::Backend;
use omo_settings::EngineSettings;
use tokio::sync::broadcast;

use crate::detector::ChangeDetector;
use crate::events::{EventEmitter, SyncEvent};
use crate::mutation::OptimisticMutations;
use crate::preload::{PreloadReport, Preloader};
use crate::presets::PresetCoordinator;
use crate::reconciler::Reconciler;
use crate::resource::{RefreshPolicy, ResourceCache};

/// Tunables for a [`SyncStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreOptions {
    /// Change detector debounce interval.
    pub debounce: Duration,
    /// Refresh policy of the provider/model catalog.
    pub catalog_policy: RefreshPolicy,
    /// Refresh policy of version info.
    pub versions_policy: RefreshPolicy,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            catalog_policy: RefreshPolicy::Revalidate,
            versions_policy: RefreshPolicy::Revalidate,
        }
    }
}

fn policy(revalidate: bool) -> RefreshPolicy {
    if revalidate {
        RefreshPolicy::Revalidate
    } else {
        RefreshPolicy::CacheFirst
    }
}

impl StoreOptions {
    /// Derive options from loaded engine settings.
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            debounce: settings.detector.debounce(),
            catalog_policy: policy(settings.refresh.revalidate_catalog),
            versions_policy: policy(settings.refresh.revalidate_versions),
        }
    }
}

/// The synchronization engine for one backend.
///
/// Built once by the application root and shared by reference. Dropping it
/// cancels any pending debounced check.
pub struct SyncStore {
    backend: Arc<dyn Backend>,
    events: Arc<EventEmitter>,
    config: ResourceCache<Configuration>,
    catalog: ResourceCache<ProviderModelCatalog>,
    versions: ResourceCache<Vec<VersionInfo>>,
    preloader: Preloader,
    detector: Arc<ChangeDetector>,
    presets: Arc<PresetCoordinator>,
    reconciler: Reconciler,
    mutations: OptimisticMutations,
}

impl SyncStore {
    /// Wire every component to `backend`. Must be called inside a tokio
    /// runtime before any check is triggered.
    pub fn new(backend: Arc<dyn Backend>, options: StoreOptions) -> Self {
        let events = Arc::new(EventEmitter::new());

        let fetch = Arc::clone(&backend);
        let config = ResourceCache::new("configuration", RefreshPolicy::CacheFirst, move || {
            let backend = Arc::clone(&fetch);
            async move { backend.read_config().await }
        });

        let fetch = Arc::clone(&backend);
        let catalog = ResourceCache::new("catalog", options.catalog_policy, move || {
            let backend = Arc::clone(&fetch);
            async move {
                let (models, connected, custom) = tokio::try_join!(
                    backend.available_models(),
                    backend.connected_providers(),
                    backend.custom_models(),
                )?;
                Ok::<_, omo_rpc::RpcError>(ProviderModelCatalog {
                    models,
                    connected,
                    custom,
                })
            }
        });

        let fetch = Arc::clone(&backend);
        let versions = ResourceCache::new("versions", options.versions_policy, move || {
            let backend = Arc::clone(&fetch);
            async move { backend.check_versions().await }
        });

        let preloader = Preloader::new(
            config.clone(),
            catalog.clone(),
            versions.clone(),
            Arc::clone(&events),
        );
        let detector = Arc::new(ChangeDetector::new(
            Arc::clone(&backend),
            options.debounce,
            Arc::clone(&events),
        ));
        let presets = Arc::new(PresetCoordinator::new(
            Arc::clone(&backend),
            config.clone(),
            Arc::clone(&detector),
            Arc::clone(&events),
        ));
        let reconciler = Reconciler::new(
            Arc::clone(&backend),
            config.clone(),
            Arc::clone(&detector),
            Arc::clone(&presets),
            Arc::clone(&events),
        );
        let mutations = OptimisticMutations::new(
            Arc::clone(&backend),
            config.clone(),
            catalog.clone(),
            Arc::clone(&presets),
            Arc::clone(&events),
        );

        Self {
            backend,
            events,
            config,
            catalog,
            versions,
            preloader,
            detector,
            presets,
            reconciler,
            mutations,
        }
    }

    /// Build from loaded engine settings.
    pub fn from_settings(backend: Arc<dyn Backend>, settings: &EngineSettings) -> Self {
        Self::new(backend, StoreOptions::from_settings(settings))
    }

    /// Preload configuration, catalog and versions in parallel.
    pub async fn preload(&self) -> PreloadReport {
        self.preloader.preload().await
    }

    /// Receive engine events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Most recent event of `kind` (its serialized `type` tag).
    pub fn latest_event(&self, kind: &str) -> Option<SyncEvent> {
        self.events.latest(kind)
    }

    /// The backend every component talks to.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Cached live configuration.
    pub fn configuration(&self) -> &ResourceCache<Configuration> {
        &self.config
    }

    /// Cached provider/model catalog.
    pub fn catalog(&self) -> &ResourceCache<ProviderModelCatalog> {
        &self.catalog
    }

    /// Cached version info.
    pub fn versions(&self) -> &ResourceCache<Vec<VersionInfo>> {
        &self.versions
    }

    /// Preload orchestrator.
    pub fn preloader(&self) -> &Preloader {
        &self.preloader
    }

    /// Change detector.
    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    /// Preset coordinator.
    pub fn presets(&self) -> &PresetCoordinator {
        &self.presets
    }

    /// Divergence reconciler.
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Optimistic mutation layer.
    pub fn mutations(&self) -> &OptimisticMutations {
        &self.mutations
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
