//! Parallel first load of configuration, catalog and versions.

use std::sync::Arc;

use omo_core::{Configuration, ProviderModelCatalog, VersionInfo};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::events::{EventEmitter, SyncEvent};
use crate::resource::ResourceCache;

/// Per-resource outcome of a preload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreloadReport {
    /// Configuration fetch result.
    pub configuration: Result<(), String>,
    /// Catalog fetch result.
    pub catalog: Result<(), String>,
    /// Version check result.
    pub versions: Result<(), String>,
}

impl PreloadReport {
    /// Whether every resource loaded.
    pub fn all_ok(&self) -> bool {
        self.failed().is_empty()
    }

    /// Names of the resources that failed.
    pub fn failed(&self) -> Vec<&'static str> {
        [
            ("configuration", &self.configuration),
            ("catalog", &self.catalog),
            ("versions", &self.versions),
        ]
        .into_iter()
        .filter(|(_, r)| r.is_err())
        .map(|(name, _)| name)
        .collect()
    }
}

fn outcome<T: Clone + Send + Sync + 'static>(cache: &ResourceCache<T>) -> Result<(), String> {
    match cache.error() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Starts the three resource caches together and waits for all of them.
pub struct Preloader {
    config: ResourceCache<Configuration>,
    catalog: ResourceCache<ProviderModelCatalog>,
    versions: ResourceCache<Vec<VersionInfo>>,
    done: watch::Sender<bool>,
    report: Mutex<Option<PreloadReport>>,
    events: Arc<EventEmitter>,
}

impl Preloader {
    /// Wrap the three caches.
    pub fn new(
        config: ResourceCache<Configuration>,
        catalog: ResourceCache<ProviderModelCatalog>,
        versions: ResourceCache<Vec<VersionInfo>>,
        events: Arc<EventEmitter>,
    ) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            config,
            catalog,
            versions,
            done,
            report: Mutex::new(None),
            events,
        }
    }

    /// Refresh all three resources concurrently. A failure in one never
    /// cancels the others.
    #[instrument(skip(self))]
    pub async fn preload(&self) -> PreloadReport {
        let ((), (), ()) = tokio::join!(
            self.config.refresh(false),
            self.catalog.refresh(false),
            self.versions.refresh(false),
        );

        let report = PreloadReport {
            configuration: outcome(&self.config),
            catalog: outcome(&self.catalog),
            versions: outcome(&self.versions),
        };
        let failed: Vec<String> = report.failed().into_iter().map(String::from).collect();
        if failed.is_empty() {
            info!("preload complete");
        } else {
            warn!(?failed, "preload completed with failures");
        }

        *self.report.lock() = Some(report.clone());
        let _ = self.done.send_replace(true);
        let _ = self.events.emit(SyncEvent::PreloadComplete { failed });
        report
    }

    /// Whether a preload has settled.
    pub fn is_preloaded(&self) -> bool {
        *self.done.borrow()
    }

    /// Report of the last settled preload.
    pub fn report(&self) -> Option<PreloadReport> {
        self.report.lock().clone()
    }

    /// Resolve once a preload has settled.
    pub async fn wait_until_preloaded(&self) {
        let mut rx = self.done.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use omo_rpc::RpcError;

    use crate::resource::RefreshPolicy;

    fn preloader(fail_catalog: bool) -> (Preloader, Arc<EventEmitter>) {
        let config = ResourceCache::new("configuration", RefreshPolicy::CacheFirst, || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Configuration::default())
        });
        let catalog = ResourceCache::new("catalog", RefreshPolicy::Revalidate, move || async move {
            if fail_catalog {
                Err(RpcError::internal("catalog unavailable"))
            } else {
                Ok(ProviderModelCatalog::default())
            }
        });
        let versions = ResourceCache::new("versions", RefreshPolicy::Revalidate, || async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(Vec::new())
        });
        let events = Arc::new(EventEmitter::new());
        (
            Preloader::new(config, catalog, versions, Arc::clone(&events)),
            events,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_every_resource() {
        let (preloader, _) = preloader(false);
        let start = tokio::time::Instant::now();
        let report = preloader.preload().await;
        assert!(report.all_ok());
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(start.elapsed() < Duration::from_millis(250));
        assert!(preloader.config.data().is_some());
        assert!(preloader.versions.data().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn one_failure_does_not_block_others() {
        let (preloader, events) = preloader(true);
        let mut rx = events.subscribe();
        let report = preloader.preload().await;
        assert_eq!(report.failed(), vec!["catalog"]);
        assert_eq!(report.catalog, Err("catalog unavailable".into()));
        assert!(preloader.config.data().is_some());
        assert!(preloader.versions.data().is_some());
        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::PreloadComplete {
                failed: vec!["catalog".into()]
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_preloaded_resolves_after_preload() {
        let (preloader, _) = preloader(false);
        assert!(!preloader.is_preloaded());
        let ((), report) = tokio::join!(preloader.wait_until_preloaded(), preloader.preload());
        assert!(preloader.is_preloaded());
        assert_eq!(preloader.report(), Some(report));
    }
}
