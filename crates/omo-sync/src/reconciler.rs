//! Resolutions for a detected divergence between snapshot and live file.

use std::fmt;
use std::sync::Arc;

use omo_core::Configuration;
use omo_core::constants::DEFAULT_PRESET;
use omo_core::presets::named_active;
use omo_rpc::Backend;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::detector::ChangeDetector;
use crate::errors::Result;
use crate::events::{EventEmitter, SyncEvent};
use crate::presets::PresetCoordinator;
use crate::resource::ResourceCache;

/// The three ways to settle a divergence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Snapshot wins, the live file reverts.
    RestoreFromCache,
    /// Close the alert. The user reloads a preset separately.
    RestoreFromPreset,
    /// The live file wins and becomes the new snapshot.
    AcceptExternal,
}

impl Resolution {
    /// Snake-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RestoreFromCache => "restore_from_cache",
            Self::RestoreFromPreset => "restore_from_preset",
            Self::AcceptExternal => "accept_external",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of accepting external changes.
#[derive(Clone, Debug, PartialEq)]
pub struct AcceptOutcome {
    /// Adopted configuration, already applied to the cache.
    pub config: Configuration,
    /// Active named preset after the accept.
    pub active_preset: Option<String>,
    /// Set when the active preset could not be re-persisted. The accept
    /// itself still succeeded.
    pub warning: Option<String>,
}

/// Applies a resolution and re-establishes a clean snapshot.
pub struct Reconciler {
    backend: Arc<dyn Backend>,
    config: ResourceCache<Configuration>,
    detector: Arc<ChangeDetector>,
    presets: Arc<PresetCoordinator>,
    events: Arc<EventEmitter>,
}

impl Reconciler {
    /// Wire the reconciler to the shared components.
    pub fn new(
        backend: Arc<dyn Backend>,
        config: ResourceCache<Configuration>,
        detector: Arc<ChangeDetector>,
        presets: Arc<PresetCoordinator>,
        events: Arc<EventEmitter>,
    ) -> Self {
        Self {
            backend,
            config,
            detector,
            presets,
            events,
        }
    }

    /// Apply `resolution`. Returns the accept outcome for
    /// [`Resolution::AcceptExternal`].
    pub async fn resolve(&self, resolution: Resolution) -> Result<Option<AcceptOutcome>> {
        match resolution {
            Resolution::RestoreFromCache => self.restore_from_cache().await.map(|()| None),
            Resolution::RestoreFromPreset => {
                self.restore_from_preset();
                Ok(None)
            }
            Resolution::AcceptExternal => self.accept_external().await.map(Some),
        }
    }

    /// Merge the snapshot over the live file, then reload.
    ///
    /// Entries present only on disk survive the merge, so the snapshot is
    /// resaved afterwards to leave no divergence behind.
    #[instrument(skip(self))]
    pub async fn restore_from_cache(&self) -> Result<()> {
        let merged = self.backend.merge_and_save().await?;
        self.backend.save_config_snapshot().await?;
        info!(entries = merged.len(), "restored configuration from snapshot");
        self.config.refresh(true).await;
        self.finish(Resolution::RestoreFromCache);
        Ok(())
    }

    /// Dismiss the alert. Loading a preset re-establishes the snapshot.
    pub fn restore_from_preset(&self) {
        self.detector.dismiss();
        let _ = self.events.emit(SyncEvent::Reconciled {
            resolution: Resolution::RestoreFromPreset.to_string(),
        });
    }

    /// Adopt the live file as the new configuration and snapshot, and
    /// re-persist the active preset from it.
    ///
    /// A failed preset re-persist is reported as a warning on a successful
    /// outcome.
    #[instrument(skip(self))]
    pub async fn accept_external(&self) -> Result<AcceptOutcome> {
        let result = self.backend.accept_external_changes().await?;
        self.config.replace(result.config.clone());

        let active = named_active(result.active_preset.as_deref()).map(String::from);
        self.presets.set_active(active.clone());

        let warning = if result.preset_synced {
            None
        } else {
            match (&active, result.preset_sync_error.clone()) {
                (_, Some(error)) => Some(error),
                (Some(_), None) => Some("preset was not re-persisted".to_string()),
                (None, None) => None,
            }
        };
        if let Some(error) = &warning {
            let preset = result
                .active_preset
                .clone()
                .unwrap_or_else(|| DEFAULT_PRESET.to_string());
            warn!(preset = %preset, error = %error, "accepted external changes, preset sync failed");
            let _ = self.events.emit(SyncEvent::PresetSyncFailed {
                preset,
                error: error.clone(),
            });
        }

        self.finish(Resolution::AcceptExternal);
        Ok(AcceptOutcome {
            config: result.config,
            active_preset: active,
            warning,
        })
    }

    fn finish(&self, resolution: Resolution) {
        self.detector.mark_clean();
        self.detector.trigger();
        let _ = self.events.emit(SyncEvent::Reconciled {
            resolution: resolution.to_string(),
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use omo_core::{AcceptExternalResult, AgentAssignment, Variant};
    use omo_rpc::testutil::{InMemoryBackend, MockBackend};
    use omo_rpc::{RpcError, methods};

    use crate::detector::CheckOutcome;
    use crate::errors::SyncError;
    use crate::resource::RefreshPolicy;

    fn config() -> Configuration {
        let mut c = Configuration::default();
        let _ = c
            .agents
            .insert("oracle".into(), AgentAssignment::new("openai/gpt-4", Some(Variant::High)));
        let _ = c
            .categories
            .insert("quick".into(), AgentAssignment::new("anthropic/haiku", None));
        c
    }

    fn reconciler(backend: Arc<dyn Backend>) -> Reconciler {
        let events = Arc::new(EventEmitter::new());
        let fetch = Arc::clone(&backend);
        let cache = ResourceCache::new("configuration", RefreshPolicy::CacheFirst, move || {
            let backend = Arc::clone(&fetch);
            async move { backend.read_config().await }
        });
        let detector = Arc::new(ChangeDetector::new(
            Arc::clone(&backend),
            Duration::from_millis(500),
            Arc::clone(&events),
        ));
        let presets = Arc::new(PresetCoordinator::new(
            Arc::clone(&backend),
            cache.clone(),
            Arc::clone(&detector),
            Arc::clone(&events),
        ));
        Reconciler::new(backend, cache, detector, presets, events)
    }

    async fn diverged() -> (Reconciler, Arc<InMemoryBackend>) {
        let backend = Arc::new(InMemoryBackend::with_config(config()));
        let reconciler = reconciler(Arc::clone(&backend) as Arc<dyn Backend>);
        reconciler.config.refresh(false).await;
        backend.save_config_snapshot().await.unwrap();
        backend.edit_live(|c| {
            c.agents.get_mut("oracle").unwrap().model = "external/model".into();
            let _ = c
                .agents
                .insert("scout".into(), AgentAssignment::new("local/llama", None));
        });
        assert_eq!(reconciler.detector.check_changes().await, CheckOutcome::Diverged(2));
        (reconciler, backend)
    }

    #[tokio::test(start_paused = true)]
    async fn restore_from_cache_reverts_and_leaves_no_divergence() {
        let (reconciler, backend) = diverged().await;
        reconciler.restore_from_cache().await.unwrap();
        assert!(!reconciler.detector.has_changes());
        assert_eq!(backend.live().agents["oracle"].model, "openai/gpt-4");
        assert_eq!(
            reconciler.config.data().unwrap().agents["oracle"].model,
            "openai/gpt-4"
        );
        assert!(backend.compare_with_snapshot().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn accept_external_adopts_live_file() {
        let (reconciler, backend) = diverged().await;
        let outcome = reconciler.accept_external().await.unwrap();
        assert_eq!(outcome.warning, None);
        assert_eq!(outcome.config, backend.live());
        assert_eq!(reconciler.config.data(), Some(backend.live()));
        assert!(!reconciler.detector.has_changes());
        assert_eq!(reconciler.detector.check_changes().await, CheckOutcome::Clean);
    }

    #[tokio::test(start_paused = true)]
    async fn accept_external_bypasses_full_reload() {
        let (reconciler, backend) = diverged().await;
        let reads = backend.calls(methods::READ_CONFIG);
        let _ = reconciler.accept_external().await.unwrap();
        assert_eq!(backend.calls(methods::READ_CONFIG), reads);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_preset_sync_is_a_warning() {
        let (reconciler, backend) = diverged().await;
        backend.insert_preset("work", config());
        backend.set_active(Some("work"));
        backend.fail(methods::UPDATE_PRESET, RpcError::internal("preset locked"));
        let mut events = reconciler.events.subscribe();

        let outcome = reconciler.accept_external().await.unwrap();
        assert_eq!(outcome.warning.as_deref(), Some("preset locked"));
        assert_eq!(outcome.active_preset.as_deref(), Some("work"));
        assert!(!reconciler.detector.has_changes());
        assert!(backend.compare_with_snapshot().await.unwrap().is_empty());

        let mut saw_sync_failure = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SyncEvent::PresetSyncFailed { .. }) {
                saw_sync_failure = true;
            }
        }
        assert!(saw_sync_failure);
    }

    #[tokio::test(start_paused = true)]
    async fn builtin_pointer_after_accept_means_no_named_preset() {
        let (reconciler, backend) = diverged().await;
        backend.set_active(Some("__builtin__economy"));
        let outcome = reconciler.accept_external().await.unwrap();
        assert_eq!(outcome.active_preset, None);
        assert_eq!(outcome.warning, None);
        assert_eq!(backend.active().as_deref(), Some("default"));
    }

    #[tokio::test(start_paused = true)]
    async fn restore_from_preset_only_dismisses() {
        let (reconciler, backend) = diverged().await;
        let before = backend.total_calls();
        reconciler.restore_from_preset();
        assert_eq!(backend.total_calls(), before);
        let state = reconciler.detector.state();
        assert!(state.has_changes());
        assert!(!state.should_alert());
    }

    #[tokio::test(start_paused = true)]
    async fn accept_failure_is_an_error() {
        let mut backend = MockBackend::new();
        let _ = backend
            .expect_accept_external_changes()
            .times(1)
            .returning(|| Err(RpcError::internal("invalid config")));
        let reconciler = reconciler(Arc::new(backend));
        assert!(matches!(
            reconciler.accept_external().await,
            Err(SyncError::Backend(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn accept_applies_returned_config_directly() {
        let mut backend = MockBackend::new();
        let _ = backend.expect_accept_external_changes().returning(|| {
            Ok(AcceptExternalResult {
                config: config(),
                active_preset: Some("default".into()),
                preset_synced: false,
                preset_sync_error: None,
            })
        });
        let _ = backend.expect_ensure_snapshot_exists().returning(|| Ok(false));
        let _ = backend.expect_compare_with_snapshot().returning(|| Ok(Vec::new()));
        let reconciler = reconciler(Arc::new(backend));

        let outcome = reconciler.accept_external().await.unwrap();
        assert_eq!(reconciler.config.data(), Some(config()));
        assert_eq!(outcome.active_preset, None);
        assert_eq!(outcome.warning, None);
    }

    #[tokio::test(start_paused = true)]
    async fn pointer_reset_failure_is_a_warning_without_named_preset() {
        let mut backend = MockBackend::new();
        let _ = backend.expect_accept_external_changes().returning(|| {
            Ok(AcceptExternalResult {
                config: config(),
                active_preset: Some("__builtin__economy".into()),
                preset_synced: false,
                preset_sync_error: Some("failed to reset active pointer".into()),
            })
        });
        let _ = backend.expect_ensure_snapshot_exists().returning(|| Ok(false));
        let _ = backend.expect_compare_with_snapshot().returning(|| Ok(Vec::new()));
        let reconciler = reconciler(Arc::new(backend));
        let mut events = reconciler.events.subscribe();

        let outcome = reconciler.accept_external().await.unwrap();
        assert_eq!(outcome.active_preset, None);
        assert_eq!(
            outcome.warning.as_deref(),
            Some("failed to reset active pointer")
        );
        let mut failed = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SyncEvent::PresetSyncFailed { preset, .. } = event {
                failed.push(preset);
            }
        }
        assert_eq!(failed, vec!["__builtin__economy".to_string()]);
    }
}
