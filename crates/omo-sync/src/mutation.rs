//! Optimistic assignment edits and custom model changes.
//!
//! An assignment edit lands in the cached configuration before the backend
//! confirms it, normalized exactly as the backend normalizes it. When the
//! backend call fails the optimistic write is kept. The next configuration
//! refresh settles the difference.

use std::sync::Arc;

use omo_core::{AssignmentUpdate, Configuration, ProviderModelCatalog};
use omo_rpc::{Backend, RpcError};
use tracing::{debug, instrument, warn};

use crate::errors::Result;
use crate::events::{EventEmitter, SyncEvent};
use crate::presets::PresetCoordinator;
use crate::resource::ResourceCache;

/// User-initiated writes.
pub struct OptimisticMutations {
    backend: Arc<dyn Backend>,
    config: ResourceCache<Configuration>,
    catalog: ResourceCache<ProviderModelCatalog>,
    presets: Arc<PresetCoordinator>,
    events: Arc<EventEmitter>,
}

impl OptimisticMutations {
    /// Wire the mutation layer to the shared components.
    pub fn new(
        backend: Arc<dyn Backend>,
        config: ResourceCache<Configuration>,
        catalog: ResourceCache<ProviderModelCatalog>,
        presets: Arc<PresetCoordinator>,
        events: Arc<EventEmitter>,
    ) -> Self {
        Self {
            backend,
            config,
            catalog,
            presets,
            events,
        }
    }

    /// Change one assignment.
    #[instrument(skip(self), fields(agent = %update.agent_name))]
    pub async fn assign(&self, update: AssignmentUpdate) -> Result<Configuration> {
        self.apply_locally(std::slice::from_ref(&update));
        let confirmed = self
            .backend
            .update_assignment(&update)
            .await
            .inspect_err(|err| warn!(error = %err, "assignment update failed, keeping optimistic value"))?;
        self.confirm(confirmed).await
    }

    /// Change several assignments in one backend write.
    #[instrument(skip(self, updates), fields(count = updates.len()))]
    pub async fn assign_many(&self, updates: Vec<AssignmentUpdate>) -> Result<Configuration> {
        if updates.is_empty() {
            return Ok(self.config.data().unwrap_or_default());
        }
        self.apply_locally(&updates);
        let confirmed = self
            .backend
            .update_assignments(&updates)
            .await
            .inspect_err(|err| warn!(error = %err, "batch update failed, keeping optimistic values"))?;
        self.confirm(confirmed).await
    }

    /// Add a user-defined model and reload the catalog.
    #[instrument(skip(self))]
    pub async fn add_custom_model(&self, provider_id: &str, model_id: &str) -> Result<()> {
        let model_id = model_id.trim();
        if model_id.is_empty() {
            return Err(RpcError::InvalidParams {
                message: "model id must not be empty".into(),
            }
            .into());
        }
        self.backend.add_custom_model(provider_id, model_id).await?;
        self.catalog.refresh(true).await;
        Ok(())
    }

    /// Remove a user-defined model and reload the catalog.
    #[instrument(skip(self))]
    pub async fn remove_custom_model(&self, provider_id: &str, model_id: &str) -> Result<()> {
        self.backend.remove_custom_model(provider_id, model_id).await?;
        self.catalog.refresh(true).await;
        Ok(())
    }

    fn apply_locally(&self, updates: &[AssignmentUpdate]) {
        let applied = self.config.modify(|config| {
            let touched = config.apply_updates(updates);
            debug!(touched, "optimistic write");
        });
        if !applied {
            debug!("configuration not cached yet, skipping optimistic write");
        }
    }

    async fn confirm(&self, confirmed: Configuration) -> Result<Configuration> {
        self.config.replace(confirmed.clone());
        if let Err(err) = self.presets.sync_active().await {
            let preset = self.presets.active().unwrap_or_default();
            warn!(preset = %preset, error = %err, "failed to re-persist active preset");
            let _ = self.events.emit(SyncEvent::PresetSyncFailed {
                preset,
                error: err.to_string(),
            });
        }
        Ok(confirmed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use omo_core::{AgentAssignment, Variant};
    use omo_rpc::methods;
    use omo_rpc::testutil::InMemoryBackend;

    use crate::detector::ChangeDetector;
    use crate::resource::RefreshPolicy;

    struct Fixture {
        mutations: OptimisticMutations,
        backend: Arc<InMemoryBackend>,
        config: ResourceCache<Configuration>,
        catalog: ResourceCache<ProviderModelCatalog>,
        presets: Arc<PresetCoordinator>,
    }

    fn config() -> Configuration {
        let mut c = Configuration::default();
        let _ = c
            .agents
            .insert("oracle".into(), AgentAssignment::new("openai/gpt-4", Some(Variant::High)));
        let _ = c
            .categories
            .insert("oracle".into(), AgentAssignment::new("openai/gpt-4", Some(Variant::High)));
        c
    }

    async fn fixture() -> Fixture {
        let backend = Arc::new(InMemoryBackend::with_config(config()));
        let dyn_backend = Arc::clone(&backend) as Arc<dyn Backend>;
        let events = Arc::new(EventEmitter::new());

        let fetch = Arc::clone(&dyn_backend);
        let config = ResourceCache::new("configuration", RefreshPolicy::CacheFirst, move || {
            let backend = Arc::clone(&fetch);
            async move { backend.read_config().await }
        });
        let fetch = Arc::clone(&dyn_backend);
        let catalog = ResourceCache::new("catalog", RefreshPolicy::Revalidate, move || {
            let backend = Arc::clone(&fetch);
            async move {
                Ok::<_, RpcError>(ProviderModelCatalog {
                    custom: backend.custom_models().await?,
                    ..ProviderModelCatalog::default()
                })
            }
        });
        let detector = Arc::new(ChangeDetector::new(
            Arc::clone(&dyn_backend),
            Duration::from_millis(500),
            Arc::clone(&events),
        ));
        let presets = Arc::new(PresetCoordinator::new(
            Arc::clone(&dyn_backend),
            config.clone(),
            detector,
            Arc::clone(&events),
        ));
        config.refresh(false).await;
        Fixture {
            mutations: OptimisticMutations::new(
                dyn_backend,
                config.clone(),
                catalog.clone(),
                Arc::clone(&presets),
                events,
            ),
            backend,
            config,
            catalog,
            presets,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn optimistic_write_is_visible_before_backend_confirms() {
        let f = fixture().await;
        f.backend.set_latency(Some(Duration::from_millis(200)));
        let update = AssignmentUpdate::new("oracle", "openai/gpt-4", Some(Variant::None));
        let (result, seen) = tokio::join!(f.mutations.assign(update), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            f.config.data().unwrap()
        });
        assert_eq!(seen.agents["oracle"], AgentAssignment::new("openai/gpt-4", None));
        assert_eq!(seen.categories["oracle"].variant, None);
        assert_eq!(result.unwrap(), f.backend.live());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_update_keeps_optimistic_value() {
        let f = fixture().await;
        f.backend
            .fail(methods::UPDATE_ASSIGNMENT, RpcError::transport("pipe closed"));
        let update = AssignmentUpdate::new("oracle", "anthropic/opus", None);
        assert!(f.mutations.assign(update).await.is_err());
        let cached = f.config.data().unwrap();
        assert_eq!(cached.agents["oracle"].model, "anthropic/opus");
        assert_eq!(cached.agents["oracle"].variant, Some(Variant::High));
        assert_eq!(f.backend.live().agents["oracle"].model, "openai/gpt-4");
    }

    #[tokio::test(start_paused = true)]
    async fn edit_while_preset_active_repersists_it() {
        let f = fixture().await;
        f.backend.insert_preset("work", config());
        f.backend.set_active(Some("work"));
        f.presets.refresh_list().await.unwrap();

        let updates = vec![
            AssignmentUpdate::new("oracle", "anthropic/opus", Some(Variant::Max)),
            AssignmentUpdate::new("missing", "x/y", None),
        ];
        let confirmed = f.mutations.assign_many(updates).await.unwrap();
        assert_eq!(confirmed.agents["oracle"].variant, Some(Variant::Max));
        assert_eq!(f.backend.preset("work"), Some(confirmed));
        assert_eq!(f.backend.calls(methods::UPDATE_PRESET), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn preset_sync_failure_does_not_fail_the_edit() {
        let f = fixture().await;
        f.backend.insert_preset("work", config());
        f.backend.set_active(Some("work"));
        f.presets.refresh_list().await.unwrap();
        f.backend
            .fail(methods::UPDATE_PRESET, RpcError::internal("read-only preset dir"));

        let update = AssignmentUpdate::new("oracle", "anthropic/opus", None);
        let confirmed = f.mutations.assign(update).await.unwrap();
        assert_eq!(confirmed.agents["oracle"].model, "anthropic/opus");
        assert_eq!(f.config.data(), Some(confirmed));
        assert_eq!(f.backend.preset("work"), Some(config()));
    }

    #[tokio::test(start_paused = true)]
    async fn no_active_preset_skips_repersist() {
        let f = fixture().await;
        let update = AssignmentUpdate::new("oracle", "anthropic/opus", None);
        let _ = f.mutations.assign(update).await.unwrap();
        assert_eq!(f.backend.calls(methods::UPDATE_PRESET), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_model_changes_refresh_catalog() {
        let f = fixture().await;
        f.mutations.add_custom_model("local", " llama ").await.unwrap();
        assert!(f.catalog.data().unwrap().is_custom("local", "llama"));
        f.mutations.remove_custom_model("local", "llama").await.unwrap();
        assert!(!f.catalog.data().unwrap().is_custom("local", "llama"));
        assert!(f.mutations.remove_custom_model("local", "llama").await.is_err());
        assert!(f.mutations.add_custom_model("local", "  ").await.is_err());
    }
}
