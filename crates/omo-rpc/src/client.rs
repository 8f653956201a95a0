//! [`Backend`] implemented over any [`Transport`].

use async_trait::async_trait;
use omo_core::{
    AcceptExternalResult, AssignmentUpdate, BuiltinPresetInfo, ConfigChange, Configuration,
    ModelMap, PresetMeta, VersionInfo,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::backend::Backend;
use crate::errors::{Result, RpcError};
use crate::methods;
use crate::transport::Transport;

/// Maps each backend operation to its wire command and decodes the payload.
pub struct RpcBackend<T> {
    transport: T,
}

impl<T: Transport> RpcBackend<T> {
    /// Wrap a transport.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Borrow the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn call<R: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<R> {
        let payload = self.transport.call(method, params).await?;
        serde_json::from_value(payload).map_err(|e| {
            RpcError::internal(format!("malformed {method} response: {e}"))
        })
    }

    async fn call_unit(&self, method: &str, params: Option<Value>) -> Result<()> {
        let _ = self.transport.call(method, params).await?;
        Ok(())
    }
}

fn name_params(name: &str) -> Option<Value> {
    Some(json!({ "name": name }))
}

fn model_params(provider_id: &str, model_id: &str) -> Option<Value> {
    Some(json!({ "providerId": provider_id, "modelId": model_id }))
}

#[async_trait]
impl<T: Transport> Backend for RpcBackend<T> {
    async fn read_config(&self) -> Result<Configuration> {
        self.call(methods::READ_CONFIG, None).await
    }

    async fn update_assignment(&self, update: &AssignmentUpdate) -> Result<Configuration> {
        self.call(methods::UPDATE_ASSIGNMENT, Some(serde_json::to_value(update)?))
            .await
    }

    async fn update_assignments(&self, updates: &[AssignmentUpdate]) -> Result<Configuration> {
        self.call(methods::UPDATE_ASSIGNMENTS, Some(json!({ "updates": updates })))
            .await
    }

    async fn list_presets(&self) -> Result<Vec<String>> {
        self.call(methods::LIST_PRESETS, None).await
    }

    async fn save_preset(&self, name: &str) -> Result<()> {
        self.call_unit(methods::SAVE_PRESET, name_params(name)).await
    }

    async fn load_preset(&self, name: &str) -> Result<()> {
        self.call_unit(methods::LOAD_PRESET, name_params(name)).await
    }

    async fn delete_preset(&self, name: &str) -> Result<()> {
        self.call_unit(methods::DELETE_PRESET, name_params(name)).await
    }

    async fn rename_preset(&self, from: &str, to: &str) -> Result<()> {
        self.call_unit(
            methods::RENAME_PRESET,
            Some(json!({ "oldName": from, "newName": to })),
        )
        .await
    }

    async fn update_preset(&self, name: &str) -> Result<()> {
        self.call_unit(methods::UPDATE_PRESET, name_params(name)).await
    }

    async fn preset_config(&self, name: &str) -> Result<Configuration> {
        self.call(methods::PRESET_CONFIG, name_params(name)).await
    }

    async fn preset_meta(&self, name: &str) -> Result<PresetMeta> {
        self.call(methods::PRESET_META, name_params(name)).await
    }

    async fn active_preset(&self) -> Result<Option<String>> {
        self.call(methods::ACTIVE_PRESET, None).await
    }

    async fn ensure_snapshot_exists(&self) -> Result<bool> {
        self.call(methods::ENSURE_SNAPSHOT, None).await
    }

    async fn compare_with_snapshot(&self) -> Result<Vec<ConfigChange>> {
        self.call(methods::COMPARE_WITH_SNAPSHOT, None).await
    }

    async fn save_config_snapshot(&self) -> Result<()> {
        self.call_unit(methods::SAVE_SNAPSHOT, None).await
    }

    async fn merge_and_save(&self) -> Result<Configuration> {
        self.call(methods::MERGE_AND_SAVE, None).await
    }

    async fn accept_external_changes(&self) -> Result<AcceptExternalResult> {
        self.call(methods::ACCEPT_EXTERNAL, None).await
    }

    async fn builtin_presets(&self) -> Result<Vec<BuiltinPresetInfo>> {
        self.call(methods::BUILTIN_PRESETS, None).await
    }

    async fn apply_builtin_preset(&self, id: &str) -> Result<()> {
        self.call_unit(methods::APPLY_BUILTIN_PRESET, Some(json!({ "presetId": id })))
            .await
    }

    async fn available_models(&self) -> Result<ModelMap> {
        self.call(methods::AVAILABLE_MODELS, None).await
    }

    async fn connected_providers(&self) -> Result<Vec<String>> {
        self.call(methods::CONNECTED_PROVIDERS, None).await
    }

    async fn custom_models(&self) -> Result<ModelMap> {
        self.call(methods::CUSTOM_MODELS, None).await
    }

    async fn add_custom_model(&self, provider_id: &str, model_id: &str) -> Result<()> {
        self.call_unit(methods::ADD_CUSTOM_MODEL, model_params(provider_id, model_id))
            .await
    }

    async fn remove_custom_model(&self, provider_id: &str, model_id: &str) -> Result<()> {
        self.call_unit(methods::REMOVE_CUSTOM_MODEL, model_params(provider_id, model_id))
            .await
    }

    async fn check_versions(&self) -> Result<Vec<VersionInfo>> {
        self.call(methods::CHECK_VERSIONS, None).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
