//! Test doubles for the backend contract.
//!
//! [`MockBackend`] (mockall) is for asserting exact call counts.
//! [`InMemoryBackend`] is a stateful fake: a live file, a snapshot, preset
//! files with an active pointer, and catalogs, all held in memory. Tests edit
//! the live file directly to simulate changes made outside the engine.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use omo_core::config::validate_document;
use omo_core::constants::{BUILTIN_PRESET_PREFIX, DEFAULT_PRESET, PATH_SEPARATORS};
use omo_core::presets::now_ms;
use omo_core::{
    AcceptExternalResult, AgentAssignment, AssignmentUpdate, BuiltinPresetInfo, ConfigChange,
    Configuration, ModelMap, PresetMeta, VersionInfo,
};
use parking_lot::Mutex;
use serde_json::{Map, Value};

pub use crate::backend::MockBackend;
use crate::backend::Backend;
use crate::errors::{self, Result, RpcError};
use crate::methods;

#[derive(Default)]
struct State {
    live: Configuration,
    snapshot: Option<Configuration>,
    presets: BTreeMap<String, (Configuration, PresetMeta)>,
    active: Option<String>,
    builtin: Vec<(BuiltinPresetInfo, Configuration)>,
    models: ModelMap,
    connected: Vec<String>,
    custom: ModelMap,
    versions: Vec<VersionInfo>,
}

/// Stateful in-memory backend.
///
/// Keeps no stored preset for `default`, so accepting external changes while
/// `default` is active re-persists nothing and reports `preset_synced: false`
/// without an error.
pub struct InMemoryBackend {
    state: Mutex<State>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<HashMap<&'static str, RpcError>>,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryBackend {
    /// Empty configuration, no presets, the three standard builtin presets.
    pub fn new() -> Self {
        let builtin = [
            ("official-default", "Official Default", "Upstream recommended models"),
            ("economy", "Economy", "Lower-cost models for every agent"),
            ("high-performance", "High Performance", "Strongest available models"),
        ]
        .into_iter()
        .map(|(id, name, description)| {
            (
                BuiltinPresetInfo {
                    id: id.to_string(),
                    name: name.to_string(),
                    description: description.to_string(),
                    icon: None,
                },
                Configuration::default(),
            )
        })
        .collect();

        Self {
            state: Mutex::new(State {
                builtin,
                ..State::default()
            }),
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            latency: Mutex::new(None),
        }
    }

    /// Start with `config` as the live file.
    pub fn with_config(config: Configuration) -> Self {
        let backend = Self::new();
        backend.state.lock().live = config;
        backend
    }

    // ── Direct state access (bypasses counters and failures) ─────────

    /// Current live file.
    pub fn live(&self) -> Configuration {
        self.state.lock().live.clone()
    }

    /// Replace the live file, as an external editor would.
    pub fn set_live(&self, config: Configuration) {
        self.state.lock().live = config;
    }

    /// Edit the live file in place, as an external editor would.
    pub fn edit_live(&self, edit: impl FnOnce(&mut Configuration)) {
        edit(&mut self.state.lock().live);
    }

    /// Current snapshot, if any.
    pub fn snapshot(&self) -> Option<Configuration> {
        self.state.lock().snapshot.clone()
    }

    /// Stored copy of preset `name`.
    pub fn preset(&self, name: &str) -> Option<Configuration> {
        self.state.lock().presets.get(name).map(|(c, _)| c.clone())
    }

    /// Store `config` as preset `name`.
    pub fn insert_preset(&self, name: &str, config: Configuration) {
        let _ = self
            .state
            .lock()
            .presets
            .insert(name.to_string(), (config, PresetMeta::new(now_ms())));
    }

    /// Raw active pointer.
    pub fn active(&self) -> Option<String> {
        self.state.lock().active.clone()
    }

    /// Set the raw active pointer.
    pub fn set_active(&self, name: Option<&str>) {
        self.state.lock().active = name.map(str::to_string);
    }

    /// Set the assignments applied by builtin preset `id`.
    pub fn set_builtin_config(&self, id: &str, config: Configuration) {
        if let Some(entry) = self.state.lock().builtin.iter_mut().find(|(i, _)| i.id == id) {
            entry.1 = config;
        }
    }

    /// Replace the provider/model catalog.
    pub fn set_catalog(&self, models: ModelMap, connected: Vec<String>, custom: ModelMap) {
        let mut state = self.state.lock();
        state.models = models;
        state.connected = connected;
        state.custom = custom;
    }

    /// Replace version info.
    pub fn set_versions(&self, versions: Vec<VersionInfo>) {
        self.state.lock().versions = versions;
    }

    // ── Instrumentation ──────────────────────────────────────────────

    /// Make every call to `method` fail with `err` until cleared.
    ///
    /// A failure registered for [`methods::UPDATE_PRESET`] also fails the
    /// preset re-persist step inside accept-external.
    pub fn fail(&self, method: &'static str, err: RpcError) {
        let _ = self.failures.lock().insert(method, err);
    }

    /// Stop failing `method`.
    pub fn clear_failure(&self, method: &'static str) {
        let _ = self.failures.lock().remove(method);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Number of calls made to `method`.
    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().get(method).copied().unwrap_or(0)
    }

    /// Number of calls made across all methods.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// Reset all counters.
    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    async fn enter(&self, method: &'static str) -> Result<()> {
        *self.calls.lock().entry(method).or_insert(0) += 1;
        let latency = *self.latency.lock();
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failures.lock().get(method).cloned();
        failure.map_or(Ok(()), Err)
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(RpcError::InvalidParams {
            message: "preset name must not be empty".into(),
        });
    }
    if name.contains(PATH_SEPARATORS) {
        return Err(RpcError::Custom {
            code: errors::INVALID_PATH.into(),
            message: format!("invalid preset name '{name}'"),
            details: None,
        });
    }
    Ok(())
}

fn preset_not_found(name: &str) -> RpcError {
    RpcError::not_found(errors::PRESET_NOT_FOUND, format!("preset '{name}' not found"))
}

fn check_config(config: &Configuration) -> Result<()> {
    let value = config.to_value().map_err(|e| RpcError::internal(e.to_string()))?;
    validate_document(&value).map_err(|e| RpcError::Custom {
        code: errors::INVALID_CONFIG.into(),
        message: e.to_string(),
        details: None,
    })
}

fn to_value(assignment: &AgentAssignment) -> Value {
    serde_json::to_value(assignment).unwrap_or_default()
}

fn diff_section(
    section: &str,
    old: &BTreeMap<String, AgentAssignment>,
    new: &BTreeMap<String, AgentAssignment>,
    out: &mut Vec<ConfigChange>,
) {
    let names: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    for name in names {
        let path = format!("{section}.{name}");
        match (old.get(name), new.get(name)) {
            (Some(a), Some(b)) if a != b => {
                out.push(ConfigChange::modified(path, to_value(a), to_value(b)));
            }
            (Some(a), None) => out.push(ConfigChange::removed(path, to_value(a))),
            (None, Some(b)) => out.push(ConfigChange::added(path, to_value(b))),
            _ => {}
        }
    }
}

fn diff_extra(old: &Map<String, Value>, new: &Map<String, Value>, out: &mut Vec<ConfigChange>) {
    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    for key in keys {
        match (old.get(key), new.get(key)) {
            (Some(a), Some(b)) if a != b => {
                out.push(ConfigChange::modified(key.clone(), a.clone(), b.clone()));
            }
            (Some(a), None) => out.push(ConfigChange::removed(key.clone(), a.clone())),
            (None, Some(b)) => out.push(ConfigChange::added(key.clone(), b.clone())),
            _ => {}
        }
    }
}

/// Entry-level divergence between two configurations, ordered by section
/// then name.
pub fn diff_configs(old: &Configuration, new: &Configuration) -> Vec<ConfigChange> {
    let mut out = Vec::new();
    diff_section("agents", &old.agents, &new.agents, &mut out);
    diff_section("categories", &old.categories, &new.categories, &mut out);
    diff_extra(&old.extra, &new.extra, &mut out);
    out
}

/// Snapshot entries win; entries only present on disk are kept.
fn merge_snapshot_over(snapshot: &Configuration, live: &Configuration) -> Configuration {
    let mut merged = live.clone();
    for (name, a) in &snapshot.agents {
        let _ = merged.agents.insert(name.clone(), a.clone());
    }
    for (name, a) in &snapshot.categories {
        let _ = merged.categories.insert(name.clone(), a.clone());
    }
    for (key, v) in &snapshot.extra {
        let _ = merged.extra.insert(key.clone(), v.clone());
    }
    merged
}

fn overwrite(
    target: &mut BTreeMap<String, AgentAssignment>,
    source: &BTreeMap<String, AgentAssignment>,
) {
    for (name, preset) in source {
        if let Some(entry) = target.get_mut(name) {
            entry.model.clone_from(&preset.model);
            entry.variant = preset.variant;
        }
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn read_config(&self) -> Result<Configuration> {
        self.enter(methods::READ_CONFIG).await?;
        Ok(self.live())
    }

    async fn update_assignment(&self, update: &AssignmentUpdate) -> Result<Configuration> {
        self.enter(methods::UPDATE_ASSIGNMENT).await?;
        let mut state = self.state.lock();
        let _ = state.live.apply_update(update);
        Ok(state.live.clone())
    }

    async fn update_assignments(&self, updates: &[AssignmentUpdate]) -> Result<Configuration> {
        self.enter(methods::UPDATE_ASSIGNMENTS).await?;
        let mut state = self.state.lock();
        let _ = state.live.apply_updates(updates);
        Ok(state.live.clone())
    }

    async fn list_presets(&self) -> Result<Vec<String>> {
        self.enter(methods::LIST_PRESETS).await?;
        Ok(self.state.lock().presets.keys().cloned().collect())
    }

    async fn save_preset(&self, name: &str) -> Result<()> {
        self.enter(methods::SAVE_PRESET).await?;
        check_name(name)?;
        let mut state = self.state.lock();
        let config = state.live.clone();
        let now = now_ms();
        let meta = match state.presets.get(name) {
            Some((_, meta)) => {
                let mut meta = *meta;
                meta.touch(now);
                meta
            }
            None => PresetMeta::new(now),
        };
        let _ = state.presets.insert(name.to_string(), (config, meta));
        Ok(())
    }

    async fn load_preset(&self, name: &str) -> Result<()> {
        self.enter(methods::LOAD_PRESET).await?;
        let mut state = self.state.lock();
        let config = state
            .presets
            .get(name)
            .map(|(c, _)| c.clone())
            .ok_or_else(|| preset_not_found(name))?;
        check_config(&config)?;
        state.live = config;
        state.active = Some(name.to_string());
        Ok(())
    }

    async fn delete_preset(&self, name: &str) -> Result<()> {
        self.enter(methods::DELETE_PRESET).await?;
        let mut state = self.state.lock();
        state
            .presets
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| preset_not_found(name))
    }

    async fn rename_preset(&self, from: &str, to: &str) -> Result<()> {
        self.enter(methods::RENAME_PRESET).await?;
        check_name(to)?;
        let mut state = self.state.lock();
        if from != to && state.presets.contains_key(to) {
            return Err(RpcError::Custom {
                code: errors::ALREADY_EXISTS.into(),
                message: format!("preset '{to}' already exists"),
                details: None,
            });
        }
        let entry = state.presets.remove(from).ok_or_else(|| preset_not_found(from))?;
        let _ = state.presets.insert(to.to_string(), entry);
        if state.active.as_deref() == Some(from) {
            state.active = Some(to.to_string());
        }
        Ok(())
    }

    async fn update_preset(&self, name: &str) -> Result<()> {
        self.enter(methods::UPDATE_PRESET).await?;
        let mut state = self.state.lock();
        let live = state.live.clone();
        let (config, meta) = state
            .presets
            .get_mut(name)
            .ok_or_else(|| preset_not_found(name))?;
        *config = live;
        meta.touch(now_ms());
        Ok(())
    }

    async fn preset_config(&self, name: &str) -> Result<Configuration> {
        self.enter(methods::PRESET_CONFIG).await?;
        self.preset(name).ok_or_else(|| preset_not_found(name))
    }

    async fn preset_meta(&self, name: &str) -> Result<PresetMeta> {
        self.enter(methods::PRESET_META).await?;
        self.state
            .lock()
            .presets
            .get(name)
            .map(|(_, m)| *m)
            .ok_or_else(|| preset_not_found(name))
    }

    async fn active_preset(&self) -> Result<Option<String>> {
        self.enter(methods::ACTIVE_PRESET).await?;
        Ok(self.active())
    }

    async fn ensure_snapshot_exists(&self) -> Result<bool> {
        self.enter(methods::ENSURE_SNAPSHOT).await?;
        let mut state = self.state.lock();
        if state.snapshot.is_some() {
            return Ok(false);
        }
        state.snapshot = Some(state.live.clone());
        Ok(true)
    }

    async fn compare_with_snapshot(&self) -> Result<Vec<ConfigChange>> {
        self.enter(methods::COMPARE_WITH_SNAPSHOT).await?;
        let mut state = self.state.lock();
        match &state.snapshot {
            Some(snapshot) => Ok(diff_configs(snapshot, &state.live)),
            None => {
                state.snapshot = Some(state.live.clone());
                Ok(Vec::new())
            }
        }
    }

    async fn save_config_snapshot(&self) -> Result<()> {
        self.enter(methods::SAVE_SNAPSHOT).await?;
        let mut state = self.state.lock();
        state.snapshot = Some(state.live.clone());
        Ok(())
    }

    async fn merge_and_save(&self) -> Result<Configuration> {
        self.enter(methods::MERGE_AND_SAVE).await?;
        let mut state = self.state.lock();
        let merged = match &state.snapshot {
            Some(snapshot) => merge_snapshot_over(snapshot, &state.live),
            None => state.live.clone(),
        };
        check_config(&merged)?;
        state.live = merged.clone();
        Ok(merged)
    }

    async fn accept_external_changes(&self) -> Result<AcceptExternalResult> {
        self.enter(methods::ACCEPT_EXTERNAL).await?;
        let sync_failure = self.failures.lock().get(methods::UPDATE_PRESET).cloned();
        let mut state = self.state.lock();
        let config = state.live.clone();
        check_config(&config)?;
        state.snapshot = Some(config.clone());

        if state
            .active
            .as_deref()
            .is_some_and(|a| a.starts_with(BUILTIN_PRESET_PREFIX))
        {
            state.active = Some(DEFAULT_PRESET.to_string());
        }

        let mut preset_synced = false;
        let mut preset_sync_error = None;
        if let Some(name) = state.active.clone().filter(|a| a != DEFAULT_PRESET) {
            if let Some(err) = sync_failure {
                preset_sync_error = Some(err.to_string());
            } else if let Some((stored, meta)) = state.presets.get_mut(&name) {
                stored.clone_from(&config);
                meta.touch(now_ms());
                preset_synced = true;
            } else {
                preset_sync_error = Some(preset_not_found(&name).to_string());
            }
        }

        Ok(AcceptExternalResult {
            config,
            active_preset: state.active.clone(),
            preset_synced,
            preset_sync_error,
        })
    }

    async fn builtin_presets(&self) -> Result<Vec<BuiltinPresetInfo>> {
        self.enter(methods::BUILTIN_PRESETS).await?;
        Ok(self.state.lock().builtin.iter().map(|(i, _)| i.clone()).collect())
    }

    async fn apply_builtin_preset(&self, id: &str) -> Result<()> {
        self.enter(methods::APPLY_BUILTIN_PRESET).await?;
        let mut state = self.state.lock();
        let preset = state
            .builtin
            .iter()
            .find(|(info, _)| info.id == id)
            .map(|(_, c)| c.clone())
            .ok_or_else(|| {
                RpcError::not_found(errors::PRESET_NOT_FOUND, format!("unknown builtin preset '{id}'"))
            })?;
        overwrite(&mut state.live.agents, &preset.agents);
        overwrite(&mut state.live.categories, &preset.categories);
        state.active = Some(format!("{BUILTIN_PRESET_PREFIX}{id}"));
        Ok(())
    }

    async fn available_models(&self) -> Result<ModelMap> {
        self.enter(methods::AVAILABLE_MODELS).await?;
        Ok(self.state.lock().models.clone())
    }

    async fn connected_providers(&self) -> Result<Vec<String>> {
        self.enter(methods::CONNECTED_PROVIDERS).await?;
        Ok(self.state.lock().connected.clone())
    }

    async fn custom_models(&self) -> Result<ModelMap> {
        self.enter(methods::CUSTOM_MODELS).await?;
        Ok(self.state.lock().custom.clone())
    }

    async fn add_custom_model(&self, provider_id: &str, model_id: &str) -> Result<()> {
        self.enter(methods::ADD_CUSTOM_MODEL).await?;
        let mut state = self.state.lock();
        let models = state.custom.entry(provider_id.to_string()).or_default();
        if !models.iter().any(|m| m == model_id) {
            models.push(model_id.to_string());
        }
        Ok(())
    }

    async fn remove_custom_model(&self, provider_id: &str, model_id: &str) -> Result<()> {
        self.enter(methods::REMOVE_CUSTOM_MODEL).await?;
        let mut state = self.state.lock();
        let not_found = || {
            RpcError::not_found(
                errors::MODEL_NOT_FOUND,
                format!("custom model '{provider_id}/{model_id}' not found"),
            )
        };
        let models = state.custom.get_mut(provider_id).ok_or_else(not_found)?;
        let before = models.len();
        models.retain(|m| m != model_id);
        if models.len() == before {
            return Err(not_found());
        }
        if models.is_empty() {
            let _ = state.custom.remove(provider_id);
        }
        Ok(())
    }

    async fn check_versions(&self) -> Result<Vec<VersionInfo>> {
        self.enter(methods::CHECK_VERSIONS).await?;
        Ok(self.state.lock().versions.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use omo_core::{ChangeType, Variant};

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

    #[tokio::test]
    async fn compare_without_snapshot_creates_one() {
        let backend = InMemoryBackend::with_config(config());
        assert!(backend.compare_with_snapshot().await.unwrap().is_empty());
        assert_eq!(backend.snapshot(), Some(config()));
    }

    #[tokio::test]
    async fn ensure_snapshot_is_idempotent() {
        let backend = InMemoryBackend::with_config(config());
        assert!(backend.ensure_snapshot_exists().await.unwrap());
        assert!(!backend.ensure_snapshot_exists().await.unwrap());
        assert_eq!(backend.calls(methods::ENSURE_SNAPSHOT), 2);
    }

    #[tokio::test]
    async fn external_edit_shows_as_modified_entry() {
        let backend = InMemoryBackend::with_config(config());
        backend.save_config_snapshot().await.unwrap();
        backend.edit_live(|c| c.agents.get_mut("oracle").unwrap().model = "x".into());
        let changes = backend.compare_with_snapshot().await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "agents.oracle");
        assert_eq!(changes[0].change_type, ChangeType::Modified);
    }

    #[tokio::test]
    async fn merge_and_save_restores_snapshot_entries() {
        let backend = InMemoryBackend::with_config(config());
        backend.save_config_snapshot().await.unwrap();
        backend.edit_live(|c| c.agents.get_mut("oracle").unwrap().model = "x".into());
        let merged = backend.merge_and_save().await.unwrap();
        assert_eq!(merged.agents["oracle"].model, "openai/gpt-4");
        assert!(backend.compare_with_snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn accept_external_resyncs_snapshot_and_active_preset() {
        let backend = InMemoryBackend::with_config(config());
        backend.insert_preset("work", config());
        backend.set_active(Some("work"));
        backend.save_config_snapshot().await.unwrap();
        backend.edit_live(|c| c.categories.get_mut("quick").unwrap().model = "y".into());

        let result = backend.accept_external_changes().await.unwrap();
        assert!(result.preset_synced);
        assert_eq!(backend.preset("work").unwrap().categories["quick"].model, "y");
        assert!(backend.compare_with_snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn accept_external_reports_sync_failure() {
        let backend = InMemoryBackend::with_config(config());
        backend.insert_preset("work", config());
        backend.set_active(Some("work"));
        backend.fail(methods::UPDATE_PRESET, RpcError::internal("disk full"));

        let result = backend.accept_external_changes().await.unwrap();
        assert!(!result.preset_synced);
        assert_eq!(result.preset_sync_error.as_deref(), Some("disk full"));
        assert_eq!(backend.snapshot(), Some(config()));
    }

    #[tokio::test]
    async fn rename_collision_rejected() {
        let backend = InMemoryBackend::new();
        backend.insert_preset("a", config());
        backend.insert_preset("b", config());
        let err = backend.rename_preset("a", "b").await.unwrap_err();
        assert_eq!(err.code(), errors::ALREADY_EXISTS);
        assert!(backend.preset("a").is_some());
    }

    #[tokio::test]
    async fn apply_builtin_sets_marker() {
        let backend = InMemoryBackend::with_config(config());
        let mut economy = Configuration::default();
        let _ = economy
            .agents
            .insert("oracle".into(), AgentAssignment::new("cheap/model", None));
        backend.set_builtin_config("economy", economy);

        backend.apply_builtin_preset("economy").await.unwrap();
        assert_eq!(backend.live().agents["oracle"].model, "cheap/model");
        assert_eq!(backend.live().agents["oracle"].variant, None);
        assert_eq!(backend.active().as_deref(), Some("__builtin__economy"));
        assert_matches!(
            backend.apply_builtin_preset("nope").await,
            Err(RpcError::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn custom_models_add_is_idempotent_remove_errors() {
        let backend = InMemoryBackend::new();
        backend.add_custom_model("local", "llama").await.unwrap();
        backend.add_custom_model("local", "llama").await.unwrap();
        assert_eq!(backend.custom_models().await.unwrap()["local"], vec!["llama"]);
        backend.remove_custom_model("local", "llama").await.unwrap();
        assert!(backend.custom_models().await.unwrap().is_empty());
        assert_matches!(
            backend.remove_custom_model("local", "llama").await,
            Err(RpcError::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn injected_failure_counts_call() {
        let backend = InMemoryBackend::new();
        backend.fail(methods::READ_CONFIG, RpcError::transport("down"));
        assert!(backend.read_config().await.is_err());
        assert_eq!(backend.calls(methods::READ_CONFIG), 1);
        backend.clear_failure(methods::READ_CONFIG);
        assert!(backend.read_config().await.is_ok());
    }

    #[tokio::test]
    async fn save_preset_rejects_separator() {
        let backend = InMemoryBackend::new();
        let err = backend.save_preset("a/b").await.unwrap_err();
        assert_eq!(err.code(), errors::INVALID_PATH);
    }
}
