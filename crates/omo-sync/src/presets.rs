//! Named preset tracking and lifecycle rules.
//!
//! The coordinator keeps the preset list, the active pointer and the bulk
//! selection under one lock. Every rule that can reject an operation is
//! checked before the backend is contacted, and a rejected operation leaves
//! that state untouched.

use std::collections::BTreeSet;
use std::sync::Arc;

use omo_core::constants::{DEFAULT_PRESET, PATH_SEPARATORS};
use omo_core::presets::named_active;
use omo_core::{BuiltinPresetInfo, Configuration, PresetMeta};
use omo_rpc::Backend;
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::detector::ChangeDetector;
use crate::errors::{PresetError, Result};
use crate::events::{EventEmitter, SyncEvent};
use crate::resource::ResourceCache;

/// Preset list, active pointer and selection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PresetState {
    /// Known preset names, sorted.
    pub presets: Vec<String>,
    /// Active named preset. `None` means the default configuration.
    pub active: Option<String>,
    /// Names picked for a bulk operation.
    pub selected: BTreeSet<String>,
}

impl PresetState {
    fn contains(&self, name: &str) -> bool {
        self.presets.iter().any(|p| p == name)
    }

    fn is_active(&self, name: &str) -> bool {
        self.active.as_deref() == Some(name)
    }
}

/// Trim a user-supplied preset name and reject empty names and path
/// separators.
pub fn validate_name(raw: &str) -> std::result::Result<String, PresetError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(PresetError::EmptyName);
    }
    if name.contains(PATH_SEPARATORS) {
        return Err(PresetError::InvalidPath(name.to_string()));
    }
    Ok(name.to_string())
}

fn check_deletable(state: &PresetState, name: &str) -> std::result::Result<(), PresetError> {
    if name == DEFAULT_PRESET {
        return Err(PresetError::DefaultPreset);
    }
    if state.is_active(name) {
        return Err(PresetError::ActivePreset(name.to_string()));
    }
    if !state.contains(name) {
        return Err(PresetError::UnknownPreset(name.to_string()));
    }
    Ok(())
}

/// Keeps the active preset consistent with live edits.
pub struct PresetCoordinator {
    backend: Arc<dyn Backend>,
    config: ResourceCache<Configuration>,
    detector: Arc<ChangeDetector>,
    events: Arc<EventEmitter>,
    state: Mutex<PresetState>,
}

impl PresetCoordinator {
    /// Create a coordinator with an empty list. Call
    /// [`refresh_list`](Self::refresh_list) before validating against it.
    pub fn new(
        backend: Arc<dyn Backend>,
        config: ResourceCache<Configuration>,
        detector: Arc<ChangeDetector>,
        events: Arc<EventEmitter>,
    ) -> Self {
        Self {
            backend,
            config,
            detector,
            events,
            state: Mutex::new(PresetState::default()),
        }
    }

    // ── State ───────────────────────────────────────────────────────

    /// Snapshot of list, active pointer and selection.
    pub fn state(&self) -> PresetState {
        self.state.lock().clone()
    }

    /// Known preset names.
    pub fn presets(&self) -> Vec<String> {
        self.state.lock().presets.clone()
    }

    /// Active named preset.
    pub fn active(&self) -> Option<String> {
        self.state.lock().active.clone()
    }

    /// Move the active pointer, emitting an event when it changes.
    pub(crate) fn set_active(&self, active: Option<String>) {
        let changed = {
            let mut state = self.state.lock();
            if state.active == active {
                false
            } else {
                state.active.clone_from(&active);
                true
            }
        };
        if changed {
            info!(active = ?active, "active preset changed");
            let _ = self.events.emit(SyncEvent::ActivePresetChanged { active });
        }
    }

    /// Reload the list and the active pointer from the backend.
    #[instrument(skip(self))]
    pub async fn refresh_list(&self) -> Result<()> {
        let mut presets = self.backend.list_presets().await?;
        let pointer = self.backend.active_preset().await?;
        presets.sort();
        presets.dedup();
        {
            let mut state = self.state.lock();
            state.selected.retain(|s| presets.contains(s));
            state.presets = presets;
        }
        self.set_active(named_active(pointer.as_deref()).map(String::from));
        Ok(())
    }

    // ── Selection ───────────────────────────────────────────────────

    /// Add a known preset to the selection. Returns false for unknown names.
    pub fn select(&self, name: &str) -> bool {
        let mut state = self.state.lock();
        if !state.contains(name) {
            return false;
        }
        let _ = state.selected.insert(name.to_string());
        true
    }

    /// Remove a preset from the selection.
    pub fn deselect(&self, name: &str) {
        let _ = self.state.lock().selected.remove(name);
    }

    /// Clear the selection.
    pub fn clear_selection(&self) {
        self.state.lock().selected.clear();
    }

    /// Selected names, sorted.
    pub fn selected(&self) -> Vec<String> {
        self.state.lock().selected.iter().cloned().collect()
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Save the live configuration under a new name. The new preset is not
    /// made active.
    #[instrument(skip(self))]
    pub async fn save_current_as(&self, raw_name: &str) -> Result<String> {
        let name = validate_name(raw_name)?;
        {
            let state = self.state.lock();
            if name == DEFAULT_PRESET {
                return Err(PresetError::DefaultPreset.into());
            }
            if state.contains(&name) {
                return Err(PresetError::NameTaken(name).into());
            }
        }
        self.backend.save_preset(&name).await?;
        {
            let mut state = self.state.lock();
            if !state.contains(&name) {
                state.presets.push(name.clone());
                state.presets.sort();
            }
        }
        info!(preset = %name, "preset saved");
        Ok(name)
    }

    /// Load a preset into the live configuration and make it active.
    #[instrument(skip(self))]
    pub async fn load(&self, name: &str) -> Result<()> {
        self.backend.load_preset(name).await?;
        self.backend.save_config_snapshot().await?;
        self.config.refresh(true).await;
        self.set_active(named_active(Some(name)).map(String::from));
        self.detector.mark_clean();
        Ok(())
    }

    /// Delete one preset.
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<()> {
        {
            let state = self.state.lock();
            check_deletable(&state, name)?;
            if state.presets.len() <= 1 {
                return Err(PresetError::LastPreset.into());
            }
        }
        self.backend.delete_preset(name).await?;
        self.forget(&[name.to_string()]);
        info!(preset = %name, "preset deleted");
        Ok(())
    }

    /// Delete several presets. Refuses when the batch would remove every
    /// preset. Returns how many were deleted.
    #[instrument(skip(self))]
    pub async fn delete_many(&self, names: &[String]) -> Result<usize> {
        let batch: BTreeSet<String> = names.iter().cloned().collect();
        if batch.is_empty() {
            return Ok(0);
        }
        {
            let state = self.state.lock();
            for name in &batch {
                check_deletable(&state, name)?;
            }
            if state.presets.len() <= batch.len() {
                return Err(PresetError::LastPreset.into());
            }
        }

        let mut deleted = Vec::with_capacity(batch.len());
        let mut failure = None;
        for name in batch {
            match self.backend.delete_preset(&name).await {
                Ok(()) => deleted.push(name),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        self.forget(&deleted);
        match failure {
            Some(err) => Err(err.into()),
            None => Ok(deleted.len()),
        }
    }

    /// Delete every selected preset.
    pub async fn delete_selected(&self) -> Result<usize> {
        let selected = self.selected();
        self.delete_many(&selected).await
    }

    /// Rename a preset. Repoints the active pointer and the selection.
    #[instrument(skip(self))]
    pub async fn rename(&self, from: &str, raw_to: &str) -> Result<String> {
        let to = validate_name(raw_to)?;
        {
            let state = self.state.lock();
            if from == DEFAULT_PRESET || to == DEFAULT_PRESET {
                return Err(PresetError::DefaultPreset.into());
            }
            if !state.contains(from) {
                return Err(PresetError::UnknownPreset(from.to_string()).into());
            }
            if to == from {
                return Ok(to);
            }
            if state.contains(&to) {
                return Err(PresetError::NameTaken(to).into());
            }
        }

        self.backend.rename_preset(from, &to).await?;

        let active = {
            let mut state = self.state.lock();
            for preset in &mut state.presets {
                if preset == from {
                    preset.clone_from(&to);
                }
            }
            state.presets.sort();
            if state.selected.remove(from) {
                let _ = state.selected.insert(to.clone());
            }
            let repointed = state.is_active(from);
            if repointed {
                state.active = Some(to.clone());
            }
            repointed
        };
        if active {
            let _ = self.events.emit(SyncEvent::ActivePresetChanged {
                active: Some(to.clone()),
            });
        }
        info!(from, to = %to, "preset renamed");
        Ok(to)
    }

    /// Re-persist the active preset from the live configuration. Returns
    /// false when no named preset is active.
    #[instrument(skip(self))]
    pub async fn sync_active(&self) -> Result<bool> {
        let Some(name) = self.active() else {
            return Ok(false);
        };
        self.backend.update_preset(&name).await?;
        debug!(preset = %name, "active preset re-persisted");
        Ok(true)
    }

    // ── Read-through ────────────────────────────────────────────────

    /// Configuration stored in a preset.
    pub async fn preset_config(&self, name: &str) -> Result<Configuration> {
        Ok(self.backend.preset_config(name).await?)
    }

    /// Metadata of a preset.
    pub async fn preset_meta(&self, name: &str) -> Result<PresetMeta> {
        Ok(self.backend.preset_meta(name).await?)
    }

    /// Builtin preset catalog.
    pub async fn builtin_presets(&self) -> Result<Vec<BuiltinPresetInfo>> {
        Ok(self.backend.builtin_presets().await?)
    }

    /// Apply a builtin preset. Afterwards no named preset is active and the
    /// snapshot matches the applied configuration.
    #[instrument(skip(self))]
    pub async fn apply_builtin(&self, id: &str) -> Result<()> {
        self.backend.apply_builtin_preset(id).await?;
        self.backend.save_config_snapshot().await?;
        self.config.refresh(true).await;
        self.set_active(None);
        self.detector.mark_clean();
        info!(builtin = id, "builtin preset applied");
        Ok(())
    }

    fn forget(&self, names: &[String]) {
        let mut state = self.state.lock();
        state.presets.retain(|p| !names.contains(p));
        for name in names {
            let _ = state.selected.remove(name);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
