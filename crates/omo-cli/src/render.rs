//! Plain-text rendering for terminal output.

use std::fmt::Write as _;

use omo_core::{
    AgentAssignment, BuiltinPresetInfo, ConfigChange, Configuration, PresetMeta,
    ProviderModelCatalog, VersionInfo,
};
use omo_sync::{CheckOutcome, PreloadReport, PresetState};
use serde::Serialize;

/// Summary printed by `status`.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct Status {
    pub preload_failed: Vec<&'static str>,
    pub active_preset: Option<String>,
    pub changes: usize,
    pub check_error: Option<String>,
}

impl Status {
    pub fn new(report: &PreloadReport, active_preset: Option<String>, outcome: &CheckOutcome) -> Self {
        let (changes, check_error) = match outcome {
            CheckOutcome::Clean => (0, None),
            CheckOutcome::Diverged(n) => (*n, None),
            CheckOutcome::Failed(err) => (0, Some(err.clone())),
        };
        Self {
            preload_failed: report.failed(),
            active_preset,
            changes,
            check_error,
        }
    }
}

fn assignment(out: &mut String, section: &str, name: &str, a: &AgentAssignment) {
    let _ = match a.variant {
        Some(variant) => writeln!(out, "{section}.{name:<20} {} ({variant})", a.model),
        None => writeln!(out, "{section}.{name:<20} {}", a.model),
    };
}

pub fn configuration(config: &Configuration) -> String {
    let mut out = String::new();
    for (name, a) in &config.agents {
        assignment(&mut out, "agents", name, a);
    }
    for (name, a) in &config.categories {
        assignment(&mut out, "categories", name, a);
    }
    out
}

pub fn changes(changes: &[ConfigChange]) -> String {
    if changes.is_empty() {
        return "no changes outside omo-switch\n".to_string();
    }
    let mut out = format!("{} change(s) outside omo-switch:\n", changes.len());
    for change in changes {
        let _ = writeln!(out, "  {change}");
    }
    out
}

pub fn preload(report: &PreloadReport) -> String {
    let mut out = String::new();
    for (name, result) in [
        ("configuration", &report.configuration),
        ("catalog", &report.catalog),
        ("versions", &report.versions),
    ] {
        let _ = match result {
            Ok(()) => writeln!(out, "{name:<14} ok"),
            Err(err) => writeln!(out, "{name:<14} failed: {err}"),
        };
    }
    out
}

pub fn status(status: &Status) -> String {
    let mut out = format!(
        "active preset: {}\n",
        status.active_preset.as_deref().unwrap_or("default")
    );
    let _ = match (&status.check_error, status.changes) {
        (Some(err), _) => writeln!(out, "could not check for changes: {err}"),
        (None, 0) => writeln!(out, "in sync with snapshot"),
        (None, n) => writeln!(out, "{n} change(s) outside omo-switch"),
    };
    out
}

pub fn presets(state: &PresetState) -> String {
    let mut out = String::new();
    let default_marker = if state.active.is_none() { '*' } else { ' ' };
    let _ = writeln!(out, "{default_marker} default");
    for name in &state.presets {
        let marker = if state.active.as_deref() == Some(name) { '*' } else { ' ' };
        let _ = writeln!(out, "{marker} {name}");
    }
    out
}

pub fn builtin(presets: &[BuiltinPresetInfo]) -> String {
    let mut out = String::new();
    for p in presets {
        let _ = writeln!(out, "{:<18} {:<18} {}", p.id, p.name, p.description);
    }
    out
}

pub fn meta(meta: &PresetMeta) -> String {
    let stamp = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map_or_else(|| "-".to_string(), |t| t.to_rfc3339())
    };
    format!(
        "created {}\nupdated {}\nversion {}\n",
        stamp(meta.created()),
        stamp(meta.updated()),
        meta.version
    )
}

pub fn catalog(catalog: &ProviderModelCatalog, provider: Option<&str>) -> String {
    let mut out = String::new();
    let providers: Vec<&str> = match provider {
        Some(p) => vec![p],
        None => catalog.providers(),
    };
    for p in providers {
        let status = if catalog.is_connected(p) { "connected" } else { "not connected" };
        let _ = writeln!(out, "{p} ({status})");
        for model in catalog.models_for(p) {
            let tag = if catalog.is_custom(p, &model) { " [custom]" } else { "" };
            let _ = writeln!(out, "  {model}{tag}");
        }
    }
    out
}

pub fn versions(versions: &[VersionInfo]) -> String {
    let mut out = String::new();
    for v in versions {
        if !v.installed {
            let _ = writeln!(out, "{:<20} not installed", v.name);
            continue;
        }
        let current = v.current_version.as_deref().unwrap_or("?");
        let _ = if v.has_update {
            let latest = v.latest_version.as_deref().unwrap_or("?");
            writeln!(out, "{:<20} {current} -> {latest}  ({})", v.name, v.update_command)
        } else {
            writeln!(out, "{:<20} {current}", v.name)
        };
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
