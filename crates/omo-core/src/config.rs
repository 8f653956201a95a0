//! Agent/category model assignments.
//!
//! A [`Configuration`] holds two maps keyed by name: `agents` and
//! `categories`. Every other top-level field of the backend document is kept
//! verbatim in [`Configuration::extra`] so a round trip never drops data.
//!
//! ## Variant normalization
//!
//! `variant = none` is never stored. Omission and `none` are the same value,
//! and both deserialization and [`Configuration::apply_update`] collapse
//! `none` to an absent field exactly as the backend does before persisting.
//! If the cache normalized differently, the next compare-with-snapshot would
//! report a divergence that does not exist on disk.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::errors::{CoreError, Result};

/// Reasoning-effort variant attached to a model assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Maximum effort.
    Max,
    /// High effort.
    High,
    /// Medium effort.
    Medium,
    /// Low effort.
    Low,
    /// No variant. Never persisted.
    None,
}

impl Variant {
    /// Wire string for this variant.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Max => "max",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::None => "none",
        }
    }

    /// Collapse `none` to `Option::None`.
    pub fn normalized(self) -> Option<Self> {
        (self != Self::None).then_some(self)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "max" => Ok(Self::Max),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            "none" => Ok(Self::None),
            other => Err(CoreError::UnknownVariant(other.to_string())),
        }
    }
}

fn deserialize_variant<'de, D>(deserializer: D) -> std::result::Result<Option<Variant>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Variant>::deserialize(deserializer)?;
    Ok(raw.and_then(Variant::normalized))
}

/// Model assigned to one agent or category.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentAssignment {
    /// Model identifier, usually `provider/model`.
    pub model: String,
    /// Optional variant. `None` covers both "absent" and `none`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_variant"
    )]
    pub variant: Option<Variant>,
    /// Fields this engine does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentAssignment {
    /// Assignment with a model and an already-normalized variant.
    pub fn new(model: impl Into<String>, variant: Option<Variant>) -> Self {
        Self {
            model: model.into(),
            variant: variant.and_then(Variant::normalized),
            extra: Map::new(),
        }
    }

    /// Apply a model change the way the backend does.
    ///
    /// `model` is always overwritten. `Some(Variant::None)` removes the
    /// variant, `Some(v)` sets it, and `None` leaves it untouched.
    pub fn apply(&mut self, model: &str, variant: Option<Variant>) {
        model.clone_into(&mut self.model);
        if let Some(v) = variant {
            self.variant = v.normalized();
        }
    }
}

/// One requested assignment change, addressed by agent or category name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentUpdate {
    /// Agent or category name.
    pub agent_name: String,
    /// New model identifier.
    pub model: String,
    /// Requested variant; absent keeps the current one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
}

impl AssignmentUpdate {
    /// Build an update.
    pub fn new(agent_name: impl Into<String>, model: impl Into<String>, variant: Option<Variant>) -> Self {
        Self {
            agent_name: agent_name.into(),
            model: model.into(),
            variant,
        }
    }
}

/// Full agent/category configuration as owned by the backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Per-agent assignments.
    #[serde(default)]
    pub agents: BTreeMap<String, AgentAssignment>,
    /// Per-category assignments.
    #[serde(default)]
    pub categories: BTreeMap<String, AgentAssignment>,
    /// Top-level fields this engine does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Configuration {
    /// Decode a backend document, checking its shape first.
    pub fn from_value(value: Value) -> Result<Self> {
        validate_document(&value)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Encode as the backend document shape.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Look up an assignment by name, agents first.
    pub fn assignment(&self, name: &str) -> Option<&AgentAssignment> {
        self.agents.get(name).or_else(|| self.categories.get(name))
    }

    /// Apply one update to every map that already contains the name.
    ///
    /// Names present in neither map are ignored. Returns whether any entry
    /// was touched.
    pub fn apply_update(&mut self, update: &AssignmentUpdate) -> bool {
        let mut touched = false;
        for map in [&mut self.agents, &mut self.categories] {
            if let Some(entry) = map.get_mut(&update.agent_name) {
                entry.apply(&update.model, update.variant);
                touched = true;
            }
        }
        touched
    }

    /// Apply a batch in order. Returns how many updates touched an entry.
    pub fn apply_updates(&mut self, updates: &[AssignmentUpdate]) -> usize {
        updates.iter().filter(|u| self.apply_update(u)).count()
    }

    /// Total number of agent and category entries.
    pub fn len(&self) -> usize {
        self.agents.len() + self.categories.len()
    }

    /// Whether both maps are empty.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty() && self.categories.is_empty()
    }
}

/// Check the backend's structural rules: a root object with `agents` and
/// `categories` objects.
pub fn validate_document(value: &Value) -> Result<()> {
    let Some(obj) = value.as_object() else {
        return Err(CoreError::InvalidConfig("root must be an object".into()));
    };
    for key in ["agents", "categories"] {
        match obj.get(key) {
            None => return Err(CoreError::InvalidConfig(format!("missing '{key}'"))),
            Some(v) if !v.is_object() => {
                return Err(CoreError::InvalidConfig(format!("'{key}' must be an object")));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
