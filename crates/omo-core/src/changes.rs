//! Divergence records produced by the backend's compare-with-snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of divergence at one path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Present on disk, absent from the snapshot.
    Added,
    /// Present in the snapshot, absent on disk.
    Removed,
    /// Present in both with different values.
    Modified,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Modified => "modified",
        })
    }
}

/// One divergent leaf between the snapshot and the live file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigChange {
    /// Dotted path, e.g. `agents.sisyphus.model`.
    pub path: String,
    /// Kind of change.
    pub change_type: ChangeType,
    /// Snapshot value (`None` for [`ChangeType::Added`]).
    #[serde(default)]
    pub old_value: Option<Value>,
    /// Live value (`None` for [`ChangeType::Removed`]).
    #[serde(default)]
    pub new_value: Option<Value>,
}

impl ConfigChange {
    /// An entry added on disk.
    pub fn added(path: impl Into<String>, new_value: Value) -> Self {
        Self {
            path: path.into(),
            change_type: ChangeType::Added,
            old_value: None,
            new_value: Some(new_value),
        }
    }

    /// An entry removed on disk.
    pub fn removed(path: impl Into<String>, old_value: Value) -> Self {
        Self {
            path: path.into(),
            change_type: ChangeType::Removed,
            old_value: Some(old_value),
            new_value: None,
        }
    }

    /// An entry whose value changed on disk.
    pub fn modified(path: impl Into<String>, old_value: Value, new_value: Value) -> Self {
        Self {
            path: path.into(),
            change_type: ChangeType::Modified,
            old_value: Some(old_value),
            new_value: Some(new_value),
        }
    }

    /// First path segment (`agents`, `categories`, ...).
    pub fn section(&self) -> &str {
        self.path.split('.').next().unwrap_or_default()
    }
}

impl fmt::Display for ConfigChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<Value>| v.as_ref().map_or_else(|| "-".to_string(), Value::to_string);
        write!(
            f,
            "{:<8} {} ({} -> {})",
            self.change_type,
            self.path,
            show(&self.old_value),
            show(&self.new_value)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shape_is_snake_case() {
        let change = ConfigChange::modified("agents.a.model", json!("x"), json!("y"));
        assert_eq!(
            serde_json::to_value(&change).unwrap(),
            json!({
                "path": "agents.a.model",
                "change_type": "modified",
                "old_value": "x",
                "new_value": "y"
            })
        );
    }

    #[test]
    fn decodes_backend_added_entry() {
        let change: ConfigChange = serde_json::from_value(json!({
            "path": "categories.quick",
            "change_type": "added",
            "old_value": null,
            "new_value": {"model": "m"}
        }))
        .unwrap();
        assert_eq!(change.change_type, ChangeType::Added);
        assert!(change.old_value.is_none());
        assert_eq!(change.section(), "categories");
    }

    #[test]
    fn display_marks_missing_sides() {
        let change = ConfigChange::removed("agents.a", json!({"model": "m"}));
        let text = change.to_string();
        assert!(text.starts_with("removed"));
        assert!(text.ends_with("-> -)"));
    }
}
