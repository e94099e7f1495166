//! Key-by-key structural diff for front-matter and metadata maps.
//!
//! Line-level diffs of the content body live in [`crate::patch`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The status of an item in a diff comparison.
///
/// - `Added`     -- present only in the new side.
/// - `Removed`   -- present only in the old side.
/// - `Changed`   -- present in both sides but with different values.
/// - `Unchanged` -- present in both sides with identical values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Added,
    Removed,
    Changed,
    Unchanged,
}

impl DiffStatus {
    /// String representation for display and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Changed => "changed",
            Self::Unchanged => "unchanged",
        }
    }
}

impl std::fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Map diff
// ---------------------------------------------------------------------------

/// A single key that differs between two maps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub status: DiffStatus,
}

/// Structural comparison of two maps. Unchanged keys are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MapDiff {
    pub added: Vec<FieldDiff>,
    pub removed: Vec<FieldDiff>,
    pub changed: Vec<FieldDiff>,
}

impl MapDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Every key that differs, sorted.
    pub fn touched_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .added
            .iter()
            .chain(&self.removed)
            .chain(&self.changed)
            .map(|d| d.key.as_str())
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Value on the new side for a touched key. `Some(None)` means the key
    /// was removed; `None` means the key was not touched at all.
    pub fn new_value_of(&self, key: &str) -> Option<Option<&Value>> {
        self.added
            .iter()
            .chain(&self.removed)
            .chain(&self.changed)
            .find(|d| d.key == key)
            .map(|d| d.new_value.as_ref())
    }
}

/// Compare two maps key-by-key.
///
/// Both values are expected to be JSON objects. Non-object inputs are
/// treated as empty objects. Each list in the result is sorted by key.
pub fn diff_map(old: &Value, new: &Value) -> MapDiff {
    let empty = serde_json::Map::new();
    let old_obj = old.as_object().unwrap_or(&empty);
    let new_obj = new.as_object().unwrap_or(&empty);

    let mut keys: Vec<&String> = old_obj.keys().chain(new_obj.keys()).collect();
    keys.sort();
    keys.dedup();

    let mut diff = MapDiff::default();
    for key in keys {
        let entry = match (old_obj.get(key), new_obj.get(key)) {
            (Some(a), Some(b)) if a == b => continue,
            (Some(a), Some(b)) => FieldDiff {
                key: key.clone(),
                old_value: Some(a.clone()),
                new_value: Some(b.clone()),
                status: DiffStatus::Changed,
            },
            (Some(a), None) => FieldDiff {
                key: key.clone(),
                old_value: Some(a.clone()),
                new_value: None,
                status: DiffStatus::Removed,
            },
            (None, Some(b)) => FieldDiff {
                key: key.clone(),
                old_value: None,
                new_value: Some(b.clone()),
                status: DiffStatus::Added,
            },
            (None, None) => unreachable!("key must exist in at least one map"),
        };
        match entry.status {
            DiffStatus::Added => diff.added.push(entry),
            DiffStatus::Removed => diff.removed.push(entry),
            _ => diff.changed.push(entry),
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_matches_as_str() {
        assert_eq!(format!("{}", DiffStatus::Added), "added");
        assert_eq!(format!("{}", DiffStatus::Changed), "changed");
    }

    #[test]
    fn identical_maps_produce_empty_diff() {
        let a = json!({"title": "x", "tags": ["a", "b"]});
        assert!(diff_map(&a, &a.clone()).is_empty());
    }

    #[test]
    fn changed_value() {
        let diff = diff_map(&json!({"draft": true}), &json!({"draft": false}));
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].key, "draft");
        assert_eq!(diff.changed[0].old_value, Some(json!(true)));
        assert_eq!(diff.changed[0].new_value, Some(json!(false)));
        assert!(diff.added.is_empty() && diff.removed.is_empty());
    }

    #[test]
    fn added_and_removed_keys() {
        let diff = diff_map(&json!({"old": 1}), &json!({"new": 2}));
        assert_eq!(diff.added[0].key, "new");
        assert_eq!(diff.added[0].status, DiffStatus::Added);
        assert_eq!(diff.removed[0].key, "old");
        assert!(diff.removed[0].new_value.is_none());
    }

    #[test]
    fn non_object_treated_as_empty() {
        let diff = diff_map(&json!("not-an-object"), &json!({"key": "value"}));
        assert_eq!(diff.added.len(), 1);
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn touched_keys_sorted_across_lists() {
        let diff = diff_map(
            &json!({"z": 1, "m": 1, "same": 0}),
            &json!({"m": 2, "a": 1, "same": 0}),
        );
        assert_eq!(diff.touched_keys(), vec!["a", "m", "z"]);
    }

    #[test]
    fn new_value_of_distinguishes_removed_and_untouched() {
        let diff = diff_map(&json!({"gone": 1, "kept": 1}), &json!({"kept": 1}));
        assert_eq!(diff.new_value_of("gone"), Some(None));
        assert_eq!(diff.new_value_of("kept"), None);
    }
}
