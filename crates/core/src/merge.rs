//! Merge strategies, conflict detection between two branch tips, and merged
//! payload resolution.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::ContentPayload;
use crate::diff::diff_map;
use crate::error::CoreError;
use crate::patch::{conflicting_ranges, diff_content};
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// Fields a caller supplies when resolving conflicts by hand. Anything left
/// as `None` falls back to the target branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualResolution {
    pub content: Option<String>,
    pub front_matter: Option<Value>,
    pub metadata: Option<Value>,
}

/// How conflicting merges are settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum MergeStrategy {
    UseSource,
    UseTarget,
    Manual(ManualResolution),
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UseSource => "use_source",
            Self::UseTarget => "use_target",
            Self::Manual(_) => "manual",
        }
    }

    /// Build a strategy from a loosely-typed request (strategy name plus an
    /// optional manual resolution).
    pub fn from_parts(name: &str, resolution: Option<ManualResolution>) -> Result<Self, CoreError> {
        match name {
            "use_source" | "useSource" => Ok(Self::UseSource),
            "use_target" | "useTarget" => Ok(Self::UseTarget),
            "manual" => Ok(Self::Manual(resolution.unwrap_or_default())),
            other => Err(CoreError::Validation(format!(
                "Unsupported merge strategy '{other}'. Must be one of: use_source, use_target, manual"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Conflicts
// ---------------------------------------------------------------------------

/// A single place where source and target diverged from the merge base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum MergeConflict {
    /// Base lines `[start_line, end_line)` (1-based start) changed on both sides.
    Content { start_line: usize, end_line: usize },
    FrontMatter { key: String },
    Metadata { key: String },
}

/// Structured record persisted on a merge version when conflicts occurred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub strategy: MergeStrategy,
    pub conflicts: Vec<MergeConflict>,
    pub resolved_by: String,
    pub resolved_at: Timestamp,
}

/// Compare source and target against their common base.
///
/// Content conflicts come from overlapping hunks; map conflicts are keys that
/// both sides touched and left with different values.
pub fn find_conflicts(
    base: &ContentPayload,
    source: &ContentPayload,
    target: &ContentPayload,
) -> Vec<MergeConflict> {
    let source_patch = diff_content(&base.content, &source.content);
    let target_patch = diff_content(&base.content, &target.content);

    let mut conflicts: Vec<MergeConflict> = conflicting_ranges(&source_patch, &target_patch)
        .into_iter()
        .map(|range| MergeConflict::Content {
            start_line: range.start + 1,
            end_line: range.end + 1,
        })
        .collect();

    conflicts.extend(
        conflicting_keys(&base.front_matter, &source.front_matter, &target.front_matter)
            .into_iter()
            .map(|key| MergeConflict::FrontMatter { key }),
    );
    conflicts.extend(
        conflicting_keys(&base.metadata, &source.metadata, &target.metadata)
            .into_iter()
            .map(|key| MergeConflict::Metadata { key }),
    );
    conflicts
}

fn conflicting_keys(base: &Value, source: &Value, target: &Value) -> Vec<String> {
    let ours = diff_map(base, source);
    let theirs = diff_map(base, target);
    ours.touched_keys()
        .into_iter()
        .filter(|key| match theirs.new_value_of(key) {
            Some(their_value) => ours.new_value_of(key) != Some(their_value),
            None => false,
        })
        .map(str::to_string)
        .collect()
}

/// Payload written to the target branch once conflicts (if any) are settled.
pub fn resolve_payload(
    strategy: &MergeStrategy,
    source: &ContentPayload,
    target: &ContentPayload,
) -> ContentPayload {
    match strategy {
        MergeStrategy::UseSource => source.clone(),
        MergeStrategy::UseTarget => target.clone(),
        MergeStrategy::Manual(resolution) => ContentPayload {
            title: target.title.clone(),
            slug: target.slug.clone(),
            content: resolution
                .content
                .clone()
                .unwrap_or_else(|| target.content.clone()),
            front_matter: resolution
                .front_matter
                .clone()
                .unwrap_or_else(|| target.front_matter.clone()),
            metadata: resolution
                .metadata
                .clone()
                .unwrap_or_else(|| target.metadata.clone()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(content: &str, front_matter: Value) -> ContentPayload {
        ContentPayload {
            title: format!("title {content}"),
            slug: "slug".to_string(),
            content: content.to_string(),
            front_matter,
            metadata: json!({}),
        }
    }

    // -- strategy parsing ------------------------------------------------------

    #[test]
    fn from_parts_accepts_known_names() {
        assert_eq!(MergeStrategy::from_parts("use_source", None).unwrap(), MergeStrategy::UseSource);
        assert_eq!(MergeStrategy::from_parts("useTarget", None).unwrap(), MergeStrategy::UseTarget);
        assert_eq!(
            MergeStrategy::from_parts("manual", None).unwrap(),
            MergeStrategy::Manual(ManualResolution::default())
        );
    }

    #[test]
    fn from_parts_rejects_unknown() {
        let err = MergeStrategy::from_parts("octopus", None).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn strategy_serializes_with_tag() {
        let json = serde_json::to_value(MergeStrategy::UseTarget).unwrap();
        assert_eq!(json, json!({"strategy": "use_target"}));
        let manual = MergeStrategy::Manual(ManualResolution {
            content: Some("x".into()),
            ..Default::default()
        });
        let back: MergeStrategy =
            serde_json::from_value(serde_json::to_value(&manual).unwrap()).unwrap();
        assert_eq!(back, manual);
    }

    // -- find_conflicts --------------------------------------------------------

    #[test]
    fn overlapping_content_edits_conflict() {
        let base = payload("Hello", json!({}));
        let source = payload("Hello there", json!({}));
        let target = payload("Hello world", json!({}));
        assert_eq!(
            find_conflicts(&base, &source, &target),
            vec![MergeConflict::Content {
                start_line: 1,
                end_line: 2
            }]
        );
    }

    #[test]
    fn one_sided_edits_do_not_conflict() {
        let base = payload("a\nb\n", json!({"tags": ["x"]}));
        let source = payload("a\nB\n", json!({"tags": ["x", "y"]}));
        let target = base.clone();
        assert!(find_conflicts(&base, &source, &target).is_empty());
    }

    #[test]
    fn same_key_changed_differently_conflicts() {
        let base = payload("same", json!({"draft": true, "order": 1}));
        let source = payload("same", json!({"draft": false, "order": 2}));
        let target = payload("same", json!({"draft": false, "order": 3}));
        assert_eq!(
            find_conflicts(&base, &source, &target),
            vec![MergeConflict::FrontMatter {
                key: "order".to_string()
            }]
        );
    }

    #[test]
    fn removed_versus_changed_key_conflicts() {
        let base = payload("same", json!({"hero": "a.png"}));
        let source = payload("same", json!({}));
        let target = payload("same", json!({"hero": "b.png"}));
        assert_eq!(find_conflicts(&base, &source, &target).len(), 1);
    }

    // -- resolve_payload -------------------------------------------------------

    #[test]
    fn use_source_and_use_target_copy_verbatim() {
        let source = payload("src", json!({"a": 1}));
        let target = payload("tgt", json!({"a": 2}));
        assert_eq!(resolve_payload(&MergeStrategy::UseSource, &source, &target), source);
        assert_eq!(resolve_payload(&MergeStrategy::UseTarget, &source, &target), target);
    }

    #[test]
    fn manual_overrides_fieldwise_and_falls_back_to_target() {
        let source = payload("src", json!({"a": 1}));
        let target = payload("tgt", json!({"a": 2}));
        let strategy = MergeStrategy::Manual(ManualResolution {
            content: Some("hand-merged".to_string()),
            front_matter: None,
            metadata: Some(json!({"merged": true})),
        });
        let merged = resolve_payload(&strategy, &source, &target);
        assert_eq!(merged.content, "hand-merged");
        assert_eq!(merged.front_matter, json!({"a": 2}));
        assert_eq!(merged.metadata, json!({"merged": true}));
        assert_eq!(merged.title, target.title);
    }
}
