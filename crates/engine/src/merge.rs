//! Branch merging and version comparison.

use serde::{Deserialize, Serialize};
use serde_json::json;
use verso_core::branching::validate_branch_name;
use verso_core::content::{Author, ChangeType, ContentPayload};
use verso_core::diff::{diff_map, MapDiff};
use verso_core::error::CoreError;
use verso_core::merge::{find_conflicts, resolve_payload, ConflictRecord, MergeConflict, MergeStrategy};
use verso_core::patch::{diff_content, PatchSummary};
use verso_core::types::DbId;
use verso_db::models::ContentVersion;

use crate::error::EngineResult;
use crate::locks::LockKey;
use crate::service::VersioningService;
use crate::versions::{CreateVersion, Lineage};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MergeOptions {
    /// Applied only when conflicts are found. Without one, a conflicting
    /// merge persists nothing.
    pub strategy: Option<MergeStrategy>,
    pub change_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    /// The new target version, or `None` if conflicts were left unresolved.
    pub version: Option<ContentVersion>,
    pub conflicts: Vec<MergeConflict>,
    pub resolved: bool,
}

/// Comparison between two arbitrary versions.
#[derive(Debug, Clone, Serialize)]
pub struct VersionDiff {
    pub from_id: DbId,
    pub to_id: DbId,
    /// Unified patch turning `from` content into `to` content.
    pub content_patch: String,
    pub summary: PatchSummary,
    pub front_matter: MapDiff,
    pub metadata: MapDiff,
}

fn empty_payload() -> ContentPayload {
    ContentPayload {
        title: String::new(),
        slug: String::new(),
        content: String::new(),
        front_matter: json!({}),
        metadata: json!({}),
    }
}

impl VersioningService {
    /// Merge the tip of `source_branch` into `target_branch`.
    ///
    /// Without conflicts the source payload is taken as-is. With conflicts the
    /// strategy in `options` decides the payload and a [`ConflictRecord`] is
    /// stored on the new version.
    pub async fn merge_branches(
        &self,
        source_branch: &str,
        target_branch: &str,
        content_id: DbId,
        author: Author,
        options: MergeOptions,
    ) -> EngineResult<MergeOutcome> {
        validate_branch_name(source_branch)?;
        validate_branch_name(target_branch)?;
        if source_branch == target_branch {
            return Err(CoreError::Validation(format!(
                "Cannot merge branch '{source_branch}' into itself"
            ))
            .into());
        }

        let _guard = self
            .locks
            .lock(LockKey::branch(content_id, target_branch))
            .await;

        let source = self.branch_tip(content_id, source_branch).await?;
        let target = self.branch_tip(content_id, target_branch).await?;
        let base = self.merge_base(&source, &target).await?;

        let source_payload = source.payload();
        let target_payload = target.payload();
        let conflicts = find_conflicts(&base, &source_payload, &target_payload);

        let (payload, conflict_resolution) = if conflicts.is_empty() {
            (source_payload, None)
        } else {
            let Some(strategy) = options.strategy else {
                tracing::warn!(
                    content_id = %content_id,
                    source_branch,
                    target_branch,
                    conflicts = conflicts.len(),
                    "Merge has unresolved conflicts"
                );
                return Ok(MergeOutcome {
                    version: None,
                    conflicts,
                    resolved: false,
                });
            };
            let payload = resolve_payload(&strategy, &source_payload, &target_payload);
            let record = ConflictRecord {
                strategy,
                conflicts: conflicts.clone(),
                resolved_by: author.id.clone(),
                resolved_at: self.now(),
            };
            let record = serde_json::to_value(&record)
                .map_err(|e| CoreError::Internal(format!("Failed to encode conflict record: {e}")))?;
            (payload, Some(record))
        };
        payload.validate()?;

        let change_message = options.change_message.unwrap_or_else(|| {
            format!("Merged {source_branch} v{} into {target_branch}", source.version)
        });
        let input = CreateVersion {
            content_id,
            content_type: target.content_type,
            branch: Some(target_branch.to_string()),
            payload,
            author,
            change_type: Some(ChangeType::Update),
            change_message: Some(change_message),
        };
        let lineage = Lineage {
            merged_from_id: Some(source.id),
            conflict_resolution,
            ..Default::default()
        };
        let merged = self.append_version(input, target_branch, lineage).await?;

        tracing::info!(
            content_id = %content_id,
            source_branch,
            target_branch,
            version = merged.version,
            conflicts = conflicts.len(),
            "Merged branches"
        );
        Ok(MergeOutcome {
            version: Some(merged),
            conflicts,
            resolved: true,
        })
    }

    /// Compare two versions, which need not be adjacent or on one branch.
    pub async fn get_diff(&self, from_id: DbId, to_id: DbId) -> EngineResult<VersionDiff> {
        let from = self.load(from_id).await?;
        let to = self.load(to_id).await?;
        let patch = diff_content(&from.content, &to.content);
        Ok(VersionDiff {
            from_id,
            to_id,
            summary: patch.summary(),
            content_patch: patch.to_string(),
            front_matter: diff_map(&from.front_matter, &to.front_matter),
            metadata: diff_map(&from.metadata, &to.metadata),
        })
    }

    async fn branch_tip(&self, content_id: DbId, branch: &str) -> EngineResult<ContentVersion> {
        self.store
            .find_latest(content_id, branch, false)
            .await?
            .ok_or_else(|| CoreError::not_found("Branch", format!("{content_id}/{branch}")).into())
    }

    /// The most recent shared state of the two branches.
    ///
    /// Candidates are the versions recorded by earlier merges in either
    /// direction (the newest wins), then the source branch's fork point, then
    /// the target branch's fork point if it was forked from the source.
    /// Unrelated branches compare against an empty document.
    async fn merge_base(
        &self,
        source: &ContentVersion,
        target: &ContentVersion,
    ) -> EngineResult<ContentPayload> {
        let content_id = source.content_id;
        let merged_in = self
            .store
            .find_last_merged_source(content_id, &target.branch_name, &source.branch_name)
            .await?;
        let merged_back = self
            .store
            .find_last_merged_source(content_id, &source.branch_name, &target.branch_name)
            .await?;
        let latest_merge = [merged_in, merged_back]
            .into_iter()
            .flatten()
            .max_by_key(|v| (v.created_at, v.id));
        if let Some(base) = latest_merge {
            return Ok(base.payload());
        }

        if let Some(fork) = self.fork_point(content_id, &source.branch_name).await? {
            return Ok(fork.payload());
        }
        if let Some(fork) = self.fork_point(content_id, &target.branch_name).await? {
            let origin = match fork.branched_from_id {
                Some(id) => self.store.find_by_id(id).await?,
                None => None,
            };
            if origin.is_some_and(|o| o.branch_name == source.branch_name) {
                return Ok(fork.payload());
            }
        }
        Ok(empty_payload())
    }

    /// Version 1 of a forked branch. It copies the version the branch was
    /// created from verbatim, so its payload is the fork point.
    async fn fork_point(
        &self,
        content_id: DbId,
        branch: &str,
    ) -> EngineResult<Option<ContentVersion>> {
        let first = self.store.find_by_number(content_id, branch, 1).await?;
        Ok(first.filter(|v| v.branched_from_id.is_some()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use verso_core::clock::FixedClock;
    use verso_core::content::ContentType;
    use verso_core::merge::ManualResolution;
    use verso_core::types::new_id;
    use verso_db::MemoryVersionStore;

    use super::*;
    use crate::error::ErrorKind;

    fn service() -> VersioningService {
        VersioningService::new(
            Arc::new(MemoryVersionStore::new()),
            Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap())),
        )
    }

    fn author() -> Author {
        Author::new("u1", "Ada", "ada@example.com")
    }

    fn edit(content_id: DbId, branch: &str, content: &str, front_matter: serde_json::Value) -> CreateVersion {
        CreateVersion {
            content_id,
            content_type: ContentType::Post,
            branch: Some(branch.to_string()),
            payload: ContentPayload {
                title: "Post".to_string(),
                slug: "post".to_string(),
                content: content.to_string(),
                front_matter,
                metadata: json!({}),
            },
            author: author(),
            change_type: None,
            change_message: None,
        }
    }

    /// main v1 -> draft v1, then one edit on each branch.
    async fn diverged(
        svc: &VersioningService,
        main_content: &str,
        draft_content: &str,
    ) -> DbId {
        let content_id = new_id();
        let v1 = svc
            .create_version(edit(content_id, "main", "a\nb\nc\n", json!({"order": 1})))
            .await
            .unwrap();
        svc.create_branch(v1.id, "draft", author()).await.unwrap();
        svc.create_version(edit(content_id, "main", main_content, json!({"order": 1})))
            .await
            .unwrap();
        svc.create_version(edit(content_id, "draft", draft_content, json!({"order": 1})))
            .await
            .unwrap();
        content_id
    }

    // -- merge_branches -----------------------------------------------------------

    #[tokio::test]
    async fn disjoint_edits_merge_cleanly_with_source_payload() {
        let svc = service();
        let content_id = diverged(&svc, "A\nb\nc\n", "a\nb\nC\n").await;

        let outcome = svc
            .merge_branches("draft", "main", content_id, author(), MergeOptions::default())
            .await
            .unwrap();
        assert!(outcome.resolved);
        assert!(outcome.conflicts.is_empty());
        let merged = outcome.version.unwrap();
        assert_eq!(merged.version, 3);
        assert_eq!(merged.content, "a\nb\nC\n");
        assert!(merged.conflict_resolution.is_none());
        assert_eq!(merged.change_message.as_deref(), Some("Merged draft v2 into main"));
    }

    #[tokio::test]
    async fn conflicting_merge_without_strategy_persists_nothing() {
        let svc = service();
        let content_id = diverged(&svc, "a\nX\nc\n", "a\nY\nc\n").await;

        let outcome = svc
            .merge_branches("draft", "main", content_id, author(), MergeOptions::default())
            .await
            .unwrap();
        assert!(!outcome.resolved);
        assert!(outcome.version.is_none());
        assert_eq!(
            outcome.conflicts,
            vec![MergeConflict::Content {
                start_line: 2,
                end_line: 3
            }]
        );
        let tip = svc.branch_tip(content_id, "main").await.unwrap();
        assert_eq!(tip.version, 2);
    }

    #[tokio::test]
    async fn manual_strategy_records_resolution() {
        let svc = service();
        let content_id = diverged(&svc, "a\nX\nc\n", "a\nY\nc\n").await;
        let options = MergeOptions {
            strategy: Some(MergeStrategy::Manual(ManualResolution {
                content: Some("a\nXY\nc\n".to_string()),
                ..Default::default()
            })),
            change_message: Some("hand merge".to_string()),
        };

        let outcome = svc
            .merge_branches("draft", "main", content_id, author(), options)
            .await
            .unwrap();
        let merged = outcome.version.unwrap();
        assert_eq!(merged.content, "a\nXY\nc\n");
        let record: ConflictRecord =
            serde_json::from_value(merged.conflict_resolution.unwrap()).unwrap();
        assert_eq!(record.resolved_by, "u1");
        assert_eq!(record.conflicts, outcome.conflicts);
        assert_eq!(record.strategy.as_str(), "manual");
    }

    #[tokio::test]
    async fn second_merge_uses_previous_merge_as_base() {
        let svc = service();
        let content_id = diverged(&svc, "a\nX\nc\n", "a\nY\nc\n").await;
        let options = MergeOptions {
            strategy: Some(MergeStrategy::UseSource),
            change_message: None,
        };
        svc.merge_branches("draft", "main", content_id, author(), options)
            .await
            .unwrap();

        // Only draft moves after the first merge, so the second merge is clean.
        svc.create_version(edit(content_id, "draft", "a\nY\nc\nd\n", json!({"order": 1})))
            .await
            .unwrap();
        let outcome = svc
            .merge_branches("draft", "main", content_id, author(), MergeOptions::default())
            .await
            .unwrap();
        assert!(outcome.resolved);
        assert_eq!(outcome.version.unwrap().content, "a\nY\nc\nd\n");
    }

    #[tokio::test]
    async fn self_merge_and_missing_branch_are_rejected() {
        let svc = service();
        let content_id = diverged(&svc, "A\nb\nc\n", "a\nb\nC\n").await;

        let err = svc
            .merge_branches("main", "main", content_id, author(), MergeOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = svc
            .merge_branches("ghost", "main", content_id, author(), MergeOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    // -- get_diff -------------------------------------------------------------------

    #[tokio::test]
    async fn diff_between_branches() {
        let svc = service();
        let content_id = new_id();
        let a = svc
            .create_version(edit(content_id, "main", "one\n", json!({"a": 1})))
            .await
            .unwrap();
        let b = svc
            .create_version(edit(content_id, "main", "one\ntwo\n", json!({"a": 2, "b": true})))
            .await
            .unwrap();

        let diff = svc.get_diff(a.id, b.id).await.unwrap();
        assert_eq!(diff.summary.lines_added, 1);
        assert_eq!(diff.summary.lines_removed, 0);
        assert_eq!(diff.front_matter.added.len(), 1);
        assert_eq!(diff.front_matter.changed.len(), 1);
        assert!(diff.metadata.is_empty());
        assert_eq!(diff.content_patch, b.diff.unwrap());
    }
}
