//! Version creation, lookups, history and soft deletion.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use verso_core::branching::{validate_branch_name, DEFAULT_BRANCH};
use verso_core::content::{Author, ChangeType, ContentPayload, ContentType};
use verso_core::diff::diff_map;
use verso_core::error::CoreError;
use verso_core::patch::diff_content;
use verso_core::types::{new_id, DbId};
use verso_db::models::{ContentVersion, HistoryQuery, NewContentVersion};

use crate::error::EngineResult;
use crate::locks::LockKey;
use crate::service::VersioningService;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_HISTORY_LIMIT: i64 = 20;

/// Upper bound on a single history page.
pub const MAX_HISTORY_LIMIT: i64 = 100;

// ---------------------------------------------------------------------------
// Inputs & results
// ---------------------------------------------------------------------------

/// Request to append a version to a branch.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateVersion {
    pub content_id: DbId,
    pub content_type: ContentType,
    /// Defaults to `main`.
    pub branch: Option<String>,
    pub payload: ContentPayload,
    pub author: Author,
    /// Defaults to `create` for a branch's first version, `update` otherwise.
    pub change_type: Option<ChangeType>,
    pub change_message: Option<String>,
}

/// Lineage fields only the branch and merge paths set.
#[derive(Debug, Clone, Default)]
pub(crate) struct Lineage {
    pub merged_from_id: Option<DbId>,
    pub branched_from_id: Option<DbId>,
    pub conflict_resolution: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LatestQuery {
    pub branch: Option<String>,
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryOptions {
    pub branch: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub include_deleted: bool,
}

/// What changed between a history entry and the entry before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub lines_added: usize,
    pub lines_removed: usize,
    pub front_matter_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub version: ContentVersion,
    /// `None` for the oldest entry of the page.
    pub changes: Option<ChangeSummary>,
    pub hash_valid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionHistory {
    pub items: Vec<HistoryEntry>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub version_id: DbId,
    pub stored_hash: String,
    pub computed_hash: String,
    pub valid: bool,
}

fn branch_or_default(branch: Option<&str>) -> EngineResult<String> {
    let branch = branch.unwrap_or(DEFAULT_BRANCH);
    validate_branch_name(branch)?;
    Ok(branch.to_string())
}

fn summarize_change(older: &ContentVersion, newer: &ContentVersion) -> ChangeSummary {
    let lines = diff_content(&older.content, &newer.content).summary();
    let front_matter_keys = diff_map(&older.front_matter, &newer.front_matter)
        .touched_keys()
        .into_iter()
        .map(str::to_string)
        .collect();
    ChangeSummary {
        lines_added: lines.lines_added,
        lines_removed: lines.lines_removed,
        front_matter_keys,
    }
}

impl VersioningService {
    // ── Creation ─────────────────────────────────────────────────────

    /// Append a version to `(content_id, branch)`.
    ///
    /// The next number is one past the branch's highest version, soft-deleted
    /// rows included, so numbers are never reused.
    pub async fn create_version(&self, input: CreateVersion) -> EngineResult<ContentVersion> {
        input.payload.validate()?;
        let branch = branch_or_default(input.branch.as_deref())?;

        let _guard = self
            .locks
            .lock(LockKey::branch(input.content_id, &branch))
            .await;
        self.append_version(input, &branch, Lineage::default()).await
    }

    /// Number, derive and insert a version. The caller must hold the branch
    /// lock for `(input.content_id, branch)`.
    pub(crate) async fn append_version(
        &self,
        input: CreateVersion,
        branch: &str,
        lineage: Lineage,
    ) -> EngineResult<ContentVersion> {
        let previous = self
            .store
            .find_latest(input.content_id, branch, true)
            .await?;
        let version = previous.as_ref().map_or(1, |p| p.version + 1);
        let change_type = input.change_type.unwrap_or(if previous.is_some() {
            ChangeType::Update
        } else {
            ChangeType::Create
        });
        let diff = previous
            .as_ref()
            .map(|p| diff_content(&p.content, &input.payload.content).to_string());
        let stats = input.payload.stats();

        let new_version = NewContentVersion {
            id: new_id(),
            content_id: input.content_id,
            content_type: input.content_type,
            version,
            branch_name: branch.to_string(),
            hash: input.payload.fingerprint(),
            payload: input.payload,
            previous_version_id: previous.as_ref().map(|p| p.id),
            diff,
            merged_from_id: lineage.merged_from_id,
            branched_from_id: lineage.branched_from_id,
            conflict_resolution: lineage.conflict_resolution,
            author_id: input.author.id,
            author_name: input.author.name,
            author_email: input.author.email,
            change_type,
            change_message: input.change_message,
            size: stats.size,
            word_count: stats.word_count,
            reading_time: stats.reading_time,
            created_at: self.now(),
        };

        let created = self.store.insert(&new_version).await?;
        tracing::info!(
            content_id = %created.content_id,
            version_id = %created.id,
            branch = %created.branch_name,
            version = created.version,
            change_type = created.change_type.as_str(),
            "Created content version"
        );
        Ok(created)
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub async fn get_latest_version(
        &self,
        content_id: DbId,
        query: LatestQuery,
    ) -> EngineResult<Option<ContentVersion>> {
        let branch = branch_or_default(query.branch.as_deref())?;
        Ok(self
            .store
            .find_latest(content_id, &branch, query.include_deleted)
            .await?)
    }

    /// A page of history, newest first. Every entry but the oldest on the page
    /// is annotated with what changed relative to its predecessor
    /// (`previous_version_id`), falling back to the next-older entry on the
    /// page when that row no longer exists.
    pub async fn get_version_history(
        &self,
        content_id: DbId,
        options: HistoryOptions,
    ) -> EngineResult<VersionHistory> {
        let branch = branch_or_default(options.branch.as_deref())?;
        let limit = options.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        let offset = options.offset.unwrap_or(0);
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(CoreError::Validation(format!(
                "limit must be between 1 and {MAX_HISTORY_LIMIT}, got {limit}"
            ))
            .into());
        }
        if offset < 0 {
            return Err(CoreError::Validation(format!("offset must not be negative, got {offset}")).into());
        }

        let query = HistoryQuery {
            branch,
            limit,
            offset,
            include_deleted: options.include_deleted,
        };
        let (versions, total) = self.store.list_history(content_id, &query).await?;

        let mut changes: Vec<Option<ChangeSummary>> = Vec::with_capacity(versions.len());
        for (i, newer) in versions.iter().enumerate() {
            let Some(next_on_page) = versions.get(i + 1) else {
                changes.push(None);
                break;
            };
            // A soft-deleted predecessor is filtered off the page but is still
            // what this version was diffed against.
            let previous = match newer.previous_version_id {
                Some(id) if id != next_on_page.id => self.store.find_by_id(id).await?,
                _ => None,
            };
            let older = previous.as_ref().unwrap_or(next_on_page);
            changes.push(Some(summarize_change(older, newer)));
        }
        let items = versions
            .into_iter()
            .zip(changes)
            .map(|(version, changes)| HistoryEntry {
                hash_valid: version.verify_hash().is_ok(),
                version,
                changes,
            })
            .collect();

        Ok(VersionHistory {
            items,
            total,
            limit,
            offset,
        })
    }

    pub async fn get_published_version(
        &self,
        content_id: DbId,
    ) -> EngineResult<Option<ContentVersion>> {
        Ok(self.store.find_published(content_id).await?)
    }

    /// Point lookup that refuses to hand out a version whose stored hash no
    /// longer matches its payload.
    pub async fn get_version(&self, version_id: DbId) -> EngineResult<ContentVersion> {
        let version = self.load(version_id).await?;
        if let Err(e) = version.verify_hash() {
            tracing::error!(version_id = %version_id, error = %e, "Content version failed integrity check");
            return Err(e.into());
        }
        Ok(version)
    }

    pub async fn get_version_by_number(
        &self,
        content_id: DbId,
        branch: &str,
        version: i32,
    ) -> EngineResult<ContentVersion> {
        self.store
            .find_by_number(content_id, branch, version)
            .await?
            .ok_or_else(|| {
                CoreError::not_found("ContentVersion", format!("{content_id}/{branch}/v{version}"))
                    .into()
            })
    }

    pub async fn verify_integrity(&self, version_id: DbId) -> EngineResult<IntegrityReport> {
        let version = self.load(version_id).await?;
        let computed_hash = version.computed_hash();
        Ok(IntegrityReport {
            version_id,
            valid: computed_hash == version.hash,
            stored_hash: version.hash,
            computed_hash,
        })
    }

    // ── Soft deletion ────────────────────────────────────────────────

    /// Hide a version from latest/history queries. Published versions must be
    /// unpublished first; a pending schedule is dropped.
    pub async fn delete_version(&self, version_id: DbId) -> EngineResult<ContentVersion> {
        let existing = self.load(version_id).await?;
        let _guard = self.locks.lock(LockKey::Content(existing.content_id)).await;

        let current = self.load(version_id).await?;
        if current.is_published {
            return Err(CoreError::Validation(format!(
                "Version {version_id} is published and cannot be deleted"
            ))
            .into());
        }
        let deleted = self
            .store
            .set_deleted(version_id, true)
            .await?
            .ok_or_else(|| CoreError::Conflict(format!("Version {version_id} is already deleted")))?;
        tracing::info!(content_id = %deleted.content_id, version_id = %version_id, "Soft-deleted content version");
        Ok(deleted)
    }

    pub async fn undelete_version(&self, version_id: DbId) -> EngineResult<ContentVersion> {
        self.load(version_id).await?;
        let restored = self
            .store
            .set_deleted(version_id, false)
            .await?
            .ok_or_else(|| CoreError::Conflict(format!("Version {version_id} is not deleted")))?;
        tracing::info!(content_id = %restored.content_id, version_id = %version_id, "Undeleted content version");
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use verso_core::clock::FixedClock;
    use verso_core::patch::apply_patch_text;
    use verso_db::MemoryVersionStore;

    use crate::error::{EngineError, ErrorKind};

    fn service() -> (VersioningService, Arc<MemoryVersionStore>) {
        let store = Arc::new(MemoryVersionStore::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap(),
        ));
        (VersioningService::new(store.clone(), clock), store)
    }

    fn request(content_id: DbId, content: &str) -> CreateVersion {
        CreateVersion {
            content_id,
            content_type: ContentType::Post,
            branch: None,
            payload: ContentPayload {
                title: "Release notes".to_string(),
                slug: "release-notes".to_string(),
                content: content.to_string(),
                front_matter: json!({"tags": ["release"]}),
                metadata: json!({}),
            },
            author: Author::new("u1", "Ada", "ada@example.com"),
            change_type: None,
            change_message: None,
        }
    }

    // -- create_version ---------------------------------------------------------

    #[tokio::test]
    async fn first_version_has_no_lineage() {
        let (svc, _) = service();
        let v1 = svc.create_version(request(new_id(), "Hello\n")).await.unwrap();
        assert_eq!(v1.version, 1);
        assert_eq!(v1.branch_name, "main");
        assert_eq!(v1.change_type, ChangeType::Create);
        assert!(v1.previous_version_id.is_none());
        assert!(v1.diff.is_none());
        assert_eq!(v1.word_count, 1);
        assert_eq!(v1.reading_time, 1);
    }

    #[tokio::test]
    async fn next_version_carries_diff_from_previous() {
        let (svc, _) = service();
        let content_id = new_id();
        let v1 = svc.create_version(request(content_id, "a\nb\n")).await.unwrap();
        let v2 = svc.create_version(request(content_id, "a\nB\n")).await.unwrap();

        assert_eq!(v2.version, 2);
        assert_eq!(v2.change_type, ChangeType::Update);
        assert_eq!(v2.previous_version_id, Some(v1.id));
        let diff = v2.diff.as_deref().unwrap();
        assert_eq!(apply_patch_text(&v1.content, diff).unwrap(), v2.content);
    }

    #[tokio::test]
    async fn empty_fields_are_rejected() {
        let (svc, _) = service();
        let err = svc.create_version(request(new_id(), "")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut bad_branch = request(new_id(), "x");
        bad_branch.branch = Some("Feature_X".to_string());
        let err = svc.create_version(bad_branch).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn numbering_skips_soft_deleted_versions() {
        let (svc, _) = service();
        let content_id = new_id();
        svc.create_version(request(content_id, "one")).await.unwrap();
        let v2 = svc.create_version(request(content_id, "two")).await.unwrap();
        svc.delete_version(v2.id).await.unwrap();

        let v3 = svc.create_version(request(content_id, "three")).await.unwrap();
        assert_eq!(v3.version, 3);

        let latest = svc
            .get_latest_version(content_id, LatestQuery::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, v3.id);
    }

    // -- history ------------------------------------------------------------------

    #[tokio::test]
    async fn history_entries_summarize_against_predecessor() {
        let (svc, _) = service();
        let content_id = new_id();
        svc.create_version(request(content_id, "Hello")).await.unwrap();
        let mut second = request(content_id, "Hello world");
        second.payload.front_matter = json!({"tags": ["release"], "draft": false});
        svc.create_version(second).await.unwrap();

        let history = svc
            .get_version_history(content_id, HistoryOptions::default())
            .await
            .unwrap();
        assert_eq!(history.total, 2);
        assert_eq!(history.limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(history.items[0].version.version, 2);
        assert_eq!(
            history.items[0].changes,
            Some(ChangeSummary {
                lines_added: 1,
                lines_removed: 1,
                front_matter_keys: vec!["draft".to_string()],
            })
        );
        assert!(history.items[1].changes.is_none());
        assert!(history.items.iter().all(|e| e.hash_valid));
    }

    #[tokio::test]
    async fn history_summary_skips_over_deleted_predecessor_on_page() {
        let (svc, _) = service();
        let content_id = new_id();
        svc.create_version(request(content_id, "a\n")).await.unwrap();
        let v2 = svc.create_version(request(content_id, "a\nb\n")).await.unwrap();
        svc.create_version(request(content_id, "a\nb\nc\n")).await.unwrap();
        svc.delete_version(v2.id).await.unwrap();

        let history = svc
            .get_version_history(content_id, HistoryOptions::default())
            .await
            .unwrap();
        let numbers: Vec<i32> = history.items.iter().map(|e| e.version.version).collect();
        assert_eq!(numbers, vec![3, 1]);
        // Measured against v2, which v3 was created from, not v1.
        let changes = history.items[0].changes.as_ref().unwrap();
        assert_eq!((changes.lines_added, changes.lines_removed), (1, 0));
    }

    #[tokio::test]
    async fn history_rejects_out_of_range_limit() {
        let (svc, _) = service();
        let options = HistoryOptions {
            limit: Some(0),
            ..Default::default()
        };
        let err = svc.get_version_history(new_id(), options).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    // -- integrity ----------------------------------------------------------------

    #[tokio::test]
    async fn tampered_version_fails_integrity() {
        let (svc, store) = service();
        let v1 = svc.create_version(request(new_id(), "original")).await.unwrap();

        let mut tampered = v1.clone();
        tampered.content = "edited in place".to_string();
        store.replace(tampered).await;

        let err = svc.get_version(v1.id).await.unwrap_err();
        assert_matches!(
            err,
            EngineError::Core(CoreError::IntegrityFailure { id, .. }) if id == v1.id
        );

        let report = svc.verify_integrity(v1.id).await.unwrap();
        assert!(!report.valid);
        assert_eq!(report.stored_hash, v1.hash);
    }

    #[tokio::test]
    async fn missing_version_is_not_found() {
        let (svc, _) = service();
        let err = svc.get_version(new_id()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = svc
            .get_version_by_number(new_id(), "main", 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    // -- soft deletion ------------------------------------------------------------

    #[tokio::test]
    async fn deleted_version_stays_addressable_and_can_be_undeleted() {
        let (svc, _) = service();
        let v1 = svc.create_version(request(new_id(), "body")).await.unwrap();

        let deleted = svc.delete_version(v1.id).await.unwrap();
        assert!(deleted.is_deleted);
        assert!(svc.get_version(v1.id).await.unwrap().is_deleted);

        let err = svc.delete_version(v1.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let restored = svc.undelete_version(v1.id).await.unwrap();
        assert!(!restored.is_deleted);
    }
}
