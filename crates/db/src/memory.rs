//! In-memory [`VersionStore`] for tests and embedding.
//!
//! Enforces the same unique keys as the Postgres schema so that callers
//! observe identical `Duplicate` behaviour.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use verso_core::types::{DbId, Timestamp};

use crate::models::{BranchSummary, ContentVersion, HistoryQuery, NewContentVersion, ReviewUpdate};
use crate::store::{StoreError, StoreResult, VersionStore};

const BRANCH_VERSION_CONSTRAINT: &str = "uq_content_versions_branch_version";
const PRIMARY_KEY_CONSTRAINT: &str = "content_versions_pkey";

#[derive(Default)]
pub struct MemoryVersionStore {
    rows: RwLock<HashMap<DbId, ContentVersion>>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows, soft-deleted ones included.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Overwrite a stored row as-is. Test hook for simulating tampering or
    /// back-dated rows.
    pub async fn replace(&self, version: ContentVersion) {
        self.rows.write().await.insert(version.id, version);
    }

    async fn update<F>(&self, id: DbId, apply: F) -> Option<ContentVersion>
    where
        F: FnOnce(&mut ContentVersion) -> bool + Send,
    {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&id)?;
        apply(row).then(|| row.clone())
    }
}

fn on_branch<'a>(
    rows: &'a HashMap<DbId, ContentVersion>,
    content_id: DbId,
    branch: &'a str,
    include_deleted: bool,
) -> impl Iterator<Item = &'a ContentVersion> {
    rows.values().filter(move |v| {
        v.content_id == content_id && v.branch_name == branch && (include_deleted || !v.is_deleted)
    })
}

#[async_trait]
impl VersionStore for MemoryVersionStore {
    async fn insert(&self, input: &NewContentVersion) -> StoreResult<ContentVersion> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&input.id) {
            return Err(StoreError::Duplicate(PRIMARY_KEY_CONSTRAINT.to_string()));
        }
        if on_branch(&rows, input.content_id, &input.branch_name, true)
            .any(|v| v.version == input.version)
        {
            return Err(StoreError::Duplicate(BRANCH_VERSION_CONSTRAINT.to_string()));
        }
        let version = input.clone().into_version();
        rows.insert(version.id, version.clone());
        Ok(version)
    }

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<ContentVersion>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find_by_number(
        &self,
        content_id: DbId,
        branch: &str,
        version: i32,
    ) -> StoreResult<Option<ContentVersion>> {
        let rows = self.rows.read().await;
        let found = on_branch(&rows, content_id, branch, true)
            .find(|v| v.version == version)
            .cloned();
        Ok(found)
    }

    async fn find_latest(
        &self,
        content_id: DbId,
        branch: &str,
        include_deleted: bool,
    ) -> StoreResult<Option<ContentVersion>> {
        let rows = self.rows.read().await;
        let latest = on_branch(&rows, content_id, branch, include_deleted)
            .max_by_key(|v| v.version)
            .cloned();
        Ok(latest)
    }

    async fn list_history(
        &self,
        content_id: DbId,
        query: &HistoryQuery,
    ) -> StoreResult<(Vec<ContentVersion>, i64)> {
        let rows = self.rows.read().await;
        let mut matching: Vec<&ContentVersion> =
            on_branch(&rows, content_id, &query.branch, query.include_deleted).collect();
        matching.sort_by(|a, b| b.version.cmp(&a.version));
        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn find_published(&self, content_id: DbId) -> StoreResult<Option<ContentVersion>> {
        let rows = self.rows.read().await;
        let published = rows
            .values()
            .find(|v| v.content_id == content_id && v.is_published)
            .cloned();
        Ok(published)
    }

    async fn list_branches(&self, content_id: DbId) -> StoreResult<Vec<BranchSummary>> {
        let rows = self.rows.read().await;
        let mut summaries: HashMap<&str, BranchSummary> = HashMap::new();
        for v in rows.values().filter(|v| v.content_id == content_id) {
            summaries
                .entry(v.branch_name.as_str())
                .and_modify(|s| {
                    s.latest_version = s.latest_version.max(v.version);
                    s.version_count += 1;
                    s.updated_at = s.updated_at.max(v.created_at);
                })
                .or_insert_with(|| BranchSummary {
                    branch_name: v.branch_name.clone(),
                    latest_version: v.version,
                    version_count: 1,
                    updated_at: v.created_at,
                });
        }
        let mut out: Vec<BranchSummary> = summaries.into_values().collect();
        out.sort_by(|a, b| a.branch_name.cmp(&b.branch_name));
        Ok(out)
    }

    async fn find_last_merged_source(
        &self,
        content_id: DbId,
        target_branch: &str,
        source_branch: &str,
    ) -> StoreResult<Option<ContentVersion>> {
        let rows = self.rows.read().await;
        let mut merges: Vec<&ContentVersion> = on_branch(&rows, content_id, target_branch, true)
            .filter(|v| v.merged_from_id.is_some())
            .collect();
        merges.sort_by(|a, b| b.version.cmp(&a.version));
        let source = merges
            .into_iter()
            .filter_map(|v| v.merged_from_id.and_then(|id| rows.get(&id)))
            .find(|source| source.branch_name == source_branch)
            .cloned();
        Ok(source)
    }

    async fn publish(
        &self,
        content_id: DbId,
        version_id: DbId,
        published_at: Timestamp,
    ) -> StoreResult<Option<ContentVersion>> {
        let mut rows = self.rows.write().await;
        match rows.get(&version_id) {
            Some(v) if v.content_id == content_id && !v.is_deleted => {}
            _ => return Ok(None),
        }
        for v in rows.values_mut() {
            if v.content_id == content_id && v.is_published && v.id != version_id {
                v.is_published = false;
                v.is_draft = true;
            }
        }
        let published = rows.get_mut(&version_id).map(|v| {
            v.is_published = true;
            v.is_draft = false;
            v.published_at = Some(published_at);
            v.scheduled_publish_at = None;
            v.clone()
        });
        Ok(published)
    }

    async fn unpublish(&self, content_id: DbId) -> StoreResult<Option<ContentVersion>> {
        let mut rows = self.rows.write().await;
        let unpublished = rows
            .values_mut()
            .find(|v| v.content_id == content_id && v.is_published)
            .map(|v| {
                v.is_published = false;
                v.is_draft = true;
                v.clone()
            });
        Ok(unpublished)
    }

    async fn set_schedule(
        &self,
        id: DbId,
        at: Option<Timestamp>,
    ) -> StoreResult<Option<ContentVersion>> {
        Ok(self
            .update(id, |v| {
                if v.is_deleted {
                    return false;
                }
                v.scheduled_publish_at = at;
                true
            })
            .await)
    }

    async fn set_deleted(&self, id: DbId, deleted: bool) -> StoreResult<Option<ContentVersion>> {
        Ok(self
            .update(id, |v| {
                if v.is_deleted == deleted {
                    return false;
                }
                v.is_deleted = deleted;
                if deleted {
                    v.scheduled_publish_at = None;
                }
                true
            })
            .await)
    }

    async fn set_review(
        &self,
        id: DbId,
        review: &ReviewUpdate,
    ) -> StoreResult<Option<ContentVersion>> {
        let review = review.clone();
        Ok(self
            .update(id, move |v| {
                v.review_status = Some(review.status);
                v.reviewed_by = Some(review.reviewed_by);
                v.reviewed_at = Some(review.reviewed_at);
                v.review_notes = review.notes;
                true
            })
            .await)
    }

    async fn list_due_scheduled(&self, now: Timestamp) -> StoreResult<Vec<ContentVersion>> {
        let rows = self.rows.read().await;
        let mut due: Vec<ContentVersion> = rows
            .values()
            .filter(|v| !v.is_published && !v.is_deleted)
            .filter(|v| v.scheduled_publish_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        due.sort_by_key(|v| (v.scheduled_publish_at, v.id));
        Ok(due)
    }

    async fn list_content_ids(&self) -> StoreResult<Vec<DbId>> {
        let rows = self.rows.read().await;
        let mut ids: Vec<DbId> = rows.values().map(|v| v.content_id).collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn list_all_versions(&self, content_id: DbId) -> StoreResult<Vec<ContentVersion>> {
        let rows = self.rows.read().await;
        let mut all: Vec<ContentVersion> = rows
            .values()
            .filter(|v| v.content_id == content_id)
            .cloned()
            .collect();
        all.sort_by(|a, b| (&a.branch_name, a.version).cmp(&(&b.branch_name, b.version)));
        Ok(all)
    }

    async fn hard_delete(&self, ids: &[DbId]) -> StoreResult<u64> {
        let mut rows = self.rows.write().await;
        let removed = ids.iter().filter(|id| rows.remove(id).is_some()).count();
        Ok(removed as u64)
    }
}
