//! [`VersionStore`] backed by PostgreSQL.

use async_trait::async_trait;
use verso_core::types::{DbId, Timestamp};

use crate::models::{BranchSummary, ContentVersion, HistoryQuery, NewContentVersion, ReviewUpdate};
use crate::repositories::ContentVersionRepo;
use crate::store::{StoreResult, VersionStore};
use crate::DbPool;

#[derive(Clone)]
pub struct PgVersionStore {
    pool: DbPool,
}

impl PgVersionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl VersionStore for PgVersionStore {
    async fn insert(&self, input: &NewContentVersion) -> StoreResult<ContentVersion> {
        Ok(ContentVersionRepo::create(&self.pool, input).await?)
    }

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<ContentVersion>> {
        Ok(ContentVersionRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_by_number(
        &self,
        content_id: DbId,
        branch: &str,
        version: i32,
    ) -> StoreResult<Option<ContentVersion>> {
        Ok(ContentVersionRepo::find_by_number(&self.pool, content_id, branch, version).await?)
    }

    async fn find_latest(
        &self,
        content_id: DbId,
        branch: &str,
        include_deleted: bool,
    ) -> StoreResult<Option<ContentVersion>> {
        Ok(ContentVersionRepo::find_latest(&self.pool, content_id, branch, include_deleted).await?)
    }

    async fn list_history(
        &self,
        content_id: DbId,
        query: &HistoryQuery,
    ) -> StoreResult<(Vec<ContentVersion>, i64)> {
        let items = ContentVersionRepo::list_history(&self.pool, content_id, query).await?;
        let total = ContentVersionRepo::count_history(&self.pool, content_id, query).await?;
        Ok((items, total))
    }

    async fn find_published(&self, content_id: DbId) -> StoreResult<Option<ContentVersion>> {
        Ok(ContentVersionRepo::find_published(&self.pool, content_id).await?)
    }

    async fn list_branches(&self, content_id: DbId) -> StoreResult<Vec<BranchSummary>> {
        Ok(ContentVersionRepo::list_branches(&self.pool, content_id).await?)
    }

    async fn find_last_merged_source(
        &self,
        content_id: DbId,
        target_branch: &str,
        source_branch: &str,
    ) -> StoreResult<Option<ContentVersion>> {
        Ok(ContentVersionRepo::find_last_merged_source(
            &self.pool,
            content_id,
            target_branch,
            source_branch,
        )
        .await?)
    }

    async fn publish(
        &self,
        content_id: DbId,
        version_id: DbId,
        published_at: Timestamp,
    ) -> StoreResult<Option<ContentVersion>> {
        Ok(ContentVersionRepo::publish(&self.pool, content_id, version_id, published_at).await?)
    }

    async fn unpublish(&self, content_id: DbId) -> StoreResult<Option<ContentVersion>> {
        Ok(ContentVersionRepo::unpublish(&self.pool, content_id).await?)
    }

    async fn set_schedule(
        &self,
        id: DbId,
        at: Option<Timestamp>,
    ) -> StoreResult<Option<ContentVersion>> {
        Ok(ContentVersionRepo::set_schedule(&self.pool, id, at).await?)
    }

    async fn set_deleted(&self, id: DbId, deleted: bool) -> StoreResult<Option<ContentVersion>> {
        if deleted {
            Ok(ContentVersionRepo::soft_delete(&self.pool, id).await?)
        } else {
            Ok(ContentVersionRepo::restore(&self.pool, id).await?)
        }
    }

    async fn set_review(
        &self,
        id: DbId,
        review: &ReviewUpdate,
    ) -> StoreResult<Option<ContentVersion>> {
        Ok(ContentVersionRepo::set_review(&self.pool, id, review).await?)
    }

    async fn list_due_scheduled(&self, now: Timestamp) -> StoreResult<Vec<ContentVersion>> {
        Ok(ContentVersionRepo::list_due_scheduled(&self.pool, now).await?)
    }

    async fn list_content_ids(&self) -> StoreResult<Vec<DbId>> {
        Ok(ContentVersionRepo::list_content_ids(&self.pool).await?)
    }

    async fn list_all_versions(&self, content_id: DbId) -> StoreResult<Vec<ContentVersion>> {
        Ok(ContentVersionRepo::list_by_content(&self.pool, content_id).await?)
    }

    async fn hard_delete(&self, ids: &[DbId]) -> StoreResult<u64> {
        let removed = ContentVersionRepo::hard_delete_many(&self.pool, ids).await?;
        tracing::debug!(requested = ids.len(), removed, "Hard-deleted content versions");
        Ok(removed)
    }
}
