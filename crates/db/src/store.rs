//! Backend seam for version persistence.
//!
//! The engine owns all version-number and derived-field computation; a
//! backend only has to persist rows, answer indexed lookups, and flip
//! lifecycle flags atomically.

use async_trait::async_trait;
use verso_core::types::{DbId, Timestamp};

use crate::models::{BranchSummary, ContentVersion, HistoryQuery, NewContentVersion, ReviewUpdate};

/// Errors a backend can report.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique key (branch/version slot, single published version) is
    /// already taken.
    #[error("Duplicate value violates unique constraint: {0}")]
    Duplicate(String),

    /// Any other database failure.
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    /// PostgreSQL unique violations (`23505`) become [`StoreError::Duplicate`].
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                return Self::Duplicate(constraint);
            }
        }
        Self::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence operations for content versions.
///
/// Methods returning `Option` yield `None` when the addressed row does not
/// exist (or, for flag updates, is not in a state the update applies to).
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Insert a fully computed version. Fails with [`StoreError::Duplicate`]
    /// if `(content_id, branch_name, version)` is taken.
    async fn insert(&self, input: &NewContentVersion) -> StoreResult<ContentVersion>;

    /// Point lookup by id, including soft-deleted rows.
    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<ContentVersion>>;

    async fn find_by_number(
        &self,
        content_id: DbId,
        branch: &str,
        version: i32,
    ) -> StoreResult<Option<ContentVersion>>;

    /// Highest-numbered version on a branch.
    async fn find_latest(
        &self,
        content_id: DbId,
        branch: &str,
        include_deleted: bool,
    ) -> StoreResult<Option<ContentVersion>>;

    /// One page of a branch's history, newest first, plus the total count
    /// matching the same filter.
    async fn list_history(
        &self,
        content_id: DbId,
        query: &HistoryQuery,
    ) -> StoreResult<(Vec<ContentVersion>, i64)>;

    async fn find_published(&self, content_id: DbId) -> StoreResult<Option<ContentVersion>>;

    async fn list_branches(&self, content_id: DbId) -> StoreResult<Vec<BranchSummary>>;

    /// The most recent version of `source_branch` that was merged into
    /// `target_branch`.
    async fn find_last_merged_source(
        &self,
        content_id: DbId,
        target_branch: &str,
        source_branch: &str,
    ) -> StoreResult<Option<ContentVersion>>;

    /// In one atomic step: unpublish every other version of `content_id`
    /// (any branch) and publish `version_id`. Nothing changes if the version
    /// is missing, soft-deleted, or belongs to another content item.
    async fn publish(
        &self,
        content_id: DbId,
        version_id: DbId,
        published_at: Timestamp,
    ) -> StoreResult<Option<ContentVersion>>;

    /// Clear the published flag for `content_id`, returning the version that
    /// was published.
    async fn unpublish(&self, content_id: DbId) -> StoreResult<Option<ContentVersion>>;

    /// Set or clear `scheduled_publish_at` on a non-deleted version.
    async fn set_schedule(
        &self,
        id: DbId,
        at: Option<Timestamp>,
    ) -> StoreResult<Option<ContentVersion>>;

    /// Toggle the soft-delete flag. Deleting also clears any pending
    /// schedule. Returns `None` if the flag already had that value.
    async fn set_deleted(&self, id: DbId, deleted: bool) -> StoreResult<Option<ContentVersion>>;

    async fn set_review(
        &self,
        id: DbId,
        review: &ReviewUpdate,
    ) -> StoreResult<Option<ContentVersion>>;

    /// Non-deleted, non-published versions whose schedule is due.
    async fn list_due_scheduled(&self, now: Timestamp) -> StoreResult<Vec<ContentVersion>>;

    async fn list_content_ids(&self) -> StoreResult<Vec<DbId>>;

    /// Every version of a content item across branches, including
    /// soft-deleted ones.
    async fn list_all_versions(&self, content_id: DbId) -> StoreResult<Vec<ContentVersion>>;

    /// Permanently remove rows. Returns the number removed.
    async fn hard_delete(&self, ids: &[DbId]) -> StoreResult<u64>;
}
