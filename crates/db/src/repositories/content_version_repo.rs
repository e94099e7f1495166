//! Repository for the `content_versions` table.

use sqlx::PgPool;
use verso_core::types::{DbId, Timestamp};

use crate::models::content_version::{
    BranchSummary, ContentVersion, HistoryQuery, NewContentVersion, ReviewUpdate,
};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, content_id, content_type, version, title, slug, content, \
    front_matter, metadata, previous_version_id, diff, merged_from_id, branched_from_id, \
    conflict_resolution, branch_name, is_draft, is_published, is_deleted, published_at, \
    scheduled_publish_at, author_id, author_name, author_email, change_type, change_message, \
    hash, size, word_count, reading_time, review_status, reviewed_by, reviewed_at, \
    review_notes, created_at";

/// Provides insert, lookup and lifecycle operations for content versions.
pub struct ContentVersionRepo;

impl ContentVersionRepo {
    // ── Insert & lookups ─────────────────────────────────────────────

    /// Insert a fully computed version. Collides with
    /// `uq_content_versions_branch_version` if the slot is taken.
    pub async fn create(
        pool: &PgPool,
        input: &NewContentVersion,
    ) -> Result<ContentVersion, sqlx::Error> {
        let query = format!(
            "INSERT INTO content_versions
                (id, content_id, content_type, version, title, slug, content,
                 front_matter, metadata, previous_version_id, diff, merged_from_id,
                 branched_from_id, conflict_resolution, branch_name,
                 author_id, author_name, author_email, change_type, change_message,
                 hash, size, word_count, reading_time, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                     $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ContentVersion>(&query)
            .bind(input.id)
            .bind(input.content_id)
            .bind(input.content_type.as_str())
            .bind(input.version)
            .bind(&input.payload.title)
            .bind(&input.payload.slug)
            .bind(&input.payload.content)
            .bind(&input.payload.front_matter)
            .bind(&input.payload.metadata)
            .bind(input.previous_version_id)
            .bind(&input.diff)
            .bind(input.merged_from_id)
            .bind(input.branched_from_id)
            .bind(&input.conflict_resolution)
            .bind(&input.branch_name)
            .bind(&input.author_id)
            .bind(&input.author_name)
            .bind(&input.author_email)
            .bind(input.change_type.as_str())
            .bind(&input.change_message)
            .bind(&input.hash)
            .bind(input.size)
            .bind(input.word_count)
            .bind(input.reading_time)
            .bind(input.created_at)
            .fetch_one(pool)
            .await
    }

    /// Find a version by ID, including soft-deleted rows.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ContentVersion>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM content_versions WHERE id = $1");
        sqlx::query_as::<_, ContentVersion>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_number(
        pool: &PgPool,
        content_id: DbId,
        branch: &str,
        version: i32,
    ) -> Result<Option<ContentVersion>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM content_versions \
             WHERE content_id = $1 AND branch_name = $2 AND version = $3"
        );
        sqlx::query_as::<_, ContentVersion>(&query)
            .bind(content_id)
            .bind(branch)
            .bind(version)
            .fetch_optional(pool)
            .await
    }

    /// Highest-numbered version on a branch.
    pub async fn find_latest(
        pool: &PgPool,
        content_id: DbId,
        branch: &str,
        include_deleted: bool,
    ) -> Result<Option<ContentVersion>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM content_versions \
             WHERE content_id = $1 AND branch_name = $2 AND ($3 OR NOT is_deleted) \
             ORDER BY version DESC LIMIT 1"
        );
        sqlx::query_as::<_, ContentVersion>(&query)
            .bind(content_id)
            .bind(branch)
            .bind(include_deleted)
            .fetch_optional(pool)
            .await
    }

    /// One page of a branch's history, newest first.
    pub async fn list_history(
        pool: &PgPool,
        content_id: DbId,
        params: &HistoryQuery,
    ) -> Result<Vec<ContentVersion>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM content_versions \
             WHERE content_id = $1 AND branch_name = $2 AND ($3 OR NOT is_deleted) \
             ORDER BY version DESC LIMIT $4 OFFSET $5"
        );
        sqlx::query_as::<_, ContentVersion>(&query)
            .bind(content_id)
            .bind(&params.branch)
            .bind(params.include_deleted)
            .bind(params.limit)
            .bind(params.offset)
            .fetch_all(pool)
            .await
    }

    /// Total rows matching the same filter as [`Self::list_history`].
    pub async fn count_history(
        pool: &PgPool,
        content_id: DbId,
        params: &HistoryQuery,
    ) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM content_versions \
             WHERE content_id = $1 AND branch_name = $2 AND ($3 OR NOT is_deleted)",
        )
        .bind(content_id)
        .bind(&params.branch)
        .bind(params.include_deleted)
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }

    pub async fn find_published(
        pool: &PgPool,
        content_id: DbId,
    ) -> Result<Option<ContentVersion>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM content_versions \
             WHERE content_id = $1 AND is_published"
        );
        sqlx::query_as::<_, ContentVersion>(&query)
            .bind(content_id)
            .fetch_optional(pool)
            .await
    }

    /// Per-branch overview, soft-deleted rows included in the counts.
    pub async fn list_branches(
        pool: &PgPool,
        content_id: DbId,
    ) -> Result<Vec<BranchSummary>, sqlx::Error> {
        sqlx::query_as::<_, BranchSummary>(
            "SELECT branch_name, MAX(version) AS latest_version, \
                    COUNT(*) AS version_count, MAX(created_at) AS updated_at \
             FROM content_versions WHERE content_id = $1 \
             GROUP BY branch_name ORDER BY branch_name",
        )
        .bind(content_id)
        .fetch_all(pool)
        .await
    }

    /// The source-branch version recorded by the latest merge of
    /// `source_branch` into `target_branch`.
    pub async fn find_last_merged_source(
        pool: &PgPool,
        content_id: DbId,
        target_branch: &str,
        source_branch: &str,
    ) -> Result<Option<ContentVersion>, sqlx::Error> {
        let columns = prefixed_columns("s");
        let query = format!(
            "SELECT {columns} FROM content_versions t \
             JOIN content_versions s ON s.id = t.merged_from_id \
             WHERE t.content_id = $1 AND t.branch_name = $2 AND s.branch_name = $3 \
             ORDER BY t.version DESC LIMIT 1"
        );
        sqlx::query_as::<_, ContentVersion>(&query)
            .bind(content_id)
            .bind(target_branch)
            .bind(source_branch)
            .fetch_optional(pool)
            .await
    }

    // ── Publication ──────────────────────────────────────────────────

    /// Publish a version, un-publishing any other version of the same content
    /// in the same transaction. A transaction-scoped advisory lock keyed on
    /// the content id serializes concurrent publishers.
    ///
    /// Returns `None` (and changes nothing) if `version_id` does not exist for
    /// `content_id` or is soft-deleted.
    pub async fn publish(
        pool: &PgPool,
        content_id: DbId,
        version_id: DbId,
        published_at: Timestamp,
    ) -> Result<Option<ContentVersion>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(content_id)
            .execute(&mut *tx)
            .await?;

        let exists: Option<(DbId,)> = sqlx::query_as(
            "SELECT id FROM content_versions \
             WHERE id = $1 AND content_id = $2 AND NOT is_deleted FOR UPDATE",
        )
        .bind(version_id)
        .bind(content_id)
        .fetch_optional(&mut *tx)
        .await?;
        if exists.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        // Unpublish the current version (if any)
        sqlx::query(
            "UPDATE content_versions SET is_published = false, is_draft = true \
             WHERE content_id = $1 AND is_published AND id <> $2",
        )
        .bind(content_id)
        .bind(version_id)
        .execute(&mut *tx)
        .await?;

        let query = format!(
            "UPDATE content_versions SET is_published = true, is_draft = false, \
                published_at = $2, scheduled_publish_at = NULL \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let result = sqlx::query_as::<_, ContentVersion>(&query)
            .bind(version_id)
            .bind(published_at)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result)
    }

    pub async fn unpublish(
        pool: &PgPool,
        content_id: DbId,
    ) -> Result<Option<ContentVersion>, sqlx::Error> {
        let query = format!(
            "UPDATE content_versions SET is_published = false, is_draft = true \
             WHERE content_id = $1 AND is_published \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ContentVersion>(&query)
            .bind(content_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn set_schedule(
        pool: &PgPool,
        id: DbId,
        at: Option<Timestamp>,
    ) -> Result<Option<ContentVersion>, sqlx::Error> {
        let query = format!(
            "UPDATE content_versions SET scheduled_publish_at = $2 \
             WHERE id = $1 AND NOT is_deleted \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ContentVersion>(&query)
            .bind(id)
            .bind(at)
            .fetch_optional(pool)
            .await
    }

    /// Versions whose scheduled publication is due.
    pub async fn list_due_scheduled(
        pool: &PgPool,
        now: Timestamp,
    ) -> Result<Vec<ContentVersion>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM content_versions \
             WHERE scheduled_publish_at <= $1 AND NOT is_published AND NOT is_deleted \
             ORDER BY scheduled_publish_at, id"
        );
        sqlx::query_as::<_, ContentVersion>(&query)
            .bind(now)
            .fetch_all(pool)
            .await
    }

    // ── Review & deletion ────────────────────────────────────────────

    pub async fn set_review(
        pool: &PgPool,
        id: DbId,
        review: &ReviewUpdate,
    ) -> Result<Option<ContentVersion>, sqlx::Error> {
        let query = format!(
            "UPDATE content_versions SET review_status = $2, reviewed_by = $3, \
                reviewed_at = $4, review_notes = $5 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ContentVersion>(&query)
            .bind(id)
            .bind(review.status.as_str())
            .bind(&review.reviewed_by)
            .bind(review.reviewed_at)
            .bind(&review.notes)
            .fetch_optional(pool)
            .await
    }

    /// Soft-delete a version and drop any pending schedule.
    pub async fn soft_delete(pool: &PgPool, id: DbId) -> Result<Option<ContentVersion>, sqlx::Error> {
        let query = format!(
            "UPDATE content_versions SET is_deleted = true, scheduled_publish_at = NULL \
             WHERE id = $1 AND NOT is_deleted \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ContentVersion>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn restore(pool: &PgPool, id: DbId) -> Result<Option<ContentVersion>, sqlx::Error> {
        let query = format!(
            "UPDATE content_versions SET is_deleted = false \
             WHERE id = $1 AND is_deleted \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ContentVersion>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    // ── Retention ────────────────────────────────────────────────────

    pub async fn list_content_ids(pool: &PgPool) -> Result<Vec<DbId>, sqlx::Error> {
        let rows: Vec<(DbId,)> =
            sqlx::query_as("SELECT DISTINCT content_id FROM content_versions ORDER BY content_id")
                .fetch_all(pool)
                .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    pub async fn list_by_content(
        pool: &PgPool,
        content_id: DbId,
    ) -> Result<Vec<ContentVersion>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM content_versions WHERE content_id = $1 \
             ORDER BY branch_name, version"
        );
        sqlx::query_as::<_, ContentVersion>(&query)
            .bind(content_id)
            .fetch_all(pool)
            .await
    }

    /// Permanently delete versions. Returns the number of rows removed.
    pub async fn hard_delete_many(pool: &PgPool, ids: &[DbId]) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM content_versions WHERE id = ANY($1)")
            .bind(ids)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// [`COLUMNS`] qualified with a table alias, for joins.
fn prefixed_columns(alias: &str) -> String {
    COLUMNS
        .split(',')
        .map(|column| format!("{alias}.{}", column.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_columns_qualifies_every_column() {
        let qualified = prefixed_columns("s");
        assert!(qualified.starts_with("s.id, s.content_id, "));
        assert!(qualified.ends_with("s.created_at"));
        assert_eq!(qualified.matches("s.").count(), COLUMNS.split(',').count());
    }
}
