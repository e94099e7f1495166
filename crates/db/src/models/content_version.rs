//! Content version entity model and DTOs.
//!
//! A version is an immutable payload snapshot. Only the lifecycle flags
//! (`is_draft`, `is_published`, `is_deleted`, `published_at`,
//! `scheduled_publish_at`) and the review fields change after insert.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use verso_core::content::{ChangeType, ContentPayload, ContentType, ReviewStatus};
use verso_core::error::CoreError;
use verso_core::hashing::content_fingerprint;
use verso_core::publication::PublicationState;
use verso_core::types::{DbId, Timestamp};

/// A row from the `content_versions` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentVersion {
    pub id: DbId,
    pub content_id: DbId,
    pub content_type: ContentType,
    pub version: i32,

    pub title: String,
    pub slug: String,
    pub content: String,
    pub front_matter: Value,
    pub metadata: Value,

    pub previous_version_id: Option<DbId>,
    pub diff: Option<String>,
    pub merged_from_id: Option<DbId>,
    pub branched_from_id: Option<DbId>,
    pub conflict_resolution: Option<Value>,

    pub branch_name: String,

    pub is_draft: bool,
    pub is_published: bool,
    pub is_deleted: bool,
    pub published_at: Option<Timestamp>,
    pub scheduled_publish_at: Option<Timestamp>,

    pub author_id: String,
    pub author_name: String,
    pub author_email: String,
    pub change_type: ChangeType,
    pub change_message: Option<String>,

    pub hash: String,
    pub size: i64,
    pub word_count: i32,
    pub reading_time: i32,

    pub review_status: Option<ReviewStatus>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<Timestamp>,
    pub review_notes: Option<String>,

    pub created_at: Timestamp,
}

impl ContentVersion {
    /// Copy out the user-authored fields.
    pub fn payload(&self) -> ContentPayload {
        ContentPayload {
            title: self.title.clone(),
            slug: self.slug.clone(),
            content: self.content.clone(),
            front_matter: self.front_matter.clone(),
            metadata: self.metadata.clone(),
        }
    }

    pub fn publication_state(&self) -> PublicationState {
        PublicationState::from_flags(self.is_published, self.scheduled_publish_at)
    }

    /// Hash recomputed from the stored payload.
    pub fn computed_hash(&self) -> String {
        content_fingerprint(&self.content, &self.front_matter, &self.metadata)
    }

    /// Fail with [`CoreError::IntegrityFailure`] if the stored hash no longer
    /// matches the payload.
    pub fn verify_hash(&self) -> Result<(), CoreError> {
        let actual = self.computed_hash();
        if actual == self.hash {
            Ok(())
        } else {
            Err(CoreError::IntegrityFailure {
                id: self.id,
                expected: self.hash.clone(),
                actual,
            })
        }
    }
}

impl<'r> FromRow<'r, PgRow> for ContentVersion {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let review_status: Option<String> = row.try_get("review_status")?;
        Ok(Self {
            id: row.try_get("id")?,
            content_id: row.try_get("content_id")?,
            content_type: decode_enum(row, "content_type")?,
            version: row.try_get("version")?,
            title: row.try_get("title")?,
            slug: row.try_get("slug")?,
            content: row.try_get("content")?,
            front_matter: row.try_get("front_matter")?,
            metadata: row.try_get("metadata")?,
            previous_version_id: row.try_get("previous_version_id")?,
            diff: row.try_get("diff")?,
            merged_from_id: row.try_get("merged_from_id")?,
            branched_from_id: row.try_get("branched_from_id")?,
            conflict_resolution: row.try_get("conflict_resolution")?,
            branch_name: row.try_get("branch_name")?,
            is_draft: row.try_get("is_draft")?,
            is_published: row.try_get("is_published")?,
            is_deleted: row.try_get("is_deleted")?,
            published_at: row.try_get("published_at")?,
            scheduled_publish_at: row.try_get("scheduled_publish_at")?,
            author_id: row.try_get("author_id")?,
            author_name: row.try_get("author_name")?,
            author_email: row.try_get("author_email")?,
            change_type: decode_enum(row, "change_type")?,
            change_message: row.try_get("change_message")?,
            hash: row.try_get("hash")?,
            size: row.try_get("size")?,
            word_count: row.try_get("word_count")?,
            reading_time: row.try_get("reading_time")?,
            review_status: review_status
                .map(|raw| parse_column("review_status", &raw))
                .transpose()?,
            reviewed_by: row.try_get("reviewed_by")?,
            reviewed_at: row.try_get("reviewed_at")?,
            review_notes: row.try_get("review_notes")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Decode a TEXT column holding one of the core string enums.
fn decode_enum<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: std::str::FromStr<Err = CoreError>,
{
    let raw: String = row.try_get(column)?;
    parse_column(column, &raw)
}

fn parse_column<T>(column: &str, raw: &str) -> Result<T, sqlx::Error>
where
    T: std::str::FromStr<Err = CoreError>,
{
    raw.parse().map_err(|e: CoreError| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

/// DTO for inserting a version. Every derived field is already computed by
/// the caller.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewContentVersion {
    pub id: DbId,
    pub content_id: DbId,
    pub content_type: ContentType,
    pub version: i32,
    pub branch_name: String,
    pub payload: ContentPayload,
    pub previous_version_id: Option<DbId>,
    pub diff: Option<String>,
    pub merged_from_id: Option<DbId>,
    pub branched_from_id: Option<DbId>,
    pub conflict_resolution: Option<Value>,
    pub author_id: String,
    pub author_name: String,
    pub author_email: String,
    pub change_type: ChangeType,
    pub change_message: Option<String>,
    pub hash: String,
    pub size: i64,
    pub word_count: i32,
    pub reading_time: i32,
    pub created_at: Timestamp,
}

impl NewContentVersion {
    /// The row as it looks right after insert: a non-published draft.
    pub fn into_version(self) -> ContentVersion {
        ContentVersion {
            id: self.id,
            content_id: self.content_id,
            content_type: self.content_type,
            version: self.version,
            title: self.payload.title,
            slug: self.payload.slug,
            content: self.payload.content,
            front_matter: self.payload.front_matter,
            metadata: self.payload.metadata,
            previous_version_id: self.previous_version_id,
            diff: self.diff,
            merged_from_id: self.merged_from_id,
            branched_from_id: self.branched_from_id,
            conflict_resolution: self.conflict_resolution,
            branch_name: self.branch_name,
            is_draft: true,
            is_published: false,
            is_deleted: false,
            published_at: None,
            scheduled_publish_at: None,
            author_id: self.author_id,
            author_name: self.author_name,
            author_email: self.author_email,
            change_type: self.change_type,
            change_message: self.change_message,
            hash: self.hash,
            size: self.size,
            word_count: self.word_count,
            reading_time: self.reading_time,
            review_status: None,
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
            created_at: self.created_at,
        }
    }
}

/// DTO for recording a review decision.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReviewUpdate {
    pub status: ReviewStatus,
    pub reviewed_by: String,
    pub reviewed_at: Timestamp,
    pub notes: Option<String>,
}

/// Paging and filtering for history queries.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryQuery {
    pub branch: String,
    pub limit: i64,
    pub offset: i64,
    pub include_deleted: bool,
}

/// Per-branch overview of one content item.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct BranchSummary {
    pub branch_name: String,
    pub latest_version: i32,
    pub version_count: i64,
    pub updated_at: Timestamp,
}
