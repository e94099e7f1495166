//! Content item vocabulary: content types, change types, review states,
//! payloads and derived statistics.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::hashing::content_fingerprint;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Words per minute used for the reading-time estimate.
pub const WORDS_PER_MINUTE: usize = 200;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Kind of content item a version belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Post,
    Project,
    Page,
    Component,
}

impl ContentType {
    /// Return the database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Project => "project",
            Self::Page => "page",
            Self::Component => "component",
        }
    }
}

impl std::str::FromStr for ContentType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(Self::Post),
            "project" => Ok(Self::Project),
            "page" => Ok(Self::Page),
            "component" => Ok(Self::Component),
            other => Err(CoreError::Validation(format!(
                "Unknown content type '{other}'. Must be one of: post, project, page, component"
            ))),
        }
    }
}

/// What produced a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
    Publish,
    Unpublish,
    Restore,
}

impl ChangeType {
    /// Return the database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Publish => "publish",
            Self::Unpublish => "unpublish",
            Self::Restore => "restore",
        }
    }
}

impl std::str::FromStr for ChangeType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "publish" => Ok(Self::Publish),
            "unpublish" => Ok(Self::Unpublish),
            "restore" => Ok(Self::Restore),
            other => Err(CoreError::Validation(format!(
                "Unknown change type '{other}'"
            ))),
        }
    }
}

/// Editorial review outcome, independent of publication state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    ChangesRequested,
    Rejected,
}

impl ReviewStatus {
    /// Return the database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::ChangesRequested => "changes_requested",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for ReviewStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "changes_requested" => Ok(Self::ChangesRequested),
            "rejected" => Ok(Self::Rejected),
            other => Err(CoreError::Validation(format!(
                "Unknown review status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Author
// ---------------------------------------------------------------------------

/// Identity of whoever triggered an operation, resolved by the caller's
/// auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl Author {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// The user-authored part of a version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPayload {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub front_matter: Value,
    pub metadata: Value,
}

impl ContentPayload {
    /// Check the required fields and the map shapes.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.title.trim().is_empty() {
            return Err(CoreError::Validation("Title must not be empty".to_string()));
        }
        if self.slug.trim().is_empty() {
            return Err(CoreError::Validation("Slug must not be empty".to_string()));
        }
        if self.content.is_empty() {
            return Err(CoreError::Validation(
                "Content must not be empty".to_string(),
            ));
        }
        validate_map("front_matter", &self.front_matter)?;
        validate_map("metadata", &self.metadata)?;
        Ok(())
    }

    pub fn fingerprint(&self) -> String {
        content_fingerprint(&self.content, &self.front_matter, &self.metadata)
    }

    pub fn stats(&self) -> ContentStats {
        ContentStats::compute(&self.content)
    }
}

/// Front-matter and metadata must be JSON objects.
fn validate_map(field: &str, value: &Value) -> Result<(), CoreError> {
    if value.is_object() {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "{field} must be a JSON object"
        )))
    }
}

// ---------------------------------------------------------------------------
// Derived statistics
// ---------------------------------------------------------------------------

/// Size and readability figures recomputed whenever a version is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContentStats {
    /// Body length in bytes.
    pub size: i64,
    pub word_count: i32,
    /// Estimated minutes to read.
    pub reading_time: i32,
}

impl ContentStats {
    pub fn compute(content: &str) -> Self {
        let words = content.split_whitespace().count();
        let reading_time = if words == 0 {
            0
        } else {
            words.div_ceil(WORDS_PER_MINUTE).max(1)
        };
        Self {
            size: content.len() as i64,
            word_count: words as i32,
            reading_time: reading_time as i32,
        }
    }
}
