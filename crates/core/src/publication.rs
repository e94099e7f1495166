//! Publication state machine for a single content item.
//!
//! State is derived from a version's flags rather than stored:
//! `Published` wins, then `Scheduled` (a draft with a pending
//! `scheduled_publish_at`), otherwise `Draft`.

use serde::Serialize;

use crate::error::CoreError;
use crate::types::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationState {
    Draft,
    Scheduled,
    Published,
}

impl PublicationState {
    pub fn from_flags(is_published: bool, scheduled_publish_at: Option<Timestamp>) -> Self {
        if is_published {
            Self::Published
        } else if scheduled_publish_at.is_some() {
            Self::Scheduled
        } else {
            Self::Draft
        }
    }
}

/// What a publish request should do right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishAction {
    /// Flip the published flag immediately.
    Immediate,
    /// Record the time and leave the flip to the scheduler.
    Defer(Timestamp),
}

/// A missing or already-due `scheduled_publish_at` publishes immediately.
pub fn publish_action(scheduled_publish_at: Option<Timestamp>, now: Timestamp) -> PublishAction {
    match scheduled_publish_at {
        Some(at) if at > now => PublishAction::Defer(at),
        _ => PublishAction::Immediate,
    }
}

/// Explicit scheduling requires a time strictly in the future.
pub fn validate_publish_at(publish_at: Timestamp, now: Timestamp) -> Result<(), CoreError> {
    if publish_at <= now {
        return Err(CoreError::Validation(format!(
            "Scheduled publish time {publish_at} must be in the future (now is {now})"
        )));
    }
    Ok(())
}
