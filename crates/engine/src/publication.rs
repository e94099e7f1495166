//! Publish, schedule, unpublish, restore and review.
//!
//! Publishing is serialized per content item by the `Content` lock; the
//! store's `publish` swaps the published flag in one atomic step so at most
//! one version of a content item is ever published.

use serde::Deserialize;
use verso_core::content::{Author, ChangeType, ReviewStatus};
use verso_core::error::CoreError;
use verso_core::publication::{publish_action, validate_publish_at, PublishAction};
use verso_core::types::{DbId, Timestamp};
use verso_db::models::{ContentVersion, ReviewUpdate};

use crate::error::EngineResult;
use crate::locks::LockKey;
use crate::service::VersioningService;
use crate::versions::CreateVersion;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublishOptions {
    /// A future time defers the publish to the scheduler.
    pub scheduled_publish_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewDecision {
    pub status: ReviewStatus,
    pub reviewer: Author,
    pub notes: Option<String>,
}

impl VersioningService {
    /// Publish a version now, or record a future publish time.
    pub async fn publish_version(
        &self,
        version_id: DbId,
        options: PublishOptions,
    ) -> EngineResult<ContentVersion> {
        let version = self.load(version_id).await?;
        ensure_not_deleted(&version)?;

        match publish_action(options.scheduled_publish_at, self.now()) {
            PublishAction::Defer(at) => self.store_schedule(&version, Some(at)).await,
            PublishAction::Immediate => {
                let _guard = self.locks.lock(LockKey::Content(version.content_id)).await;
                self.publish_locked(&version).await
            }
        }
    }

    /// Publish a version whose schedule has come due. The row is re-read
    /// under the content lock; `None` means it is no longer due (cancelled,
    /// moved later, or already published) and nothing changed.
    pub(crate) async fn publish_if_due(
        &self,
        version_id: DbId,
        content_id: DbId,
    ) -> EngineResult<Option<ContentVersion>> {
        let _guard = self.locks.lock(LockKey::Content(content_id)).await;
        let version = self.load(version_id).await?;
        ensure_not_deleted(&version)?;
        let due = matches!(version.scheduled_publish_at, Some(at) if at <= self.now());
        if version.is_published || !due {
            tracing::debug!(
                content_id = %content_id,
                version_id = %version_id,
                "Scheduled publication no longer due, skipping"
            );
            return Ok(None);
        }
        self.publish_locked(&version).await.map(Some)
    }

    /// Caller holds the `Content` lock.
    async fn publish_locked(&self, version: &ContentVersion) -> EngineResult<ContentVersion> {
        let version_id = version.id;
        let published_at = self.now();
        match self
            .store
            .publish(version.content_id, version_id, published_at)
            .await?
        {
            Some(published) => {
                tracing::info!(
                    content_id = %published.content_id,
                    version_id = %version_id,
                    branch = %published.branch_name,
                    version = published.version,
                    "Published content version"
                );
                Ok(published)
            }
            None => {
                // Deleted or removed between the check and the publish.
                let current = self.load(version_id).await?;
                ensure_not_deleted(&current)?;
                Err(CoreError::Internal(format!("Failed to publish version {version_id}")).into())
            }
        }
    }

    /// Set a strictly future publish time on a draft.
    pub async fn schedule_publication(
        &self,
        version_id: DbId,
        publish_at: Timestamp,
    ) -> EngineResult<ContentVersion> {
        validate_publish_at(publish_at, self.now())?;
        let version = self.load(version_id).await?;
        ensure_not_deleted(&version)?;
        if version.is_published {
            return Err(CoreError::Validation(format!(
                "Version {version_id} is already published"
            ))
            .into());
        }
        self.store_schedule(&version, Some(publish_at)).await
    }

    pub async fn cancel_scheduled_publication(
        &self,
        version_id: DbId,
    ) -> EngineResult<ContentVersion> {
        let version = self.load(version_id).await?;
        if version.scheduled_publish_at.is_none() {
            return Err(CoreError::Validation(format!(
                "Version {version_id} has no scheduled publication"
            ))
            .into());
        }
        self.store_schedule(&version, None).await
    }

    /// Take the content item offline. The previously published version goes
    /// back to being a draft.
    pub async fn unpublish_content(&self, content_id: DbId) -> EngineResult<ContentVersion> {
        let _guard = self.locks.lock(LockKey::Content(content_id)).await;
        let unpublished = self
            .store
            .unpublish(content_id)
            .await?
            .ok_or_else(|| CoreError::not_found("PublishedVersion", content_id))?;
        tracing::info!(
            content_id = %content_id,
            version_id = %unpublished.id,
            "Unpublished content"
        );
        Ok(unpublished)
    }

    /// Append a copy of an earlier version's payload to the tip of its branch.
    pub async fn restore_version(
        &self,
        version_id: DbId,
        author: Author,
    ) -> EngineResult<ContentVersion> {
        let source = self.get_version(version_id).await?;
        let restored = self
            .create_version(CreateVersion {
                content_id: source.content_id,
                content_type: source.content_type,
                branch: Some(source.branch_name.clone()),
                payload: source.payload(),
                author,
                change_type: Some(ChangeType::Restore),
                change_message: Some(format!("Restored from v{}", source.version)),
            })
            .await?;
        tracing::info!(
            content_id = %restored.content_id,
            from_version = source.version,
            version = restored.version,
            "Restored content version"
        );
        Ok(restored)
    }

    /// Record a review decision. Independent of publication state.
    pub async fn review_version(
        &self,
        version_id: DbId,
        decision: ReviewDecision,
    ) -> EngineResult<ContentVersion> {
        let update = ReviewUpdate {
            status: decision.status,
            reviewed_by: decision.reviewer.id,
            reviewed_at: self.now(),
            notes: decision.notes,
        };
        let reviewed = self
            .store
            .set_review(version_id, &update)
            .await?
            .ok_or_else(|| CoreError::not_found("ContentVersion", version_id))?;
        tracing::info!(
            version_id = %version_id,
            status = update.status.as_str(),
            reviewed_by = %update.reviewed_by,
            "Reviewed content version"
        );
        Ok(reviewed)
    }

    async fn store_schedule(
        &self,
        version: &ContentVersion,
        at: Option<Timestamp>,
    ) -> EngineResult<ContentVersion> {
        let _guard = self.locks.lock(LockKey::Content(version.content_id)).await;
        let updated = self
            .store
            .set_schedule(version.id, at)
            .await?
            .ok_or_else(|| CoreError::Validation(format!("Version {} is deleted", version.id)))?;
        match at {
            Some(at) => tracing::info!(
                content_id = %updated.content_id,
                version_id = %updated.id,
                scheduled_publish_at = %at,
                "Scheduled publication"
            ),
            None => tracing::info!(
                content_id = %updated.content_id,
                version_id = %updated.id,
                "Cancelled scheduled publication"
            ),
        }
        Ok(updated)
    }
}

fn ensure_not_deleted(version: &ContentVersion) -> Result<(), CoreError> {
    if version.is_deleted {
        return Err(CoreError::Validation(format!(
            "Version {} is deleted and cannot be published",
            version.id
        )));
    }
    Ok(())
}
