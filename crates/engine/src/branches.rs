//! Branch creation and listing.

use verso_core::branching::{branch_message, validate_branch_name};
use verso_core::content::{Author, ChangeType};
use verso_core::error::CoreError;
use verso_core::types::DbId;
use verso_db::models::{BranchSummary, ContentVersion};

use crate::error::EngineResult;
use crate::locks::LockKey;
use crate::service::VersioningService;
use crate::versions::{CreateVersion, Lineage};

impl VersioningService {
    /// Fork `branch_name` off an existing version. The new branch starts at
    /// version 1 with a copy of the source payload.
    pub async fn create_branch(
        &self,
        source_version_id: DbId,
        branch_name: &str,
        author: Author,
    ) -> EngineResult<ContentVersion> {
        validate_branch_name(branch_name)?;
        let source = self.load(source_version_id).await?;
        if source.is_deleted {
            return Err(CoreError::Validation(format!(
                "Cannot branch from deleted version {source_version_id}"
            ))
            .into());
        }

        let _guard = self
            .locks
            .lock(LockKey::branch(source.content_id, branch_name))
            .await;

        if self
            .store
            .find_latest(source.content_id, branch_name, true)
            .await?
            .is_some()
        {
            return Err(CoreError::Conflict(format!(
                "Branch '{branch_name}' already exists for content {}",
                source.content_id
            ))
            .into());
        }

        let input = CreateVersion {
            content_id: source.content_id,
            content_type: source.content_type,
            branch: Some(branch_name.to_string()),
            payload: source.payload(),
            author,
            change_type: Some(ChangeType::Create),
            change_message: Some(branch_message(&source.branch_name, source.version)),
        };
        let lineage = Lineage {
            branched_from_id: Some(source.id),
            ..Default::default()
        };
        let created = self.append_version(input, branch_name, lineage).await?;

        tracing::info!(
            content_id = %source.content_id,
            branch = branch_name,
            from_branch = %source.branch_name,
            from_version = source.version,
            "Created branch"
        );
        Ok(created)
    }

    pub async fn list_branches(&self, content_id: DbId) -> EngineResult<Vec<BranchSummary>> {
        Ok(self.store.list_branches(content_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use verso_core::clock::FixedClock;
    use verso_core::content::{ContentPayload, ContentType};
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

    async fn seed(svc: &VersioningService) -> ContentVersion {
        svc.create_version(CreateVersion {
            content_id: new_id(),
            content_type: ContentType::Page,
            branch: None,
            payload: ContentPayload {
                title: "About".to_string(),
                slug: "about".to_string(),
                content: "Hello".to_string(),
                front_matter: json!({}),
                metadata: json!({}),
            },
            author: author(),
            change_type: None,
            change_message: None,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn branch_starts_at_version_one_with_source_payload() {
        let svc = service();
        let main = seed(&svc).await;

        let draft = svc.create_branch(main.id, "draft", author()).await.unwrap();
        assert_eq!(draft.version, 1);
        assert_eq!(draft.branch_name, "draft");
        assert_eq!(draft.content, main.content);
        assert_eq!(draft.hash, main.hash);
        assert_eq!(draft.content_type, ContentType::Page);
        assert_eq!(draft.change_type, ChangeType::Create);
        assert_eq!(draft.branched_from_id, Some(main.id));
        assert_eq!(draft.change_message.as_deref(), Some("Branched from main v1"));
        assert!(draft.previous_version_id.is_none());
    }

    #[tokio::test]
    async fn duplicate_branch_is_a_conflict() {
        let svc = service();
        let main = seed(&svc).await;
        svc.create_branch(main.id, "draft", author()).await.unwrap();

        let err = svc.create_branch(main.id, "draft", author()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = svc.create_branch(main.id, "main", author()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn invalid_name_is_rejected() {
        let svc = service();
        let main = seed(&svc).await;
        let err = svc.create_branch(main.id, "My Branch", author()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn list_branches_reports_each_branch() {
        let svc = service();
        let main = seed(&svc).await;
        svc.create_branch(main.id, "draft", author()).await.unwrap();

        let branches = svc.list_branches(main.content_id).await.unwrap();
        let names: Vec<&str> = branches.iter().map(|b| b.branch_name.as_str()).collect();
        assert_eq!(names, vec!["draft", "main"]);
    }
}
