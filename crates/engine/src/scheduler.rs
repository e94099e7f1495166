//! Scheduled publication and retention passes, plus the background loops
//! that drive them.
//!
//! Both passes isolate failures per item: one bad version or content item is
//! logged and reported, and the pass moves on. Cancellation is checked
//! between items, so an in-flight item always completes.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use verso_core::retention::{select_for_deletion, RetentionCandidate, RetentionPolicy};
use verso_core::types::DbId;

use crate::error::EngineResult;
use crate::locks::LockKey;
use crate::service::VersioningService;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of publishing one due version.
#[derive(Debug, Clone, Serialize)]
pub struct PublicationResult {
    pub version_id: DbId,
    pub content_id: DbId,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PublicationRunReport {
    pub results: Vec<PublicationResult>,
    /// Due versions left untouched because the run was cancelled.
    pub skipped: usize,
}

impl PublicationRunReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

/// Outcome of sweeping one content item.
#[derive(Debug, Clone, Serialize)]
pub struct RetentionResult {
    pub content_id: DbId,
    pub deleted: u64,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionRunReport {
    pub results: Vec<RetentionResult>,
    pub skipped: usize,
}

impl RetentionRunReport {
    pub fn versions_deleted(&self) -> u64 {
        self.results.iter().map(|r| r.deleted).sum()
    }
}

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

impl VersioningService {
    /// Publish every non-deleted, unpublished version whose schedule is due.
    pub async fn process_scheduled_publications(&self) -> EngineResult<PublicationRunReport> {
        self.process_scheduled_publications_until(&CancellationToken::new())
            .await
    }

    /// As [`Self::process_scheduled_publications`], stopping before the next
    /// item once `cancel` fires.
    pub async fn process_scheduled_publications_until(
        &self,
        cancel: &CancellationToken,
    ) -> EngineResult<PublicationRunReport> {
        let due = self.store.list_due_scheduled(self.now()).await?;
        let mut report = PublicationRunReport::default();

        for (index, version) in due.iter().enumerate() {
            if cancel.is_cancelled() {
                report.skipped = due.len() - index;
                tracing::info!(skipped = report.skipped, "Scheduled publication run cancelled");
                break;
            }
            let result = match self.publish_if_due(version.id, version.content_id).await {
                Ok(Some(_)) => PublicationResult {
                    version_id: version.id,
                    content_id: version.content_id,
                    success: true,
                    error: None,
                },
                Ok(None) => PublicationResult {
                    version_id: version.id,
                    content_id: version.content_id,
                    success: false,
                    error: Some("Schedule changed before publication".to_string()),
                },
                Err(e) => {
                    tracing::warn!(
                        version_id = %version.id,
                        content_id = %version.content_id,
                        error = %e,
                        "Scheduled publication failed"
                    );
                    PublicationResult {
                        version_id: version.id,
                        content_id: version.content_id,
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            report.results.push(result);
        }

        if !report.results.is_empty() {
            tracing::info!(
                succeeded = report.succeeded(),
                failed = report.failed(),
                "Processed scheduled publications"
            );
        }
        Ok(report)
    }

    /// Hard-delete superseded versions of every content item per `policy`.
    pub async fn cleanup_old_versions(
        &self,
        policy: &RetentionPolicy,
    ) -> EngineResult<RetentionRunReport> {
        self.cleanup_old_versions_until(policy, &CancellationToken::new())
            .await
    }

    pub async fn cleanup_old_versions_until(
        &self,
        policy: &RetentionPolicy,
        cancel: &CancellationToken,
    ) -> EngineResult<RetentionRunReport> {
        policy.validate()?;
        let content_ids = self.store.list_content_ids().await?;
        let mut report = RetentionRunReport::default();

        for (index, content_id) in content_ids.iter().copied().enumerate() {
            if cancel.is_cancelled() {
                report.skipped = content_ids.len() - index;
                tracing::info!(skipped = report.skipped, "Retention run cancelled");
                break;
            }
            let result = match self.sweep_content(content_id, policy).await {
                Ok(deleted) => RetentionResult {
                    content_id,
                    deleted,
                    success: true,
                    error: None,
                },
                Err(e) => {
                    tracing::error!(content_id = %content_id, error = %e, "Retention sweep failed");
                    RetentionResult {
                        content_id,
                        deleted: 0,
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            report.results.push(result);
        }

        let deleted = report.versions_deleted();
        if deleted > 0 {
            tracing::info!(deleted, contents = report.results.len(), "Retention: purged old versions");
        } else {
            tracing::debug!("Retention: no versions to purge");
        }
        Ok(report)
    }

    /// The content lock keeps a concurrent publish from landing on a version
    /// this sweep has already selected.
    async fn sweep_content(&self, content_id: DbId, policy: &RetentionPolicy) -> EngineResult<u64> {
        let _guard = self.locks.lock(LockKey::Content(content_id)).await;
        let versions = self.store.list_all_versions(content_id).await?;
        let candidates: Vec<RetentionCandidate> = versions
            .into_iter()
            .map(|v| RetentionCandidate {
                id: v.id,
                branch_name: v.branch_name,
                version: v.version,
                created_at: v.created_at,
                is_published: v.is_published,
                branched_from_id: v.branched_from_id,
                merged_from_id: v.merged_from_id,
            })
            .collect();

        let doomed = select_for_deletion(&candidates, policy, self.now())?;
        if doomed.is_empty() {
            return Ok(0);
        }
        let deleted = self.store.hard_delete(&doomed).await?;
        tracing::debug!(content_id = %content_id, deleted, "Retention: swept content item");
        Ok(deleted)
    }
}

// ---------------------------------------------------------------------------
// Background loops
// ---------------------------------------------------------------------------

/// Default period between scheduled publication scans.
pub const DEFAULT_SCHEDULER_INTERVAL: Duration = Duration::from_secs(60);

/// Default period between retention sweeps.
pub const DEFAULT_RETENTION_INTERVAL: Duration = Duration::from_secs(86_400);

/// Periodically publishes due scheduled versions.
pub struct PublicationScheduler {
    service: Arc<VersioningService>,
    interval: Duration,
    running: Mutex<()>,
}

impl PublicationScheduler {
    pub fn new(service: Arc<VersioningService>, interval: Duration) -> Self {
        Self {
            service,
            interval,
            running: Mutex::new(()),
        }
    }

    /// Run until `cancel` is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Publication scheduler started");
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Publication scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.run_once(&cancel).await;
                }
            }
        }
    }

    /// One scan. Returns `None` without scanning if another scan is still in
    /// progress or the scan itself could not start.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Option<PublicationRunReport> {
        let Ok(_running) = self.running.try_lock() else {
            tracing::warn!("Previous scheduled publication scan still running, skipping");
            return None;
        };
        match self.service.process_scheduled_publications_until(cancel).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(error = %e, "Failed to process scheduled publications");
                None
            }
        }
    }
}

/// Periodically hard-deletes superseded versions.
pub struct RetentionSweeper {
    service: Arc<VersioningService>,
    policy: RetentionPolicy,
    interval: Duration,
    running: Mutex<()>,
}

impl RetentionSweeper {
    pub fn new(service: Arc<VersioningService>, policy: RetentionPolicy, interval: Duration) -> Self {
        Self {
            service,
            policy,
            interval,
            running: Mutex::new(()),
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            keep_versions = self.policy.keep_versions,
            older_than_days = self.policy.older_than_days,
            keep_published = self.policy.keep_published,
            interval_secs = self.interval.as_secs(),
            "Retention sweeper started"
        );
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Retention sweeper stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.run_once(&cancel).await;
                }
            }
        }
    }

    pub async fn run_once(&self, cancel: &CancellationToken) -> Option<RetentionRunReport> {
        let Ok(_running) = self.running.try_lock() else {
            tracing::warn!("Previous retention sweep still running, skipping");
            return None;
        };
        match self
            .service
            .cleanup_old_versions_until(&self.policy, cancel)
            .await
        {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(error = %e, "Retention sweep failed to start");
                None
            }
        }
    }
}
