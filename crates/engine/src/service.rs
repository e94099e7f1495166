use std::sync::Arc;

use verso_core::clock::{Clock, SystemClock};
use verso_core::error::CoreError;
use verso_core::types::{DbId, Timestamp};
use verso_db::models::ContentVersion;
use verso_db::VersionStore;

use crate::error::EngineResult;
use crate::locks::KeyedLocks;

/// Entry point for every versioning operation.
///
/// Holds the store, the clock, and the keyed locks that serialize version
/// numbering per branch and publication per content item. Share it behind an
/// `Arc` between callers and the background loops.
pub struct VersioningService {
    pub(crate) store: Arc<dyn VersionStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) locks: KeyedLocks,
}

impl VersioningService {
    pub fn new(store: Arc<dyn VersionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            locks: KeyedLocks::new(),
        }
    }

    /// Service reading wall-clock time.
    pub fn with_system_clock(store: Arc<dyn VersionStore>) -> Self {
        Self::new(store, Arc::new(SystemClock))
    }

    pub fn store(&self) -> &Arc<dyn VersionStore> {
        &self.store
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Load a version or fail with `NotFound`. Soft-deleted rows are returned.
    pub(crate) async fn load(&self, id: DbId) -> EngineResult<ContentVersion> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("ContentVersion", id).into())
    }
}
