//! Keyed async mutexes serializing read-latest-then-write sections.
//!
//! Each key maps to its own `tokio::sync::Mutex`, created lazily. Entries
//! nobody holds or waits on are dropped on the next acquisition so the
//! registry stays proportional to in-flight work.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;
use verso_core::types::DbId;

/// What a lock protects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey {
    /// Version numbering on one branch of one content item.
    Branch { content_id: DbId, branch: String },
    /// The published flag of one content item.
    Content(DbId),
}

impl LockKey {
    pub fn branch(content_id: DbId, branch: &str) -> Self {
        Self::Branch {
            content_id,
            branch: branch.to_string(),
        }
    }
}

#[derive(Default)]
pub struct KeyedLocks {
    entries: Mutex<HashMap<LockKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. The lock is released when the
    /// returned guard drops.
    pub async fn lock(&self, key: LockKey) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.retain(|k, m| k == &key || Arc::strong_count(m) > 1);
            Arc::clone(entries.entry(key).or_default())
        };
        mutex.lock_owned().await
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let id = uuid::Uuid::now_v7();
        let guard = locks.lock(LockKey::branch(id, "main")).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.lock(LockKey::branch(id, "main")).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let id = uuid::Uuid::now_v7();
        let _main = locks.lock(LockKey::branch(id, "main")).await;
        let _draft = locks.lock(LockKey::branch(id, "draft")).await;
        let _content = locks.lock(LockKey::Content(id)).await;
        assert_eq!(locks.len(), 3);
    }

    #[tokio::test]
    async fn released_keys_are_pruned() {
        let locks = KeyedLocks::new();
        for _ in 0..5 {
            let _g = locks.lock(LockKey::Content(uuid::Uuid::now_v7())).await;
        }
        let _last = locks.lock(LockKey::Content(uuid::Uuid::now_v7())).await;
        assert_eq!(locks.len(), 1);
    }
}
