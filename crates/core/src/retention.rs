//! Retention policy for superseded versions.
//!
//! Selection is a pure function over one content item's versions so the
//! sweep can run the same rules against any store.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

/// Default number of most recent versions kept per content item.
pub const DEFAULT_KEEP_VERSIONS: usize = 20;

/// Default age (days) under which every version is kept.
pub const DEFAULT_OLDER_THAN_DAYS: i64 = 90;

/// Upper bound for `older_than_days` (100 years).
pub const MAX_OLDER_THAN_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub keep_versions: usize,
    pub older_than_days: i64,
    pub keep_published: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_versions: DEFAULT_KEEP_VERSIONS,
            older_than_days: DEFAULT_OLDER_THAN_DAYS,
            keep_published: true,
        }
    }
}

impl RetentionPolicy {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(0..=MAX_OLDER_THAN_DAYS).contains(&self.older_than_days) {
            return Err(CoreError::Validation(format!(
                "older_than_days must be between 0 and {MAX_OLDER_THAN_DAYS}, got {}",
                self.older_than_days
            )));
        }
        Ok(())
    }

    /// Versions created before this instant are eligible for deletion.
    pub fn cutoff(&self, now: Timestamp) -> Result<Timestamp, CoreError> {
        chrono::Duration::try_days(self.older_than_days)
            .and_then(|age| now.checked_sub_signed(age))
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "older_than_days {} is out of range",
                    self.older_than_days
                ))
            })
    }
}

/// The fields of a version the sweep needs to decide its fate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionCandidate {
    pub id: DbId,
    pub branch_name: String,
    pub version: i32,
    pub created_at: Timestamp,
    pub is_published: bool,
    pub branched_from_id: Option<DbId>,
    pub merged_from_id: Option<DbId>,
}

/// Pick the versions of one content item to hard-delete.
///
/// Kept: the `keep_versions` most recent, anything at or after the cutoff,
/// the published version (if `keep_published`), and the tip of every branch.
/// Merge bases also survive: the first version of every forked branch and
/// the version it was forked from, plus the newest merge between each pair
/// of branches and the version it merged in.
pub fn select_for_deletion(
    candidates: &[RetentionCandidate],
    policy: &RetentionPolicy,
    now: Timestamp,
) -> Result<Vec<DbId>, CoreError> {
    let cutoff = policy.cutoff(now)?;

    let mut newest_first: Vec<&RetentionCandidate> = candidates.iter().collect();
    newest_first.sort_by(|a, b| {
        (b.created_at, b.version, b.id).cmp(&(a.created_at, a.version, a.id))
    });

    let mut retained: HashSet<DbId> = newest_first
        .iter()
        .take(policy.keep_versions)
        .map(|c| c.id)
        .collect();

    let mut tips: HashMap<&str, &RetentionCandidate> = HashMap::new();
    for candidate in candidates {
        tips.entry(candidate.branch_name.as_str())
            .and_modify(|tip| {
                if candidate.version > tip.version {
                    *tip = candidate;
                }
            })
            .or_insert(candidate);
    }
    retained.extend(tips.values().map(|c| c.id));

    for candidate in candidates {
        if candidate.created_at >= cutoff || (policy.keep_published && candidate.is_published) {
            retained.insert(candidate.id);
        }
    }

    retained.extend(merge_bases(candidates));

    Ok(newest_first
        .into_iter()
        .filter(|c| !retained.contains(&c.id) && c.created_at < cutoff)
        .map(|c| c.id)
        .collect())
}

/// Versions that merge-base resolution reads.
fn merge_bases(candidates: &[RetentionCandidate]) -> HashSet<DbId> {
    let by_id: HashMap<DbId, &RetentionCandidate> =
        candidates.iter().map(|c| (c.id, c)).collect();
    let mut bases = HashSet::new();

    for candidate in candidates {
        if let (1, Some(fork)) = (candidate.version, candidate.branched_from_id) {
            bases.insert(candidate.id);
            bases.insert(fork);
        }
    }

    // Newest merge per (target branch, source branch).
    let mut merges: HashMap<(&str, &str), &RetentionCandidate> = HashMap::new();
    for candidate in candidates {
        let Some(source) = candidate.merged_from_id.and_then(|id| by_id.get(&id)) else {
            continue;
        };
        merges
            .entry((candidate.branch_name.as_str(), source.branch_name.as_str()))
            .and_modify(|newest| {
                if (candidate.created_at, candidate.id) > (newest.created_at, newest.id) {
                    *newest = candidate;
                }
            })
            .or_insert(candidate);
    }
    for merge in merges.values() {
        bases.insert(merge.id);
        bases.extend(merge.merged_from_id);
    }

    bases
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
    }

    fn history(n: i32, branch: &str, age_days: i64) -> Vec<RetentionCandidate> {
        (1..=n)
            .map(|v| RetentionCandidate {
                id: uuid::Uuid::new_v4(),
                branch_name: branch.to_string(),
                version: v,
                created_at: now() - Duration::days(age_days) + Duration::minutes(v as i64),
                is_published: false,
                branched_from_id: None,
                merged_from_id: None,
            })
            .collect()
    }

    fn versions_of(candidates: &[RetentionCandidate], ids: &[DbId]) -> Vec<i32> {
        let mut v: Vec<i32> = candidates
            .iter()
            .filter(|c| ids.contains(&c.id))
            .map(|c| c.version)
            .collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn keeps_most_recent_and_deletes_rest() {
        let versions = history(10, "main", 30);
        let policy = RetentionPolicy {
            keep_versions: 3,
            older_than_days: 0,
            keep_published: true,
        };
        let doomed = select_for_deletion(&versions, &policy, now()).unwrap();
        assert_eq!(versions_of(&versions, &doomed), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn keeps_published_version() {
        let mut versions = history(10, "main", 30);
        versions[1].is_published = true;
        let policy = RetentionPolicy {
            keep_versions: 3,
            older_than_days: 0,
            keep_published: true,
        };
        let doomed = select_for_deletion(&versions, &policy, now()).unwrap();
        assert_eq!(versions_of(&versions, &doomed), vec![1, 3, 4, 5, 6, 7]);

        let policy = RetentionPolicy {
            keep_published: false,
            ..policy
        };
        let doomed = select_for_deletion(&versions, &policy, now()).unwrap();
        assert!(versions_of(&versions, &doomed).contains(&2));
    }

    #[test]
    fn keeps_everything_newer_than_cutoff() {
        let versions = history(10, "main", 5);
        let policy = RetentionPolicy {
            keep_versions: 1,
            older_than_days: 30,
            keep_published: true,
        };
        assert!(select_for_deletion(&versions, &policy, now()).unwrap().is_empty());
    }

    #[test]
    fn keeps_tip_of_every_branch() {
        let mut versions = history(6, "main", 30);
        versions.extend(history(2, "draft", 60));
        let policy = RetentionPolicy {
            keep_versions: 2,
            older_than_days: 0,
            keep_published: true,
        };
        let doomed = select_for_deletion(&versions, &policy, now()).unwrap();
        let draft_tip = versions
            .iter()
            .find(|c| c.branch_name == "draft" && c.version == 2)
            .unwrap();
        assert!(!doomed.contains(&draft_tip.id));
        assert_eq!(doomed.len(), 5);
    }

    #[test]
    fn negative_age_is_rejected() {
        let policy = RetentionPolicy {
            older_than_days: -1,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn oversized_age_is_rejected_without_panicking() {
        let policy = RetentionPolicy {
            keep_versions: 3,
            older_than_days: 1_000_000_000_000,
            keep_published: true,
        };
        assert!(policy.validate().is_err());
        assert!(policy.cutoff(now()).is_err());
        assert!(select_for_deletion(&history(3, "main", 30), &policy, now()).is_err());

        let policy = RetentionPolicy {
            older_than_days: MAX_OLDER_THAN_DAYS,
            ..policy
        };
        assert!(policy.validate().is_ok());
        assert!(policy.cutoff(now()).is_ok());
    }

    #[test]
    fn keeps_fork_points_and_latest_merge() {
        let mut versions = history(6, "main", 30);
        let fork = versions[0].id;
        let mut draft = history(4, "draft", 30);
        draft[0].branched_from_id = Some(fork);
        // draft v3 merged main v4 in; draft v4 merged main v5 in.
        draft[2].merged_from_id = Some(versions[3].id);
        draft[3].merged_from_id = Some(versions[4].id);
        let older_merge = draft[2].id;
        let merged_in = versions[4].id;
        let draft_v1 = draft[0].id;
        versions.extend(draft);

        let policy = RetentionPolicy {
            keep_versions: 0,
            older_than_days: 0,
            keep_published: true,
        };
        let doomed = select_for_deletion(&versions, &policy, now()).unwrap();
        assert!(!doomed.contains(&fork));
        assert!(!doomed.contains(&draft_v1));
        assert!(!doomed.contains(&merged_in));
        assert!(doomed.contains(&older_merge));
    }
}
