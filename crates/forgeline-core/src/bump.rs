//! Version bump calculation between two dependency snapshots.
//!
//! Given the old and new top-level dependency releases of a product branch,
//! computes the minimal bump the product's own version needs. Only one level
//! of the tree is compared; dependency releases are never unwound further.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use forgeline_state::{BranchProvider, CommitLog, Release, ReleaseStore};

use crate::error::Result;
use crate::version::{self, BumpAction, CommitActionClassifier, VersionSchema};

pub struct VersionBumpCalculator {
    releases: Arc<dyn ReleaseStore>,
    branches: Arc<dyn BranchProvider>,
    commits: Arc<dyn CommitLog>,
    classifier: Arc<dyn CommitActionClassifier>,
}

impl VersionBumpCalculator {
    pub fn new(
        releases: Arc<dyn ReleaseStore>,
        branches: Arc<dyn BranchProvider>,
        commits: Arc<dyn CommitLog>,
        classifier: Arc<dyn CommitActionClassifier>,
    ) -> Self {
        Self {
            releases,
            branches,
            commits,
            classifier,
        }
    }

    /// Largest bump action warranted by the change from `old` to `new`.
    ///
    /// `pinned` holds release uuids frozen by pinned dependency slots; they
    /// never influence the bump. Evaluation stops the instant a major bump is
    /// found, since nothing can exceed it.
    pub async fn largest_action(
        &self,
        pinned: &HashSet<Uuid>,
        old: &[Release],
        new: &[Release],
    ) -> Result<BumpAction> {
        let old_by_component = by_component(old, pinned);
        let new_by_component = by_component(new, pinned);

        let mut largest = BumpAction::Bump;
        if old_by_component.len() != new_by_component.len() {
            // A dependency appeared or disappeared.
            largest = BumpAction::BumpMinor;
        }

        for (component, new_release) in &new_by_component {
            let Some(old_release) = old_by_component.get(component) else {
                continue;
            };
            if old_release.uuid == new_release.uuid {
                continue;
            }
            if old_release.branch != new_release.branch {
                // A branch move is at least minor, but the version compare
                // below can still escalate it to major.
                largest = largest.max(BumpAction::BumpMinor);
            }
            let action = self.compare_releases(old_release, new_release).await?;
            largest = largest.max(action);
            if largest == BumpAction::BumpMajor {
                return Ok(BumpAction::BumpMajor);
            }
        }
        Ok(largest)
    }

    /// Bump for two releases of one component: positional numeric comparison
    /// when the new release's branch schema allows it, commit classification
    /// otherwise.
    async fn compare_releases(&self, old: &Release, new: &Release) -> Result<BumpAction> {
        let schema = self.schema_of_branch(new.branch).await?;
        if VersionSchema::is_numeric(&schema) {
            if let (Some(old_parts), Some(new_parts)) = (
                version::parse_numeric(&old.version),
                version::parse_numeric(&new.version),
            ) {
                return Ok(compare_numeric(&old_parts, &new_parts));
            }
        }
        self.classify_commits_between(old, new).await
    }

    async fn schema_of_branch(&self, branch: Uuid) -> Result<String> {
        Ok(self
            .branches
            .get(branch)
            .await?
            .map(|b| b.version_schema)
            .unwrap_or_default())
    }

    /// Classify every source commit strictly between two releases of a
    /// branch. The between-list spans both boundary releases; the oldest
    /// entry is dropped so the old release's own commits are not counted.
    async fn classify_commits_between(&self, old: &Release, new: &Release) -> Result<BumpAction> {
        let (from, to) = if old.created_at <= new.created_at {
            (old.created_at, new.created_at)
        } else {
            (new.created_at, old.created_at)
        };
        let mut between = self
            .releases
            .list_of_branch_between(new.branch, from, to)
            .await?;
        if between.len() > 1 {
            between.pop();
        }
        let commit_ids: Vec<Uuid> = between.iter().flat_map(|r| r.all_commits()).collect();
        let messages = self.commits.messages(&commit_ids).await?;

        let mut largest = BumpAction::Bump;
        for message in &messages {
            largest = largest.max(self.classifier.classify(message));
            if largest == BumpAction::BumpMajor {
                break;
            }
        }
        debug!(
            component = %new.component,
            commits = messages.len(),
            action = ?largest,
            "classified commit range"
        );
        Ok(largest)
    }
}

fn by_component<'a>(
    releases: &'a [Release],
    pinned: &HashSet<Uuid>,
) -> HashMap<Uuid, &'a Release> {
    releases
        .iter()
        .filter(|r| !pinned.contains(&r.uuid))
        .map(|r| (r.component, r))
        .collect()
}

/// Position-by-position numeric comparison: a difference at position 0 is
/// major, 1 is minor, anything later is patch.
fn compare_numeric(old: &[u64], new: &[u64]) -> BumpAction {
    let len = old.len().max(new.len());
    for position in 0..len {
        let o = old.get(position).copied().unwrap_or(0);
        let n = new.get(position).copied().unwrap_or(0);
        if o != n {
            return match position {
                0 => BumpAction::BumpMajor,
                1 => BumpAction::BumpMinor,
                _ => BumpAction::BumpPatch,
            };
        }
    }
    BumpAction::Bump
}
