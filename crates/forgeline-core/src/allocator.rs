//! Race-free version allocation.
//!
//! `allocate` holds an exclusive async lock keyed by (branch, version-type)
//! across the read-compute-persist critical section, so two concurrent
//! callers for the same branch and version line never receive the same
//! version string. A lost race against an externally supplied version still
//! surfaces as a storage uniqueness violation, never a silent overwrite.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;
use uuid::Uuid;

use forgeline_state::{
    AssignmentType, BranchProvider, ComponentProvider, Release, VersionAssignment,
    VersionAssignmentStore, VersionType,
};

use crate::error::{EngineError, Result};
use crate::version::{self, BumpAction};

pub struct VersionAllocator {
    assignments: Arc<dyn VersionAssignmentStore>,
    branches: Arc<dyn BranchProvider>,
    components: Arc<dyn ComponentProvider>,
    /// One entry per (branch, version line) ever allocated on; entries are
    /// never evicted, so the map is bounded by the number of live branches.
    locks: StdMutex<HashMap<(Uuid, VersionType), Arc<AsyncMutex<()>>>>,
}

impl VersionAllocator {
    pub fn new(
        assignments: Arc<dyn VersionAssignmentStore>,
        branches: Arc<dyn BranchProvider>,
        components: Arc<dyn ComponentProvider>,
    ) -> Self {
        Self {
            assignments,
            branches,
            components,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, branch: Uuid, version_type: VersionType) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry((branch, version_type))
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Issue the next version for a branch and version line.
    ///
    /// An existing OPEN assignment is consumed first (it becomes the
    /// allocation). Otherwise the next version is computed from the branch's
    /// schema (the component's when the branch declares none) and the latest
    /// assignment, then persisted as RESERVED.
    pub async fn allocate(
        &self,
        branch_id: Uuid,
        version_type: VersionType,
        action: BumpAction,
    ) -> Result<VersionAssignment> {
        let lock = self.lock_for(branch_id, version_type);
        let _guard = lock.lock().await;

        let branch = self
            .branches
            .get(branch_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                kind: "branch",
                id: branch_id.to_string(),
            })?;

        if let Some(mut open) = self.assignments.open_of_branch(branch_id, version_type).await? {
            open.assignment_type = AssignmentType::Reserved;
            let consumed = self.assignments.save(open).await?;
            debug!(branch = %branch_id, version = %consumed.version, "consumed open assignment");
            return Ok(consumed);
        }

        let schema = if branch.version_schema.is_empty() {
            self.components
                .get(branch.component)
                .await?
                .map(|c| c.version_schema)
                .ok_or_else(|| EngineError::NotFound {
                    kind: "component",
                    id: branch.component.to_string(),
                })?
        } else {
            branch.version_schema.clone()
        };

        let last = self
            .assignments
            .latest_of_branch(branch_id, version_type)
            .await?;
        let next = version::next_version(&schema, last.as_ref().map(|a| a.version.as_str()), action, Utc::now())?;
        let assignment = VersionAssignment::reserved(
            branch.org,
            branch_id,
            branch.component,
            &next,
            version_type,
        );
        let saved = self.assignments.save(assignment).await?;
        debug!(branch = %branch_id, version = %saved.version, ?action, "allocated version");
        Ok(saved)
    }

    /// Bind a version to its release the moment the release exists.
    ///
    /// Marks the matching assignment ASSIGNED, creating one when the version
    /// was supplied externally and never passed through `allocate`.
    pub async fn bind(&self, release: &Release, version_type: VersionType) -> Result<VersionAssignment> {
        let existing = self
            .assignments
            .find_by_component_and_version(release.component, &release.version, version_type)
            .await?;
        let mut assignment = match existing {
            Some(a) => a,
            None => VersionAssignment::reserved(
                release.org,
                release.branch,
                release.component,
                &release.version,
                version_type,
            ),
        };
        assignment.assignment_type = AssignmentType::Assigned;
        assignment.release = Some(release.uuid);
        Ok(self.assignments.save(assignment).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use forgeline_state::fakes::{
        MemoryBranchProvider, MemoryComponentProvider, MemoryVersionAssignmentStore,
    };
    use forgeline_state::{BranchRecord, BranchType, ComponentRecord};

    struct World {
        allocator: Arc<VersionAllocator>,
        assignments: Arc<MemoryVersionAssignmentStore>,
        branch: Uuid,
    }

    async fn world(schema: &str) -> World {
        let assignments = Arc::new(MemoryVersionAssignmentStore::new());
        let branches = Arc::new(MemoryBranchProvider::new());
        let components = Arc::new(MemoryComponentProvider::new());
        let org = Uuid::new_v4();
        let component = components.add(ComponentRecord::new(org, "svc", "semver"));
        let mut branch = BranchRecord::new("main", component.uuid, org, BranchType::Base);
        branch.version_schema = schema.to_string();
        let branch = branches.save(branch).await.unwrap();
        let allocator = Arc::new(VersionAllocator::new(
            assignments.clone(),
            branches,
            components,
        ));
        World {
            allocator,
            assignments,
            branch: branch.uuid,
        }
    }

    #[tokio::test]
    async fn sequential_allocations_advance_the_version() {
        let w = world("semver").await;
        let first = w
            .allocator
            .allocate(w.branch, VersionType::Dev, BumpAction::Bump)
            .await
            .unwrap();
        assert_eq!(first.version, "0.1.0");
        let second = w
            .allocator
            .allocate(w.branch, VersionType::Dev, BumpAction::BumpMinor)
            .await
            .unwrap();
        assert_eq!(second.version, "0.2.0");
    }

    #[tokio::test]
    async fn empty_branch_schema_falls_back_to_component() {
        let w = world("").await;
        let first = w
            .allocator
            .allocate(w.branch, VersionType::Dev, BumpAction::Bump)
            .await
            .unwrap();
        assert_eq!(first.version, "0.1.0");
    }

    #[tokio::test]
    async fn open_assignment_is_consumed_first() {
        let w = world("semver").await;
        let seeded = w
            .allocator
            .allocate(w.branch, VersionType::Dev, BumpAction::Bump)
            .await
            .unwrap();
        let mut open = seeded.clone();
        open.uuid = Uuid::new_v4();
        open.version = "5.0.0".to_string();
        open.assignment_type = AssignmentType::Open;
        w.assignments.save(open).await.unwrap();

        let next = w
            .allocator
            .allocate(w.branch, VersionType::Dev, BumpAction::BumpMajor)
            .await
            .unwrap();
        assert_eq!(next.version, "5.0.0");
        assert_eq!(next.assignment_type, AssignmentType::Reserved);
    }

    #[tokio::test]
    async fn concurrent_allocations_never_collide() {
        let w = world("semver").await;
        let mut handles = Vec::new();
        for _ in 0..32 {
            let allocator = w.allocator.clone();
            let branch = w.branch;
            handles.push(tokio::spawn(async move {
                allocator
                    .allocate(branch, VersionType::Dev, BumpAction::Bump)
                    .await
                    .unwrap()
                    .version
            }));
        }
        let mut seen = HashSet::new();
        for handle in handles {
            let version = handle.await.unwrap();
            assert!(seen.insert(version), "duplicate version issued");
        }
        assert_eq!(seen.len(), 32);
    }

    #[tokio::test]
    async fn bind_marks_the_assignment_assigned() {
        let w = world("semver").await;
        let allocated = w
            .allocator
            .allocate(w.branch, VersionType::Dev, BumpAction::Bump)
            .await
            .unwrap();
        let release = Release::new(
            allocated.component,
            allocated.branch,
            allocated.org,
            &allocated.version,
        );
        let bound = w.allocator.bind(&release, VersionType::Dev).await.unwrap();
        assert_eq!(bound.assignment_type, AssignmentType::Assigned);
        assert_eq!(bound.release, Some(release.uuid));
        assert_eq!(bound.uuid, allocated.uuid);
    }
}
