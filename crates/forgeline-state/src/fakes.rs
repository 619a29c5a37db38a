//! In-memory fakes for the storage traits (testing only)
//!
//! `MemoryReleaseStore`, `MemoryBranchProvider`, `MemoryComponentProvider`,
//! `MemoryVersionAssignmentStore`, `StaticCommitLog`, and `MemoryAuditLog`
//! satisfy the trait contracts without any external dependencies, including
//! the uniqueness guarantees a real backend must enforce.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::model::*;
use crate::stores::*;

// ---------------------------------------------------------------------------
// MemoryReleaseStore
// ---------------------------------------------------------------------------

/// In-memory release store backed by an insertion-ordered `Vec<Release>`.
#[derive(Debug, Default)]
pub struct MemoryReleaseStore {
    releases: Mutex<Vec<Release>>,
}

impl MemoryReleaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored releases, insertion order. Test inspection helper.
    pub fn all(&self) -> Vec<Release> {
        self.releases.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReleaseStore for MemoryReleaseStore {
    async fn get(&self, id: Uuid) -> StorageResult<Option<Release>> {
        let releases = self.releases.lock().unwrap();
        Ok(releases.iter().find(|r| r.uuid == id).cloned())
    }

    async fn find_by_component_and_version(
        &self,
        component: Uuid,
        version: &str,
    ) -> StorageResult<Option<Release>> {
        let releases = self.releases.lock().unwrap();
        Ok(releases
            .iter()
            .find(|r| r.component == component && r.version == version)
            .cloned())
    }

    async fn latest_of_branch(
        &self,
        branch: Uuid,
        min_lifecycle: Option<Lifecycle>,
    ) -> StorageResult<Option<Release>> {
        let releases = self.releases.lock().unwrap();
        Ok(releases
            .iter()
            .filter(|r| r.branch == branch)
            .filter(|r| min_lifecycle.map(|min| r.lifecycle >= min).unwrap_or(true))
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn list_of_branch_between(
        &self,
        branch: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Release>> {
        let releases = self.releases.lock().unwrap();
        let mut out: Vec<Release> = releases
            .iter()
            .filter(|r| r.branch == branch && r.created_at >= from && r.created_at <= to)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn find_products_with_parent(
        &self,
        org: Uuid,
        release: Uuid,
    ) -> StorageResult<Vec<Release>> {
        let releases = self.releases.lock().unwrap();
        Ok(releases
            .iter()
            .filter(|r| r.org == org && r.has_parent(release))
            .cloned()
            .collect())
    }

    async fn insert(&self, release: Release) -> StorageResult<Release> {
        let mut releases = self.releases.lock().unwrap();
        if releases
            .iter()
            .any(|r| r.component == release.component && r.version == release.version)
        {
            return Err(StorageError::DuplicateVersion {
                component: release.component.to_string(),
                version: release.version.clone(),
            });
        }
        releases.push(release.clone());
        Ok(release)
    }

    async fn update(&self, release: Release) -> StorageResult<Release> {
        let mut releases = self.releases.lock().unwrap();
        let slot = releases
            .iter_mut()
            .find(|r| r.uuid == release.uuid)
            .ok_or_else(|| StorageError::NotFound {
                kind: "release",
                id: release.uuid.to_string(),
            })?;
        *slot = release.clone();
        Ok(release)
    }
}

// ---------------------------------------------------------------------------
// MemoryBranchProvider
// ---------------------------------------------------------------------------

/// In-memory branch store backed by a `HashMap<Uuid, BranchRecord>`.
#[derive(Debug, Default)]
pub struct MemoryBranchProvider {
    branches: Mutex<HashMap<Uuid, BranchRecord>>,
}

impl MemoryBranchProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BranchProvider for MemoryBranchProvider {
    async fn get(&self, id: Uuid) -> StorageResult<Option<BranchRecord>> {
        let branches = self.branches.lock().unwrap();
        Ok(branches.get(&id).cloned())
    }

    async fn find_by_child_component_and_branch(
        &self,
        org: Uuid,
        component: Uuid,
        branch: Uuid,
    ) -> StorageResult<Vec<BranchRecord>> {
        let branches = self.branches.lock().unwrap();
        Ok(branches
            .values()
            .filter(|b| b.org == org && !b.archived)
            .filter(|b| {
                b.dependencies
                    .iter()
                    .any(|d| d.component == component && d.branch == Some(branch))
            })
            .cloned()
            .collect())
    }

    async fn find_with_dependency_patterns(&self, org: Uuid) -> StorageResult<Vec<BranchRecord>> {
        let branches = self.branches.lock().unwrap();
        Ok(branches
            .values()
            .filter(|b| b.org == org && !b.archived && !b.dependency_patterns.is_empty())
            .cloned()
            .collect())
    }

    async fn base_branch_of_component(
        &self,
        component: Uuid,
    ) -> StorageResult<Option<BranchRecord>> {
        let branches = self.branches.lock().unwrap();
        Ok(branches
            .values()
            .find(|b| b.component == component && b.branch_type == BranchType::Base && !b.archived)
            .cloned())
    }

    async fn find_by_component_and_name(
        &self,
        component: Uuid,
        name: &str,
    ) -> StorageResult<Option<BranchRecord>> {
        let branches = self.branches.lock().unwrap();
        Ok(branches
            .values()
            .find(|b| b.component == component && b.name == name)
            .cloned())
    }

    async fn save(&self, branch: BranchRecord) -> StorageResult<BranchRecord> {
        let mut branches = self.branches.lock().unwrap();
        branches.insert(branch.uuid, branch.clone());
        Ok(branch)
    }
}

// ---------------------------------------------------------------------------
// MemoryComponentProvider
// ---------------------------------------------------------------------------

/// In-memory component store backed by a `HashMap<Uuid, ComponentRecord>`.
#[derive(Debug, Default)]
pub struct MemoryComponentProvider {
    components: Mutex<HashMap<Uuid, ComponentRecord>>,
}

impl MemoryComponentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, component: ComponentRecord) -> ComponentRecord {
        let mut components = self.components.lock().unwrap();
        components.insert(component.uuid, component.clone());
        component
    }
}

#[async_trait]
impl ComponentProvider for MemoryComponentProvider {
    async fn get(&self, id: Uuid) -> StorageResult<Option<ComponentRecord>> {
        let components = self.components.lock().unwrap();
        Ok(components.get(&id).cloned())
    }

    async fn list_by_org(&self, org: Uuid) -> StorageResult<Vec<ComponentRecord>> {
        let components = self.components.lock().unwrap();
        let mut out: Vec<ComponentRecord> = components
            .values()
            .filter(|c| c.org == org)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// MemoryVersionAssignmentStore
// ---------------------------------------------------------------------------

/// In-memory assignment store backed by an insertion-ordered vec, so that
/// "latest" is deterministic even for same-instant rows.
#[derive(Debug, Default)]
pub struct MemoryVersionAssignmentStore {
    assignments: Mutex<Vec<VersionAssignment>>,
}

impl MemoryVersionAssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<VersionAssignment> {
        self.assignments.lock().unwrap().clone()
    }
}

#[async_trait]
impl VersionAssignmentStore for MemoryVersionAssignmentStore {
    async fn find_by_component_and_version(
        &self,
        component: Uuid,
        version: &str,
        version_type: VersionType,
    ) -> StorageResult<Option<VersionAssignment>> {
        let assignments = self.assignments.lock().unwrap();
        Ok(assignments
            .iter()
            .find(|a| {
                a.component == component && a.version == version && a.version_type == version_type
            })
            .cloned())
    }

    async fn latest_of_branch(
        &self,
        branch: Uuid,
        version_type: VersionType,
    ) -> StorageResult<Option<VersionAssignment>> {
        let assignments = self.assignments.lock().unwrap();
        Ok(assignments
            .iter()
            .filter(|a| a.branch == branch && a.version_type == version_type)
            .last()
            .cloned())
    }

    async fn open_of_branch(
        &self,
        branch: Uuid,
        version_type: VersionType,
    ) -> StorageResult<Option<VersionAssignment>> {
        let assignments = self.assignments.lock().unwrap();
        Ok(assignments
            .iter()
            .find(|a| {
                a.branch == branch
                    && a.version_type == version_type
                    && a.assignment_type == AssignmentType::Open
            })
            .cloned())
    }

    async fn save(&self, assignment: VersionAssignment) -> StorageResult<VersionAssignment> {
        let mut assignments = self.assignments.lock().unwrap();
        let existing = assignments.iter().position(|a| a.uuid == assignment.uuid);
        let collision = assignments.iter().any(|a| {
            a.uuid != assignment.uuid
                && a.component == assignment.component
                && a.version == assignment.version
                && a.version_type == assignment.version_type
        });
        if collision {
            return Err(StorageError::DuplicateVersion {
                component: assignment.component.to_string(),
                version: assignment.version.clone(),
            });
        }
        if assignment.assignment_type == AssignmentType::Open {
            let open_exists = assignments.iter().any(|a| {
                a.uuid != assignment.uuid
                    && a.branch == assignment.branch
                    && a.version_type == assignment.version_type
                    && a.assignment_type == AssignmentType::Open
            });
            if open_exists {
                return Err(StorageError::DuplicateOpenAssignment {
                    branch: assignment.branch.to_string(),
                });
            }
        }
        match existing {
            Some(pos) => assignments[pos] = assignment.clone(),
            None => assignments.push(assignment.clone()),
        }
        Ok(assignment)
    }
}

// ---------------------------------------------------------------------------
// StaticCommitLog
// ---------------------------------------------------------------------------

/// Commit log backed by a pre-seeded `HashMap<Uuid, String>`.
#[derive(Debug, Default)]
pub struct StaticCommitLog {
    messages: Mutex<HashMap<Uuid, String>>,
}

impl StaticCommitLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, id: Uuid, message: &str) {
        self.messages.lock().unwrap().insert(id, message.to_string());
    }
}

#[async_trait]
impl CommitLog for StaticCommitLog {
    async fn messages(&self, ids: &[Uuid]) -> StorageResult<Vec<String>> {
        let messages = self.messages.lock().unwrap();
        Ok(ids.iter().filter_map(|id| messages.get(id).cloned()).collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryAuditLog
// ---------------------------------------------------------------------------

/// Append-only audit trail kept in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    snapshots: Mutex<Vec<Release>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<Release> {
        self.snapshots.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn record(&self, snapshot: &Release) -> StorageResult<()> {
        self.snapshots.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}
