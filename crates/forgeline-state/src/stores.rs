//! Storage trait definitions for Forgeline
//!
//! These traits define the storage abstractions the engine writes through:
//! - `ReleaseStore`: release persistence and lookup
//! - `BranchProvider`: branch lookup, dependent feature-set discovery
//! - `ComponentProvider`: component lookup
//! - `VersionAssignmentStore`: version reservation bookkeeping
//! - `CommitLog`: commit message lookup for bump classification
//! - `AuditLog`: pre-save release snapshots
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module. Only the lifecycle service and the
//! version allocator are permitted to write through these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::model::{
    BranchRecord, ComponentRecord, Lifecycle, Release, VersionAssignment, VersionType,
};

// ---------------------------------------------------------------------------
// ReleaseStore
// ---------------------------------------------------------------------------

/// Release persistence.
///
/// Guarantees:
/// - `insert` rejects a duplicate (component, version) pair with
///   `StorageError::DuplicateVersion`; it never overwrites.
/// - `update` requires the row to exist.
/// - Releases are never physically deleted.
#[async_trait]
pub trait ReleaseStore: Send + Sync {
    async fn get(&self, id: Uuid) -> StorageResult<Option<Release>>;

    /// Release owning a (component, version) pair, if any.
    async fn find_by_component_and_version(
        &self,
        component: Uuid,
        version: &str,
    ) -> StorageResult<Option<Release>>;

    /// Latest-created release of a branch at or above the given lifecycle.
    /// `None` lifecycle means any.
    async fn latest_of_branch(
        &self,
        branch: Uuid,
        min_lifecycle: Option<Lifecycle>,
    ) -> StorageResult<Option<Release>>;

    /// Releases of a branch created in `[from, to]`, newest first.
    async fn list_of_branch_between(
        &self,
        branch: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Release>>;

    /// Product releases (within the org) that carry `release` as a parent.
    /// First-level only, no recursion.
    async fn find_products_with_parent(
        &self,
        org: Uuid,
        release: Uuid,
    ) -> StorageResult<Vec<Release>>;

    /// Insert a new release, enforcing (component, version) uniqueness.
    async fn insert(&self, release: Release) -> StorageResult<Release>;

    /// Replace an existing release row.
    async fn update(&self, release: Release) -> StorageResult<Release>;
}

// ---------------------------------------------------------------------------
// BranchProvider
// ---------------------------------------------------------------------------

/// Branch lookup and dependent feature-set discovery.
#[async_trait]
pub trait BranchProvider: Send + Sync {
    async fn get(&self, id: Uuid) -> StorageResult<Option<BranchRecord>>;

    /// Branches in the org declaring an explicit dependency slot on
    /// (component, branch).
    async fn find_by_child_component_and_branch(
        &self,
        org: Uuid,
        component: Uuid,
        branch: Uuid,
    ) -> StorageResult<Vec<BranchRecord>>;

    /// Branches in the org carrying at least one dependency pattern.
    async fn find_with_dependency_patterns(&self, org: Uuid) -> StorageResult<Vec<BranchRecord>>;

    /// The BASE branch of a component, if one exists.
    async fn base_branch_of_component(
        &self,
        component: Uuid,
    ) -> StorageResult<Option<BranchRecord>>;

    /// Branch of a component by name.
    async fn find_by_component_and_name(
        &self,
        component: Uuid,
        name: &str,
    ) -> StorageResult<Option<BranchRecord>>;

    async fn save(&self, branch: BranchRecord) -> StorageResult<BranchRecord>;
}

// ---------------------------------------------------------------------------
// ComponentProvider
// ---------------------------------------------------------------------------

/// Component lookup.
#[async_trait]
pub trait ComponentProvider: Send + Sync {
    async fn get(&self, id: Uuid) -> StorageResult<Option<ComponentRecord>>;

    /// All components of an org, archived included; pattern resolution
    /// filters archival itself.
    async fn list_by_org(&self, org: Uuid) -> StorageResult<Vec<ComponentRecord>>;
}

// ---------------------------------------------------------------------------
// VersionAssignmentStore
// ---------------------------------------------------------------------------

/// Version reservation bookkeeping.
///
/// Guarantees:
/// - `save` of a new (component, version, version-type) row that collides
///   with an existing one fails with `DuplicateVersion`.
/// - At most one OPEN assignment per (branch, version-type).
#[async_trait]
pub trait VersionAssignmentStore: Send + Sync {
    /// Assignment holding a (component, version) pair for a version type.
    async fn find_by_component_and_version(
        &self,
        component: Uuid,
        version: &str,
        version_type: VersionType,
    ) -> StorageResult<Option<VersionAssignment>>;

    /// Latest-created assignment on a branch for a version type.
    async fn latest_of_branch(
        &self,
        branch: Uuid,
        version_type: VersionType,
    ) -> StorageResult<Option<VersionAssignment>>;

    /// The OPEN assignment on a branch for a version type, if any.
    async fn open_of_branch(
        &self,
        branch: Uuid,
        version_type: VersionType,
    ) -> StorageResult<Option<VersionAssignment>>;

    /// Insert or update an assignment, enforcing the uniqueness guarantees.
    async fn save(&self, assignment: VersionAssignment) -> StorageResult<VersionAssignment>;
}

// ---------------------------------------------------------------------------
// CommitLog
// ---------------------------------------------------------------------------

/// Commit message lookup, used to classify changes between two releases of
/// a branch with a non-numeric version schema.
#[async_trait]
pub trait CommitLog: Send + Sync {
    /// Messages for the given commit ids; unknown ids are skipped.
    async fn messages(&self, ids: &[Uuid]) -> StorageResult<Vec<String>>;
}

// ---------------------------------------------------------------------------
// AuditLog
// ---------------------------------------------------------------------------

/// Append-only audit trail of pre-save release snapshots, keyed by
/// (release, revision).
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, snapshot: &Release) -> StorageResult<()>;
}
