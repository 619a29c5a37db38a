//! Domain records for release state.
//!
//! These are plain serde records: the storage traits in `stores` traffic in
//! them, the engine in `forgeline-core` computes over them. Mutation rules
//! (lifecycle gate, append-only events, revision bumps) are enforced by the
//! lifecycle service, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Release
// ---------------------------------------------------------------------------

/// Release lifecycle state.
///
/// `Draft` and `Pending` permit assembly-affecting mutations; `Assembled`
/// and the terminal states (`Cancelled`, `Rejected`) do not, by default.
/// Variant order is the progression order; minimum-lifecycle queries
/// compare on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Lifecycle {
    Cancelled,
    Rejected,
    Pending,
    Draft,
    Assembled,
}

impl Lifecycle {
    /// Whether assembly-affecting fields may still change in this state.
    pub fn assembly_allowed(self) -> bool {
        matches!(self, Lifecycle::Pending | Lifecycle::Draft)
    }

    /// Terminal states are never left again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Lifecycle::Cancelled | Lifecycle::Rejected)
    }
}

/// How strictly an update to assembly-affecting fields is gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateStrength {
    /// Permitted only while the release is in `Draft`.
    DraftOnly,
    /// Permitted in `Draft` or `Pending`.
    DraftPending,
    /// Always permitted (rebuild / administrative flows).
    Full,
}

/// Field family touched by an update event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateScope {
    ReleaseCreated,
    Lifecycle,
    Version,
    Artifact,
    ParentRelease,
    SourceCodeEntry,
    Commit,
    InboundDelivery,
    OutboundDelivery,
    Notes,
    Tags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateAction {
    Added,
    Removed,
    Changed,
}

/// One entry of a release's append-only change history.
///
/// Created, never mutated. One event per logically distinct field change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub scope: UpdateScope,
    pub action: UpdateAction,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    /// Uuid of the affected object for list diffs (artifact, parent release).
    pub object: Option<Uuid>,
    pub at: DateTime<Utc>,
    /// Who performed the change ("auto" for engine-created records).
    pub actor: String,
}

impl UpdateEvent {
    pub fn now(scope: UpdateScope, action: UpdateAction, actor: &str) -> Self {
        Self {
            scope,
            action,
            old_value: None,
            new_value: None,
            object: None,
            at: Utc::now(),
            actor: actor.to_string(),
        }
    }

    pub fn with_object(mut self, object: Uuid) -> Self {
        self.object = Some(object);
        self
    }

    pub fn with_values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }
}

/// Whether a tag may be removed by later updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Removable {
    Yes,
    No,
}

/// Key-value tag attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    pub key: String,
    pub value: String,
    pub removable: Removable,
}

/// One dependency slot inside a product release's assembled tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentRelease {
    pub release: Uuid,
}

impl ParentRelease {
    pub fn new(release: Uuid) -> Self {
        Self { release }
    }
}

/// A release: an immutable-once-assembled snapshot bound to one
/// (component, version) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub uuid: Uuid,
    pub version: String,
    pub lifecycle: Lifecycle,
    pub component: Uuid,
    pub branch: Uuid,
    pub org: Uuid,
    /// One slot per resolved dependency component (product releases only).
    pub parent_releases: Vec<ParentRelease>,
    pub artifacts: Vec<Uuid>,
    pub commits: Vec<Uuid>,
    pub source_code_entry: Option<Uuid>,
    pub inbound_deliverables: Vec<Uuid>,
    pub outbound_deliverables: Vec<Uuid>,
    pub tags: Vec<TagRecord>,
    /// External identifiers (e.g. purl), resolved at creation.
    pub identifiers: Vec<String>,
    pub notes: Option<String>,
    /// Append-only change history.
    pub update_events: Vec<UpdateEvent>,
    /// Bumped on every successful save.
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Release {
    /// Fresh draft release with empty assembly fields.
    pub fn new(component: Uuid, branch: Uuid, org: Uuid, version: &str) -> Self {
        let now = Utc::now();
        Self {
            uuid: Uuid::new_v4(),
            version: version.to_string(),
            lifecycle: Lifecycle::Draft,
            component,
            branch,
            org,
            parent_releases: Vec::new(),
            artifacts: Vec::new(),
            commits: Vec::new(),
            source_code_entry: None,
            inbound_deliverables: Vec::new(),
            outbound_deliverables: Vec::new(),
            tags: Vec::new(),
            identifiers: Vec::new(),
            notes: None,
            update_events: Vec::new(),
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// All commit uuids attached to this release, source-code entry included.
    pub fn all_commits(&self) -> Vec<Uuid> {
        let mut all = self.commits.clone();
        if let Some(sce) = self.source_code_entry {
            if !all.contains(&sce) {
                all.push(sce);
            }
        }
        all
    }

    /// Whether the given release is already one of this release's parents.
    pub fn has_parent(&self, release: Uuid) -> bool {
        self.parent_releases.iter().any(|p| p.release == release)
    }
}

// ---------------------------------------------------------------------------
// VersionAssignment
// ---------------------------------------------------------------------------

/// Version line an assignment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionType {
    Dev,
    Release,
}

/// Binding state of a version assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentType {
    /// User-preset next version, consumed by the next allocation.
    /// At most one per (branch, version-type).
    Open,
    /// Allocated but not yet bound to a release.
    Reserved,
    /// Bound to a release.
    Assigned,
}

/// Reservation of one version string on a branch.
///
/// Created when a version is first reserved, bound (`Assigned`) the moment
/// its release exists, never deleted. A version string is globally unique
/// per component; the storage layer rejects duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionAssignment {
    pub uuid: Uuid,
    pub org: Uuid,
    pub branch: Uuid,
    pub component: Uuid,
    pub version: String,
    pub version_type: VersionType,
    pub assignment_type: AssignmentType,
    pub release: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl VersionAssignment {
    pub fn reserved(
        org: Uuid,
        branch: Uuid,
        component: Uuid,
        version: &str,
        version_type: VersionType,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            org,
            branch,
            component,
            version: version.to_string(),
            version_type,
            assignment_type: AssignmentType::Reserved,
            release: None,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Branch & dependencies
// ---------------------------------------------------------------------------

/// Line of development under a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchType {
    /// Primary, authoritative branch.
    Base,
    Feature,
    Regular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoIntegrate {
    Enabled,
    Disabled,
}

/// Participation of a dependency slot in assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyStatus {
    /// Slot must resolve; a missing release aborts assembly of the branch.
    Required,
    /// Slot is included when resolvable, tolerated when not.
    Transient,
    Optional,
    /// Slot never participates in auto-integration.
    Ignored,
}

/// Dependency descriptor owned by a product branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildComponent {
    pub component: Uuid,
    /// Pins the slot to one branch of the component.
    pub branch: Option<Uuid>,
    /// Pins the slot to one exact release; freezes it for auto-integration.
    pub release: Option<Uuid>,
    pub status: DependencyStatus,
}

impl ChildComponent {
    pub fn required(component: Uuid, branch: Uuid) -> Self {
        Self {
            component,
            branch: Some(branch),
            release: None,
            status: DependencyStatus::Required,
        }
    }
}

/// Name-matching rule letting a product branch auto-depend on components
/// without an explicit declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyPattern {
    /// Regex over component names, e.g. `^payments-.*`.
    pub pattern: String,
    /// Specific branch name to depend on; falls back to the BASE branch.
    pub target_branch_name: Option<String>,
    /// Status for synthesized slots; `Required` when unset.
    pub default_status: Option<DependencyStatus>,
}

/// Branch record. Product (feature-set) branches carry dependencies and
/// optionally dependency patterns; component branches carry neither.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchRecord {
    pub uuid: Uuid,
    pub name: String,
    pub component: Uuid,
    pub org: Uuid,
    pub branch_type: BranchType,
    /// Version schema, e.g. "semver" or "yyyy.0m.micro". Falls back to the
    /// component schema when empty.
    pub version_schema: String,
    pub auto_integrate: AutoIntegrate,
    pub dependencies: Vec<ChildComponent>,
    pub dependency_patterns: Vec<DependencyPattern>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

impl BranchRecord {
    pub fn new(name: &str, component: Uuid, org: Uuid, branch_type: BranchType) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            component,
            org,
            branch_type,
            version_schema: String::new(),
            auto_integrate: AutoIntegrate::Disabled,
            dependencies: Vec::new(),
            dependency_patterns: Vec::new(),
            archived: false,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// A versioned software unit (library, service, or product) that owns
/// branches and releases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub uuid: Uuid,
    pub org: Uuid,
    pub name: String,
    pub version_schema: String,
    pub archived: bool,
}

impl ComponentRecord {
    pub fn new(org: Uuid, name: &str, version_schema: &str) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            org,
            name: name.to_string(),
            version_schema: version_schema.to_string(),
            archived: false,
        }
    }
}
