//! Release state machine and mutation gate.
//!
//! `ReleaseLifecycle` is the sole writer of release state. Every successful
//! mutation bumps the revision counter, stamps the update time, appends a
//! pre-save audit snapshot, and writes one `UpdateEvent` per logically
//! distinct field change, so history is reconstructable. Updates to a single
//! release are serialized by a per-release async write lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};
use uuid::Uuid;

use forgeline_state::{
    AuditLog, BranchProvider, Lifecycle, ParentRelease, Release, ReleaseStore, Removable,
    TagRecord, UpdateAction, UpdateEvent, UpdateScope, UpdateStrength, VersionType,
};

use crate::allocator::VersionAllocator;
use crate::error::{EngineError, Result};
use crate::notify::{NotificationSink, ReleaseEventType};

/// Fired after a release enters ASSEMBLED. Implementations must not block;
/// the auto-integration engine spawns detached work from it.
pub trait AssembledHook: Send + Sync {
    fn on_assembled(&self, release: &Release);
}

/// Creation request. Fields left at their defaults are simply absent.
#[derive(Debug, Clone)]
pub struct ReleaseInput {
    pub version: String,
    pub branch: Uuid,
    pub org: Uuid,
    pub lifecycle: Lifecycle,
    pub version_type: VersionType,
    pub parent_releases: Vec<ParentRelease>,
    pub artifacts: Vec<Uuid>,
    pub commits: Vec<Uuid>,
    pub source_code_entry: Option<Uuid>,
    pub inbound_deliverables: Vec<Uuid>,
    pub outbound_deliverables: Vec<Uuid>,
    pub tags: Vec<TagRecord>,
    pub identifiers: Vec<String>,
    pub notes: Option<String>,
    /// Replace an existing non-pending release under FULL strength instead
    /// of failing the version conflict.
    pub rebuild: bool,
    pub actor: String,
}

impl ReleaseInput {
    pub fn new(branch: Uuid, org: Uuid, version: &str, lifecycle: Lifecycle) -> Self {
        Self {
            version: version.to_string(),
            branch,
            org,
            lifecycle,
            version_type: VersionType::Dev,
            parent_releases: Vec::new(),
            artifacts: Vec::new(),
            commits: Vec::new(),
            source_code_entry: None,
            inbound_deliverables: Vec::new(),
            outbound_deliverables: Vec::new(),
            tags: Vec::new(),
            identifiers: Vec::new(),
            notes: None,
            rebuild: false,
            actor: "auto".to_string(),
        }
    }
}

/// Update request. `None` means the field was not supplied and stays as-is.
#[derive(Debug, Clone, Default)]
pub struct ReleaseUpdate {
    pub lifecycle: Option<Lifecycle>,
    pub parent_releases: Option<Vec<ParentRelease>>,
    pub artifacts: Option<Vec<Uuid>>,
    pub commits: Option<Vec<Uuid>>,
    pub source_code_entry: Option<Option<Uuid>>,
    pub inbound_deliverables: Option<Vec<Uuid>>,
    pub outbound_deliverables: Option<Vec<Uuid>>,
    pub tags: Option<Vec<TagRecord>>,
    pub notes: Option<String>,
    pub actor: String,
}

impl ReleaseUpdate {
    pub fn by(actor: &str) -> Self {
        Self {
            actor: actor.to_string(),
            ..Self::default()
        }
    }

    /// Whether the update touches any assembly-affecting field.
    fn touches_assembly(&self) -> bool {
        self.parent_releases.is_some()
            || self.artifacts.is_some()
            || self.commits.is_some()
            || self.source_code_entry.is_some()
            || self.inbound_deliverables.is_some()
            || self.outbound_deliverables.is_some()
    }
}

pub struct ReleaseLifecycle {
    releases: Arc<dyn ReleaseStore>,
    branches: Arc<dyn BranchProvider>,
    audit: Arc<dyn AuditLog>,
    sink: Arc<dyn NotificationSink>,
    allocator: Arc<VersionAllocator>,
    assembled_hook: StdMutex<Option<Arc<dyn AssembledHook>>>,
    /// One entry per release ever updated through this service; entries are
    /// never evicted, so the map grows with the number of touched releases.
    write_locks: StdMutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl ReleaseLifecycle {
    pub fn new(
        releases: Arc<dyn ReleaseStore>,
        branches: Arc<dyn BranchProvider>,
        audit: Arc<dyn AuditLog>,
        sink: Arc<dyn NotificationSink>,
        allocator: Arc<VersionAllocator>,
    ) -> Self {
        Self {
            releases,
            branches,
            audit,
            sink,
            allocator,
            assembled_hook: StdMutex::new(None),
            write_locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Register the hook fired when a release enters ASSEMBLED. Registered
    /// once at wiring time, after the engine exists.
    pub fn register_assembled_hook(&self, hook: Arc<dyn AssembledHook>) {
        *self.assembled_hook.lock().unwrap_or_else(|e| e.into_inner()) = Some(hook);
    }

    fn fire_assembled(&self, release: &Release) {
        let hook = self
            .assembled_hook
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(hook) = hook {
            hook.on_assembled(release);
        }
    }

    fn write_lock(&self, release: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self.write_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(release)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Create a release, or reconcile with an existing one holding the same
    /// (component, version) pair.
    ///
    /// An existing PENDING release is advanced to the requested lifecycle and
    /// updated at DRAFT_PENDING strength (the scheduled slot gets its build).
    /// An existing non-pending release fails the call unless `rebuild` is
    /// set, which replaces assembly-affecting fields at FULL strength.
    pub async fn create_release(&self, input: ReleaseInput) -> Result<Release> {
        if input.version.trim().is_empty() {
            return Err(EngineError::Validation("version is required".to_string()));
        }
        let branch = self
            .branches
            .get(input.branch)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                kind: "branch",
                id: input.branch.to_string(),
            })?;
        if branch.org != input.org {
            return Err(EngineError::Validation(
                "branch belongs to a different organization".to_string(),
            ));
        }
        let component = branch.component;

        if let Some(existing) = self
            .releases
            .find_by_component_and_version(component, &input.version)
            .await?
        {
            if existing.lifecycle != Lifecycle::Pending && !input.rebuild {
                return Err(EngineError::Consistency(format!(
                    "version {} is already bound to release {}",
                    input.version, existing.uuid
                )));
            }
            let strength = if input.rebuild {
                UpdateStrength::Full
            } else {
                UpdateStrength::DraftPending
            };
            debug!(release = %existing.uuid, rebuild = input.rebuild, "reconciling existing release");
            let update = ReleaseUpdate {
                lifecycle: Some(input.lifecycle),
                parent_releases: Some(input.parent_releases),
                artifacts: Some(input.artifacts),
                commits: Some(input.commits),
                source_code_entry: Some(input.source_code_entry),
                inbound_deliverables: Some(input.inbound_deliverables),
                outbound_deliverables: Some(input.outbound_deliverables),
                tags: None,
                notes: input.notes,
                actor: input.actor,
            };
            return self.update_release(existing.uuid, update, strength).await;
        }

        let mut release = Release::new(component, input.branch, input.org, &input.version);
        release.lifecycle = input.lifecycle;
        release.parent_releases = input.parent_releases;
        release.artifacts = input.artifacts;
        release.commits = input.commits;
        release.source_code_entry = input.source_code_entry;
        release.inbound_deliverables = input.inbound_deliverables;
        release.outbound_deliverables = input.outbound_deliverables;
        release.tags = input.tags;
        release.identifiers = input.identifiers;
        release.notes = input.notes;
        release.update_events.push(UpdateEvent::now(
            UpdateScope::ReleaseCreated,
            UpdateAction::Added,
            &input.actor,
        ));

        // A lost uniqueness race surfaces here as DuplicateVersion.
        let inserted = self.releases.insert(release).await?;
        self.allocator.bind(&inserted, input.version_type).await?;

        let event = if inserted.lifecycle == Lifecycle::Pending {
            ReleaseEventType::ReleaseScheduled
        } else {
            ReleaseEventType::NewRelease
        };
        self.sink.on_release_event(&inserted, event).await;
        if inserted.lifecycle == Lifecycle::Assembled {
            self.fire_assembled(&inserted);
        }
        info!(release = %inserted.uuid, version = %inserted.version, "created release");
        Ok(inserted)
    }

    /// Apply an update under the given strength.
    ///
    /// Assembly-affecting fields pass the lifecycle gate first; a violation
    /// rejects the whole call with nothing written. Field diffs become
    /// update events; an update that changes nothing writes nothing.
    pub async fn update_release(
        &self,
        id: Uuid,
        update: ReleaseUpdate,
        strength: UpdateStrength,
    ) -> Result<Release> {
        let lock = self.write_lock(id);
        let _guard = lock.lock().await;

        let current = self
            .releases
            .get(id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                kind: "release",
                id: id.to_string(),
            })?;

        if update.touches_assembly() {
            let permitted = match strength {
                UpdateStrength::DraftOnly => current.lifecycle == Lifecycle::Draft,
                UpdateStrength::DraftPending => current.lifecycle.assembly_allowed(),
                UpdateStrength::Full => true,
            };
            if !permitted {
                return Err(EngineError::LifecycleViolation(format!(
                    "assembly fields of release {} are frozen in {:?}",
                    id, current.lifecycle
                )));
            }
        }
        if let Some(target) = update.lifecycle {
            if current.lifecycle.is_terminal() && target != current.lifecycle {
                return Err(EngineError::LifecycleViolation(format!(
                    "release {} is {:?} and cannot transition",
                    id, current.lifecycle
                )));
            }
        }
        if let Some(new_tags) = &update.tags {
            for tag in current.tags.iter().filter(|t| t.removable == Removable::No) {
                if !new_tags.iter().any(|n| n.key == tag.key) {
                    return Err(EngineError::Consistency(format!(
                        "non-removable tag {} cannot be dropped",
                        tag.key
                    )));
                }
            }
        }

        let mut next = current.clone();
        let mut events = Vec::new();
        let actor = update.actor.as_str();

        if let Some(parents) = update.parent_releases {
            diff_uuid_lists(
                UpdateScope::ParentRelease,
                &current.parent_releases.iter().map(|p| p.release).collect::<Vec<_>>(),
                &parents.iter().map(|p| p.release).collect::<Vec<_>>(),
                actor,
                &mut events,
            );
            next.parent_releases = parents;
        }
        if let Some(artifacts) = update.artifacts {
            diff_uuid_lists(UpdateScope::Artifact, &current.artifacts, &artifacts, actor, &mut events);
            next.artifacts = artifacts;
        }
        if let Some(commits) = update.commits {
            diff_uuid_lists(UpdateScope::Commit, &current.commits, &commits, actor, &mut events);
            next.commits = commits;
        }
        if let Some(sce) = update.source_code_entry {
            if sce != current.source_code_entry {
                events.push(
                    UpdateEvent::now(UpdateScope::SourceCodeEntry, UpdateAction::Changed, actor)
                        .with_values(
                            current.source_code_entry.map(|u| u.to_string()),
                            sce.map(|u| u.to_string()),
                        ),
                );
                next.source_code_entry = sce;
            }
        }
        if let Some(inbound) = update.inbound_deliverables {
            diff_uuid_lists(
                UpdateScope::InboundDelivery,
                &current.inbound_deliverables,
                &inbound,
                actor,
                &mut events,
            );
            next.inbound_deliverables = inbound;
        }
        if let Some(outbound) = update.outbound_deliverables {
            diff_uuid_lists(
                UpdateScope::OutboundDelivery,
                &current.outbound_deliverables,
                &outbound,
                actor,
                &mut events,
            );
            next.outbound_deliverables = outbound;
        }
        if let Some(tags) = update.tags {
            diff_tags(&current.tags, &tags, actor, &mut events);
            next.tags = tags;
        }
        if let Some(notes) = update.notes {
            if current.notes.as_deref() != Some(notes.as_str()) {
                events.push(
                    UpdateEvent::now(UpdateScope::Notes, UpdateAction::Changed, actor)
                        .with_values(current.notes.clone(), Some(notes.clone())),
                );
                next.notes = Some(notes);
            }
        }
        if let Some(target) = update.lifecycle {
            if target != current.lifecycle {
                events.push(
                    UpdateEvent::now(UpdateScope::Lifecycle, UpdateAction::Changed, actor)
                        .with_values(
                            Some(format!("{:?}", current.lifecycle)),
                            Some(format!("{:?}", target)),
                        ),
                );
                next.lifecycle = target;
            }
        }

        if events.is_empty() {
            return Ok(current);
        }
        next.update_events.extend(events);
        let saved = self.save(&current, next).await?;
        self.notify_transition(&current, &saved).await;
        Ok(saved)
    }

    /// Transition a release's lifecycle without touching assembly fields.
    pub async fn update_lifecycle(
        &self,
        id: Uuid,
        target: Lifecycle,
        actor: &str,
    ) -> Result<Release> {
        let update = ReleaseUpdate {
            lifecycle: Some(target),
            ..ReleaseUpdate::by(actor)
        };
        self.update_release(id, update, UpdateStrength::DraftPending)
            .await
    }

    /// Persist a mutated release: pre-save snapshot, revision bump, update
    /// timestamp.
    async fn save(&self, previous: &Release, mut next: Release) -> Result<Release> {
        self.audit.record(previous).await?;
        next.revision = previous.revision + 1;
        next.updated_at = Utc::now();
        Ok(self.releases.update(next).await?)
    }

    async fn notify_transition(&self, before: &Release, after: &Release) {
        if before.lifecycle == after.lifecycle {
            return;
        }
        let event = match after.lifecycle {
            Lifecycle::Draft => Some(ReleaseEventType::ReleaseDrafted),
            Lifecycle::Cancelled => Some(ReleaseEventType::ReleaseCancelled),
            Lifecycle::Rejected => Some(ReleaseEventType::ReleaseRejected),
            Lifecycle::Assembled => Some(ReleaseEventType::ReleaseAssembled),
            Lifecycle::Pending => None,
        };
        if let Some(event) = event {
            self.sink.on_release_event(after, event).await;
        }
        if after.lifecycle == Lifecycle::Assembled {
            self.fire_assembled(after);
        }
    }
}

/// One ADDED/REMOVED event per element that joined or left the list.
fn diff_uuid_lists(
    scope: UpdateScope,
    old: &[Uuid],
    new: &[Uuid],
    actor: &str,
    events: &mut Vec<UpdateEvent>,
) {
    for added in new.iter().filter(|u| !old.contains(u)) {
        events.push(UpdateEvent::now(scope, UpdateAction::Added, actor).with_object(*added));
    }
    for removed in old.iter().filter(|u| !new.contains(u)) {
        events.push(UpdateEvent::now(scope, UpdateAction::Removed, actor).with_object(*removed));
    }
}

fn diff_tags(old: &[TagRecord], new: &[TagRecord], actor: &str, events: &mut Vec<UpdateEvent>) {
    for tag in new {
        match old.iter().find(|t| t.key == tag.key) {
            None => events.push(
                UpdateEvent::now(UpdateScope::Tags, UpdateAction::Added, actor)
                    .with_values(None, Some(format!("{}={}", tag.key, tag.value))),
            ),
            Some(previous) if previous.value != tag.value => events.push(
                UpdateEvent::now(UpdateScope::Tags, UpdateAction::Changed, actor).with_values(
                    Some(format!("{}={}", tag.key, previous.value)),
                    Some(format!("{}={}", tag.key, tag.value)),
                ),
            ),
            Some(_) => {}
        }
    }
    for tag in old.iter().filter(|t| !new.iter().any(|n| n.key == t.key)) {
        events.push(
            UpdateEvent::now(UpdateScope::Tags, UpdateAction::Removed, actor)
                .with_values(Some(format!("{}={}", tag.key, tag.value)), None),
        );
    }
}
