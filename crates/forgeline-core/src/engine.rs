//! Cascading auto-integration of component releases into product releases.
//!
//! When a release enters ASSEMBLED, the engine finds every product branch
//! depending on it (explicitly or by name pattern), re-resolves that branch's
//! dependency set, picks one release per dependency, computes the version
//! bump, allocates the next product version, and creates the product release
//! through the lifecycle service. Product releases themselves enter
//! ASSEMBLED, so integration cascades upward.
//!
//! Each candidate branch is processed independently; a failure in one is
//! logged and never propagates to the triggering release or to other
//! branches. Two triggers hitting different slots of the same product branch
//! at once can each pass the idempotency checks before either writes and
//! produce two product releases in rapid succession; this narrow race is a
//! known limitation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use forgeline_state::{
    AutoIntegrate, BranchProvider, BranchRecord, BranchType, ChildComponent, ComponentProvider,
    DependencyStatus, Lifecycle, ParentRelease, Release, ReleaseStore, VersionType,
};

use crate::allocator::VersionAllocator;
use crate::bump::VersionBumpCalculator;
use crate::error::Result;
use crate::lifecycle::{AssembledHook, ReleaseInput, ReleaseLifecycle};
use crate::resolver;
use crate::version::BumpAction;

#[derive(Clone)]
pub struct AutoIntegrationEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    releases: Arc<dyn ReleaseStore>,
    branches: Arc<dyn BranchProvider>,
    components: Arc<dyn ComponentProvider>,
    lifecycle: Arc<ReleaseLifecycle>,
    allocator: Arc<VersionAllocator>,
    bump: VersionBumpCalculator,
}

impl AutoIntegrationEngine {
    pub fn new(
        releases: Arc<dyn ReleaseStore>,
        branches: Arc<dyn BranchProvider>,
        components: Arc<dyn ComponentProvider>,
        lifecycle: Arc<ReleaseLifecycle>,
        allocator: Arc<VersionAllocator>,
        bump: VersionBumpCalculator,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                releases,
                branches,
                components,
                lifecycle,
                allocator,
                bump,
            }),
        }
    }

    /// Fire-and-forget entry point: spawns the integration run as a detached
    /// task. Caller cancellation does not cancel it and no result is awaited.
    pub fn on_release_assembled(&self, release: Release) {
        let inner = self.inner.clone();
        tokio::spawn(inner.run(release));
    }

    /// Run one integration pass to completion. The deterministic form of
    /// [`Self::on_release_assembled`]; per-branch failures are still only
    /// logged.
    pub async fn run(&self, release: &Release) {
        self.inner.clone().run(release.clone()).await;
    }
}

/// Wire the full stack over one set of stores: allocator, bump calculator,
/// lifecycle service, and engine, with the assembled hook registered so
/// releases entering ASSEMBLED cascade automatically.
#[allow(clippy::too_many_arguments)]
pub fn wire(
    releases: Arc<dyn ReleaseStore>,
    branches: Arc<dyn BranchProvider>,
    components: Arc<dyn ComponentProvider>,
    assignments: Arc<dyn forgeline_state::VersionAssignmentStore>,
    commits: Arc<dyn forgeline_state::CommitLog>,
    audit: Arc<dyn forgeline_state::AuditLog>,
    sink: Arc<dyn crate::notify::NotificationSink>,
    classifier: Arc<dyn crate::version::CommitActionClassifier>,
) -> (Arc<ReleaseLifecycle>, AutoIntegrationEngine) {
    let allocator = Arc::new(VersionAllocator::new(
        assignments,
        branches.clone(),
        components.clone(),
    ));
    let lifecycle = Arc::new(ReleaseLifecycle::new(
        releases.clone(),
        branches.clone(),
        audit,
        sink,
        allocator.clone(),
    ));
    let bump = VersionBumpCalculator::new(
        releases.clone(),
        branches.clone(),
        commits,
        classifier,
    );
    let engine = AutoIntegrationEngine::new(
        releases,
        branches,
        components,
        lifecycle.clone(),
        allocator,
        bump,
    );
    lifecycle.register_assembled_hook(Arc::new(engine.clone()));
    (lifecycle, engine)
}

impl AssembledHook for AutoIntegrationEngine {
    fn on_assembled(&self, release: &Release) {
        self.on_release_assembled(release.clone());
    }
}

impl EngineInner {
    async fn run(self: Arc<Self>, trigger: Release) {
        let candidates = match self.candidate_branches(&trigger).await {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(release = %trigger.uuid, %err, "candidate discovery failed");
                return;
            }
        };
        debug!(release = %trigger.uuid, candidates = candidates.len(), "auto-integration pass");

        let mut tasks = Vec::new();
        for branch in candidates {
            let inner = self.clone();
            let trigger = trigger.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(err) = inner.integrate_branch(&trigger, &branch).await {
                    warn!(
                        branch = %branch.uuid,
                        release = %trigger.uuid,
                        %err,
                        "auto-integration of branch failed"
                    );
                }
            }));
        }
        let _ = futures::future::join_all(tasks).await;
    }

    /// Product branches that may need a new release for this trigger:
    /// explicit dependents of (component, branch) plus pattern owners whose
    /// patterns match the component's name, auto-integrate enabled, deduped.
    async fn candidate_branches(&self, trigger: &Release) -> Result<Vec<BranchRecord>> {
        let mut candidates = self
            .branches
            .find_by_child_component_and_branch(trigger.org, trigger.component, trigger.branch)
            .await?;
        candidates.retain(|b| {
            b.auto_integrate == AutoIntegrate::Enabled && b.component != trigger.component
        });

        if let Some(component) = self.components.get(trigger.component).await? {
            for owner in self.branches.find_with_dependency_patterns(trigger.org).await? {
                if owner.auto_integrate != AutoIntegrate::Enabled
                    || owner.component == trigger.component
                    || candidates.iter().any(|c| c.uuid == owner.uuid)
                {
                    continue;
                }
                if resolver::pattern_matches_component(&owner, &component.name) {
                    candidates.push(owner);
                }
            }
        }
        Ok(candidates)
    }

    async fn integrate_branch(&self, trigger: &Release, branch: &BranchRecord) -> Result<()> {
        let index = resolver::index_for_branch(branch, &*self.components, &*self.branches).await?;
        let effective = resolver::resolve_effective_dependencies(branch, &index);

        let Some(slot) = matching_slot(&effective, trigger) else {
            debug!(branch = %branch.uuid, "no dependency slot matches the trigger");
            return Ok(());
        };
        if slot.status == DependencyStatus::Ignored || slot.release.is_some() {
            debug!(branch = %branch.uuid, "slot is ignored or pinned, skipping");
            return Ok(());
        }
        if self.already_integrated(trigger.org, branch.uuid, trigger.uuid).await? {
            debug!(branch = %branch.uuid, "trigger already integrated");
            return Ok(());
        }

        // One release per effective dependency, best candidate per component.
        let mut candidates: HashMap<Uuid, Vec<Release>> = HashMap::new();
        let mut pinned: HashSet<Uuid> = HashSet::new();
        for dep in &effective {
            if dep.status == DependencyStatus::Ignored {
                continue;
            }
            let resolved = self.resolve_slot(trigger, dep).await?;
            match resolved {
                Some(release) => {
                    if dep.release.is_some() {
                        pinned.insert(release.uuid);
                    }
                    candidates.entry(dep.component).or_default().push(release);
                }
                None if dep.status == DependencyStatus::Required => {
                    warn!(
                        branch = %branch.uuid,
                        component = %dep.component,
                        "required dependency has no release, aborting this branch"
                    );
                    return Ok(());
                }
                None => continue,
            }
        }

        let mut selected: HashMap<Uuid, Release> = HashMap::new();
        for (component, releases) in candidates {
            if let Some(best) = self.select_best_of(releases).await? {
                selected.insert(component, best);
            }
        }
        let Some(to_use) = selected.get(&trigger.component).cloned() else {
            debug!(branch = %branch.uuid, "trigger component resolved to nothing");
            return Ok(());
        };
        if to_use.uuid != trigger.uuid
            && self.already_integrated(trigger.org, branch.uuid, to_use.uuid).await?
        {
            debug!(branch = %branch.uuid, "resolved release already integrated");
            return Ok(());
        }

        let previous = self.releases.latest_of_branch(branch.uuid, None).await?;
        let new_snapshot: Vec<Release> = selected.values().cloned().collect();
        let action = match &previous {
            Some(previous) => {
                let mut old_snapshot = Vec::new();
                for parent in &previous.parent_releases {
                    if let Some(release) = self.releases.get(parent.release).await? {
                        old_snapshot.push(release);
                    }
                }
                self.bump
                    .largest_action(&pinned, &old_snapshot, &new_snapshot)
                    .await?
            }
            None => BumpAction::Bump,
        };

        let assignment = self
            .allocator
            .allocate(branch.uuid, VersionType::Dev, action)
            .await?;

        let mut parents = Vec::new();
        let mut seen = HashSet::new();
        for dep in &effective {
            if let Some(release) = selected.get(&dep.component) {
                if seen.insert(dep.component) {
                    parents.push(ParentRelease::new(release.uuid));
                }
            }
        }

        let mut input = ReleaseInput::new(
            branch.uuid,
            branch.org,
            &assignment.version,
            Lifecycle::Assembled,
        );
        input.parent_releases = parents;
        input.actor = "auto-integration".to_string();
        let product = self.lifecycle.create_release(input).await?;
        info!(
            product = %product.uuid,
            branch = %branch.uuid,
            version = %product.version,
            trigger = %trigger.uuid,
            ?action,
            "auto-integrated product release"
        );
        Ok(())
    }

    /// Whether some product release of the branch already carries the given
    /// release as a parent.
    async fn already_integrated(&self, org: Uuid, branch: Uuid, release: Uuid) -> Result<bool> {
        let products = self.releases.find_products_with_parent(org, release).await?;
        Ok(products.iter().any(|p| p.branch == branch))
    }

    /// Resolve one dependency slot to a release: the pin when present, the
    /// trigger itself on the trigger's branch, the latest ASSEMBLED release
    /// of the slot's branch (BASE branch when unpinned) otherwise.
    async fn resolve_slot(
        &self,
        trigger: &Release,
        dep: &ChildComponent,
    ) -> Result<Option<Release>> {
        if let Some(pin) = dep.release {
            return Ok(self.releases.get(pin).await?);
        }
        let branch = match dep.branch {
            Some(branch) => Some(branch),
            None => self
                .branches
                .base_branch_of_component(dep.component)
                .await?
                .map(|b| b.uuid),
        };
        let Some(branch) = branch else {
            return Ok(None);
        };
        if dep.component == trigger.component && branch == trigger.branch {
            return Ok(Some(trigger.clone()));
        }
        Ok(self
            .releases
            .latest_of_branch(branch, Some(Lifecycle::Assembled))
            .await?)
    }

    async fn select_best_of(&self, candidates: Vec<Release>) -> Result<Option<Release>> {
        let mut typed = Vec::with_capacity(candidates.len());
        for release in candidates {
            let branch_type = self
                .branches
                .get(release.branch)
                .await?
                .map(|b| b.branch_type)
                .unwrap_or(BranchType::Regular);
            typed.push((release, branch_type));
        }
        Ok(select_best(typed))
    }
}

/// Slot of the effective dependency set matching the triggering release:
/// exact (component, branch) first, then a sole unpinned slot for the
/// component. Pinned slots on other branches never match.
fn matching_slot<'a>(effective: &'a [ChildComponent], trigger: &Release) -> Option<&'a ChildComponent> {
    let slots: Vec<&ChildComponent> = effective
        .iter()
        .filter(|d| d.component == trigger.component)
        .collect();
    if let Some(exact) = slots.iter().copied().find(|d| d.branch == Some(trigger.branch)) {
        return Some(exact);
    }
    match slots.as_slice() {
        [only] if only.branch.is_none() => Some(*only),
        _ => None,
    }
}

/// Deterministic tie-break across releases of one component: a BASE-branch
/// release always beats a non-BASE one; otherwise the later-created wins.
fn select_best(candidates: Vec<(Release, BranchType)>) -> Option<Release> {
    let mut best: Option<(Release, BranchType)> = None;
    for (release, branch_type) in candidates {
        best = match best {
            None => Some((release, branch_type)),
            Some((current, current_type)) => {
                let wins = match (
                    branch_type == BranchType::Base,
                    current_type == BranchType::Base,
                ) {
                    (true, false) => true,
                    (false, true) => false,
                    _ => release.created_at > current.created_at,
                };
                if wins {
                    Some((release, branch_type))
                } else {
                    Some((current, current_type))
                }
            }
        };
    }
    best.map(|(release, _)| release)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn base_branch_release_beats_later_non_base() {
        let org = Uuid::new_v4();
        let component = Uuid::new_v4();
        let mut on_base = Release::new(component, Uuid::new_v4(), org, "1.0.0");
        on_base.created_at = on_base.created_at - Duration::hours(5);
        let on_feature = Release::new(component, Uuid::new_v4(), org, "1.1.0");

        let best = select_best(vec![
            (on_feature.clone(), BranchType::Feature),
            (on_base.clone(), BranchType::Base),
        ])
        .unwrap();
        assert_eq!(best.uuid, on_base.uuid);
    }

    #[test]
    fn later_release_wins_when_neither_is_base() {
        let org = Uuid::new_v4();
        let component = Uuid::new_v4();
        let mut earlier = Release::new(component, Uuid::new_v4(), org, "1.0.0");
        earlier.created_at = earlier.created_at - Duration::hours(5);
        let later = Release::new(component, Uuid::new_v4(), org, "1.1.0");

        let best = select_best(vec![
            (earlier, BranchType::Feature),
            (later.clone(), BranchType::Regular),
        ])
        .unwrap();
        assert_eq!(best.uuid, later.uuid);
    }

    #[test]
    fn exact_slot_match_beats_sole_slot_rule() {
        let org = Uuid::new_v4();
        let component = Uuid::new_v4();
        let branch = Uuid::new_v4();
        let trigger = Release::new(component, branch, org, "1.0.0");
        let effective = vec![
            ChildComponent {
                component,
                branch: Some(Uuid::new_v4()),
                release: None,
                status: DependencyStatus::Required,
            },
            ChildComponent {
                component,
                branch: Some(branch),
                release: None,
                status: DependencyStatus::Required,
            },
        ];
        let slot = matching_slot(&effective, &trigger).unwrap();
        assert_eq!(slot.branch, Some(branch));
    }

    #[test]
    fn sole_unpinned_slot_matches_any_branch() {
        let org = Uuid::new_v4();
        let component = Uuid::new_v4();
        let trigger = Release::new(component, Uuid::new_v4(), org, "1.0.0");
        let effective = vec![ChildComponent {
            component,
            branch: None,
            release: None,
            status: DependencyStatus::Required,
        }];
        assert!(matching_slot(&effective, &trigger).is_some());
    }

    #[test]
    fn pinned_slot_on_another_branch_never_matches() {
        let org = Uuid::new_v4();
        let component = Uuid::new_v4();
        let trigger = Release::new(component, Uuid::new_v4(), org, "1.0.0");
        let effective = vec![ChildComponent {
            component,
            branch: Some(Uuid::new_v4()),
            release: None,
            status: DependencyStatus::Required,
        }];
        assert!(matching_slot(&effective, &trigger).is_none());
    }
}
