//! Integration tests for the auto-integration engine
//! (assembled release → dependent product releases).

use std::sync::Arc;

use forgeline_core::{
    wire, AutoIntegrationEngine, ConventionalCommitClassifier, RecordingSink, ReleaseInput,
    ReleaseLifecycle, VersionAllocator, VersionBumpCalculator,
};
use forgeline_state::fakes::{
    MemoryAuditLog, MemoryBranchProvider, MemoryComponentProvider, MemoryReleaseStore,
    MemoryVersionAssignmentStore, StaticCommitLog,
};
use forgeline_state::{
    AutoIntegrate, BranchProvider, BranchRecord, BranchType, ChildComponent, ComponentRecord,
    DependencyPattern, DependencyStatus, Lifecycle, Release, ReleaseStore,
};
use uuid::Uuid;

struct World {
    releases: Arc<MemoryReleaseStore>,
    branches: Arc<MemoryBranchProvider>,
    components: Arc<MemoryComponentProvider>,
    lifecycle: Arc<ReleaseLifecycle>,
    engine: AutoIntegrationEngine,
    org: Uuid,
}

/// Full stack over the in-memory fakes, without the assembled hook, so every
/// integration pass is an explicit `engine.run` call.
fn world() -> World {
    let releases = Arc::new(MemoryReleaseStore::new());
    let branches = Arc::new(MemoryBranchProvider::new());
    let components = Arc::new(MemoryComponentProvider::new());
    let assignments = Arc::new(MemoryVersionAssignmentStore::new());
    let commits = Arc::new(StaticCommitLog::new());
    let audit = Arc::new(MemoryAuditLog::new());
    let sink = Arc::new(RecordingSink::new());

    let allocator = Arc::new(VersionAllocator::new(
        assignments.clone(),
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
        Arc::new(ConventionalCommitClassifier::new()),
    );
    let engine = AutoIntegrationEngine::new(
        releases.clone(),
        branches.clone(),
        components.clone(),
        lifecycle.clone(),
        allocator,
        bump,
    );
    World {
        releases,
        branches,
        components,
        lifecycle,
        engine,
        org: Uuid::new_v4(),
    }
}

impl World {
    /// A component with one BASE branch on the semver schema.
    async fn component(&self, name: &str) -> (ComponentRecord, BranchRecord) {
        let component = self
            .components
            .add(ComponentRecord::new(self.org, name, "semver"));
        let mut branch = BranchRecord::new("main", component.uuid, self.org, BranchType::Base);
        branch.version_schema = "semver".to_string();
        let branch = self.branches.save(branch).await.unwrap();
        (component, branch)
    }

    async fn feature_branch(&self, component: &ComponentRecord, name: &str) -> BranchRecord {
        let mut branch = BranchRecord::new(name, component.uuid, self.org, BranchType::Feature);
        branch.version_schema = "semver".to_string();
        self.branches.save(branch).await.unwrap()
    }

    /// A product (feature-set) branch with auto-integrate enabled.
    async fn product_branch(
        &self,
        dependencies: Vec<ChildComponent>,
        patterns: Vec<DependencyPattern>,
    ) -> BranchRecord {
        let component = self
            .components
            .add(ComponentRecord::new(self.org, "platform", "semver"));
        let mut branch = BranchRecord::new("main", component.uuid, self.org, BranchType::Base);
        branch.version_schema = "semver".to_string();
        branch.auto_integrate = AutoIntegrate::Enabled;
        branch.dependencies = dependencies;
        branch.dependency_patterns = patterns;
        self.branches.save(branch).await.unwrap()
    }

    async fn assembled(&self, branch: &BranchRecord, version: &str) -> Release {
        let input = ReleaseInput::new(branch.uuid, self.org, version, Lifecycle::Assembled);
        self.lifecycle.create_release(input).await.unwrap()
    }

    fn releases_of_branch(&self, branch: Uuid) -> Vec<Release> {
        self.releases
            .all()
            .into_iter()
            .filter(|r| r.branch == branch)
            .collect()
    }
}

#[tokio::test]
async fn assembled_release_creates_a_product_release() {
    let w = world();
    let (svc, svc_main) = w.component("svc-a").await;
    let product = w
        .product_branch(
            vec![ChildComponent::required(svc.uuid, svc_main.uuid)],
            Vec::new(),
        )
        .await;

    let trigger = w.assembled(&svc_main, "1.0.0").await;
    w.engine.run(&trigger).await;

    let created = w.releases_of_branch(product.uuid);
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].version, "0.1.0");
    assert_eq!(created[0].lifecycle, Lifecycle::Assembled);
    assert!(created[0].has_parent(trigger.uuid));
}

#[tokio::test]
async fn repeated_trigger_never_duplicates_the_product() {
    let w = world();
    let (svc, svc_main) = w.component("svc-a").await;
    let product = w
        .product_branch(
            vec![ChildComponent::required(svc.uuid, svc_main.uuid)],
            Vec::new(),
        )
        .await;

    let trigger = w.assembled(&svc_main, "1.0.0").await;
    w.engine.run(&trigger).await;
    w.engine.run(&trigger).await;

    assert_eq!(w.releases_of_branch(product.uuid).len(), 1);
}

#[tokio::test]
async fn ignored_slot_never_integrates() {
    let w = world();
    let (svc, svc_main) = w.component("svc-a").await;
    let mut slot = ChildComponent::required(svc.uuid, svc_main.uuid);
    slot.status = DependencyStatus::Ignored;
    let product = w.product_branch(vec![slot], Vec::new()).await;

    let trigger = w.assembled(&svc_main, "1.0.0").await;
    w.engine.run(&trigger).await;

    assert!(w.releases_of_branch(product.uuid).is_empty());
}

#[tokio::test]
async fn release_pinned_slot_never_integrates() {
    let w = world();
    let (svc, svc_main) = w.component("svc-a").await;
    let frozen = w.assembled(&svc_main, "0.9.0").await;
    let mut slot = ChildComponent::required(svc.uuid, svc_main.uuid);
    slot.release = Some(frozen.uuid);
    let product = w.product_branch(vec![slot], Vec::new()).await;

    let trigger = w.assembled(&svc_main, "1.0.0").await;
    w.engine.run(&trigger).await;

    assert!(w.releases_of_branch(product.uuid).is_empty());
}

#[tokio::test]
async fn disabled_auto_integrate_never_integrates() {
    let w = world();
    let (svc, svc_main) = w.component("svc-a").await;
    let mut product = w
        .product_branch(
            vec![ChildComponent::required(svc.uuid, svc_main.uuid)],
            Vec::new(),
        )
        .await;
    product.auto_integrate = AutoIntegrate::Disabled;
    let product = w.branches.save(product).await.unwrap();

    let trigger = w.assembled(&svc_main, "1.0.0").await;
    w.engine.run(&trigger).await;

    assert!(w.releases_of_branch(product.uuid).is_empty());
}

#[tokio::test]
async fn pattern_matched_component_integrates_without_declaration() {
    let w = world();
    let (_, svc_main) = w.component("svc-payments").await;
    let product = w
        .product_branch(
            Vec::new(),
            vec![DependencyPattern {
                pattern: "^svc-".to_string(),
                target_branch_name: None,
                default_status: None,
            }],
        )
        .await;

    let trigger = w.assembled(&svc_main, "1.0.0").await;
    w.engine.run(&trigger).await;

    let created = w.releases_of_branch(product.uuid);
    assert_eq!(created.len(), 1);
    assert!(created[0].has_parent(trigger.uuid));
}

#[tokio::test]
async fn base_branch_release_is_preferred_over_the_trigger() {
    let w = world();
    let (svc, svc_main) = w.component("svc-a").await;
    let svc_feature = w.feature_branch(&svc, "feature/x").await;
    let on_base = w.assembled(&svc_main, "1.0.0").await;
    let product = w
        .product_branch(
            vec![
                ChildComponent::required(svc.uuid, svc_feature.uuid),
                ChildComponent::required(svc.uuid, svc_main.uuid),
            ],
            Vec::new(),
        )
        .await;

    let trigger = w.assembled(&svc_feature, "1.1.0").await;
    w.engine.run(&trigger).await;

    let created = w.releases_of_branch(product.uuid);
    assert_eq!(created.len(), 1);
    assert!(created[0].has_parent(on_base.uuid));
    assert!(!created[0].has_parent(trigger.uuid));
}

#[tokio::test]
async fn missing_required_dependency_aborts_the_branch_only() {
    let w = world();
    let (svc_a, a_main) = w.component("svc-a").await;
    let (svc_b, b_main) = w.component("svc-b").await;
    let with_missing = w
        .product_branch(
            vec![
                ChildComponent::required(svc_a.uuid, a_main.uuid),
                ChildComponent::required(svc_b.uuid, b_main.uuid),
            ],
            Vec::new(),
        )
        .await;
    let healthy = w
        .product_branch(
            vec![ChildComponent::required(svc_a.uuid, a_main.uuid)],
            Vec::new(),
        )
        .await;

    let trigger = w.assembled(&a_main, "1.0.0").await;
    w.engine.run(&trigger).await;

    assert!(w.releases_of_branch(with_missing.uuid).is_empty());
    assert_eq!(w.releases_of_branch(healthy.uuid).len(), 1);
}

#[tokio::test]
async fn dependency_patch_bumps_the_product_patch_position() {
    let w = world();
    let (svc, svc_main) = w.component("svc-a").await;
    let product = w
        .product_branch(
            vec![ChildComponent::required(svc.uuid, svc_main.uuid)],
            Vec::new(),
        )
        .await;

    let first = w.assembled(&svc_main, "1.0.0").await;
    w.engine.run(&first).await;
    let second = w.assembled(&svc_main, "1.0.1").await;
    w.engine.run(&second).await;

    let mut versions: Vec<String> = w
        .releases_of_branch(product.uuid)
        .into_iter()
        .map(|r| r.version)
        .collect();
    versions.sort();
    assert_eq!(versions, vec!["0.1.0".to_string(), "0.1.1".to_string()]);
}

#[tokio::test]
async fn dependency_major_bumps_the_product_major_position() {
    let w = world();
    let (svc, svc_main) = w.component("svc-a").await;
    let product = w
        .product_branch(
            vec![ChildComponent::required(svc.uuid, svc_main.uuid)],
            Vec::new(),
        )
        .await;

    let first = w.assembled(&svc_main, "1.0.0").await;
    w.engine.run(&first).await;
    let second = w.assembled(&svc_main, "2.0.0").await;
    w.engine.run(&second).await;

    let latest = w
        .releases
        .latest_of_branch(product.uuid, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.version, "1.0.0");
}

#[tokio::test]
async fn wired_stack_integrates_on_assembly_without_being_awaited() -> anyhow::Result<()> {
    let releases = Arc::new(MemoryReleaseStore::new());
    let branches = Arc::new(MemoryBranchProvider::new());
    let components = Arc::new(MemoryComponentProvider::new());
    let org = Uuid::new_v4();

    let svc = components.add(ComponentRecord::new(org, "svc-a", "semver"));
    let mut svc_main = BranchRecord::new("main", svc.uuid, org, BranchType::Base);
    svc_main.version_schema = "semver".to_string();
    let svc_main = branches.save(svc_main).await?;

    let platform = components.add(ComponentRecord::new(org, "platform", "semver"));
    let mut product = BranchRecord::new("main", platform.uuid, org, BranchType::Base);
    product.version_schema = "semver".to_string();
    product.auto_integrate = AutoIntegrate::Enabled;
    product.dependencies = vec![ChildComponent::required(svc.uuid, svc_main.uuid)];
    let product = branches.save(product).await?;

    let (lifecycle, _engine) = wire(
        releases.clone(),
        branches.clone(),
        components,
        Arc::new(MemoryVersionAssignmentStore::new()),
        Arc::new(StaticCommitLog::new()),
        Arc::new(MemoryAuditLog::new()),
        Arc::new(RecordingSink::new()),
        Arc::new(ConventionalCommitClassifier::new()),
    );

    let input = ReleaseInput::new(svc_main.uuid, org, "1.0.0", Lifecycle::Assembled);
    let trigger = lifecycle.create_release(input).await?;

    // The integration pass runs detached; poll for its result.
    let mut integrated = false;
    for _ in 0..100 {
        let products = releases.find_products_with_parent(org, trigger.uuid).await?;
        if products.iter().any(|p| p.branch == product.uuid) {
            integrated = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(integrated, "product release never appeared");
    Ok(())
}
