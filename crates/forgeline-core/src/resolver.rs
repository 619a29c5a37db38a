//! Effective dependency resolution for product branches.
//!
//! A product branch declares dependencies two ways: explicit
//! `ChildComponent` entries and name-matching dependency patterns. The
//! effective set merges both, with explicit entries overriding pattern
//! matches for the same component.

use regex::Regex;
use tracing::{debug, warn};

use forgeline_state::{
    BranchProvider, BranchRecord, BranchType, ChildComponent, ComponentProvider, ComponentRecord,
    DependencyStatus,
};

use crate::error::Result;

/// A component together with the branches pattern resolution may target:
/// its BASE branch and any branches named by the product's patterns.
#[derive(Debug, Clone)]
pub struct ComponentListing {
    pub component: ComponentRecord,
    pub branches: Vec<BranchRecord>,
}

impl ComponentListing {
    fn branch_named(&self, name: &str) -> Option<&BranchRecord> {
        self.branches
            .iter()
            .find(|b| b.name == name && !b.archived)
    }

    fn base_branch(&self) -> Option<&BranchRecord> {
        self.branches
            .iter()
            .find(|b| b.branch_type == BranchType::Base && !b.archived)
    }
}

/// Build the component index a product branch's patterns resolve against:
/// every org component, each listed with its BASE branch and the branches
/// the patterns name explicitly.
pub async fn index_for_branch(
    branch: &BranchRecord,
    components: &dyn ComponentProvider,
    branches: &dyn BranchProvider,
) -> Result<Vec<ComponentListing>> {
    let mut index = Vec::new();
    for component in components.list_by_org(branch.org).await? {
        let mut targets = Vec::new();
        if let Some(base) = branches.base_branch_of_component(component.uuid).await? {
            targets.push(base);
        }
        for pattern in &branch.dependency_patterns {
            if let Some(name) = &pattern.target_branch_name {
                if let Some(named) = branches
                    .find_by_component_and_name(component.uuid, name)
                    .await?
                {
                    if !targets.iter().any(|b| b.uuid == named.uuid) {
                        targets.push(named);
                    }
                }
            }
        }
        index.push(ComponentListing {
            component,
            branches: targets,
        });
    }
    Ok(index)
}

/// Compute the effective dependency set of a product branch.
///
/// Pure function of the branch and the component index. Pattern-matched
/// components are synthesized first (skipping the branch's own component,
/// archived components, and components without a resolvable target branch);
/// explicit entries then override pattern entries for the same component.
/// Invalid pattern regexes are skipped, never fatal.
pub fn resolve_effective_dependencies(
    branch: &BranchRecord,
    index: &[ComponentListing],
) -> Vec<ChildComponent> {
    let mut effective: Vec<ChildComponent> = Vec::new();

    for pattern in &branch.dependency_patterns {
        let regex = match Regex::new(&pattern.pattern) {
            Ok(re) => re,
            Err(err) => {
                warn!(pattern = %pattern.pattern, %err, "skipping invalid dependency pattern");
                continue;
            }
        };
        for listing in index {
            let component = &listing.component;
            if component.archived
                || component.uuid == branch.component
                || !regex.is_match(&component.name)
            {
                continue;
            }
            if effective.iter().any(|d| d.component == component.uuid) {
                continue;
            }
            let target = match &pattern.target_branch_name {
                Some(name) => listing.branch_named(name),
                None => listing.base_branch(),
            };
            let Some(target) = target else {
                debug!(component = %component.name, "pattern match has no resolvable branch");
                continue;
            };
            effective.push(ChildComponent {
                component: component.uuid,
                branch: Some(target.uuid),
                release: None,
                status: pattern.default_status.unwrap_or(DependencyStatus::Required),
            });
        }
    }

    // Explicit declarations win over pattern matches for the same component.
    for declared in &branch.dependencies {
        match effective
            .iter()
            .position(|d| d.component == declared.component)
        {
            Some(pos) => effective[pos] = declared.clone(),
            None => effective.push(declared.clone()),
        }
    }

    effective
}

/// Candidate product branches for auto-integration of a component's name:
/// branches with auto-integrate enabled and at least one pattern matching.
pub fn pattern_matches_component(branch: &BranchRecord, component_name: &str) -> bool {
    branch.dependency_patterns.iter().any(|p| {
        Regex::new(&p.pattern)
            .map(|re| re.is_match(component_name))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeline_state::{AutoIntegrate, DependencyPattern};
    use uuid::Uuid;

    fn listing(component: ComponentRecord, branches: Vec<BranchRecord>) -> ComponentListing {
        ComponentListing {
            component,
            branches,
        }
    }

    fn base_branch(component: &ComponentRecord, name: &str) -> BranchRecord {
        BranchRecord::new(name, component.uuid, component.org, BranchType::Base)
    }

    #[test]
    fn patterns_synthesize_required_slots_on_base_branches() {
        let org = Uuid::new_v4();
        let svc = ComponentRecord::new(org, "payments-api", "semver");
        let svc_base = base_branch(&svc, "main");
        let product_component = ComponentRecord::new(org, "platform", "semver");
        let mut product = BranchRecord::new("main", product_component.uuid, org, BranchType::Base);
        product.auto_integrate = AutoIntegrate::Enabled;
        product.dependency_patterns = vec![DependencyPattern {
            pattern: "^payments-.*".to_string(),
            target_branch_name: None,
            default_status: None,
        }];

        let index = vec![
            listing(svc.clone(), vec![svc_base.clone()]),
            listing(product_component, vec![product.clone()]),
        ];
        let effective = resolve_effective_dependencies(&product, &index);
        assert_eq!(effective.len(), 1);
        assert_eq!(effective[0].component, svc.uuid);
        assert_eq!(effective[0].branch, Some(svc_base.uuid));
        assert_eq!(effective[0].status, DependencyStatus::Required);
    }

    #[test]
    fn explicit_declaration_overrides_pattern_match() {
        let org = Uuid::new_v4();
        let svc = ComponentRecord::new(org, "payments-api", "semver");
        let svc_base = base_branch(&svc, "main");
        let pinned = Uuid::new_v4();
        let product_component = ComponentRecord::new(org, "platform", "semver");
        let mut product = BranchRecord::new("main", product_component.uuid, org, BranchType::Base);
        product.dependency_patterns = vec![DependencyPattern {
            pattern: "^payments-.*".to_string(),
            target_branch_name: None,
            default_status: None,
        }];
        product.dependencies = vec![ChildComponent {
            component: svc.uuid,
            branch: Some(svc_base.uuid),
            release: Some(pinned),
            status: DependencyStatus::Ignored,
        }];

        let index = vec![listing(svc.clone(), vec![svc_base])];
        let effective = resolve_effective_dependencies(&product, &index);
        assert_eq!(effective.len(), 1);
        assert_eq!(effective[0].status, DependencyStatus::Ignored);
        assert_eq!(effective[0].release, Some(pinned));
    }

    #[test]
    fn archived_and_self_components_never_match() {
        let org = Uuid::new_v4();
        let mut retired = ComponentRecord::new(org, "payments-legacy", "semver");
        retired.archived = true;
        let retired_base = base_branch(&retired, "main");
        let product_component = ComponentRecord::new(org, "payments-platform", "semver");
        let mut product = BranchRecord::new("main", product_component.uuid, org, BranchType::Base);
        product.dependency_patterns = vec![DependencyPattern {
            pattern: "^payments-.*".to_string(),
            target_branch_name: None,
            default_status: None,
        }];

        let index = vec![
            listing(retired, vec![retired_base]),
            listing(
                product_component.clone(),
                vec![base_branch(&product_component, "main")],
            ),
        ];
        let effective = resolve_effective_dependencies(&product, &index);
        assert!(effective.is_empty());
    }

    #[test]
    fn invalid_regex_is_skipped() {
        let org = Uuid::new_v4();
        let svc = ComponentRecord::new(org, "payments-api", "semver");
        let svc_base = base_branch(&svc, "main");
        let mut product = BranchRecord::new("main", Uuid::new_v4(), org, BranchType::Base);
        product.dependency_patterns = vec![
            DependencyPattern {
                pattern: "([unclosed".to_string(),
                target_branch_name: None,
                default_status: None,
            },
            DependencyPattern {
                pattern: "^payments-.*".to_string(),
                target_branch_name: None,
                default_status: Some(DependencyStatus::Optional),
            },
        ];

        let index = vec![listing(svc.clone(), vec![svc_base])];
        let effective = resolve_effective_dependencies(&product, &index);
        assert_eq!(effective.len(), 1);
        assert_eq!(effective[0].status, DependencyStatus::Optional);
    }
}
