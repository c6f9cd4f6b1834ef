use crate::authentication::AuthenticationProvider;
use crate::authorization::AuthorizationProvider;
use crate::composite::CompositeSecurityProvider;
use crate::error::{Error, Result};
use crate::permission::Grantee;
use crate::principal::Principal;
use crate::registry::FactoryRegistry;
use crate::resource::{ResourceAction, ResourceKey};
use crate::types::IdentityId;
use std::collections::HashSet;
use std::sync::{Arc, Weak};

/// Registered name of [`DefaultCheckPermissionStrategy`].
pub const DEFAULT_STRATEGY: &str = "default";
/// Registered name of [`DirectCheckPermissionStrategy`].
pub const DIRECT_STRATEGY: &str = "direct";

/// Authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Permission is granted.
    Allow,
    /// Permission is denied.
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Self::Allow
    }
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed { Self::Allow } else { Self::Deny }
    }
}

/// Policy deciding whether a principal may act on a resource.
///
/// Strategies are built with a weak handle to the composite that owns them
/// and read grants and identity hierarchy back through it.
pub trait CheckPermissionStrategy: Send + Sync {
    /// Decides whether `principal` may perform `action` on `key`.
    fn check_permission(
        &self,
        principal: &Principal,
        key: &ResourceKey,
        action: ResourceAction,
    ) -> Result<Decision>;
}

/// Strategy factories keyed by configuration name.
pub type StrategyRegistry =
    FactoryRegistry<Weak<CompositeSecurityProvider>, Box<dyn CheckPermissionStrategy>>;

impl StrategyRegistry {
    /// Returns a registry holding the built-in strategies.
    pub fn with_defaults() -> Self {
        Self::new("permission check strategy")
            .with(DEFAULT_STRATEGY, |composite| {
                let strategy: Box<dyn CheckPermissionStrategy> =
                    Box::new(DefaultCheckPermissionStrategy::new(composite));
                Ok(strategy)
            })
            .with(DIRECT_STRATEGY, |composite| {
                let strategy: Box<dyn CheckPermissionStrategy> =
                    Box::new(DirectCheckPermissionStrategy::new(composite));
                Ok(strategy)
            })
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn upgrade(composite: &Weak<CompositeSecurityProvider>) -> Result<Arc<CompositeSecurityProvider>> {
    composite
        .upgrade()
        .ok_or(Error::ProviderUnavailable("composite security provider"))
}

/// Everything a principal acts as: itself, its expanded roles and groups,
/// and its organization.
#[derive(Debug, Default)]
struct Subject {
    roles: HashSet<IdentityId>,
    groups: HashSet<IdentityId>,
}

impl Subject {
    fn matches(&self, principal: &Principal, grantee: &Grantee) -> bool {
        match grantee {
            Grantee::User(id) => id == principal.id(),
            Grantee::Role(id) => self.roles.contains(id),
            Grantee::Group(id) => self.groups.contains(id),
            Grantee::Organization(org) => {
                org == principal.org_id() || (org.is_self() && principal.org_id().is_default())
            }
        }
    }
}

/// Resolves grants along the folder hierarchy and the identity hierarchy.
///
/// - A system administrator role allows everything.
/// - Resources outside the principal's organization are denied.
/// - An organization administrator role allows everything in its organization.
/// - Otherwise the nearest key (the resource, then each enclosing folder)
///   with grantees for the action decides; no such key denies.
///
/// A principal acts as its user, every role reachable from its own roles and
/// its groups' roles, every group reachable from its groups (when the store
/// supports group grants), and its organization.
#[derive(Debug)]
pub struct DefaultCheckPermissionStrategy {
    composite: Weak<CompositeSecurityProvider>,
}

impl DefaultCheckPermissionStrategy {
    pub fn new(composite: Weak<CompositeSecurityProvider>) -> Self {
        Self { composite }
    }

    fn subject(
        &self,
        composite: &CompositeSecurityProvider,
        principal: &Principal,
    ) -> Result<Subject> {
        let auth = composite.authentication();
        let max_depth = composite.config().max_inherit_depth;

        let mut direct_groups = principal.groups().to_vec();
        direct_groups.extend(auth.user_groups(principal.id())?);
        let groups = expand(direct_groups, max_depth, |group| auth.group_parents(group))?;

        let mut direct_roles = principal.roles().to_vec();
        direct_roles.extend(auth.user_roles(principal.id())?);
        for group in &groups {
            direct_roles.extend(auth.group_roles(group)?);
        }
        let roles = expand(direct_roles, max_depth, |role| auth.role_parents(role))?;

        // Group grants are honored only when the store supports them; group
        // roles apply either way.
        let groups = if composite.supports_group_permission() {
            groups.into_iter().collect()
        } else {
            HashSet::new()
        };

        Ok(Subject {
            roles: roles.into_iter().collect(),
            groups,
        })
    }
}

impl CheckPermissionStrategy for DefaultCheckPermissionStrategy {
    fn check_permission(
        &self,
        principal: &Principal,
        key: &ResourceKey,
        action: ResourceAction,
    ) -> Result<Decision> {
        let composite = upgrade(&self.composite)?;
        let auth = composite.authentication();
        let subject = self.subject(&composite, principal)?;

        if subject
            .roles
            .iter()
            .any(|role| auth.is_system_administrator_role(role))
        {
            return Ok(Decision::Allow);
        }
        if key.org_id() != principal.org_id() {
            return Ok(Decision::Deny);
        }
        if subject
            .roles
            .iter()
            .any(|role| auth.is_org_administrator_role(role) && role.org_id() == key.org_id())
        {
            return Ok(Decision::Allow);
        }

        let mut current = Some(key.clone());
        while let Some(candidate) = current {
            if let Some(permission) = composite.get_permission(&candidate)?
                && permission.has_grants(action)
            {
                let allowed = permission
                    .grantees(action)
                    .any(|grantee| subject.matches(principal, grantee));
                return Ok(Decision::from(allowed));
            }
            current = candidate.parent();
        }

        Ok(Decision::Deny)
    }
}

/// Checks only the exact key against the principal's session identities.
///
/// No folder inheritance, no hierarchy expansion, no administrator roles.
#[derive(Debug)]
pub struct DirectCheckPermissionStrategy {
    composite: Weak<CompositeSecurityProvider>,
}

impl DirectCheckPermissionStrategy {
    pub fn new(composite: Weak<CompositeSecurityProvider>) -> Self {
        Self { composite }
    }
}

impl CheckPermissionStrategy for DirectCheckPermissionStrategy {
    fn check_permission(
        &self,
        principal: &Principal,
        key: &ResourceKey,
        action: ResourceAction,
    ) -> Result<Decision> {
        let composite = upgrade(&self.composite)?;
        if key.org_id() != principal.org_id() {
            return Ok(Decision::Deny);
        }
        let Some(permission) = composite.get_permission(key)? else {
            return Ok(Decision::Deny);
        };

        let subject = Subject {
            roles: principal.roles().iter().cloned().collect(),
            groups: if composite.supports_group_permission() {
                principal.groups().iter().cloned().collect()
            } else {
                HashSet::new()
            },
        };
        let allowed = permission
            .grantees(action)
            .any(|grantee| subject.matches(principal, grantee));
        Ok(Decision::from(allowed))
    }
}

/// Depth-first closure over `parents`, rejecting cycles and overly deep chains.
fn expand<F>(seeds: Vec<IdentityId>, max_depth: usize, parents: F) -> Result<Vec<IdentityId>>
where
    F: Fn(&IdentityId) -> Result<Vec<IdentityId>>,
{
    let mut visited = HashSet::new();
    let mut visiting = HashSet::new();
    let mut output = Vec::new();

    for seed in seeds {
        if visited.contains(&seed) {
            continue;
        }
        expand_from(seed, max_depth, &parents, &mut visited, &mut visiting, &mut output)?;
    }

    Ok(output)
}

fn expand_from<F>(
    seed: IdentityId,
    max_depth: usize,
    parents: &F,
    visited: &mut HashSet<IdentityId>,
    visiting: &mut HashSet<IdentityId>,
    output: &mut Vec<IdentityId>,
) -> Result<()>
where
    F: Fn(&IdentityId) -> Result<Vec<IdentityId>>,
{
    let direct = parents(&seed)?;
    visiting.insert(seed.clone());
    output.push(seed.clone());

    let mut stack: Vec<(IdentityId, usize, std::vec::IntoIter<IdentityId>)> =
        vec![(seed, 0, direct.into_iter())];

    while let Some((current, depth, mut iter)) = stack.pop() {
        if let Some(parent) = iter.next() {
            stack.push((current, depth, iter));

            let next_depth = depth + 1;
            if next_depth > max_depth {
                return Err(Error::RoleDepthExceeded {
                    identity: parent,
                    max_depth,
                });
            }
            if visiting.contains(&parent) {
                return Err(Error::RoleCycleDetected { identity: parent });
            }
            if visited.contains(&parent) {
                continue;
            }

            let grand_parents = parents(&parent)?;
            visiting.insert(parent.clone());
            output.push(parent.clone());
            stack.push((parent, next_depth, grand_parents.into_iter()));
            continue;
        }

        visiting.remove(&current);
        visited.insert(current);
    }

    Ok(())
}
