use crate::resource::ResourceAction;
use crate::types::{IdentityId, IdentityType, OrganizationId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A principal a grant is given to.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Grantee {
    /// A single user.
    User(IdentityId),
    /// Every member of a group, including nested groups.
    Group(IdentityId),
    /// Every holder of a role, including inheriting roles.
    Role(IdentityId),
    /// Every identity in an organization.
    Organization(OrganizationId),
}

impl Grantee {
    /// Builds a grantee from an identity kind and id.
    pub fn from_identity(kind: IdentityType, id: IdentityId) -> Self {
        match kind {
            IdentityType::User => Self::User(id),
            IdentityType::Group => Self::Group(id),
            IdentityType::Role => Self::Role(id),
            IdentityType::Organization => Self::Organization(id.org_id().clone()),
        }
    }

    /// Returns the identity kind.
    pub fn kind(&self) -> IdentityType {
        match self {
            Self::User(_) => IdentityType::User,
            Self::Group(_) => IdentityType::Group,
            Self::Role(_) => IdentityType::Role,
            Self::Organization(_) => IdentityType::Organization,
        }
    }

    /// Returns the organization the grantee lives in.
    pub fn org_id(&self) -> &OrganizationId {
        match self {
            Self::User(id) | Self::Group(id) | Self::Role(id) => id.org_id(),
            Self::Organization(org) => org,
        }
    }

    fn moved_to(&self, org_id: &OrganizationId) -> Self {
        match self {
            Self::User(id) => Self::User(id.with_org_id(org_id.clone())),
            Self::Group(id) => Self::Group(id.with_org_id(org_id.clone())),
            Self::Role(id) => Self::Role(id.with_org_id(org_id.clone())),
            Self::Organization(_) => Self::Organization(org_id.clone()),
        }
    }
}

impl fmt::Display for Grantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) | Self::Group(id) | Self::Role(id) => write!(f, "{}:{id}", self.kind()),
            Self::Organization(org) => write!(f, "organization:{org}"),
        }
    }
}

/// Grant set of a resource or identity: action to allowed grantees.
///
/// A `Permission` with no grantees is an explicit empty grant and is distinct
/// from a key that was never assigned a permission.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission {
    grants: BTreeMap<ResourceAction, BTreeSet<Grantee>>,
}

impl Permission {
    /// Creates an empty grant set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a grant and returns the updated permission.
    pub fn with_grant(mut self, action: ResourceAction, grantee: Grantee) -> Self {
        self.grant(action, grantee);
        self
    }

    /// Grants `action` to `grantee`. Returns false if it was already granted.
    pub fn grant(&mut self, action: ResourceAction, grantee: Grantee) -> bool {
        self.grants.entry(action).or_default().insert(grantee)
    }

    /// Revokes `action` from `grantee`. Returns false if it was not granted.
    pub fn revoke(&mut self, action: ResourceAction, grantee: &Grantee) -> bool {
        let Some(set) = self.grants.get_mut(&action) else {
            return false;
        };
        let removed = set.remove(grantee);
        if set.is_empty() {
            self.grants.remove(&action);
        }
        removed
    }

    /// Returns grantees for an action.
    pub fn grantees(&self, action: ResourceAction) -> impl Iterator<Item = &Grantee> {
        self.grants.get(&action).into_iter().flatten()
    }

    /// Returns whether `grantee` holds `action` directly.
    pub fn is_granted(&self, action: ResourceAction, grantee: &Grantee) -> bool {
        self.grants
            .get(&action)
            .is_some_and(|set| set.contains(grantee))
    }

    /// Returns true when any grantee is assigned for the action.
    pub fn has_grants(&self, action: ResourceAction) -> bool {
        self.grants.get(&action).is_some_and(|set| !set.is_empty())
    }

    /// Returns the actions with at least one grantee.
    pub fn actions(&self) -> impl Iterator<Item = ResourceAction> + '_ {
        self.grants.keys().copied()
    }

    /// Returns true when nothing is granted.
    pub fn is_blank(&self) -> bool {
        self.grants.values().all(BTreeSet::is_empty)
    }

    /// Adds every grant of `other`. Returns true if anything was new.
    pub fn merge(&mut self, other: &Permission) -> bool {
        let mut changed = false;
        for (action, grantees) in &other.grants {
            let set = self.grants.entry(*action).or_default();
            for grantee in grantees {
                changed |= set.insert(grantee.clone());
            }
        }
        changed
    }

    /// Replaces `old` with `new` in every action. Returns true if anything changed.
    pub fn rename_grantee(&mut self, old: &Grantee, new: &Grantee) -> bool {
        let mut changed = false;
        for set in self.grants.values_mut() {
            if set.remove(old) {
                set.insert(new.clone());
                changed = true;
            }
        }
        changed
    }

    /// Removes `grantee` from every action. Returns true if anything changed.
    pub fn remove_grantee(&mut self, grantee: &Grantee) -> bool {
        let mut changed = false;
        for set in self.grants.values_mut() {
            changed |= set.remove(grantee);
        }
        self.grants.retain(|_, set| !set.is_empty());
        changed
    }

    /// Moves every grantee of `old` into `new`. Returns true if anything changed.
    pub fn rename_organization(&mut self, old: &OrganizationId, new: &OrganizationId) -> bool {
        let mut changed = false;
        for set in self.grants.values_mut() {
            let moved: Vec<Grantee> = set
                .iter()
                .filter(|grantee| grantee.org_id() == old)
                .cloned()
                .collect();
            for grantee in moved {
                set.remove(&grantee);
                set.insert(grantee.moved_to(new));
                changed = true;
            }
        }
        changed
    }

    /// Drops every grantee that belongs to `org`. Returns true if anything changed.
    pub fn remove_organization(&mut self, org: &OrganizationId) -> bool {
        let mut changed = false;
        for set in self.grants.values_mut() {
            let before = set.len();
            set.retain(|grantee| grantee.org_id() != org);
            changed |= set.len() != before;
        }
        self.grants.retain(|_, set| !set.is_empty());
        changed
    }
}
