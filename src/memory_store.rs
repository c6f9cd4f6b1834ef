use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::authentication::AuthenticationProvider;
use crate::authorization::{AuthorizationProvider, PermissionEntry};
use crate::capability::{JsonConfigurableProvider, SecurityProvider};
use crate::error::{Error, Result};
use crate::events::{AuthenticationChangeEvent, AuthenticationChangeListener};
use crate::org_cache::{Organization, OrganizationCache};
use crate::permission::{Grantee, Permission};
use crate::resource::{ResourceKey, ResourceType};
use crate::types::{IdentityId, IdentityType, OrganizationId};
use crate::user_provider::{SsoUser, UserProvider};

/// In-memory authorization provider for tests, demos and single-node setups.
///
/// Grants live in a sharded map, so writers on different keys rarely block
/// each other.
#[derive(Debug, Clone)]
pub struct MemoryAuthorizationProvider {
    name: String,
    inner: Arc<GrantStore>,
}

#[derive(Debug)]
struct GrantStore {
    grants: DashMap<ResourceKey, Permission>,
    group_permission: AtomicBool,
    torn_down: AtomicBool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrantDocument {
    #[serde(default = "group_permission_by_default")]
    group_permission: bool,
    #[serde(default)]
    grants: Vec<PermissionEntry>,
}

fn group_permission_by_default() -> bool {
    true
}

impl MemoryAuthorizationProvider {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self {
            name: "memory".to_string(),
            inner: Arc::new(GrantStore {
                grants: DashMap::new(),
                group_permission: AtomicBool::new(true),
                torn_down: AtomicBool::new(false),
            }),
        }
    }

    /// Enables or disables group grants.
    pub fn with_group_permission(self, on: bool) -> Self {
        self.inner.group_permission.store(on, Ordering::SeqCst);
        self
    }

    /// Returns the number of stored grants.
    pub fn len(&self) -> usize {
        self.inner.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.grants.is_empty()
    }

    fn rewrite_all<F>(&self, mut rewrite: F) -> usize
    where
        F: FnMut(&mut Permission) -> bool,
    {
        let mut changed = 0;
        for mut entry in self.inner.grants.iter_mut() {
            if rewrite(entry.value_mut()) {
                changed += 1;
            }
        }
        changed
    }

    /// Moves the grant at `old` to `new`, merging into any grant already there.
    fn rekey(&self, old: &ResourceKey, new: ResourceKey) {
        let Some((_, permission)) = self.inner.grants.remove(old) else {
            return;
        };
        match self.inner.grants.entry(new) {
            Entry::Occupied(mut slot) => {
                tracing::debug!(key = %slot.key(), "merging grant into existing key");
                slot.get_mut().merge(&permission);
            }
            Entry::Vacant(slot) => {
                slot.insert(permission);
            }
        }
    }

    fn rename_identity(&self, kind: IdentityType, old: &IdentityId, new: &IdentityId) -> usize {
        let resource_type = ResourceType::for_identity(kind);
        self.rekey(
            &ResourceKey::for_identity(resource_type, old),
            ResourceKey::for_identity(resource_type, new),
        );
        let old = Grantee::from_identity(kind, old.clone());
        let new = Grantee::from_identity(kind, new.clone());
        self.rewrite_all(|permission| permission.rename_grantee(&old, &new))
    }

    fn remove_identity(&self, kind: IdentityType, old: &IdentityId) -> usize {
        let resource_type = ResourceType::for_identity(kind);
        self.inner
            .grants
            .remove(&ResourceKey::for_identity(resource_type, old));
        let old = Grantee::from_identity(kind, old.clone());
        self.rewrite_all(|permission| permission.remove_grantee(&old))
    }

    fn rename_organization(&self, old: &OrganizationId, new: &OrganizationId) -> usize {
        let keys: Vec<ResourceKey> = self
            .inner
            .grants
            .iter()
            .filter(|entry| entry.key().org_id() == old)
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            let moved = match key.identity() {
                Some(identity) => ResourceKey::for_identity(
                    key.resource_type(),
                    &identity.with_org_id(new.clone()),
                ),
                None => key.with_org_id(new.clone()),
            };
            self.rekey(&key, moved);
        }
        self.rewrite_all(|permission| permission.rename_organization(old, new))
    }

    fn remove_organization(&self, old: &OrganizationId) -> usize {
        self.inner.grants.retain(|key, _| key.org_id() != old);
        self.rewrite_all(|permission| permission.remove_organization(old))
    }
}

impl Default for MemoryAuthorizationProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityProvider for MemoryAuthorizationProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn set_provider_name(&mut self, name: String) {
        self.name = name;
    }

    fn tear_down(&self) {
        if self.inner.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(provider = %self.name, grants = self.len(), "releasing grants");
        self.inner.grants.clear();
    }
}

impl AuthenticationChangeListener for MemoryAuthorizationProvider {
    fn authentication_changed(&self, event: &AuthenticationChangeEvent) -> Result<()> {
        let changed = match (event.is_organization_change(), event.is_removed()) {
            (true, true) => self.remove_organization(event.old_org_id()),
            (true, false) => {
                let new = event.new_org_id().ok_or_else(|| {
                    Error::authorization("organization rename without new organization")
                })?;
                self.rename_organization(event.old_org_id(), new)
            }
            (false, true) => self.remove_identity(event.identity_type(), event.old_id()),
            (false, false) => {
                let new = event
                    .new_id()
                    .ok_or_else(|| Error::authorization("identity rename without new id"))?;
                self.rename_identity(event.identity_type(), event.old_id(), new)
            }
        };
        tracing::debug!(provider = %self.name, changed, "rewrote grants after identity change");
        Ok(())
    }
}

impl JsonConfigurableProvider for MemoryAuthorizationProvider {
    /// Replaces every grant with the ones in the document.
    fn read_configuration(&self, config: &Value) -> Result<()> {
        let document = GrantDocument::deserialize(config)?;
        self.inner
            .group_permission
            .store(document.group_permission, Ordering::SeqCst);
        self.inner.grants.clear();
        for entry in document.grants {
            self.inner.grants.insert(entry.key, entry.permission);
        }
        Ok(())
    }

    fn write_configuration(&self) -> Result<Value> {
        let document = GrantDocument {
            group_permission: self.supports_group_permission(),
            grants: self.get_permissions()?,
        };
        Ok(serde_json::to_value(document)?)
    }
}

impl AuthorizationProvider for MemoryAuthorizationProvider {
    fn set_permission(&self, key: &ResourceKey, permission: Permission) -> Result<()> {
        self.inner.grants.insert(key.clone(), permission);
        Ok(())
    }

    fn remove_permission(&self, key: &ResourceKey) -> Result<()> {
        self.inner.grants.remove(key);
        Ok(())
    }

    fn get_permission(&self, key: &ResourceKey) -> Result<Option<Permission>> {
        Ok(self
            .inner
            .grants
            .get(key)
            .map(|entry| entry.value().clone()))
    }

    fn get_permissions(&self) -> Result<Vec<PermissionEntry>> {
        let mut entries: Vec<PermissionEntry> = self
            .inner
            .grants
            .iter()
            .map(|entry| PermissionEntry {
                key: entry.key().clone(),
                permission: entry.value().clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    fn supports_group_permission(&self) -> bool {
        self.inner.group_permission.load(Ordering::SeqCst)
    }

    fn configuration(&self) -> &dyn JsonConfigurableProvider {
        self
    }
}

type Edges = RwLock<HashMap<IdentityId, HashSet<IdentityId>>>;

fn add_edge(edges: &Edges, from: IdentityId, to: IdentityId) {
    let mut guard = edges.write().expect("poisoned lock");
    guard.entry(from).or_default().insert(to);
}

fn edges_of(edges: &Edges, from: &IdentityId) -> Vec<IdentityId> {
    let guard = edges.read().expect("poisoned lock");
    guard
        .get(from)
        .map(|targets| targets.iter().cloned().collect())
        .unwrap_or_default()
}

fn rename_sources(edges: &Edges, old: &IdentityId, new: &IdentityId) {
    let mut guard = edges.write().expect("poisoned lock");
    if let Some(targets) = guard.remove(old) {
        guard.entry(new.clone()).or_default().extend(targets);
    }
}

fn rename_targets(edges: &Edges, old: &IdentityId, new: &IdentityId) {
    let mut guard = edges.write().expect("poisoned lock");
    for targets in guard.values_mut() {
        if targets.remove(old) {
            targets.insert(new.clone());
        }
    }
}

fn remove_sources(edges: &Edges, old: &IdentityId) {
    edges.write().expect("poisoned lock").remove(old);
}

fn remove_targets(edges: &Edges, old: &IdentityId) {
    let mut guard = edges.write().expect("poisoned lock");
    for targets in guard.values_mut() {
        targets.remove(old);
    }
}

fn rename_member(set: &RwLock<HashSet<IdentityId>>, old: &IdentityId, new: &IdentityId) {
    let mut guard = set.write().expect("poisoned lock");
    if guard.remove(old) {
        guard.insert(new.clone());
    }
}

/// In-memory identity directory for tests and demos.
///
/// Passwords are kept as given; do not use it with real credentials.
#[derive(Debug, Clone)]
pub struct MemoryAuthenticationProvider {
    name: String,
    inner: Arc<Directory>,
}

#[derive(Debug, Default)]
struct Directory {
    passwords: RwLock<HashMap<IdentityId, String>>,
    password_resets: RwLock<HashSet<IdentityId>>,
    user_roles: Edges,
    user_groups: Edges,
    role_parents: Edges,
    group_parents: Edges,
    group_roles: Edges,
    system_admin_roles: RwLock<HashSet<IdentityId>>,
    org_admin_roles: RwLock<HashSet<IdentityId>>,
}

impl MemoryAuthenticationProvider {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            name: "memory".to_string(),
            inner: Arc::default(),
        }
    }

    /// Adds or replaces a user.
    pub fn add_user(&self, user: IdentityId, password: impl Into<String>) {
        let mut guard = self.inner.passwords.write().expect("poisoned lock");
        guard.insert(user, password.into());
    }

    /// Assigns a role to a user.
    pub fn add_user_role(&self, user: IdentityId, role: IdentityId) {
        add_edge(&self.inner.user_roles, user, role);
    }

    /// Adds a user to a group.
    pub fn add_user_group(&self, user: IdentityId, group: IdentityId) {
        add_edge(&self.inner.user_groups, user, group);
    }

    /// Makes `role` inherit from `parent`.
    pub fn add_role_parent(&self, role: IdentityId, parent: IdentityId) {
        add_edge(&self.inner.role_parents, role, parent);
    }

    /// Nests `group` in `parent`.
    pub fn add_group_parent(&self, group: IdentityId, parent: IdentityId) {
        add_edge(&self.inner.group_parents, group, parent);
    }

    /// Assigns a role to every member of a group.
    pub fn add_group_role(&self, group: IdentityId, role: IdentityId) {
        add_edge(&self.inner.group_roles, group, role);
    }

    /// Marks a role as system administrator.
    pub fn add_system_admin_role(&self, role: IdentityId) {
        let mut guard = self.inner.system_admin_roles.write().expect("poisoned lock");
        guard.insert(role);
    }

    /// Marks a role as administrator of its organization.
    pub fn add_org_admin_role(&self, role: IdentityId) {
        let mut guard = self.inner.org_admin_roles.write().expect("poisoned lock");
        guard.insert(role);
    }

    /// Forces a password reset at the next login.
    pub fn require_password_reset(&self, user: IdentityId) {
        let mut guard = self.inner.password_resets.write().expect("poisoned lock");
        guard.insert(user);
    }

    /// Changes a password and clears any pending reset.
    pub fn change_password(&self, user: &IdentityId, password: impl Into<String>) -> Result<()> {
        let mut passwords = self.inner.passwords.write().expect("poisoned lock");
        let Some(stored) = passwords.get_mut(user) else {
            return Err(Error::authentication(format!("unknown user {user}")));
        };
        *stored = password.into();
        drop(passwords);
        let mut resets = self.inner.password_resets.write().expect("poisoned lock");
        resets.remove(user);
        Ok(())
    }

    /// Renames an identity and returns the event to propagate to grant stores.
    pub fn rename_identity(
        &self,
        kind: IdentityType,
        old: &IdentityId,
        new: IdentityId,
    ) -> Result<AuthenticationChangeEvent> {
        let dir = &self.inner;
        match kind {
            IdentityType::User => {
                let mut passwords = dir.passwords.write().expect("poisoned lock");
                let Some(password) = passwords.remove(old) else {
                    return Err(Error::authentication(format!("unknown user {old}")));
                };
                passwords.insert(new.clone(), password);
                drop(passwords);
                rename_member(&dir.password_resets, old, &new);
                rename_sources(&dir.user_roles, old, &new);
                rename_sources(&dir.user_groups, old, &new);
            }
            IdentityType::Role => {
                rename_targets(&dir.user_roles, old, &new);
                rename_targets(&dir.group_roles, old, &new);
                rename_sources(&dir.role_parents, old, &new);
                rename_targets(&dir.role_parents, old, &new);
                rename_member(&dir.system_admin_roles, old, &new);
                rename_member(&dir.org_admin_roles, old, &new);
            }
            IdentityType::Group => {
                rename_targets(&dir.user_groups, old, &new);
                rename_sources(&dir.group_parents, old, &new);
                rename_targets(&dir.group_parents, old, &new);
                rename_sources(&dir.group_roles, old, &new);
            }
            IdentityType::Organization => {
                return Err(Error::authentication(
                    "organizations are not renamed through the identity directory",
                ));
            }
        }
        Ok(AuthenticationChangeEvent::identity_renamed(
            kind,
            old.clone(),
            new,
        ))
    }

    /// Removes an identity and returns the event to propagate to grant stores.
    pub fn remove_identity(
        &self,
        kind: IdentityType,
        old: &IdentityId,
    ) -> Result<AuthenticationChangeEvent> {
        let dir = &self.inner;
        match kind {
            IdentityType::User => {
                dir.passwords.write().expect("poisoned lock").remove(old);
                dir.password_resets
                    .write()
                    .expect("poisoned lock")
                    .remove(old);
                remove_sources(&dir.user_roles, old);
                remove_sources(&dir.user_groups, old);
            }
            IdentityType::Role => {
                remove_targets(&dir.user_roles, old);
                remove_targets(&dir.group_roles, old);
                remove_sources(&dir.role_parents, old);
                remove_targets(&dir.role_parents, old);
                dir.system_admin_roles
                    .write()
                    .expect("poisoned lock")
                    .remove(old);
                dir.org_admin_roles
                    .write()
                    .expect("poisoned lock")
                    .remove(old);
            }
            IdentityType::Group => {
                remove_targets(&dir.user_groups, old);
                remove_sources(&dir.group_parents, old);
                remove_targets(&dir.group_parents, old);
                remove_sources(&dir.group_roles, old);
            }
            IdentityType::Organization => {
                return Err(Error::authentication(
                    "organizations are not removed through the identity directory",
                ));
            }
        }
        Ok(AuthenticationChangeEvent::identity_removed(kind, old.clone()))
    }
}

impl Default for MemoryAuthenticationProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityProvider for MemoryAuthenticationProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn set_provider_name(&mut self, name: String) {
        self.name = name;
    }
}

impl AuthenticationProvider for MemoryAuthenticationProvider {
    fn user_roles(&self, user: &IdentityId) -> Result<Vec<IdentityId>> {
        Ok(edges_of(&self.inner.user_roles, user))
    }

    fn user_groups(&self, user: &IdentityId) -> Result<Vec<IdentityId>> {
        Ok(edges_of(&self.inner.user_groups, user))
    }

    fn role_parents(&self, role: &IdentityId) -> Result<Vec<IdentityId>> {
        Ok(edges_of(&self.inner.role_parents, role))
    }

    fn group_parents(&self, group: &IdentityId) -> Result<Vec<IdentityId>> {
        Ok(edges_of(&self.inner.group_parents, group))
    }

    fn group_roles(&self, group: &IdentityId) -> Result<Vec<IdentityId>> {
        Ok(edges_of(&self.inner.group_roles, group))
    }

    fn is_system_administrator_role(&self, role: &IdentityId) -> bool {
        let guard = self.inner.system_admin_roles.read().expect("poisoned lock");
        guard.contains(role)
    }

    fn is_org_administrator_role(&self, role: &IdentityId) -> bool {
        let guard = self.inner.org_admin_roles.read().expect("poisoned lock");
        guard.contains(role)
    }

    fn authenticate(&self, user: &IdentityId, password: &str) -> Result<bool> {
        let passwords = self.inner.passwords.read().expect("poisoned lock");
        if passwords.get(user).map(String::as_str) != Some(password) {
            return Ok(false);
        }
        drop(passwords);
        let resets = self.inner.password_resets.read().expect("poisoned lock");
        if resets.contains(user) {
            return Err(Error::PasswordReset { user: user.clone() });
        }
        Ok(true)
    }
}

/// In-memory SSO directory.
#[derive(Debug, Default, Clone)]
pub struct MemoryUserProvider {
    users: Arc<RwLock<BTreeMap<IdentityId, SsoUser>>>,
}

impl MemoryUserProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a user.
    pub fn add_user(&self, user: SsoUser) {
        let mut guard = self.users.write().expect("poisoned lock");
        guard.insert(user.id.clone(), user);
    }
}

impl UserProvider for MemoryUserProvider {
    fn find_user(&self, id: &IdentityId) -> Result<Option<SsoUser>> {
        let guard = self.users.read().expect("poisoned lock");
        Ok(guard.get(id).cloned())
    }

    fn user_ids(&self) -> Result<Vec<IdentityId>> {
        let guard = self.users.read().expect("poisoned lock");
        Ok(guard.keys().cloned().collect())
    }
}

/// In-memory organization cache.
#[derive(Debug, Default)]
pub struct MemoryOrganizationCache {
    organizations: RwLock<BTreeMap<OrganizationId, Organization>>,
    closes: AtomicUsize,
}

impl MemoryOrganizationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an organization.
    pub fn insert(&self, organization: Organization) {
        let mut guard = self.organizations.write().expect("poisoned lock");
        guard.insert(organization.id.clone(), organization);
    }

    /// Returns how many times the cache was closed.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl OrganizationCache for MemoryOrganizationCache {
    fn organization(&self, id: &OrganizationId) -> Option<Organization> {
        let guard = self.organizations.read().expect("poisoned lock");
        guard.get(id).cloned()
    }

    fn organization_ids(&self) -> Vec<OrganizationId> {
        let guard = self.organizations.read().expect("poisoned lock");
        guard.keys().cloned().collect()
    }

    fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.organizations.write().expect("poisoned lock").clear();
        Ok(())
    }
}
