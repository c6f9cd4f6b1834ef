use crate::authentication::AuthenticationProvider;
use crate::authorization::{AuthorizationProvider, PermissionEntry};
use crate::capability::SecurityProvider;
use crate::error::{Error, Result};
use crate::events::{AuthenticationChangeEvent, AuthenticationChangeListener};
use crate::permission::Permission;
use crate::resource::ResourceKey;
use crate::types::{IdentityId, OrganizationId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) fn id(name: &str, org: &str) -> IdentityId {
    IdentityId::new(name, org).unwrap()
}

pub(crate) fn org(value: &str) -> OrganizationId {
    OrganizationId::new(value).unwrap()
}

type Edges = Mutex<HashMap<IdentityId, Vec<IdentityId>>>;

fn add_edge(edges: &Edges, from: IdentityId, to: IdentityId) {
    edges.lock().unwrap().entry(from).or_default().push(to);
}

fn edges_of(edges: &Edges, from: &IdentityId) -> Vec<IdentityId> {
    edges.lock().unwrap().get(from).cloned().unwrap_or_default()
}

#[derive(Default)]
pub(crate) struct TestDirectory {
    user_roles: Edges,
    user_groups: Edges,
    role_parents: Edges,
    group_parents: Edges,
    group_roles: Edges,
    system_admins: Mutex<HashSet<IdentityId>>,
    org_admins: Mutex<HashSet<IdentityId>>,
    passwords: Mutex<HashMap<IdentityId, String>>,
    resets: Mutex<HashSet<IdentityId>>,
}

impl TestDirectory {
    pub(crate) fn user_role(&self, user: IdentityId, role: IdentityId) {
        add_edge(&self.user_roles, user, role);
    }

    pub(crate) fn user_group(&self, user: IdentityId, group: IdentityId) {
        add_edge(&self.user_groups, user, group);
    }

    pub(crate) fn role_parent(&self, role: IdentityId, parent: IdentityId) {
        add_edge(&self.role_parents, role, parent);
    }

    pub(crate) fn group_parent(&self, group: IdentityId, parent: IdentityId) {
        add_edge(&self.group_parents, group, parent);
    }

    pub(crate) fn group_role(&self, group: IdentityId, role: IdentityId) {
        add_edge(&self.group_roles, group, role);
    }

    pub(crate) fn system_admin_role(&self, role: IdentityId) {
        self.system_admins.lock().unwrap().insert(role);
    }

    pub(crate) fn org_admin_role(&self, role: IdentityId) {
        self.org_admins.lock().unwrap().insert(role);
    }

    pub(crate) fn password(&self, user: IdentityId, password: &str) {
        self.passwords
            .lock()
            .unwrap()
            .insert(user, password.to_string());
    }

    pub(crate) fn require_reset(&self, user: IdentityId) {
        self.resets.lock().unwrap().insert(user);
    }
}

impl SecurityProvider for TestDirectory {
    fn provider_name(&self) -> &str {
        "test-directory"
    }

    fn set_provider_name(&mut self, _name: String) {}
}

impl AuthenticationProvider for TestDirectory {
    fn user_roles(&self, user: &IdentityId) -> Result<Vec<IdentityId>> {
        Ok(edges_of(&self.user_roles, user))
    }

    fn user_groups(&self, user: &IdentityId) -> Result<Vec<IdentityId>> {
        Ok(edges_of(&self.user_groups, user))
    }

    fn role_parents(&self, role: &IdentityId) -> Result<Vec<IdentityId>> {
        Ok(edges_of(&self.role_parents, role))
    }

    fn group_parents(&self, group: &IdentityId) -> Result<Vec<IdentityId>> {
        Ok(edges_of(&self.group_parents, group))
    }

    fn group_roles(&self, group: &IdentityId) -> Result<Vec<IdentityId>> {
        Ok(edges_of(&self.group_roles, group))
    }

    fn is_system_administrator_role(&self, role: &IdentityId) -> bool {
        self.system_admins.lock().unwrap().contains(role)
    }

    fn is_org_administrator_role(&self, role: &IdentityId) -> bool {
        self.org_admins.lock().unwrap().contains(role)
    }

    fn authenticate(&self, user: &IdentityId, password: &str) -> Result<bool> {
        let matches = self
            .passwords
            .lock()
            .unwrap()
            .get(user)
            .is_some_and(|stored| stored == password);
        if matches && self.resets.lock().unwrap().contains(user) {
            return Err(Error::PasswordReset { user: user.clone() });
        }
        Ok(matches)
    }
}

pub(crate) struct TestGrants {
    grants: Mutex<BTreeMap<ResourceKey, Permission>>,
    group_permission: bool,
    changes: Mutex<Vec<AuthenticationChangeEvent>>,
    tear_downs: AtomicUsize,
}

impl Default for TestGrants {
    fn default() -> Self {
        Self {
            grants: Mutex::default(),
            group_permission: true,
            changes: Mutex::default(),
            tear_downs: AtomicUsize::new(0),
        }
    }
}

impl TestGrants {
    pub(crate) fn without_group_permission() -> Self {
        Self {
            group_permission: false,
            ..Self::default()
        }
    }

    pub(crate) fn insert(&self, key: ResourceKey, permission: Permission) {
        self.grants.lock().unwrap().insert(key, permission);
    }

    pub(crate) fn changes(&self) -> Vec<AuthenticationChangeEvent> {
        self.changes.lock().unwrap().clone()
    }

    pub(crate) fn tear_downs(&self) -> usize {
        self.tear_downs.load(Ordering::SeqCst)
    }
}

impl SecurityProvider for TestGrants {
    fn provider_name(&self) -> &str {
        "test-grants"
    }

    fn set_provider_name(&mut self, _name: String) {}

    fn tear_down(&self) {
        self.tear_downs.fetch_add(1, Ordering::SeqCst);
    }
}

impl AuthenticationChangeListener for TestGrants {
    fn authentication_changed(&self, event: &AuthenticationChangeEvent) -> Result<()> {
        self.changes.lock().unwrap().push(event.clone());
        Ok(())
    }
}

impl AuthorizationProvider for TestGrants {
    fn set_permission(&self, key: &ResourceKey, permission: Permission) -> Result<()> {
        self.insert(key.clone(), permission);
        Ok(())
    }

    fn remove_permission(&self, key: &ResourceKey) -> Result<()> {
        self.grants.lock().unwrap().remove(key);
        Ok(())
    }

    fn get_permission(&self, key: &ResourceKey) -> Result<Option<Permission>> {
        Ok(self.grants.lock().unwrap().get(key).cloned())
    }

    fn get_permissions(&self) -> Result<Vec<PermissionEntry>> {
        Ok(self
            .grants
            .lock()
            .unwrap()
            .iter()
            .map(|(key, permission)| PermissionEntry {
                key: key.clone(),
                permission: permission.clone(),
            })
            .collect())
    }

    fn supports_group_permission(&self) -> bool {
        self.group_permission
    }
}
