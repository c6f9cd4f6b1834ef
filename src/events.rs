use crate::error::Result;
use crate::types::{IdentityId, IdentityType, OrganizationId};
use std::sync::{Arc, RwLock};

/// Notification that an identity or organization was renamed or removed.
///
/// For removals the new id and organization are absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticationChangeEvent {
    identity_type: IdentityType,
    old_id: IdentityId,
    new_id: Option<IdentityId>,
    old_org_id: OrganizationId,
    new_org_id: Option<OrganizationId>,
    removed: bool,
}

impl AuthenticationChangeEvent {
    /// A user, group or role changed its name or moved organization.
    pub fn identity_renamed(
        identity_type: IdentityType,
        old_id: IdentityId,
        new_id: IdentityId,
    ) -> Self {
        Self {
            identity_type,
            old_org_id: old_id.org_id().clone(),
            new_org_id: Some(new_id.org_id().clone()),
            old_id,
            new_id: Some(new_id),
            removed: false,
        }
    }

    /// A user, group or role was deleted.
    pub fn identity_removed(identity_type: IdentityType, old_id: IdentityId) -> Self {
        Self {
            identity_type,
            old_org_id: old_id.org_id().clone(),
            new_org_id: None,
            old_id,
            new_id: None,
            removed: true,
        }
    }

    /// An organization changed its id.
    pub fn organization_renamed(old_org_id: OrganizationId, new_org_id: OrganizationId) -> Self {
        Self {
            identity_type: IdentityType::Organization,
            old_id: org_identity(&old_org_id),
            new_id: Some(org_identity(&new_org_id)),
            old_org_id,
            new_org_id: Some(new_org_id),
            removed: false,
        }
    }

    /// An organization was deleted.
    pub fn organization_removed(old_org_id: OrganizationId) -> Self {
        Self {
            identity_type: IdentityType::Organization,
            old_id: org_identity(&old_org_id),
            new_id: None,
            old_org_id,
            new_org_id: None,
            removed: true,
        }
    }

    pub fn identity_type(&self) -> IdentityType {
        self.identity_type
    }

    pub fn old_id(&self) -> &IdentityId {
        &self.old_id
    }

    pub fn new_id(&self) -> Option<&IdentityId> {
        self.new_id.as_ref()
    }

    pub fn old_org_id(&self) -> &OrganizationId {
        &self.old_org_id
    }

    pub fn new_org_id(&self) -> Option<&OrganizationId> {
        self.new_org_id.as_ref()
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Returns true when an organization rather than an identity changed.
    pub fn is_organization_change(&self) -> bool {
        self.identity_type == IdentityType::Organization
    }
}

// An organization is addressed as the identity named after itself.
fn org_identity(org: &OrganizationId) -> IdentityId {
    IdentityId::from_trusted(org.as_str().to_string(), org.clone())
}

/// Receives identity and organization changes so stored grants stay consistent.
pub trait AuthenticationChangeListener: Send + Sync {
    /// Called after an identity or organization was renamed or removed.
    fn authentication_changed(&self, event: &AuthenticationChangeEvent) -> Result<()> {
        let _ = event;
        Ok(())
    }
}

/// Ordered set of change listeners.
#[derive(Default)]
pub struct ChangeListeners {
    listeners: RwLock<Vec<Arc<dyn AuthenticationChangeListener>>>,
}

impl ChangeListeners {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    pub fn add(&self, listener: Arc<dyn AuthenticationChangeListener>) {
        let mut guard = self.listeners.write().expect("poisoned lock");
        guard.push(listener);
    }

    /// Unregisters a listener. Returns false if it was not registered.
    pub fn remove(&self, listener: &Arc<dyn AuthenticationChangeListener>) -> bool {
        let mut guard = self.listeners.write().expect("poisoned lock");
        let before = guard.len();
        guard.retain(|existing| !Arc::ptr_eq(existing, listener));
        guard.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().expect("poisoned lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers the event in registration order, stopping at the first error.
    pub fn dispatch(&self, event: &AuthenticationChangeEvent) -> Result<()> {
        let listeners = self.listeners.read().expect("poisoned lock").clone();
        for listener in listeners {
            listener.authentication_changed(event)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ChangeListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeListeners")
            .field("len", &self.len())
            .finish()
    }
}
