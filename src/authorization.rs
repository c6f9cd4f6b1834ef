use crate::capability::{
    CachableProvider, JsonConfigurableProvider, NoConfiguration, NoProviderCache, SecurityProvider,
};
use crate::error::{Error, Result};
use crate::events::AuthenticationChangeListener;
use crate::permission::Permission;
use crate::resource::{Resource, ResourceKey, ResourceType};
use crate::types::{IdentityId, OrganizationId};
use serde::{Deserialize, Serialize};

/// One stored grant, as returned by [`AuthorizationProvider::get_permissions`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub key: ResourceKey,
    pub permission: Permission,
}

/// Store of explicit permission grants.
///
/// Grants are keyed by [`ResourceKey`]; grants on identities use
/// [`ResourceKey::for_identity`]. Resolving who may act is left to a
/// [`crate::CheckPermissionStrategy`].
pub trait AuthorizationProvider: SecurityProvider + AuthenticationChangeListener {
    /// Stores `permission` for `key`, replacing any previous grant.
    fn set_permission(&self, key: &ResourceKey, permission: Permission) -> Result<()>;

    /// Deletes the grant for `key`. Missing grants are not an error.
    fn remove_permission(&self, key: &ResourceKey) -> Result<()>;

    /// Returns the grant exactly as stored, or `None` if none was set.
    fn get_permission(&self, key: &ResourceKey) -> Result<Option<Permission>>;

    /// Enumerates every stored grant.
    ///
    /// Providers that cannot enumerate fail with [`Error::Unsupported`].
    fn get_permissions(&self) -> Result<Vec<PermissionEntry>> {
        Err(Error::Unsupported {
            operation: "get_permissions",
        })
    }

    /// Returns whether grants given to groups are honored.
    fn supports_group_permission(&self) -> bool {
        true
    }

    /// Cache capability.
    fn cache(&self) -> &dyn CachableProvider {
        &NoProviderCache
    }

    /// Configuration capability.
    fn configuration(&self) -> &dyn JsonConfigurableProvider {
        &NoConfiguration
    }

    /// Deletes the grant on `resource` within `org_id`.
    fn remove_resource_permission(&self, resource: &Resource, org_id: OrganizationId) -> Result<()> {
        self.remove_permission(&resource.in_org(org_id))
    }

    /// Stores a grant on an identity.
    fn set_identity_permission(
        &self,
        resource_type: ResourceType,
        identity: &IdentityId,
        permission: Permission,
    ) -> Result<()> {
        self.set_permission(&ResourceKey::for_identity(resource_type, identity), permission)
    }

    /// Returns the grant on an identity.
    fn get_identity_permission(
        &self,
        resource_type: ResourceType,
        identity: &IdentityId,
    ) -> Result<Option<Permission>> {
        self.get_permission(&ResourceKey::for_identity(resource_type, identity))
    }

    /// Deletes the grant on an identity.
    fn remove_identity_permission(
        &self,
        resource_type: ResourceType,
        identity: &IdentityId,
    ) -> Result<()> {
        self.remove_permission(&ResourceKey::for_identity(resource_type, identity))
    }
}

/// Authorization provider that stores nothing and grants nothing.
///
/// Useful as a stand-in when only authentication is configured.
#[derive(Debug, Clone)]
pub struct NoopAuthorizationProvider {
    name: String,
}

impl NoopAuthorizationProvider {
    pub fn new() -> Self {
        Self {
            name: "noop".to_string(),
        }
    }
}

impl Default for NoopAuthorizationProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityProvider for NoopAuthorizationProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn set_provider_name(&mut self, name: String) {
        self.name = name;
    }
}

impl AuthenticationChangeListener for NoopAuthorizationProvider {}

impl AuthorizationProvider for NoopAuthorizationProvider {
    fn set_permission(&self, _key: &ResourceKey, _permission: Permission) -> Result<()> {
        Ok(())
    }

    fn remove_permission(&self, _key: &ResourceKey) -> Result<()> {
        Ok(())
    }

    fn get_permission(&self, _key: &ResourceKey) -> Result<Option<Permission>> {
        Ok(None)
    }
}
