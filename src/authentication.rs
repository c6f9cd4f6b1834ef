use crate::capability::{
    CachableProvider, JsonConfigurableProvider, NoConfiguration, NoProviderCache, SecurityProvider,
};
use crate::error::Result;
use crate::types::IdentityId;

/// Identity back-end consulted while resolving permissions.
///
/// Only the hierarchy queries are needed here; user management lives with
/// the concrete back-end.
pub trait AuthenticationProvider: SecurityProvider {
    /// Returns roles assigned directly to a user.
    fn user_roles(&self, user: &IdentityId) -> Result<Vec<IdentityId>>;

    /// Returns groups a user belongs to directly.
    fn user_groups(&self, user: &IdentityId) -> Result<Vec<IdentityId>>;

    /// Returns roles a role inherits from.
    fn role_parents(&self, role: &IdentityId) -> Result<Vec<IdentityId>>;

    /// Returns groups a group is nested in.
    fn group_parents(&self, group: &IdentityId) -> Result<Vec<IdentityId>>;

    /// Returns roles assigned to every member of a group.
    fn group_roles(&self, group: &IdentityId) -> Result<Vec<IdentityId>> {
        let _ = group;
        Ok(Vec::new())
    }

    /// Returns whether a role administers every organization.
    fn is_system_administrator_role(&self, role: &IdentityId) -> bool {
        let _ = role;
        false
    }

    /// Returns whether a role administers its own organization.
    fn is_org_administrator_role(&self, role: &IdentityId) -> bool {
        let _ = role;
        false
    }

    /// Verifies a password.
    ///
    /// Returns `Ok(false)` for bad credentials and
    /// [`crate::Error::PasswordReset`] when the user must reset first.
    fn authenticate(&self, user: &IdentityId, password: &str) -> Result<bool>;

    /// Cache capability.
    fn cache(&self) -> &dyn CachableProvider {
        &NoProviderCache
    }

    /// Configuration capability.
    fn configuration(&self) -> &dyn JsonConfigurableProvider {
        &NoConfiguration
    }
}
