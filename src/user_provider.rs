use crate::config::SecurityConfig;
use crate::error::Result;
use crate::registry::FactoryRegistry;
use crate::types::IdentityId;
use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// User details returned by an SSO directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsoUser {
    pub id: IdentityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<IdentityId>,
    #[serde(default)]
    pub groups: Vec<IdentityId>,
}

/// External directory consulted for users that log in through SSO.
pub trait UserProvider: Send + Sync {
    /// Returns the user with `id`, if the directory knows it.
    fn find_user(&self, id: &IdentityId) -> Result<Option<SsoUser>>;

    /// Returns every user id in the directory.
    fn user_ids(&self) -> Result<Vec<IdentityId>>;
}

/// User provider factories keyed by configuration name.
pub type UserProviderRegistry = FactoryRegistry<(), Arc<dyn UserProvider>>;

/// Builds the user provider named by `config`.
///
/// Returns `None` when none is configured or it cannot be built, including
/// when the factory panics; failures are logged.
pub fn resolve_user_provider(
    config: &SecurityConfig,
    registry: &UserProviderRegistry,
) -> Option<Arc<dyn UserProvider>> {
    let name = config.sso_user_provider.as_deref()?.trim();
    if name.is_empty() {
        return None;
    }
    match catch_unwind(AssertUnwindSafe(|| registry.create(name, ()))) {
        Ok(Ok(provider)) => Some(provider),
        Ok(Err(error)) => {
            tracing::error!(provider = name, %error, "failed to create SSO user provider");
            None
        }
        Err(_) => {
            tracing::error!(provider = name, "SSO user provider factory panicked");
            None
        }
    }
}
