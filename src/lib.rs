//! Multi-tenant security layer for BI resources.
//!
//! This crate provides organization-scoped resource keys, a pluggable
//! authorization store contract, and a composite provider that pairs an
//! authentication back-end with an authorization back-end and decides
//! access through a configurable [`CheckPermissionStrategy`]. The default
//! behavior is deny-by-default.
//!
//! # Examples
//!
//! Basic permission check using the in-memory back-ends (enable `memory-store`):
//! ```no_run
//! # #[cfg(feature = "memory-store")]
//! # {
//! use bi_security::{
//!     AuthorizationProvider, CompositeSecurityProvider, Grantee, IdentityId,
//!     MemoryAuthenticationProvider, MemoryAuthorizationProvider, OrganizationId,
//!     Permission, ResourceAction, ResourceKey, ResourceType,
//! };
//! use std::sync::Arc;
//!
//! let directory = Arc::new(MemoryAuthenticationProvider::new());
//! let grants = Arc::new(MemoryAuthorizationProvider::new());
//! let security = CompositeSecurityProvider::create(directory.clone(), grants);
//!
//! let alice = IdentityId::new("alice", "acme").unwrap();
//! directory.add_user(alice.clone(), "secret");
//! let key = ResourceKey::new(
//!     ResourceType::Report,
//!     "/sales/q1",
//!     OrganizationId::new("acme").unwrap(),
//! )
//! .unwrap();
//! security
//!     .set_permission(
//!         &key,
//!         Permission::new().with_grant(ResourceAction::Read, Grantee::User(alice.clone())),
//!     )
//!     .unwrap();
//!
//! let principal = security.authenticate(&alice, "secret").unwrap();
//! let decision = security
//!     .check_permission(&principal, &key, ResourceAction::Read)
//!     .unwrap();
//! assert!(decision.is_allowed());
//! # }
//! ```
//!
//! Caching grants in front of any store (enable `memory-cache`):
//! ```no_run
//! # #[cfg(all(feature = "memory-store", feature = "memory-cache"))]
//! # {
//! use bi_security::{CachingAuthorizationProvider, MemoryAuthorizationProvider};
//! use std::time::Duration;
//! let cached = CachingAuthorizationProvider::new(MemoryAuthorizationProvider::new(), 1024)
//!     .with_ttl(Duration::from_secs(30));
//! # let _ = cached;
//! # }
//! ```
#![forbid(unsafe_code)]

mod authentication;
mod authorization;
mod capability;
mod composite;
mod config;
mod context;
mod error;
mod events;
mod org_cache;
mod permission;
mod principal;
mod registry;
mod resource;
mod session;
mod strategy;
mod types;
mod user_provider;

#[cfg(feature = "memory-cache")]
mod memory_cache;

#[cfg(feature = "memory-store")]
mod memory_store;

#[cfg(test)]
mod test_support;

pub use crate::authentication::AuthenticationProvider;
pub use crate::authorization::{AuthorizationProvider, NoopAuthorizationProvider, PermissionEntry};
pub use crate::capability::{
    CachableProvider, JsonConfigurableProvider, NoConfiguration, NoProviderCache,
    SecurityProvider,
};
pub use crate::composite::{CompositeBuilder, CompositeSecurityProvider};
pub use crate::config::{
    MAX_INHERIT_DEPTH_KEY, PERMISSION_STRATEGY_KEY, SSO_USER_PROVIDER_KEY, SecurityConfig,
};
pub use crate::context::{ContextSnapshot, OrganizationContext, OrganizationGuard};
pub use crate::error::{Error, Result, StoreError, Subsystem};
pub use crate::events::{
    AuthenticationChangeEvent, AuthenticationChangeListener, ChangeListeners,
};
pub use crate::org_cache::{Organization, OrganizationCache, OrganizationCacheHandle};
pub use crate::permission::{Grantee, Permission};
pub use crate::principal::Principal;
pub use crate::registry::FactoryRegistry;
pub use crate::resource::{Resource, ResourceAction, ResourceKey, ResourceType};
pub use crate::session::{LoginEvent, SessionEvent, SessionListener, SessionNotifier};
pub use crate::strategy::{
    CheckPermissionStrategy, DEFAULT_STRATEGY, DIRECT_STRATEGY, Decision,
    DefaultCheckPermissionStrategy, DirectCheckPermissionStrategy, StrategyRegistry,
};
pub use crate::types::{
    DEFAULT_ORG_ID, IdentityId, IdentityType, KEY_DELIMITER, OrganizationId, SELF_ORG_ID,
};
pub use crate::user_provider::{
    SsoUser, UserProvider, UserProviderRegistry, resolve_user_provider,
};

#[cfg(feature = "memory-store")]
pub use crate::memory_store::{
    MemoryAuthenticationProvider, MemoryAuthorizationProvider, MemoryOrganizationCache,
    MemoryUserProvider,
};

#[cfg(feature = "memory-cache")]
pub use crate::memory_cache::CachingAuthorizationProvider;
