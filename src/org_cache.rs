use crate::error::Result;
use crate::types::OrganizationId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// A tenant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool {
    true
}

impl Organization {
    pub fn new(id: OrganizationId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            active: true,
        }
    }
}

/// Lookup of organizations known to the deployment.
pub trait OrganizationCache: Send + Sync {
    /// Returns an organization by id.
    fn organization(&self, id: &OrganizationId) -> Option<Organization>;

    /// Returns every organization id.
    fn organization_ids(&self) -> Vec<OrganizationId>;

    /// Releases resources. Called at most once, on shutdown.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

type CacheFactory = Box<dyn Fn() -> Arc<dyn OrganizationCache> + Send + Sync>;

/// Shared organization cache created on first use and closed on shutdown.
///
/// Hand one handle (usually in an `Arc`) to every component that needs
/// organization lookups.
pub struct OrganizationCacheHandle {
    factory: CacheFactory,
    cache: OnceLock<Arc<dyn OrganizationCache>>,
    closed: AtomicBool,
}

impl OrganizationCacheHandle {
    /// Creates a handle that builds the cache with `factory` on first use.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Arc<dyn OrganizationCache> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            cache: OnceLock::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the cache, creating it on first call.
    pub fn get(&self) -> &Arc<dyn OrganizationCache> {
        self.cache.get_or_init(|| (self.factory)())
    }

    /// Returns whether the cache was created.
    pub fn is_initialized(&self) -> bool {
        self.cache.get().is_some()
    }

    /// Closes the cache once. Close failures are logged and swallowed.
    ///
    /// A cache that was never created is not created just to be closed.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(cache) = self.cache.get() else {
            return;
        };
        if let Err(error) = cache.close() {
            tracing::debug!(%error, "ignoring organization cache close failure");
        }
    }
}

impl fmt::Debug for OrganizationCacheHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrganizationCacheHandle")
            .field("initialized", &self.is_initialized())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
