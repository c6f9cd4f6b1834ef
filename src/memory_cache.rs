use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::authorization::{AuthorizationProvider, PermissionEntry};
use crate::capability::{CachableProvider, JsonConfigurableProvider, SecurityProvider};
use crate::error::Result;
use crate::events::{AuthenticationChangeEvent, AuthenticationChangeListener};
use crate::permission::Permission;
use crate::resource::ResourceKey;

/// Read-through grant cache in front of another authorization provider.
///
/// This is a simple LRU cache with optional TTL. Absent grants are cached
/// too. Writes go straight to the wrapped provider and drop the cached key;
/// identity and organization changes drop everything. A load that overlaps
/// a write or a clear is returned but not cached.
#[derive(Debug)]
pub struct CachingAuthorizationProvider<P> {
    name: String,
    inner: P,
    state: Arc<Mutex<CacheState>>,
    capacity: usize,
    ttl: Option<Duration>,
    loading: AtomicUsize,
}

#[derive(Debug)]
struct CacheState {
    entries: HashMap<ResourceKey, CacheEntry>,
    order: VecDeque<ResourceKey>,
    cleared_at: Instant,
    generation: u64,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    permission: Option<Permission>,
    updated_at: Instant,
}

impl<P: AuthorizationProvider> CachingAuthorizationProvider<P> {
    /// Wraps `inner` with a cache holding up to `capacity` keys.
    ///
    /// A capacity of zero disables caching.
    pub fn new(inner: P, capacity: usize) -> Self {
        Self {
            name: inner.provider_name().to_string(),
            inner,
            state: Arc::new(Mutex::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
                cleared_at: Instant::now(),
                generation: 0,
            })),
            capacity,
            ttl: None,
            loading: AtomicUsize::new(0),
        }
    }

    /// Configures a time-to-live for cache entries.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Returns the wrapped provider.
    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Returns the number of cached keys.
    pub fn len(&self) -> usize {
        self.state.lock().expect("poisoned lock").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove_key(state: &mut CacheState, key: &ResourceKey) {
        if state.entries.remove(key).is_some() {
            state.order.retain(|existing| existing != key);
        }
    }

    fn touch(state: &mut CacheState, key: &ResourceKey) {
        state.order.retain(|existing| existing != key);
        state.order.push_back(key.clone());
    }

    fn is_expired(entry: &CacheEntry, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(entry.updated_at) > ttl
    }

    fn prune_expired(state: &mut CacheState, ttl: Duration, now: Instant) {
        state
            .entries
            .retain(|_, entry| !Self::is_expired(entry, ttl, now));
        state.order.retain(|key| state.entries.contains_key(key));
    }

    fn evict_if_needed(state: &mut CacheState, capacity: usize) {
        while state.entries.len() > capacity {
            if let Some(key) = state.order.pop_front() {
                state.entries.remove(&key);
            } else {
                break;
            }
        }
    }

    fn cached(&self, key: &ResourceKey) -> Option<Option<Permission>> {
        if self.capacity == 0 {
            return None;
        }

        let now = Instant::now();
        let mut guard = self.state.lock().expect("poisoned lock");

        if let Some(ttl) = self.ttl {
            if let Some(entry) = guard.entries.get(key) {
                if Self::is_expired(entry, ttl, now) {
                    Self::remove_key(&mut guard, key);
                    return None;
                }
            }
        }

        let permission = guard.entries.get(key).map(|entry| entry.permission.clone());
        if permission.is_some() {
            Self::touch(&mut guard, key);
        }
        permission
    }

    fn generation(&self) -> u64 {
        self.state.lock().expect("poisoned lock").generation
    }

    fn store(&self, key: &ResourceKey, permission: Option<Permission>, loaded_at: u64) {
        if self.capacity == 0 {
            return;
        }

        let now = Instant::now();
        let mut guard = self.state.lock().expect("poisoned lock");
        if guard.generation != loaded_at {
            return;
        }

        if let Some(ttl) = self.ttl {
            Self::prune_expired(&mut guard, ttl, now);
        }

        guard.entries.insert(
            key.clone(),
            CacheEntry {
                permission,
                updated_at: now,
            },
        );
        Self::touch(&mut guard, key);
        Self::evict_if_needed(&mut guard, self.capacity);
    }

    fn invalidate(&self, key: &ResourceKey) {
        let mut guard = self.state.lock().expect("poisoned lock");
        guard.generation = guard.generation.wrapping_add(1);
        Self::remove_key(&mut guard, key);
    }
}

impl<P: AuthorizationProvider> SecurityProvider for CachingAuthorizationProvider<P> {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn set_provider_name(&mut self, name: String) {
        self.name = name;
    }

    fn tear_down(&self) {
        self.clear_cache();
        self.inner.tear_down();
    }
}

impl<P: AuthorizationProvider> AuthenticationChangeListener for CachingAuthorizationProvider<P> {
    fn authentication_changed(&self, event: &AuthenticationChangeEvent) -> Result<()> {
        // Grantees are rewritten across every key, so nothing cached survives.
        self.clear_cache();
        self.inner.authentication_changed(event)
    }
}

impl<P: AuthorizationProvider> CachableProvider for CachingAuthorizationProvider<P> {
    fn is_cache_enabled(&self) -> bool {
        self.capacity > 0
    }

    fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst) > 0
    }

    fn cache_age(&self) -> Duration {
        let guard = self.state.lock().expect("poisoned lock");
        guard.cleared_at.elapsed()
    }

    fn clear_cache(&self) {
        let mut guard = self.state.lock().expect("poisoned lock");
        guard.entries.clear();
        guard.order.clear();
        guard.cleared_at = Instant::now();
        guard.generation = guard.generation.wrapping_add(1);
    }
}

impl<P: AuthorizationProvider> JsonConfigurableProvider for CachingAuthorizationProvider<P> {
    fn read_configuration(&self, config: &Value) -> Result<()> {
        let result = self.inner.configuration().read_configuration(config);
        self.clear_cache();
        result
    }

    fn write_configuration(&self) -> Result<Value> {
        self.inner.configuration().write_configuration()
    }
}

impl<P: AuthorizationProvider> AuthorizationProvider for CachingAuthorizationProvider<P> {
    fn set_permission(&self, key: &ResourceKey, permission: Permission) -> Result<()> {
        let result = self.inner.set_permission(key, permission);
        self.invalidate(key);
        result
    }

    fn remove_permission(&self, key: &ResourceKey) -> Result<()> {
        let result = self.inner.remove_permission(key);
        self.invalidate(key);
        result
    }

    fn get_permission(&self, key: &ResourceKey) -> Result<Option<Permission>> {
        if let Some(permission) = self.cached(key) {
            return Ok(permission);
        }

        let generation = self.generation();
        self.loading.fetch_add(1, Ordering::SeqCst);
        let loaded = self.inner.get_permission(key);
        self.loading.fetch_sub(1, Ordering::SeqCst);

        let permission = loaded?;
        self.store(key, permission.clone(), generation);
        Ok(permission)
    }

    fn get_permissions(&self) -> Result<Vec<PermissionEntry>> {
        self.inner.get_permissions()
    }

    fn supports_group_permission(&self) -> bool {
        self.inner.supports_group_permission()
    }

    fn cache(&self) -> &dyn CachableProvider {
        self
    }

    fn configuration(&self) -> &dyn JsonConfigurableProvider {
        self
    }
}
