use crate::error::Result;
use serde_json::Value;
use std::time::Duration;

/// Identity shared by every security provider.
pub trait SecurityProvider: Send + Sync {
    /// Returns the label used in diagnostics and configuration selection.
    fn provider_name(&self) -> &str;

    /// Changes the provider label.
    fn set_provider_name(&mut self, name: String);

    /// Releases provider resources. Safe to call more than once.
    fn tear_down(&self) {}
}

/// Declarative configuration round-trip for a provider.
pub trait JsonConfigurableProvider: Send + Sync {
    /// Applies a configuration document.
    fn read_configuration(&self, config: &Value) -> Result<()>;

    /// Produces a configuration document that [`read_configuration`] accepts.
    ///
    /// [`read_configuration`]: JsonConfigurableProvider::read_configuration
    fn write_configuration(&self) -> Result<Value>;
}

/// Cache lifecycle introspection for a provider.
pub trait CachableProvider: Send + Sync {
    /// Returns whether the provider caches back-end data.
    fn is_cache_enabled(&self) -> bool;

    /// Returns whether the cache is being (re)loaded.
    fn is_loading(&self) -> bool;

    /// Returns time since the cache was last populated.
    fn cache_age(&self) -> Duration;

    /// Drops cached data.
    fn clear_cache(&self);
}

/// Configuration capability for providers without configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConfiguration;

impl JsonConfigurableProvider for NoConfiguration {
    fn read_configuration(&self, _config: &Value) -> Result<()> {
        Ok(())
    }

    fn write_configuration(&self) -> Result<Value> {
        Ok(Value::Object(serde_json::Map::new()))
    }
}

/// Cache capability for providers without a cache.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProviderCache;

impl CachableProvider for NoProviderCache {
    fn is_cache_enabled(&self) -> bool {
        false
    }

    fn is_loading(&self) -> bool {
        false
    }

    fn cache_age(&self) -> Duration {
        Duration::ZERO
    }

    fn clear_cache(&self) {}
}
