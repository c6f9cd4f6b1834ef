use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

type Factory<A, T> = Arc<dyn Fn(A) -> Result<T> + Send + Sync>;

/// Named factories selected by configuration.
///
/// Implementations register under a name at startup; configuration then
/// picks one by that name.
pub struct FactoryRegistry<A, T> {
    kind: &'static str,
    factories: BTreeMap<String, Factory<A, T>>,
}

impl<A, T> FactoryRegistry<A, T> {
    /// Creates an empty registry. `kind` names the product in errors.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            factories: BTreeMap::new(),
        }
    }

    /// Registers a factory, replacing any previous one with the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(A) -> Result<T> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Builder form of [`FactoryRegistry::register`].
    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(A) -> Result<T> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    /// Returns whether a factory is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name.trim())
    }

    /// Returns registered names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Builds the implementation registered under `name`.
    pub fn create(&self, name: &str, arg: A) -> Result<T> {
        let factory = self
            .factories
            .get(name.trim())
            .ok_or_else(|| Error::UnknownImplementation {
                kind: self.kind,
                name: name.to_string(),
            })?;
        factory(arg)
    }
}

impl<A, T> Clone for FactoryRegistry<A, T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            factories: self.factories.clone(),
        }
    }
}

impl<A, T> fmt::Debug for FactoryRegistry<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("kind", &self.kind)
            .field("names", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
