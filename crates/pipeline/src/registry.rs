//! Component registry
//!
//! Maps the type names used in configuration (`mq_config.cluster_type`,
//! `shipper_list[].cluster_type`, `processors`) to factories. The collector
//! fills one registry at startup and shares it read-only with every
//! [`ConfigBuilder`](crate::ConfigBuilder).
//!
//! # Example
//!
//! ```ignore
//! let mut registry = Registry::with_builtins();
//! registry.register_backend("null", |_: &BuildScope| -> Result<Box<dyn Backend>> {
//!     Ok(Box::new(NullBackend::new()))
//! });
//!
//! let backend = registry.create_backend("null", &scope)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::passer::Passer;
use crate::scope::BuildScope;
use crate::traits::{Backend, DataProcessor, Frontend};

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;

/// Creates frontends for one source type
pub trait FrontendFactory: Send + Sync {
    fn create(&self, scope: &BuildScope) -> Result<Box<dyn Frontend>>;
}

impl<F> FrontendFactory for F
where
    F: Fn(&BuildScope) -> Result<Box<dyn Frontend>> + Send + Sync,
{
    fn create(&self, scope: &BuildScope) -> Result<Box<dyn Frontend>> {
        self(scope)
    }
}

/// Creates backends for one sink type
///
/// The scope carries the result table and shipper being built.
pub trait BackendFactory: Send + Sync {
    fn create(&self, scope: &BuildScope) -> Result<Box<dyn Backend>>;
}

impl<F> BackendFactory for F
where
    F: Fn(&BuildScope) -> Result<Box<dyn Backend>> + Send + Sync,
{
    fn create(&self, scope: &BuildScope) -> Result<Box<dyn Backend>> {
        self(scope)
    }
}

/// Creates processors for one transform type
pub trait ProcessorFactory: Send + Sync {
    fn create(&self, scope: &BuildScope) -> Result<Box<dyn DataProcessor>>;
}

impl<F> ProcessorFactory for F
where
    F: Fn(&BuildScope) -> Result<Box<dyn DataProcessor>> + Send + Sync,
{
    fn create(&self, scope: &BuildScope) -> Result<Box<dyn DataProcessor>> {
        self(scope)
    }
}

/// Name to factory table of one component kind
struct Factories<F: ?Sized> {
    kind: &'static str,
    entries: BTreeMap<String, Arc<F>>,
}

impl<F: ?Sized> Factories<F> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    fn insert(&mut self, name: &str, factory: Arc<F>) {
        if self.entries.contains_key(name) {
            panic!("{} factory '{name}' already registered", self.kind);
        }
        self.entries.insert(name.to_string(), factory);
    }

    fn try_insert(&mut self, name: &str, factory: Arc<F>) -> bool {
        if self.entries.contains_key(name) {
            return false;
        }
        self.entries.insert(name.to_string(), factory);
        true
    }

    fn get(&self, name: &str) -> Option<Arc<F>> {
        self.entries.get(name).cloned()
    }

    fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    fn available(&self) -> String {
        self.names().join(", ")
    }
}

/// Registry of frontend, backend and processor factories
pub struct Registry {
    frontends: Factories<dyn FrontendFactory>,
    backends: Factories<dyn BackendFactory>,
    processors: Factories<dyn ProcessorFactory>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            frontends: Factories::new("frontend"),
            backends: Factories::new("backend"),
            processors: Factories::new("processor"),
        }
    }

    /// Registry with the runtime's own processors
    ///
    /// Includes:
    /// - `passer` - forwards payloads unchanged, used by multi-lane branches
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_processor(
            "passer",
            |_: &BuildScope| -> Result<Box<dyn DataProcessor>> { Ok(Box::new(Passer::new())) },
        );
        registry
    }

    /// Register a frontend factory
    ///
    /// # Panics
    /// Panics if a factory is already registered with this name.
    /// Use `try_register_frontend` for fallible registration.
    pub fn register_frontend<F: FrontendFactory + 'static>(&mut self, name: &str, factory: F) {
        self.frontends.insert(name, Arc::new(factory));
    }

    /// Register a backend factory
    ///
    /// # Panics
    /// Panics if a factory is already registered with this name.
    pub fn register_backend<F: BackendFactory + 'static>(&mut self, name: &str, factory: F) {
        self.backends.insert(name, Arc::new(factory));
    }

    /// Register a processor factory
    ///
    /// # Panics
    /// Panics if a factory is already registered with this name.
    pub fn register_processor<F: ProcessorFactory + 'static>(&mut self, name: &str, factory: F) {
        self.processors.insert(name, Arc::new(factory));
    }

    /// Returns `false` if the name is taken
    pub fn try_register_frontend<F: FrontendFactory + 'static>(
        &mut self,
        name: &str,
        factory: F,
    ) -> bool {
        self.frontends.try_insert(name, Arc::new(factory))
    }

    /// Returns `false` if the name is taken
    pub fn try_register_backend<F: BackendFactory + 'static>(
        &mut self,
        name: &str,
        factory: F,
    ) -> bool {
        self.backends.try_insert(name, Arc::new(factory))
    }

    /// Returns `false` if the name is taken
    pub fn try_register_processor<F: ProcessorFactory + 'static>(
        &mut self,
        name: &str,
        factory: F,
    ) -> bool {
        self.processors.try_insert(name, Arc::new(factory))
    }

    pub fn lookup_frontend(&self, name: &str) -> Option<Arc<dyn FrontendFactory>> {
        self.frontends.get(name)
    }

    pub fn lookup_backend(&self, name: &str) -> Option<Arc<dyn BackendFactory>> {
        self.backends.get(name)
    }

    pub fn lookup_processor(&self, name: &str) -> Option<Arc<dyn ProcessorFactory>> {
        self.processors.get(name)
    }

    /// Create a frontend by type name
    ///
    /// # Errors
    /// `UnknownFrontend` listing the registered names, or whatever the
    /// factory reports.
    pub fn create_frontend(&self, name: &str, scope: &BuildScope) -> Result<Box<dyn Frontend>> {
        let factory = self
            .lookup_frontend(name)
            .ok_or_else(|| PipelineError::UnknownFrontend {
                name: name.to_string(),
                available: self.frontends.available(),
            })?;
        factory.create(scope)
    }

    /// Create a backend by type name
    pub fn create_backend(&self, name: &str, scope: &BuildScope) -> Result<Box<dyn Backend>> {
        let factory = self
            .lookup_backend(name)
            .ok_or_else(|| PipelineError::UnknownBackend {
                name: name.to_string(),
                available: self.backends.available(),
            })?;
        factory.create(scope)
    }

    /// Create a processor by type name
    pub fn create_processor(
        &self,
        name: &str,
        scope: &BuildScope,
    ) -> Result<Box<dyn DataProcessor>> {
        let factory = self
            .lookup_processor(name)
            .ok_or_else(|| PipelineError::UnknownProcessor {
                name: name.to_string(),
                available: self.processors.available(),
            })?;
        factory.create(scope)
    }

    pub fn frontend_names(&self) -> Vec<&str> {
        self.frontends.names()
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.names()
    }

    pub fn processor_names(&self) -> Vec<&str> {
        self.processors.names()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
