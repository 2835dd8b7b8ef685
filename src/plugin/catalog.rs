//! Compiled kit catalog.
//!
//! Kits built into the binary register a factory under their full package
//! name. When the package is installed, the container prefers the factory
//! over the subprocess protocol.

use std::collections::HashMap;
use std::sync::Arc;

use super::KitContext;
use crate::module::ModuleDescriptor;

/// Builds a kit context from an installed module.
pub type KitFactory = Arc<dyn Fn(&ModuleDescriptor) -> anyhow::Result<KitContext> + Send + Sync>;

/// Named kit factories.
#[derive(Clone, Default)]
pub struct KitCatalog {
    factories: HashMap<String, KitFactory>,
}

impl std::fmt::Debug for KitCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KitCatalog").field("kits", &self.names()).finish()
    }
}

impl KitCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a full package name, replacing any previous one.
    pub fn register<F>(&mut self, full_name: impl Into<String>, factory: F)
    where
        F: Fn(&ModuleDescriptor) -> anyhow::Result<KitContext> + Send + Sync + 'static,
    {
        let full_name = full_name.into();
        tracing::debug!(kit = %full_name, "registered compiled kit");
        self.factories.insert(full_name, Arc::new(factory));
    }

    /// Factory for a package.
    pub fn get(&self, full_name: &str) -> Option<KitFactory> {
        self.factories.get(full_name).cloned()
    }

    /// Whether a factory is registered.
    pub fn contains(&self, full_name: &str) -> bool {
        self.factories.contains_key(full_name)
    }

    /// Registered package names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
