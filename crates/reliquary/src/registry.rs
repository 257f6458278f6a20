//! # Adapter Registry
//!
//! Application code looks backends up by short name (`"postgres"`, `"index"`,
//! `"memory"`) rather than constructing them. The registry is assembled once at
//! start-up through [`AdapterRegistryBuilder`] and is immutable afterwards; share
//! it by cloning, which only bumps a reference count.
//!
//! ```rust
//! use reliquary::memory::MemoryAdapter;
//! use reliquary::registry::AdapterRegistry;
//! use std::sync::Arc;
//!
//! let registry = AdapterRegistry::builder()
//!     .register("memory", Arc::new(MemoryAdapter::new()))
//!     .build()
//!     .unwrap();
//! assert!(registry.get("memory").is_ok());
//! assert!(registry.get("missing").is_err());
//! ```

use crate::adapter::{MetadataAdapter, Persister, QueryService};
use crate::error::{PersistenceError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: Arc<BTreeMap<String, Arc<dyn MetadataAdapter>>>,
}

impl AdapterRegistry {
    pub fn builder() -> AdapterRegistryBuilder {
        AdapterRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn MetadataAdapter>> {
        self.adapters.get(name).cloned().ok_or_else(|| {
            warn!(name, "Unknown adapter requested");
            PersistenceError::Argument(format!("no adapter registered as {name:?}"))
        })
    }

    pub fn persister(&self, name: &str) -> Result<Arc<dyn Persister>> {
        Ok(self.get(name)?.persister())
    }

    pub fn query_service(&self, name: &str) -> Result<Arc<dyn QueryService>> {
        Ok(self.get(name)?.query_service())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.adapters.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[derive(Default)]
pub struct AdapterRegistryBuilder {
    adapters: BTreeMap<String, Arc<dyn MetadataAdapter>>,
    duplicates: Vec<String>,
}

impl AdapterRegistryBuilder {
    pub fn register(mut self, name: impl Into<String>, adapter: Arc<dyn MetadataAdapter>) -> Self {
        let name = name.into();
        if self.adapters.contains_key(&name) {
            self.duplicates.push(name);
        } else {
            self.adapters.insert(name, adapter);
        }
        self
    }

    /// Freezes the registry. Registering one name twice is an error.
    pub fn build(self) -> Result<AdapterRegistry> {
        if !self.duplicates.is_empty() {
            return Err(PersistenceError::Argument(format!(
                "adapter names registered more than once: {}",
                self.duplicates.join(", ")
            )));
        }
        info!(adapters = self.adapters.len(), "Adapter registry built");
        Ok(AdapterRegistry {
            adapters: Arc::new(self.adapters),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAdapter;

    #[test]
    fn lookups_return_the_registered_adapter() {
        let registry = AdapterRegistry::builder()
            .register("scratch", Arc::new(MemoryAdapter::with_id("scratch")))
            .register("primary", Arc::new(MemoryAdapter::with_id("primary")))
            .build()
            .unwrap();
        assert_eq!(registry.get("primary").unwrap().id(), "primary");
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["primary", "scratch"]);
        assert!(matches!(
            registry.persister("nope"),
            Err(PersistenceError::Argument(_))
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let result = AdapterRegistry::builder()
            .register("memory", Arc::new(MemoryAdapter::new()))
            .register("memory", Arc::new(MemoryAdapter::new()))
            .build();
        assert!(matches!(result, Err(PersistenceError::Argument(_))));
    }
}
