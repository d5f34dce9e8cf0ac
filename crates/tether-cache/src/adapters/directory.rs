//! # Scope Directory
//!
//! Concurrent map from scope name to registry. Registries are created on
//! first use from a template configuration and share one clock and one
//! reclamation queue.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use crate::adapters::reaper::ReclamationQueue;
use crate::adapters::registry::ResourceRegistry;
use crate::domain::error::HolderResult;
use crate::domain::{Clock, RegistryConfig, RegistrySnapshot, SystemClock};
use crate::traits::{Resource, Session};

/// Registries keyed by scope name
pub struct ScopeDirectory<R: Resource, S: Session> {
    registries: DashMap<String, Arc<ResourceRegistry<R, S>>>,
    template: RegistryConfig,
    clock: Arc<dyn Clock>,
    queue: ReclamationQueue,
}

impl<R: Resource, S: Session> ScopeDirectory<R, S> {
    /// Directory on the wall clock and the process-wide reaper
    ///
    /// `template.scope_name` is ignored; each registry gets its own.
    pub fn new(template: RegistryConfig) -> HolderResult<Self> {
        Self::with_parts(template, Arc::new(SystemClock), ReclamationQueue::default())
    }

    pub fn with_parts(
        template: RegistryConfig,
        clock: Arc<dyn Clock>,
        queue: ReclamationQueue,
    ) -> HolderResult<Self> {
        template.validate()?;
        Ok(Self {
            registries: DashMap::new(),
            template,
            clock,
            queue,
        })
    }

    /// Registry for `scope`, created on first request
    ///
    /// # Errors
    ///
    /// `HolderError::InvalidConfig` if `scope` is not a valid scope name.
    pub fn registry(&self, scope: &str) -> HolderResult<Arc<ResourceRegistry<R, S>>> {
        if let Some(existing) = self.registries.get(scope) {
            return Ok(Arc::clone(&existing));
        }

        match self.registries.entry(scope.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let config = RegistryConfig {
                    scope_name: scope.to_string(),
                    ..self.template.clone()
                };
                let registry = Arc::new(ResourceRegistry::with_parts(
                    config,
                    self.clock.clone(),
                    self.queue.clone(),
                )?);
                entry.insert(Arc::clone(&registry));
                Ok(registry)
            }
        }
    }

    /// Lookup without creating
    pub fn get(&self, scope: &str) -> Option<Arc<ResourceRegistry<R, S>>> {
        self.registries.get(scope).map(|entry| Arc::clone(&entry))
    }

    /// Close and forget one scope's registry
    pub fn remove(&self, scope: &str) -> bool {
        match self.registries.remove(scope) {
            Some((_, registry)) => {
                registry.close();
                true
            }
            None => false,
        }
    }

    /// Close every registry and empty the directory
    pub fn close_all(&self) {
        let scopes = self.scopes();
        for scope in &scopes {
            self.remove(scope);
        }
        info!("🛑 Scope directory closed: {} registries", scopes.len());
    }

    pub fn scopes(&self) -> Vec<String> {
        self.registries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.registries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }

    /// Snapshot of every registry, sorted by scope name
    pub fn snapshots(&self) -> Vec<RegistrySnapshot> {
        let mut snapshots: Vec<_> = self
            .registries
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.scope_name.cmp(&b.scope_name));
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy;

    impl Resource for Dummy {
        fn close(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    impl Session for Dummy {
        fn logout(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_is_created_once_per_scope() {
        let directory = ScopeDirectory::<Dummy, Dummy>::new(RegistryConfig::default()).unwrap();

        let a = directory.registry("ws-a").unwrap();
        let again = directory.registry("ws-a").unwrap();
        let b = directory.registry("ws-b").unwrap();

        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.scope_name(), "ws-a");
        assert_eq!(b.scope_name(), "ws-b");
        assert_eq!(directory.len(), 2);
    }

    #[test]
    fn test_invalid_scope_name_is_rejected() {
        let directory = ScopeDirectory::<Dummy, Dummy>::new(RegistryConfig::default()).unwrap();
        assert!(directory.registry("").is_err());
        assert!(directory.is_empty());
    }

    #[test]
    fn test_close_all_empties_directory() {
        let directory = ScopeDirectory::<Dummy, Dummy>::new(RegistryConfig::default()).unwrap();
        directory.registry("ws-b").unwrap();
        directory.registry("ws-a").unwrap();

        let names: Vec<_> = directory
            .snapshots()
            .into_iter()
            .map(|s| s.scope_name)
            .collect();
        assert_eq!(names, vec!["ws-a", "ws-b"]);

        directory.close_all();
        assert!(directory.is_empty());
        assert!(directory.get("ws-a").is_none());
        assert!(!directory.remove("ws-a"));
    }
}
