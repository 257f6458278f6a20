//! # Memory Adapter
//!
//! An in-process adapter holding resources in a map. It honours the full adapter
//! contract (ids, timestamps, optimistic locking through a per-resource counter)
//! and additionally records every delete, which is what lets
//! [`BufferedPersister`](crate::decorators::BufferedPersister) use a fresh one as
//! its scratch store and replay the deletes downstream afterwards.

use crate::adapter::{
    filter_type, is_stale, prepare, repeats_locked, stale_batch, stamp_token, touch, unique_ids,
    MetadataAdapter, Persister, QueryService, ResourceIter,
};
use crate::error::{PersistenceError, Result};
use crate::id::Id;
use crate::resource::Resource;
use crate::schema::ALTERNATE_IDS;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

pub const DEFAULT_ADAPTER_ID: &str = "memory";

#[derive(Debug, Clone)]
struct Stored {
    resource: Resource,
    version: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    resources: BTreeMap<Id, Stored>,
    deletes: Vec<Resource>,
}

#[derive(Debug, Clone)]
struct SharedState {
    adapter_id: Arc<str>,
    state: Arc<RwLock<MemoryState>>,
}

impl SharedState {
    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| PersistenceError::Backend("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| PersistenceError::Backend("memory store lock poisoned".to_string()))
    }

    fn snapshot(&self, filter: impl Fn(&Resource) -> bool) -> Result<Vec<Resource>> {
        Ok(self
            .read()?
            .resources
            .values()
            .map(|stored| &stored.resource)
            .filter(|resource| filter(resource))
            .cloned()
            .collect())
    }
}

/// The memory adapter. Clones share the same store.
#[derive(Debug, Clone)]
pub struct MemoryAdapter {
    shared: SharedState,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::with_id(DEFAULT_ADAPTER_ID)
    }

    pub fn with_id(adapter_id: &str) -> Self {
        Self {
            shared: SharedState {
                adapter_id: Arc::from(adapter_id),
                state: Arc::new(RwLock::new(MemoryState::default())),
            },
        }
    }

    pub fn memory_persister(&self) -> MemoryPersister {
        MemoryPersister {
            shared: self.shared.clone(),
        }
    }

    pub fn memory_query_service(&self) -> MemoryQueryService {
        MemoryQueryService {
            shared: self.shared.clone(),
        }
    }

    /// Every resource passed to `delete` since creation (or the last wipe), in call
    /// order.
    pub fn deletes(&self) -> Result<Vec<Resource>> {
        Ok(self.shared.read()?.deletes.clone())
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataAdapter for MemoryAdapter {
    fn id(&self) -> &str {
        &self.shared.adapter_id
    }

    fn persister(&self) -> Arc<dyn Persister> {
        Arc::new(self.memory_persister())
    }

    fn query_service(&self) -> Arc<dyn QueryService> {
        Arc::new(self.memory_query_service())
    }
}

#[derive(Debug, Clone)]
pub struct MemoryPersister {
    shared: SharedState,
}

impl MemoryPersister {
    fn write_one(&self, state: &mut MemoryState, resource: &Resource) -> Result<Resource> {
        let adapter_id: &str = &self.shared.adapter_id;
        let mut prepared = prepare(resource)?;
        let id = prepared.require_id()?.clone();
        let stored = state.resources.get(&id);
        touch(
            &mut prepared,
            stored.and_then(|stored| stored.resource.created_at()),
            Utc::now(),
        );
        let version = stored.map_or(1, |stored| stored.version + 1);
        stamp_token(&mut prepared, resource, adapter_id, version.to_string());
        state.resources.insert(
            id,
            Stored {
                resource: prepared.clone(),
                version,
            },
        );
        Ok(prepared)
    }

    fn stale_in(&self, state: &MemoryState, resource: &Resource) -> bool {
        let stored = resource
            .id()
            .and_then(|id| state.resources.get(id))
            .map(|stored| stored.version.to_string());
        is_stale(resource, &self.shared.adapter_id, stored.as_deref())
    }
}

impl Persister for MemoryPersister {
    fn save(&self, resource: &Resource) -> Result<Resource> {
        let mut state = self.shared.write()?;
        if self.stale_in(&state, resource) {
            warn!(adapter = %self.shared.adapter_id, id = ?resource.id(), "Stale write rejected");
            return Err(stale_batch(std::slice::from_ref(resource)));
        }
        let saved = self.write_one(&mut state, resource)?;
        debug!(adapter = %self.shared.adapter_id, id = ?saved.id(), "Saved resource");
        Ok(saved)
    }

    fn save_all(&self, resources: &[Resource]) -> Result<Vec<Resource>> {
        let mut state = self.shared.write()?;
        if repeats_locked(resources, &self.shared.adapter_id)
            || resources.iter().any(|resource| self.stale_in(&state, resource))
        {
            warn!(adapter = %self.shared.adapter_id, count = resources.len(), "Stale bulk write rejected");
            return Err(stale_batch(resources));
        }
        let saved = resources
            .iter()
            .map(|resource| self.write_one(&mut state, resource))
            .collect::<Result<Vec<_>>>()?;
        info!(adapter = %self.shared.adapter_id, count = saved.len(), "Saved resources");
        Ok(saved)
    }

    fn delete(&self, resource: &Resource) -> Result<Resource> {
        let id = resource.require_id()?;
        let mut state = self.shared.write()?;
        state.resources.remove(id);
        state.deletes.push(resource.clone());
        debug!(adapter = %self.shared.adapter_id, %id, "Deleted resource");
        Ok(resource.clone())
    }

    fn wipe(&self) -> Result<()> {
        let mut state = self.shared.write()?;
        state.resources.clear();
        state.deletes.clear();
        info!(adapter = %self.shared.adapter_id, "Wiped store");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MemoryQueryService {
    shared: SharedState,
}

impl QueryService for MemoryQueryService {
    fn find_by(&self, id: &Id) -> Result<Resource> {
        id.validate()?;
        self.shared
            .read()?
            .resources
            .get(id)
            .map(|stored| stored.resource.clone())
            .ok_or_else(|| PersistenceError::not_found(id))
    }

    fn find_many_by_ids(&self, ids: &[Id]) -> Result<Vec<Resource>> {
        ids.iter().try_for_each(|id| id.validate().map(|_| ()))?;
        let state = self.shared.read()?;
        Ok(unique_ids(ids)
            .iter()
            .filter_map(|id| state.resources.get(id))
            .map(|stored| stored.resource.clone())
            .collect())
    }

    fn find_by_alternate_identifier(&self, id: &Id) -> Result<Resource> {
        id.validate()?;
        self.shared
            .snapshot(|resource| resource.references(ALTERNATE_IDS, id))?
            .into_iter()
            .next()
            .ok_or_else(|| PersistenceError::not_found(id))
    }

    fn find_all(&self) -> ResourceIter<'_> {
        match self.shared.snapshot(|_| true) {
            Ok(resources) => Box::new(resources.into_iter().map(Ok)),
            Err(err) => Box::new(std::iter::once(Err(err))),
        }
    }

    fn find_all_of_type(&self, internal_resource: &str) -> ResourceIter<'_> {
        match self.shared.snapshot(|_| true) {
            Ok(resources) => Box::new(
                filter_type(resources, Some(internal_resource))
                    .into_iter()
                    .map(Ok),
            ),
            Err(err) => Box::new(std::iter::once(Err(err))),
        }
    }

    fn find_inverse_references_by(
        &self,
        resource: &Resource,
        property: &str,
    ) -> Result<Vec<Resource>> {
        let id = resource.require_id()?;
        self.shared
            .snapshot(|candidate| candidate.references(property, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ResourceSchema, ValueType};

    fn book() -> Resource {
        Resource::new(
            ResourceSchema::builder("Book")
                .multiple("title", ValueType::String)
                .optimistic_locking()
                .build(),
        )
    }

    #[test]
    fn deletes_are_recorded_in_order() {
        let adapter = MemoryAdapter::new();
        let persister = adapter.memory_persister();
        let saved = persister.save(&book()).unwrap();
        persister.delete(&saved).unwrap();
        persister.delete(&book().with_id("elsewhere")).unwrap();

        let deleted: Vec<_> = adapter
            .deletes()
            .unwrap()
            .iter()
            .filter_map(|resource| resource.id().cloned())
            .collect();
        assert_eq!(deleted, vec![saved.id().cloned().unwrap(), Id::new("elsewhere")]);
        assert!(adapter.memory_query_service().find_all().next().is_none());
    }

    #[test]
    fn versions_count_up_per_resource() {
        let persister = MemoryAdapter::new().memory_persister();
        let first = persister.save(&book()).unwrap();
        let second = persister.save(&first).unwrap();
        assert_eq!(first.optimistic_lock_token()[0].token, "1");
        assert_eq!(second.optimistic_lock_token()[0].token, "2");
        assert!(matches!(
            persister.save(&first),
            Err(PersistenceError::StaleObject { .. })
        ));
    }

    #[test]
    fn clones_share_one_store() {
        let adapter = MemoryAdapter::new();
        let saved = adapter.clone().persister().save(&book()).unwrap();
        let found = adapter
            .query_service()
            .find_by(saved.id().unwrap())
            .unwrap();
        assert_eq!(found, saved);
    }
}
