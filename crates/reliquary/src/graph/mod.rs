//! # Graph Store Adapter
//!
//! Maps each resource onto one container of a linked-data store (see
//! [`serializer`] for the triple layout and [`ids`] for container IRIs).
//! Optimistic locking rides on the container ETag, sent back as `If-Match`.
//! A bulk save checks every container's precondition before it writes any of
//! them, so a stale batch writes nothing.

pub mod engine;
pub mod ids;
pub mod ordered_list;
pub mod serializer;
pub mod term;

pub use engine::{GraphError, GraphRecord, MemoryTripleStore, TripleStore};
pub use ids::IriMinter;
pub use ordered_list::{Link, NodeKey, OrderedList};
pub use serializer::GraphSerializer;
pub use term::{Graph, Term, Triple};

use crate::adapter::{
    expected_token, is_stale, prepare, repeats_locked, stale_batch, stamp_token, touch,
    unique_ids,
    MetadataAdapter, Persister, QueryService, ResourceIter,
};
use crate::config::GraphSettings;
use crate::error::{PersistenceError, Result};
use crate::id::Id;
use crate::resource::Resource;
use crate::schema::{SchemaRegistry, ALTERNATE_IDS};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl From<GraphError> for PersistenceError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::NotFound(container) | GraphError::Gone(container) => {
                PersistenceError::NotFound(container)
            }
            GraphError::PreconditionFailed(container) => {
                PersistenceError::stale([Id::new(container)])
            }
            other => PersistenceError::Backend(other.to_string()),
        }
    }
}

#[derive(Clone)]
struct GraphContext {
    adapter_id: Arc<str>,
    store: Arc<dyn TripleStore>,
    serializer: Arc<GraphSerializer>,
}

impl GraphContext {
    /// The record held in `container`, or `None` when it is missing or deleted.
    fn fetch(&self, container: &str) -> Result<Option<GraphRecord>> {
        match self.store.get(container) {
            Ok(record) => Ok(Some(record)),
            Err(GraphError::NotFound(_) | GraphError::Gone(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn load(&self, container: &str, record: GraphRecord) -> Result<Resource> {
        self.serializer
            .from_graph(container, record.graph, &self.adapter_id, &record.etag)
    }

    fn load_container(&self, container: &str) -> Result<Option<Resource>> {
        self.fetch(container)?
            .map(|record| self.load(container, record))
            .transpose()
    }

    /// Resources whose container graphs mention `id` anywhere.
    fn mentioning(&self, id: &Id) -> Result<Vec<Resource>> {
        let containers = self.store.inbound(&self.serializer.reference(id))?;
        let mut found = Vec::with_capacity(containers.len());
        for container in containers {
            if let Some(resource) = self.load_container(&container)? {
                found.push(resource);
            }
        }
        Ok(found)
    }
}

#[derive(Clone)]
pub struct GraphAdapter {
    context: GraphContext,
}

impl GraphAdapter {
    pub fn new(
        store: Arc<dyn TripleStore>,
        schemas: Arc<SchemaRegistry>,
        settings: &GraphSettings,
    ) -> Self {
        let serializer = GraphSerializer::new(
            schemas,
            IriMinter::new(settings.base_iri.as_str()),
            settings.namespace.as_str(),
        );
        Self {
            context: GraphContext {
                adapter_id: Arc::from(settings.adapter_id.as_str()),
                store,
                serializer: Arc::new(serializer),
            },
        }
    }

    pub fn in_memory(schemas: Arc<SchemaRegistry>, settings: &GraphSettings) -> Self {
        Self::new(Arc::new(MemoryTripleStore::new()), schemas, settings)
    }

    pub fn graph_persister(&self) -> GraphPersister {
        GraphPersister {
            context: self.context.clone(),
        }
    }

    pub fn graph_query_service(&self) -> GraphQueryService {
        GraphQueryService {
            context: self.context.clone(),
        }
    }
}

impl MetadataAdapter for GraphAdapter {
    fn id(&self) -> &str {
        &self.context.adapter_id
    }

    fn persister(&self) -> Arc<dyn Persister> {
        Arc::new(self.graph_persister())
    }

    fn query_service(&self) -> Arc<dyn QueryService> {
        Arc::new(self.graph_query_service())
    }
}

/// A container write that passed its precondition check.
struct PendingPut {
    container: String,
    graph: Graph,
    if_match: Option<String>,
}

#[derive(Clone)]
pub struct GraphPersister {
    context: GraphContext,
}

impl Persister for GraphPersister {
    fn save(&self, resource: &Resource) -> Result<Resource> {
        let mut saved = self.save_all(std::slice::from_ref(resource))?;
        saved
            .pop()
            .ok_or_else(|| PersistenceError::Backend("put returned no container".to_string()))
    }

    fn save_all(&self, resources: &[Resource]) -> Result<Vec<Resource>> {
        if resources.is_empty() {
            return Ok(Vec::new());
        }
        let adapter_id: &str = &self.context.adapter_id;
        let serializer = &self.context.serializer;
        let now = Utc::now();
        let mut prepared = resources
            .iter()
            .map(prepare)
            .collect::<Result<Vec<_>>>()?;

        let mut pending = Vec::with_capacity(prepared.len());
        let mut stale = repeats_locked(resources, adapter_id);
        for (ready, resource) in prepared.iter_mut().zip(resources) {
            let container = serializer.container(ready.require_id()?);
            let stored = self.context.fetch(&container)?;
            stale |= is_stale(resource, adapter_id, stored.as_ref().map(|r| r.etag.as_str()));
            let stored_created_at = stored
                .as_ref()
                .and_then(|record| serializer.created_at(&container, &record.graph));
            touch(ready, stored_created_at, now);
            pending.push(PendingPut {
                graph: serializer.to_graph(ready)?,
                if_match: expected_token(resource, adapter_id).map(str::to_string),
                container,
            });
        }
        if stale {
            warn!(adapter = adapter_id, count = prepared.len(), "Stale write rejected");
            return Err(stale_batch(&prepared));
        }

        let mut saved = Vec::with_capacity(pending.len());
        for (put, input) in pending.into_iter().zip(resources) {
            let etag = self
                .context
                .store
                .put(&put.container, put.graph.clone(), put.if_match.as_deref())
                .map_err(|err| match err {
                    GraphError::PreconditionFailed(_) => {
                        warn!(adapter = adapter_id, container = %put.container, "Stale write rejected");
                        stale_batch(&prepared)
                    }
                    other => other.into(),
                })?;
            debug!(adapter = adapter_id, container = %put.container, %etag, "Put container");
            let mut output = serializer.from_graph(&put.container, put.graph, adapter_id, &etag)?;
            stamp_token(&mut output, input, adapter_id, etag);
            saved.push(output);
        }
        info!(adapter = adapter_id, count = saved.len(), "Wrote containers");
        Ok(saved)
    }

    fn delete(&self, resource: &Resource) -> Result<Resource> {
        let id = resource.require_id()?;
        let container = self.context.serializer.container(id);
        let existed = self.context.store.delete(&container)?;
        debug!(adapter = %self.context.adapter_id, %id, existed, "Deleted container");
        Ok(resource.clone())
    }

    fn wipe(&self) -> Result<()> {
        self.context.store.clear()?;
        info!(adapter = %self.context.adapter_id, "Cleared containers");
        Ok(())
    }
}

#[derive(Clone)]
pub struct GraphQueryService {
    context: GraphContext,
}

/// Loads listed containers one at a time as the caller iterates.
struct Containers<'a> {
    context: &'a GraphContext,
    remaining: std::vec::IntoIter<String>,
}

impl Iterator for Containers<'_> {
    type Item = Result<Resource>;

    fn next(&mut self) -> Option<Self::Item> {
        for container in self.remaining.by_ref() {
            match self.context.load_container(&container) {
                Ok(Some(resource)) => return Some(Ok(resource)),
                // Deleted since it was listed.
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
        None
    }
}

impl QueryService for GraphQueryService {
    fn find_by(&self, id: &Id) -> Result<Resource> {
        id.validate()?;
        let container = self.context.serializer.container(id);
        self.context
            .load_container(&container)?
            .ok_or_else(|| PersistenceError::not_found(id))
    }

    fn find_many_by_ids(&self, ids: &[Id]) -> Result<Vec<Resource>> {
        ids.iter().try_for_each(|id| id.validate().map(|_| ()))?;
        let mut found = Vec::new();
        for id in unique_ids(ids) {
            let container = self.context.serializer.container(&id);
            if let Some(resource) = self.context.load_container(&container)? {
                found.push(resource);
            }
        }
        Ok(found)
    }

    fn find_by_alternate_identifier(&self, id: &Id) -> Result<Resource> {
        id.validate()?;
        self.context
            .mentioning(id)?
            .into_iter()
            .find(|resource| resource.references(ALTERNATE_IDS, id))
            .ok_or_else(|| PersistenceError::not_found(id))
    }

    fn find_all(&self) -> ResourceIter<'_> {
        match self.context.store.list() {
            Ok(containers) => Box::new(Containers {
                context: &self.context,
                remaining: containers.into_iter(),
            }),
            Err(err) => Box::new(std::iter::once(Err(err.into()))),
        }
    }

    fn find_all_of_type(&self, internal_resource: &str) -> ResourceIter<'_> {
        let kind = internal_resource.to_string();
        Box::new(self.find_all().filter(move |resource| match resource {
            Ok(resource) => resource.internal_resource() == kind,
            Err(_) => true,
        }))
    }

    fn find_inverse_references_by(
        &self,
        resource: &Resource,
        property: &str,
    ) -> Result<Vec<Resource>> {
        let id = resource.require_id()?;
        Ok(self
            .context
            .mentioning(id)?
            .into_iter()
            .filter(|candidate| candidate.references(property, id))
            .collect())
    }
}
