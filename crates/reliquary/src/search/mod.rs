//! # Search Index Adapter
//!
//! Maps resources onto flat index documents (see [`serializer`] for the field
//! conventions). The index is a complete adapter in its own right, though
//! deployments usually feed it through an
//! [`IndexingPersister`](crate::decorators::IndexingPersister) behind a primary
//! store. Member order is recovered by a join from the parent's
//! `member_ids_ssim` to each child's `join_id_ssi`.

pub mod engine;
pub mod serializer;

pub use engine::{
    IndexError, IndexQuery, MemorySearchIndex, SearchDocument, SearchIndex, SearchRequest,
    SearchResponse,
};
pub use serializer::{IndexedValue, SearchSerializer};

use crate::adapter::{
    expected_token, filter_type, order_by_ids, prepare, stale_batch, stamp_token, touch,
    unique_ids, MetadataAdapter, Persister, QueryService, ResourceIter,
};
use crate::config::SearchSettings;
use crate::error::{PersistenceError, Result};
use crate::id::Id;
use crate::resource::Resource;
use crate::schema::{SchemaRegistry, ALTERNATE_IDS, MEMBER_IDS};
use chrono::{DateTime, Utc};
use serializer::{exact_field, id_term, parse_time, CREATED_AT, INTERNAL_RESOURCE, JOIN_ID};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

impl From<IndexError> for PersistenceError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::DocumentNotFound(id) => PersistenceError::NotFound(id),
            IndexError::Conflict { ids } => PersistenceError::stale(ids.into_iter().map(Id::new)),
            other => PersistenceError::Backend(other.to_string()),
        }
    }
}

#[derive(Clone)]
struct SearchContext {
    adapter_id: Arc<str>,
    index: Arc<dyn SearchIndex>,
    serializer: Arc<SearchSerializer>,
    page_size: usize,
}

impl SearchContext {
    fn load(&self, doc: SearchDocument) -> Result<Resource> {
        self.serializer.from_document(doc, &self.adapter_id)
    }

    fn search_all(&self, request: SearchRequest) -> Result<Vec<Resource>> {
        let response = self.index.search(&request)?;
        response.docs.into_iter().map(|doc| self.load(doc)).collect()
    }
}

#[derive(Clone)]
pub struct SearchAdapter {
    context: SearchContext,
}

impl SearchAdapter {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        schemas: Arc<SchemaRegistry>,
        settings: &SearchSettings,
    ) -> Self {
        Self {
            context: SearchContext {
                adapter_id: Arc::from(settings.adapter_id.as_str()),
                index,
                serializer: Arc::new(SearchSerializer::new(schemas, settings.fixed_field_limit)),
                page_size: settings.page_size.max(1),
            },
        }
    }

    pub fn in_memory(schemas: Arc<SchemaRegistry>, settings: &SearchSettings) -> Self {
        Self::new(Arc::new(MemorySearchIndex::new()), schemas, settings)
    }

    pub fn search_persister(&self) -> SearchPersister {
        SearchPersister {
            context: self.context.clone(),
        }
    }

    pub fn search_query_service(&self) -> SearchQueryService {
        SearchQueryService {
            context: self.context.clone(),
        }
    }
}

impl MetadataAdapter for SearchAdapter {
    fn id(&self) -> &str {
        &self.context.adapter_id
    }

    fn persister(&self) -> Arc<dyn Persister> {
        Arc::new(self.search_persister())
    }

    fn query_service(&self) -> Arc<dyn QueryService> {
        Arc::new(self.search_query_service())
    }
}

/// Write path of the search index. A bulk save is a single add request.
#[derive(Clone)]
pub struct SearchPersister {
    context: SearchContext,
}

impl SearchPersister {
    /// `created_at` of the batch's already indexed documents, in one request.
    fn stored_creation_times(&self, prepared: &[Resource]) -> Result<HashMap<String, DateTime<Utc>>> {
        let ids = prepared
            .iter()
            .filter_map(Resource::id)
            .map(Id::to_string)
            .collect();
        let response = self
            .context
            .index
            .search(&SearchRequest::new(IndexQuery::Ids(ids)))?;
        response
            .docs
            .into_iter()
            .filter_map(|doc| {
                let created_at = doc.first(CREATED_AT).map(parse_time)?;
                Some(created_at.map(|at| (doc.id, at)))
            })
            .collect()
    }
}

impl Persister for SearchPersister {
    fn save(&self, resource: &Resource) -> Result<Resource> {
        let mut saved = self.save_all(std::slice::from_ref(resource))?;
        saved
            .pop()
            .ok_or_else(|| PersistenceError::Backend("add returned no document".to_string()))
    }

    fn save_all(&self, resources: &[Resource]) -> Result<Vec<Resource>> {
        if resources.is_empty() {
            return Ok(Vec::new());
        }
        let adapter_id: &str = &self.context.adapter_id;
        let now = Utc::now();
        let mut prepared = resources
            .iter()
            .map(prepare)
            .collect::<Result<Vec<_>>>()?;
        let created = self.stored_creation_times(&prepared)?;
        let mut docs = Vec::with_capacity(resources.len());
        for (ready, resource) in prepared.iter_mut().zip(resources) {
            let stored_created_at = ready.id().and_then(|id| created.get(id.as_str())).copied();
            touch(ready, stored_created_at, now);
            let mut doc = self.context.serializer.to_document(ready)?;
            if let Some(token) = expected_token(resource, adapter_id) {
                doc.version = token
                    .parse()
                    .map_err(|_| stale_batch(std::slice::from_ref(&*ready)))?;
            }
            docs.push(doc);
        }

        let added = self.context.index.add(docs).map_err(|err| match err {
            IndexError::Conflict { .. } => {
                warn!(adapter = adapter_id, count = prepared.len(), "Stale write rejected");
                stale_batch(&prepared)
            }
            other => other.into(),
        })?;

        let saved = added
            .into_iter()
            .zip(resources)
            .map(|(doc, input)| {
                let version = doc.version.to_string();
                let mut output = self.context.load(doc)?;
                stamp_token(&mut output, input, adapter_id, version);
                Ok(output)
            })
            .collect::<Result<Vec<_>>>()?;
        info!(adapter = adapter_id, count = saved.len(), "Indexed documents");
        Ok(saved)
    }

    fn delete(&self, resource: &Resource) -> Result<Resource> {
        let id = resource.require_id()?;
        let existed = self.context.index.delete(id.as_str())?;
        debug!(adapter = %self.context.adapter_id, %id, existed, "Deleted document");
        Ok(resource.clone())
    }

    fn wipe(&self) -> Result<()> {
        self.context.index.clear()?;
        info!(adapter = %self.context.adapter_id, "Cleared index");
        Ok(())
    }
}

/// Read path of the search index.
#[derive(Clone)]
pub struct SearchQueryService {
    context: SearchContext,
}

impl SearchQueryService {
    fn pages(&self, request: SearchRequest) -> ResourceIter<'_> {
        Box::new(SearchPages {
            context: &self.context,
            request,
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }

    fn joined(&self, resource: &Resource, property: &str) -> Result<Vec<Resource>> {
        let ids = resource.ids_in(property);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = match resource.id() {
            Some(id) => SearchRequest::new(IndexQuery::Join {
                from_id: id.to_string(),
                from_field: exact_field(property),
                to_field: JOIN_ID.to_string(),
            }),
            None => SearchRequest::new(IndexQuery::Ids(
                unique_ids(&ids).iter().map(Id::to_string).collect(),
            )),
        };
        Ok(order_by_ids(&ids, self.context.search_all(request)?))
    }
}

/// Walks a request page by page as the caller iterates.
struct SearchPages<'a> {
    context: &'a SearchContext,
    request: SearchRequest,
    buffer: VecDeque<SearchDocument>,
    exhausted: bool,
}

impl Iterator for SearchPages<'_> {
    type Item = Result<Resource>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            let page_size = self.context.page_size;
            let request = self.request.clone().page(self.request.start, page_size);
            match self.context.index.search(&request) {
                Ok(response) => {
                    debug!(start = request.start, docs = response.docs.len(), "Fetched result page");
                    self.exhausted = response.docs.len() < page_size;
                    self.request.start += response.docs.len();
                    self.buffer.extend(response.docs);
                }
                Err(err) => {
                    self.exhausted = true;
                    return Some(Err(err.into()));
                }
            }
        }
        let doc = self.buffer.pop_front()?;
        Some(self.context.load(doc))
    }
}

impl QueryService for SearchQueryService {
    fn find_by(&self, id: &Id) -> Result<Resource> {
        id.validate()?;
        match self.context.index.get(id.as_str())? {
            Some(doc) => self.context.load(doc),
            None => Err(PersistenceError::not_found(id)),
        }
    }

    fn find_many_by_ids(&self, ids: &[Id]) -> Result<Vec<Resource>> {
        ids.iter().try_for_each(|id| id.validate().map(|_| ()))?;
        let ids = unique_ids(ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = SearchRequest::new(IndexQuery::Ids(ids.iter().map(Id::to_string).collect()));
        Ok(order_by_ids(&ids, self.context.search_all(request)?))
    }

    fn find_by_alternate_identifier(&self, id: &Id) -> Result<Resource> {
        id.validate()?;
        let request = SearchRequest::new(IndexQuery::Term {
            field: exact_field(ALTERNATE_IDS),
            value: id_term(id),
        })
        .page(0, 1);
        self.context
            .search_all(request)?
            .into_iter()
            .next()
            .ok_or_else(|| PersistenceError::not_found(id))
    }

    fn find_all(&self) -> ResourceIter<'_> {
        self.pages(SearchRequest::new(IndexQuery::All))
    }

    fn find_all_of_type(&self, internal_resource: &str) -> ResourceIter<'_> {
        self.pages(SearchRequest::new(IndexQuery::Term {
            field: INTERNAL_RESOURCE.to_string(),
            value: internal_resource.to_string(),
        }))
    }

    fn count_all_of_type(&self, internal_resource: &str) -> Result<usize> {
        let request = SearchRequest::new(IndexQuery::Term {
            field: INTERNAL_RESOURCE.to_string(),
            value: internal_resource.to_string(),
        })
        .page(0, 0);
        Ok(self.context.index.search(&request)?.num_found)
    }

    fn find_members(
        &self,
        resource: &Resource,
        internal_resource: Option<&str>,
    ) -> Result<Vec<Resource>> {
        Ok(filter_type(self.joined(resource, MEMBER_IDS)?, internal_resource))
    }

    fn find_references_by(&self, resource: &Resource, property: &str) -> Result<Vec<Resource>> {
        self.joined(resource, property)
    }

    fn find_inverse_references_by(
        &self,
        resource: &Resource,
        property: &str,
    ) -> Result<Vec<Resource>> {
        let id = resource.require_id()?;
        self.context.search_all(SearchRequest::new(IndexQuery::Term {
            field: exact_field(property),
            value: id_term(id),
        }))
    }
}
