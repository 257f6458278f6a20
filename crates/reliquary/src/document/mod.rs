//! # Document Store Adapter
//!
//! Maps resources onto a relational table with one row per resource and a JSON
//! metadata column (see [`serializer`] for the value encoding). Bulk saves run in a
//! single transaction, optimistic locking uses the row's `lock_version`, and
//! reference queries are JSON containment filters on the metadata column.

pub mod engine;
mod persister;
mod query_service;
pub mod serializer;

pub use engine::{DocumentRow, DocumentStore, MemoryDocumentStore, RowFilter, RowWrite, StoreError};
pub use persister::DocumentPersister;
pub use query_service::DocumentQueryService;
pub use serializer::DocumentSerializer;

use crate::adapter::{MetadataAdapter, Persister, QueryService};
use crate::config::DocumentSettings;
use crate::error::PersistenceError;
use crate::id::Id;
use crate::schema::SchemaRegistry;
use std::sync::Arc;

impl From<StoreError> for PersistenceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RowNotFound(id) => PersistenceError::NotFound(id),
            StoreError::Conflict { ids } => {
                PersistenceError::stale(ids.into_iter().map(Id::new))
            }
            other => PersistenceError::Backend(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct DocumentAdapter {
    persister: DocumentPersister,
    query_service: DocumentQueryService,
}

impl DocumentAdapter {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        schemas: Arc<SchemaRegistry>,
        settings: &DocumentSettings,
    ) -> Self {
        let adapter_id: Arc<str> = Arc::from(settings.adapter_id.as_str());
        let serializer = Arc::new(DocumentSerializer::new(schemas));
        Self {
            persister: DocumentPersister {
                adapter_id: adapter_id.clone(),
                store: store.clone(),
                serializer: serializer.clone(),
            },
            query_service: DocumentQueryService {
                adapter_id,
                store,
                serializer,
                page_size: settings.page_size.max(1),
            },
        }
    }

    /// An adapter over a fresh [`MemoryDocumentStore`].
    pub fn in_memory(schemas: Arc<SchemaRegistry>, settings: &DocumentSettings) -> Self {
        Self::new(Arc::new(MemoryDocumentStore::new()), schemas, settings)
    }

    pub fn document_persister(&self) -> &DocumentPersister {
        &self.persister
    }

    pub fn document_query_service(&self) -> &DocumentQueryService {
        &self.query_service
    }
}

impl MetadataAdapter for DocumentAdapter {
    fn id(&self) -> &str {
        &self.persister.adapter_id
    }

    fn persister(&self) -> Arc<dyn Persister> {
        Arc::new(self.persister.clone())
    }

    fn query_service(&self) -> Arc<dyn QueryService> {
        Arc::new(self.query_service.clone())
    }
}
