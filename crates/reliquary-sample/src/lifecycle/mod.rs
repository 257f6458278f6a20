//! # System Assembly
//!
//! [`RepositorySystem`] wires the catalog together once at start-up:
//!
//! 1. **Adapters** - one per backend, registered by name in an
//!    [`AdapterRegistry`]
//! 2. **Persister stack** - writes go to the document store and are mirrored
//!    into the search index; deletes clean up parent collections and change
//!    sets may append to a parent
//! 3. **Clients** - [`CatalogClient`] and [`FileClient`] read from the document
//!    store, so the copies they edit carry its lock token
//!
//! ```text
//! AppendingPersister
//!   └─ ParentCleanupPersister
//!        └─ IndexingPersister
//!             ├─ postgres   (document store, primary)
//!             └─ index_solr (search index)
//! ```
//!
//! The graph store is registered as `fedora` but sits outside the write path; it
//! is there for callers that want linked-data copies.
//!
//! **Logging:** call [`reliquary::tracing::setup_tracing`] before building the
//! system, then run with `RUST_LOG=info` or `RUST_LOG=debug`.

use crate::clients::{CatalogClient, FileClient};
use crate::error::CatalogError;
use crate::model;
use reliquary::decorators::{AppendingPersister, IndexingPersister, ParentCleanupPersister};
use reliquary::document::DocumentAdapter;
use reliquary::graph::GraphAdapter;
use reliquary::memory::MemoryAdapter;
use reliquary::schema::SchemaRegistry;
use reliquary::search::SearchAdapter;
use reliquary::storage::{MemoryStorage, StorageRouter};
use reliquary::{AdapterRegistry, Persister, ReliquaryConfig};
use std::sync::Arc;
use tracing::info;

pub const PRIMARY: &str = "postgres";
pub const INDEX: &str = "index_solr";
pub const GRAPH: &str = "fedora";
pub const SCRATCH: &str = "memory";

pub struct RepositorySystem {
    pub catalog: CatalogClient,
    pub files: FileClient,
    pub registry: AdapterRegistry,
    schemas: Arc<SchemaRegistry>,
}

impl RepositorySystem {
    #[tracing::instrument(skip_all)]
    pub fn new(config: &ReliquaryConfig) -> Result<Self, CatalogError> {
        let schemas = Arc::new(model::schemas());
        let registry = AdapterRegistry::builder()
            .register(
                PRIMARY,
                Arc::new(DocumentAdapter::in_memory(schemas.clone(), &config.document)),
            )
            .register(
                INDEX,
                Arc::new(SearchAdapter::in_memory(schemas.clone(), &config.search)),
            )
            .register(
                GRAPH,
                Arc::new(GraphAdapter::in_memory(schemas.clone(), &config.graph)),
            )
            .register(SCRATCH, Arc::new(MemoryAdapter::new()))
            .build()?;

        let queries = registry.query_service(PRIMARY)?;
        let indexing: Arc<dyn Persister> = Arc::new(IndexingPersister::new(
            registry.persister(PRIMARY)?,
            registry.persister(INDEX)?,
        ));
        let cleanup: Arc<dyn Persister> =
            Arc::new(ParentCleanupPersister::new(indexing, queries.clone()));
        let persister: Arc<dyn Persister> =
            Arc::new(AppendingPersister::new(cleanup, queries.clone()));
        let storage = StorageRouter::new().with(Arc::new(MemoryStorage::new()));

        info!(adapters = registry.len(), "Repository system ready");
        Ok(Self {
            catalog: CatalogClient::new(schemas.clone(), persister.clone(), queries.clone()),
            files: FileClient::new(schemas.clone(), persister, queries, storage),
            registry,
            schemas,
        })
    }

    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    /// Wipes every registered backend.
    pub fn wipe(&self) -> Result<(), CatalogError> {
        for name in self.registry.names() {
            self.registry.persister(name)?.wipe()?;
        }
        info!("Wiped all adapters");
        Ok(())
    }
}
