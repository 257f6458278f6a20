use super::logged;
use crate::adapter::Persister;
use crate::error::Result;
use crate::resource::Resource;
use std::sync::Arc;
use tracing::debug;

/// Writes to a primary persister and mirrors the primary's output into an index.
/// Callers get the primary's copy back.
#[derive(Clone)]
pub struct IndexingPersister {
    primary: Arc<dyn Persister>,
    index: Arc<dyn Persister>,
}

impl IndexingPersister {
    pub fn new(primary: Arc<dyn Persister>, index: Arc<dyn Persister>) -> Self {
        Self { primary, index }
    }
}

impl Persister for IndexingPersister {
    #[tracing::instrument(skip_all, fields(id = ?resource.id()))]
    fn save(&self, resource: &Resource) -> Result<Resource> {
        let saved = logged("indexing", self.primary.save(resource))?;
        logged("indexing", self.index.save(&saved))?;
        debug!(id = ?saved.id(), "Indexed");
        Ok(saved)
    }

    #[tracing::instrument(skip_all, fields(count = resources.len()))]
    fn save_all(&self, resources: &[Resource]) -> Result<Vec<Resource>> {
        let saved = logged("indexing", self.primary.save_all(resources))?;
        if !saved.is_empty() {
            logged("indexing", self.index.save_all(&saved))?;
        }
        Ok(saved)
    }

    #[tracing::instrument(skip_all, fields(id = ?resource.id()))]
    fn delete(&self, resource: &Resource) -> Result<Resource> {
        let deleted = logged("indexing", self.primary.delete(resource))?;
        logged("indexing", self.index.delete(resource))?;
        Ok(deleted)
    }

    fn wipe(&self) -> Result<()> {
        logged("indexing", self.primary.wipe())?;
        logged("indexing", self.index.wipe())
    }
}
