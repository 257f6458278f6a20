use super::logged;
use crate::adapter::{Persister, QueryService};
use crate::error::Result;
use crate::resource::Resource;
use std::sync::Arc;
use tracing::info;

/// Removes a deleted resource from the `member_ids` of every parent, keeping the
/// order of the remaining members.
#[derive(Clone)]
pub struct ParentCleanupPersister {
    inner: Arc<dyn Persister>,
    query_service: Arc<dyn QueryService>,
}

impl ParentCleanupPersister {
    pub fn new(inner: Arc<dyn Persister>, query_service: Arc<dyn QueryService>) -> Self {
        Self {
            inner,
            query_service,
        }
    }
}

impl Persister for ParentCleanupPersister {
    fn save(&self, resource: &Resource) -> Result<Resource> {
        self.inner.save(resource)
    }

    fn save_all(&self, resources: &[Resource]) -> Result<Vec<Resource>> {
        self.inner.save_all(resources)
    }

    #[tracing::instrument(skip_all, fields(id = ?resource.id()))]
    fn delete(&self, resource: &Resource) -> Result<Resource> {
        let id = resource.require_id()?.clone();
        let parents = logged("parent_cleanup", self.query_service.find_parents(resource))?;
        let deleted = logged("parent_cleanup", self.inner.delete(resource))?;
        for mut parent in parents {
            parent.remove_member(&id)?;
            logged("parent_cleanup", self.inner.save(&parent))?;
            info!(parent = ?parent.id(), child = %id, "Removed member");
        }
        Ok(deleted)
    }

    fn wipe(&self) -> Result<()> {
        self.inner.wipe()
    }
}
