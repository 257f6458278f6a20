use super::logged;
use crate::adapter::{Persister, QueryService};
use crate::change_set::ChangeSet;
use crate::error::Result;
use crate::resource::Resource;
use std::sync::Arc;
use tracing::info;

/// Saves a change set and, when it names a parent through
/// [`ChangeSet::set_append_id`], appends the saved resource to that parent's
/// `member_ids` and saves the parent too.
#[derive(Clone)]
pub struct AppendingPersister {
    inner: Arc<dyn Persister>,
    query_service: Arc<dyn QueryService>,
}

impl AppendingPersister {
    pub fn new(inner: Arc<dyn Persister>, query_service: Arc<dyn QueryService>) -> Self {
        Self {
            inner,
            query_service,
        }
    }
}

impl Persister for AppendingPersister {
    fn save(&self, resource: &Resource) -> Result<Resource> {
        self.inner.save(resource)
    }

    fn save_all(&self, resources: &[Resource]) -> Result<Vec<Resource>> {
        self.inner.save_all(resources)
    }

    fn delete(&self, resource: &Resource) -> Result<Resource> {
        self.inner.delete(resource)
    }

    fn wipe(&self) -> Result<()> {
        self.inner.wipe()
    }

    #[tracing::instrument(skip_all, fields(parent = ?change_set.append_id()))]
    fn save_change_set(&self, change_set: &ChangeSet) -> Result<Resource> {
        let saved = logged("appending", self.inner.save_change_set(change_set))?;
        let Some(parent_id) = change_set.append_id() else {
            return Ok(saved);
        };
        let child_id = saved.require_id()?.clone();
        let mut parent = logged("appending", self.query_service.find_by(parent_id))?;
        parent.append_member(child_id.clone())?;
        logged("appending", self.inner.save(&parent))?;
        info!(parent = %parent_id, child = %child_id, "Appended member");
        Ok(saved)
    }
}
