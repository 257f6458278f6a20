//! Batching through a scratch store.

use super::logged;
use crate::adapter::{unique_ids, MetadataAdapter, Persister};
use crate::error::Result;
use crate::memory::MemoryAdapter;
use crate::resource::Resource;
use std::sync::Arc;
use tracing::info;

const SCRATCH_ADAPTER_ID: &str = "buffer";

/// Collects a scope's writes in a private [`MemoryAdapter`] and sends them
/// downstream afterwards as one `save_all`, followed by the scope's deletes.
///
/// Outside [`with_buffer`](Self::with_buffer) the persister forwards every call
/// straight to the inner one.
#[derive(Clone)]
pub struct BufferedPersister {
    inner: Arc<dyn Persister>,
}

impl BufferedPersister {
    pub fn new(inner: Arc<dyn Persister>) -> Self {
        Self { inner }
    }

    /// Runs `scope` against a fresh scratch adapter, then flushes it. Nothing is
    /// written downstream when `scope` fails.
    ///
    /// The bulk save goes first and the deletes are replayed after it, so a
    /// rejected save leaves downstream as it was. A failing delete still returns
    /// an error after the save has landed. Ids deleted and then saved again within
    /// the scope are saved, not deleted.
    ///
    /// Returns the scope's value together with the downstream copies of the
    /// flushed resources.
    #[tracing::instrument(skip_all)]
    pub fn with_buffer<R>(
        &self,
        scope: impl FnOnce(&MemoryAdapter) -> Result<R>,
    ) -> Result<(R, Vec<Resource>)> {
        let buffer = MemoryAdapter::with_id(SCRATCH_ADAPTER_ID);
        let value = scope(&buffer)?;

        let survivors = buffer
            .query_service()
            .find_all()
            .map(|resource| resource.map(without_scratch_token))
            .collect::<Result<Vec<_>>>()?;
        let flushed = if survivors.is_empty() {
            Vec::new()
        } else {
            logged("buffered", self.inner.save_all(&survivors))?
        };

        let deletes = buffer.deletes()?;
        let deleted_ids: Vec<_> = deletes
            .iter()
            .filter_map(Resource::id)
            .filter(|id| !survivors.iter().any(|resource| resource.id() == Some(*id)))
            .cloned()
            .collect();
        for id in unique_ids(&deleted_ids) {
            if let Some(resource) = deletes.iter().find(|resource| resource.id() == Some(&id)) {
                let resource = without_scratch_token(resource.clone());
                logged("buffered", self.inner.delete(&resource))?;
            }
        }

        info!(
            deleted = deleted_ids.len(),
            flushed = flushed.len(),
            "Flushed buffer"
        );
        Ok((value, flushed))
    }
}

fn without_scratch_token(mut resource: Resource) -> Resource {
    let kept = resource
        .optimistic_lock_token()
        .iter()
        .filter(|token| token.adapter_id != SCRATCH_ADAPTER_ID)
        .cloned()
        .collect();
    resource.set_optimistic_lock_token(kept);
    resource
}

impl Persister for BufferedPersister {
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
}
