use super::engine::{DocumentStore, RowWrite, StoreError};
use super::serializer::DocumentSerializer;
use crate::adapter::{expected_token, prepare, stale_batch, stamp_token, touch, Persister};
use crate::error::{PersistenceError, Result};
use crate::resource::Resource;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Write path of the document store. Every save, single or bulk, is one
/// transactional `upsert`.
#[derive(Clone)]
pub struct DocumentPersister {
    pub(super) adapter_id: Arc<str>,
    pub(super) store: Arc<dyn DocumentStore>,
    pub(super) serializer: Arc<DocumentSerializer>,
}

impl DocumentPersister {
    fn write(&self, resource: &Resource, now: chrono::DateTime<Utc>) -> Result<(Resource, RowWrite)> {
        let mut prepared = prepare(resource)?;
        touch(&mut prepared, None, now);
        let expected_lock_version = match expected_token(resource, &self.adapter_id) {
            Some(token) => Some(
                token
                    .parse::<i64>()
                    .map_err(|_| stale_batch(std::slice::from_ref(&prepared)))?,
            ),
            None => None,
        };
        let row = self.serializer.to_row(&prepared)?;
        Ok((
            prepared,
            RowWrite {
                row,
                expected_lock_version,
            },
        ))
    }
}

impl Persister for DocumentPersister {
    fn save(&self, resource: &Resource) -> Result<Resource> {
        let mut saved = self.save_all(std::slice::from_ref(resource))?;
        saved
            .pop()
            .ok_or_else(|| PersistenceError::Backend("upsert returned no row".to_string()))
    }

    fn save_all(&self, resources: &[Resource]) -> Result<Vec<Resource>> {
        if resources.is_empty() {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let (prepared, writes): (Vec<_>, Vec<_>) = resources
            .iter()
            .map(|resource| self.write(resource, now))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .unzip();

        let rows = self.store.upsert(writes).map_err(|err| match err {
            StoreError::Conflict { .. } => {
                warn!(adapter = %self.adapter_id, count = prepared.len(), "Stale write rejected");
                stale_batch(&prepared)
            }
            other => other.into(),
        })?;

        let saved = rows
            .into_iter()
            .zip(resources)
            .map(|(row, input)| {
                let version = row.lock_version.to_string();
                let mut output = self.serializer.from_row(row, &self.adapter_id)?;
                stamp_token(&mut output, input, &self.adapter_id, version);
                Ok(output)
            })
            .collect::<Result<Vec<_>>>()?;
        info!(adapter = %self.adapter_id, count = saved.len(), "Upserted rows");
        Ok(saved)
    }

    fn delete(&self, resource: &Resource) -> Result<Resource> {
        let id = resource.require_id()?;
        let existed = self.store.delete(id.as_str())?;
        debug!(adapter = %self.adapter_id, %id, existed, "Deleted row");
        Ok(resource.clone())
    }

    fn wipe(&self) -> Result<()> {
        self.store.truncate()?;
        info!(adapter = %self.adapter_id, "Truncated rows");
        Ok(())
    }
}
