//! # Binary Storage
//!
//! Files attached to resources live outside the metadata backends, behind
//! [`StorageAdapter`]s. A file id carries the scheme of the adapter that holds it
//! (`memory://…`, `disk://…`), and a [`StorageRouter`] sends each request to the
//! first registered adapter that [`handles`](StorageAdapter::handles) the id.

use crate::error::{PersistenceError, Result};
use crate::resource::Resource;
use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub id: String,
    pub size: u64,
    pub bytes: Vec<u8>,
}

pub trait StorageAdapter: Send + Sync {
    /// Whether `id` belongs to this adapter.
    fn handles(&self, id: &str) -> bool;

    fn upload(&self, source: &mut dyn Read, filename: &str, resource: &Resource)
        -> Result<FileHandle>;

    fn find_by(&self, id: &str) -> Result<FileHandle>;

    fn delete(&self, id: &str) -> Result<()>;
}

/// Holds uploads in memory under `memory://` ids.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub const SCHEME: &'static str = "memory://";

    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> PersistenceError {
        PersistenceError::Backend("file store lock poisoned".to_string())
    }
}

impl StorageAdapter for MemoryStorage {
    fn handles(&self, id: &str) -> bool {
        id.starts_with(Self::SCHEME)
    }

    fn upload(
        &self,
        source: &mut dyn Read,
        filename: &str,
        resource: &Resource,
    ) -> Result<FileHandle> {
        let mut bytes = Vec::new();
        source
            .read_to_end(&mut bytes)
            .map_err(|err| PersistenceError::Backend(format!("reading {filename}: {err}")))?;
        let owner = resource
            .id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unattached".to_string());
        let id = format!("{}{owner}/{}/{filename}", Self::SCHEME, Uuid::new_v4().simple());
        self.files
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(id.clone(), bytes.clone());
        debug!(%id, size = bytes.len(), "Stored file");
        Ok(FileHandle {
            size: bytes.len() as u64,
            id,
            bytes,
        })
    }

    fn find_by(&self, id: &str) -> Result<FileHandle> {
        let files = self.files.read().map_err(|_| Self::poisoned())?;
        let bytes = files
            .get(id)
            .cloned()
            .ok_or_else(|| PersistenceError::FileNotFound(id.to_string()))?;
        Ok(FileHandle {
            id: id.to_string(),
            size: bytes.len() as u64,
            bytes,
        })
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.files
            .write()
            .map_err(|_| Self::poisoned())?
            .remove(id);
        Ok(())
    }
}

/// Routes file operations across adapters in registration order.
#[derive(Clone, Default)]
pub struct StorageRouter {
    adapters: Vec<Arc<dyn StorageAdapter>>,
}

impl StorageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, adapter: Arc<dyn StorageAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    fn route(&self, id: &str) -> Result<&Arc<dyn StorageAdapter>> {
        self.adapters
            .iter()
            .find(|adapter| adapter.handles(id))
            .ok_or_else(|| {
                warn!(%id, "No storage adapter handles file id");
                PersistenceError::FileNotFound(id.to_string())
            })
    }

    /// Uploads through the first registered adapter.
    pub fn upload(
        &self,
        source: &mut dyn Read,
        filename: &str,
        resource: &Resource,
    ) -> Result<FileHandle> {
        let adapter = self.adapters.first().ok_or_else(|| {
            PersistenceError::Argument("no storage adapter registered".to_string())
        })?;
        adapter.upload(source, filename, resource)
    }

    pub fn find_by(&self, id: &str) -> Result<FileHandle> {
        self.route(id)?.find_by(id)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.route(id)?.delete(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ResourceSchema;

    fn owner() -> Resource {
        Resource::new(ResourceSchema::permissive("FileSet")).with_id("fs-1")
    }

    #[test]
    fn uploads_are_found_through_the_router() {
        let router = StorageRouter::new().with(Arc::new(MemoryStorage::new()));
        let handle = router
            .upload(&mut "hello".as_bytes(), "greeting.txt", &owner())
            .unwrap();
        assert!(handle.id.starts_with("memory://fs-1/"));
        assert_eq!(handle.size, 5);
        assert_eq!(router.find_by(&handle.id).unwrap().bytes, b"hello");

        router.delete(&handle.id).unwrap();
        assert!(matches!(
            router.find_by(&handle.id),
            Err(PersistenceError::FileNotFound(_))
        ));
    }

    #[test]
    fn unknown_schemes_are_not_found() {
        let router = StorageRouter::new().with(Arc::new(MemoryStorage::new()));
        assert!(matches!(
            router.find_by("disk:///tmp/x"),
            Err(PersistenceError::FileNotFound(_))
        ));
    }
}
