use crate::error::CatalogError;
use crate::model::{FileSet, FILE_SET};
use reliquary::schema::SchemaRegistry;
use reliquary::storage::{FileHandle, StorageRouter};
use reliquary::{Id, Persister, QueryService, Value};
use std::io::Read;
use std::sync::Arc;
use tracing::{info, instrument};

/// Uploads files and records them as file sets pointing at their book.
#[derive(Clone)]
pub struct FileClient {
    schemas: Arc<SchemaRegistry>,
    persister: Arc<dyn Persister>,
    queries: Arc<dyn QueryService>,
    storage: StorageRouter,
}

impl FileClient {
    pub fn new(
        schemas: Arc<SchemaRegistry>,
        persister: Arc<dyn Persister>,
        queries: Arc<dyn QueryService>,
        storage: StorageRouter,
    ) -> Self {
        Self {
            schemas,
            persister,
            queries,
            storage,
        }
    }

    /// Saves a file set for `book`, then uploads the bytes under it.
    #[instrument(skip(self, source))]
    pub fn attach(
        &self,
        book: &Id,
        filename: &str,
        source: &mut dyn Read,
    ) -> Result<FileSet, CatalogError> {
        let file_set = self
            .schemas
            .new_resource(FILE_SET)
            .with("label", [filename])?
            .with("part_of", [book.clone()])?;
        let file_set = self.persister.save(&file_set)?;
        let handle = self.storage.upload(source, filename, &file_set)?;
        let size = i64::try_from(handle.size).unwrap_or(i64::MAX);
        let saved = self.persister.save(
            &file_set
                .with("file_identifiers", [Value::uri(handle.id.as_str())])?
                .with("size", [size])?,
        )?;
        info!(file = %handle.id, size, "Attached file");
        FileSet::try_from(saved)
    }

    /// File sets attached to `book`.
    pub fn files_of(&self, book: &Id) -> Result<Vec<FileSet>, CatalogError> {
        let book = self.queries.find_by(book)?;
        self.queries
            .find_inverse_references_by(&book, "part_of")?
            .into_iter()
            .map(FileSet::try_from)
            .collect()
    }

    pub fn download(&self, file_set: &FileSet) -> Result<Vec<FileHandle>, CatalogError> {
        file_set
            .file_ids
            .iter()
            .map(|id| self.storage.find_by(id).map_err(CatalogError::from))
            .collect()
    }

    /// Deletes the stored bytes, then the file set.
    #[instrument(skip(self, file_set), fields(id = %file_set.id))]
    pub fn detach(&self, file_set: &FileSet) -> Result<(), CatalogError> {
        for id in &file_set.file_ids {
            self.storage.delete(id)?;
        }
        let resource = self.queries.find_by(&file_set.id)?;
        self.persister.delete(&resource)?;
        Ok(())
    }
}
