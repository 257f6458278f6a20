use crate::error::CatalogError;
use crate::model::{Book, BookCreate, Collection, BOOK, COLLECTION};
use reliquary::schema::SchemaRegistry;
use reliquary::{ChangeSet, Id, Persister, QueryService};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Books and the collections that order them.
#[derive(Clone)]
pub struct CatalogClient {
    schemas: Arc<SchemaRegistry>,
    persister: Arc<dyn Persister>,
    queries: Arc<dyn QueryService>,
}

impl CatalogClient {
    pub fn new(
        schemas: Arc<SchemaRegistry>,
        persister: Arc<dyn Persister>,
        queries: Arc<dyn QueryService>,
    ) -> Self {
        Self {
            schemas,
            persister,
            queries,
        }
    }

    #[instrument(skip(self))]
    pub fn create_collection(&self, title: &str) -> Result<Collection, CatalogError> {
        let mut change_set = ChangeSet::new(self.schemas.new_resource(COLLECTION));
        change_set.set("title", [title])?;
        let saved = self.persister.save_change_set(&change_set)?;
        info!(id = ?saved.id(), "Created collection");
        Collection::try_from(saved)
    }

    /// Catalogues a book, appending it to `collection` when one is given.
    #[instrument(skip(self, params), fields(title = %params.title))]
    pub fn create_book(
        &self,
        params: &BookCreate,
        collection: Option<&Id>,
    ) -> Result<Book, CatalogError> {
        let mut change_set = ChangeSet::new(self.schemas.new_resource(BOOK));
        params.apply(&mut change_set)?;
        if let Some(parent) = collection {
            change_set.set_append_id(parent.clone());
        }
        let saved = self.persister.save_change_set(&change_set)?;
        debug!(id = ?saved.id(), "Catalogued book");
        Book::try_from(saved)
    }

    pub fn book(&self, id: &Id) -> Result<Book, CatalogError> {
        Book::try_from(self.queries.find_by(id)?)
    }

    pub fn book_by_alternate_id(&self, alternate_id: &str) -> Result<Book, CatalogError> {
        let found = self
            .queries
            .find_by_alternate_identifier(&Id::new(alternate_id))?;
        Book::try_from(found)
    }

    pub fn collection(&self, id: &Id) -> Result<Collection, CatalogError> {
        Collection::try_from(self.queries.find_by(id)?)
    }

    /// Retitles a loaded book. Fails as stale when the book changed since `book`
    /// was read.
    #[instrument(skip(self, book), fields(id = %book.id))]
    pub fn retitle(&self, book: &Book, title: &str) -> Result<Book, CatalogError> {
        let mut change_set = ChangeSet::with_fields(book.resource.clone(), ["title"]);
        change_set.set("title", [title])?;
        if !change_set.has_changes() {
            return Ok(book.clone());
        }
        Book::try_from(self.persister.save_change_set(&change_set)?)
    }

    /// The collection's books in shelf order.
    pub fn books_in(&self, collection: &Id) -> Result<Vec<Book>, CatalogError> {
        let parent = self.queries.find_by(collection)?;
        self.queries
            .find_members(&parent, Some(BOOK))?
            .into_iter()
            .map(Book::try_from)
            .collect()
    }

    /// Collections the book belongs to.
    pub fn collections_of(&self, book: &Id) -> Result<Vec<Collection>, CatalogError> {
        let book = self.queries.find_by(book)?;
        self.queries
            .find_parents(&book)?
            .into_iter()
            .map(Collection::try_from)
            .collect()
    }

    /// Moves a member to `position` (clamped to the end) within the collection.
    #[instrument(skip(self))]
    pub fn reorder(
        &self,
        collection: &Id,
        member: &Id,
        position: usize,
    ) -> Result<Collection, CatalogError> {
        let mut parent = self.queries.find_by(collection)?;
        let mut ids = parent.member_ids();
        let Some(current) = ids.iter().position(|id| id == member) else {
            return Err(reliquary::PersistenceError::not_found(member).into());
        };
        let moved = ids.remove(current);
        ids.insert(position.min(ids.len()), moved);
        parent.set_member_ids(ids)?;
        Collection::try_from(self.persister.save(&parent)?)
    }

    pub fn count_books(&self) -> Result<usize, CatalogError> {
        Ok(self.queries.count_all_of_type(BOOK)?)
    }

    #[instrument(skip(self))]
    pub fn withdraw(&self, book: &Id) -> Result<(), CatalogError> {
        let resource = self.queries.find_by(book)?;
        self.persister.delete(&resource)?;
        info!("Withdrew book");
        Ok(())
    }
}
