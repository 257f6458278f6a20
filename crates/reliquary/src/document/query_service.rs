use super::engine::{DocumentRow, DocumentStore, RowFilter};
use super::serializer::DocumentSerializer;
use crate::adapter::{order_by_ids, unique_ids, QueryService, ResourceIter};
use crate::error::{PersistenceError, Result};
use crate::id::Id;
use crate::resource::Resource;
use crate::schema::ALTERNATE_IDS;
use crate::value::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Read path of the document store.
#[derive(Clone)]
pub struct DocumentQueryService {
    pub(super) adapter_id: Arc<str>,
    pub(super) store: Arc<dyn DocumentStore>,
    pub(super) serializer: Arc<DocumentSerializer>,
    pub(super) page_size: usize,
}

impl DocumentQueryService {
    fn load(&self, row: DocumentRow) -> Result<Resource> {
        self.serializer.from_row(row, &self.adapter_id)
    }

    fn load_all(&self, rows: Vec<DocumentRow>) -> Result<Vec<Resource>> {
        rows.into_iter().map(|row| self.load(row)).collect()
    }

    /// Containment filter matching rows whose `property` holds `id`.
    fn referencing(&self, property: &str, id: &Id) -> Result<RowFilter> {
        Ok(RowFilter::MetadataContains {
            key: property.to_string(),
            value: self.serializer.dump_value(Value::Id(id.clone()))?,
        })
    }

    fn pages(&self, filter: RowFilter) -> ResourceIter<'_> {
        Box::new(RowPages {
            service: self,
            filter,
            offset: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }
}

/// Scans a filter one page at a time as the caller iterates.
struct RowPages<'a> {
    service: &'a DocumentQueryService,
    filter: RowFilter,
    offset: usize,
    buffer: VecDeque<DocumentRow>,
    exhausted: bool,
}

impl Iterator for RowPages<'_> {
    type Item = Result<Resource>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            let page_size = self.service.page_size;
            match self
                .service
                .store
                .scan(&self.filter, self.offset, Some(page_size))
            {
                Ok(rows) => {
                    debug!(offset = self.offset, rows = rows.len(), "Fetched row page");
                    self.exhausted = rows.len() < page_size;
                    self.offset += rows.len();
                    self.buffer.extend(rows);
                }
                Err(err) => {
                    self.exhausted = true;
                    return Some(Err(err.into()));
                }
            }
        }
        let row = self.buffer.pop_front()?;
        Some(self.service.load(row))
    }
}

impl QueryService for DocumentQueryService {
    fn find_by(&self, id: &Id) -> Result<Resource> {
        id.validate()?;
        match self.store.fetch(id.as_str())? {
            Some(row) => self.load(row),
            None => Err(PersistenceError::not_found(id)),
        }
    }

    fn find_many_by_ids(&self, ids: &[Id]) -> Result<Vec<Resource>> {
        ids.iter().try_for_each(|id| id.validate().map(|_| ()))?;
        let ids = unique_ids(ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let filter = RowFilter::Ids(ids.iter().map(Id::to_string).collect());
        let rows = self.store.scan(&filter, 0, None)?;
        Ok(order_by_ids(&ids, self.load_all(rows)?))
    }

    fn find_by_alternate_identifier(&self, id: &Id) -> Result<Resource> {
        id.validate()?;
        let filter = self.referencing(ALTERNATE_IDS, id)?;
        let row = self
            .store
            .scan(&filter, 0, Some(1))?
            .into_iter()
            .next()
            .ok_or_else(|| PersistenceError::not_found(id))?;
        self.load(row)
    }

    fn find_all(&self) -> ResourceIter<'_> {
        self.pages(RowFilter::All)
    }

    fn find_all_of_type(&self, internal_resource: &str) -> ResourceIter<'_> {
        self.pages(RowFilter::Type(internal_resource.to_string()))
    }

    fn count_all_of_type(&self, internal_resource: &str) -> Result<usize> {
        Ok(self
            .store
            .count(&RowFilter::Type(internal_resource.to_string()))?)
    }

    fn find_inverse_references_by(
        &self,
        resource: &Resource,
        property: &str,
    ) -> Result<Vec<Resource>> {
        let id = resource.require_id()?;
        let filter = self.referencing(property, id)?;
        let rows = self.store.scan(&filter, 0, None)?;
        self.load_all(rows)
    }
}
