//! The relational row store boundary.
//!
//! One row per resource: an opaque text primary key, the type tag, timestamps, an
//! engine-owned `lock_version` and a semi-structured `metadata` column. The
//! [`DocumentStore`] trait lists the primitives the mapping layer needs; a real
//! deployment implements it over its database driver, and
//! [`MemoryDocumentStore`] implements it in process, storing each row as JSON text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("row {0} does not exist")]
    RowNotFound(String),

    /// `lock_version` of the stored row differed from the expected one.
    #[error("lock version conflict on {}", .ids.join(", "))]
    Conflict { ids: Vec<String> },

    #[error("row encoding failed: {0}")]
    Encoding(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Encoding(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRow {
    pub id: String,
    pub internal_resource: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Assigned by the store on every write.
    #[serde(default)]
    pub lock_version: i64,
    pub metadata: Map<String, Json>,
}

/// One upsert of a bulk write.
#[derive(Debug, Clone)]
pub struct RowWrite {
    pub row: DocumentRow,
    /// Version the stored row must still have. Ignored for rows not yet stored.
    pub expected_lock_version: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowFilter {
    All,
    Type(String),
    /// `metadata[key]` is an array containing `value`.
    MetadataContains { key: String, value: Json },
    Ids(Vec<String>),
}

impl RowFilter {
    pub fn matches(&self, row: &DocumentRow) -> bool {
        match self {
            RowFilter::All => true,
            RowFilter::Type(kind) => row.internal_resource == *kind,
            RowFilter::MetadataContains { key, value } => row
                .metadata
                .get(key)
                .and_then(Json::as_array)
                .is_some_and(|values| values.contains(value)),
            RowFilter::Ids(ids) => ids.contains(&row.id),
        }
    }
}

pub trait DocumentStore: Send + Sync {
    fn fetch(&self, id: &str) -> Result<Option<DocumentRow>, StoreError>;

    /// Writes every row in one transaction. The whole batch fails with
    /// [`StoreError::Conflict`] if any expected version differs. Updated rows keep
    /// their stored `created_at`. Returns the rows as stored.
    fn upsert(&self, writes: Vec<RowWrite>) -> Result<Vec<DocumentRow>, StoreError>;

    /// Removes a row, returning whether it existed.
    fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Matching rows ordered by primary key.
    fn scan(
        &self,
        filter: &RowFilter,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<DocumentRow>, StoreError>;

    fn count(&self, filter: &RowFilter) -> Result<usize, StoreError>;

    fn truncate(&self) -> Result<(), StoreError>;
}

/// In-process row store. Rows are held as serialized JSON.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    rows: RwLock<BTreeMap<String, String>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable("row table lock poisoned".to_string())
    }

    fn decode(text: &str) -> Result<DocumentRow, StoreError> {
        Ok(serde_json::from_str(text)?)
    }

    fn decoded_rows(&self) -> Result<Vec<DocumentRow>, StoreError> {
        let rows = self.rows.read().map_err(|_| Self::poisoned())?;
        rows.values().map(|text| Self::decode(text)).collect()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn fetch(&self, id: &str) -> Result<Option<DocumentRow>, StoreError> {
        let rows = self.rows.read().map_err(|_| Self::poisoned())?;
        rows.get(id).map(|text| Self::decode(text)).transpose()
    }

    fn upsert(&self, writes: Vec<RowWrite>) -> Result<Vec<DocumentRow>, StoreError> {
        let mut rows = self.rows.write().map_err(|_| Self::poisoned())?;

        let mut staged: BTreeMap<String, DocumentRow> = BTreeMap::new();
        let mut conflicts = Vec::new();
        let mut written = Vec::with_capacity(writes.len());
        for write in writes {
            let current = match staged.get(&write.row.id) {
                Some(row) => Some(row.clone()),
                None => rows
                    .get(&write.row.id)
                    .map(|text| Self::decode(text))
                    .transpose()?,
            };
            if let (Some(expected), Some(current)) = (write.expected_lock_version, &current) {
                if expected != current.lock_version {
                    conflicts.push(write.row.id.clone());
                    continue;
                }
            }
            let mut row = write.row;
            match current {
                Some(current) => {
                    row.created_at = current.created_at;
                    row.lock_version = current.lock_version + 1;
                }
                None => row.lock_version = 1,
            }
            staged.insert(row.id.clone(), row.clone());
            written.push(row);
        }
        if !conflicts.is_empty() {
            return Err(StoreError::Conflict { ids: conflicts });
        }

        let encoded = staged
            .into_iter()
            .map(|(id, row)| Ok((id, serde_json::to_string(&row)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;
        rows.extend(encoded);
        Ok(written)
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut rows = self.rows.write().map_err(|_| Self::poisoned())?;
        Ok(rows.remove(id).is_some())
    }

    fn scan(
        &self,
        filter: &RowFilter,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<DocumentRow>, StoreError> {
        let matching = self
            .decoded_rows()?
            .into_iter()
            .filter(|row| filter.matches(row))
            .skip(offset);
        Ok(match limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    fn count(&self, filter: &RowFilter) -> Result<usize, StoreError> {
        Ok(self
            .decoded_rows()?
            .iter()
            .filter(|row| filter.matches(row))
            .count())
    }

    fn truncate(&self) -> Result<(), StoreError> {
        self.rows.write().map_err(|_| Self::poisoned())?.clear();
        Ok(())
    }
}
