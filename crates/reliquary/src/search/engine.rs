//! The search index boundary.
//!
//! Documents are flat maps of multi-valued string fields plus an `id` and an
//! engine-assigned `_version_`. [`SearchIndex`] covers the handful of request
//! shapes the mapping layer issues (term, id-list and join queries with paging);
//! [`MemorySearchIndex`] answers them in process.
//!
//! Version checks on add follow the index's optimistic concurrency rules: a
//! positive `_version_` must equal the stored one when the document exists, and
//! `0` overwrites unconditionally.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndexError {
    #[error("document {0} is not indexed")]
    DocumentNotFound(String),

    #[error("version conflict on {}", .ids.join(", "))]
    Conflict { ids: Vec<String> },

    #[error("document encoding failed: {0}")]
    Encoding(String),

    #[error("index unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::Encoding(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub id: String,
    #[serde(rename = "_version_", default)]
    pub version: i64,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Vec<String>>,
}

impl SearchDocument {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: 0,
            fields: BTreeMap::new(),
        }
    }

    pub fn field(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.field(name).first().map(String::as_str)
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.entry(name.into()).or_default().push(value.into());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexQuery {
    All,
    /// Documents whose `field` holds `value`.
    Term { field: String, value: String },
    Ids(Vec<String>),
    /// Documents whose `to_field` holds any value of `from_field` on the document
    /// `from_id`.
    Join {
        from_id: String,
        from_field: String,
        to_field: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: IndexQuery,
    /// Additional `field:value` restriction.
    pub filter: Option<(String, String)>,
    pub start: usize,
    pub rows: Option<usize>,
}

impl SearchRequest {
    pub fn new(query: IndexQuery) -> Self {
        Self {
            query,
            filter: None,
            start: 0,
            rows: None,
        }
    }

    pub fn filtered(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter = Some((field.into(), value.into()));
        self
    }

    pub fn page(mut self, start: usize, rows: usize) -> Self {
        self.start = start;
        self.rows = Some(rows);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchResponse {
    pub num_found: usize,
    pub docs: Vec<SearchDocument>,
}

pub trait SearchIndex: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<SearchDocument>, IndexError>;

    /// Indexes every document in one request. Any version conflict rejects the
    /// whole request. Returns the documents with their new versions.
    fn add(&self, docs: Vec<SearchDocument>) -> Result<Vec<SearchDocument>, IndexError>;

    fn delete(&self, id: &str) -> Result<bool, IndexError>;

    /// Matching documents ordered by id.
    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, IndexError>;

    fn clear(&self) -> Result<(), IndexError>;
}

#[derive(Debug, Default)]
struct IndexState {
    docs: BTreeMap<String, String>,
    last_version: i64,
}

/// In-process index. Documents are held as serialized JSON.
#[derive(Debug, Default)]
pub struct MemorySearchIndex {
    state: RwLock<IndexState>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> IndexError {
        IndexError::Unavailable("index lock poisoned".to_string())
    }

    fn decode(text: &str) -> Result<SearchDocument, IndexError> {
        Ok(serde_json::from_str(text)?)
    }
}

fn matches(query: &IndexQuery, doc: &SearchDocument, joined: &[String]) -> bool {
    match query {
        IndexQuery::All => true,
        IndexQuery::Term { field, value } => doc.field(field).contains(value),
        IndexQuery::Ids(ids) => ids.contains(&doc.id),
        IndexQuery::Join { to_field, .. } => doc
            .field(to_field)
            .iter()
            .any(|value| joined.contains(value)),
    }
}

impl SearchIndex for MemorySearchIndex {
    fn get(&self, id: &str) -> Result<Option<SearchDocument>, IndexError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        state.docs.get(id).map(|text| Self::decode(text)).transpose()
    }

    fn add(&self, docs: Vec<SearchDocument>) -> Result<Vec<SearchDocument>, IndexError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;

        let mut current: BTreeMap<String, i64> = BTreeMap::new();
        let mut conflicts = Vec::new();
        for doc in &docs {
            let stored = match current.get(&doc.id) {
                Some(version) => Some(*version),
                None => state
                    .docs
                    .get(&doc.id)
                    .map(|text| Self::decode(text).map(|stored| stored.version))
                    .transpose()?,
            };
            if doc.version > 0 && stored.is_some_and(|stored| stored != doc.version) {
                conflicts.push(doc.id.clone());
            }
            // Later documents in the same request see this one as written.
            current.insert(doc.id.clone(), doc.version.max(stored.unwrap_or(0)) + 1);
        }
        if !conflicts.is_empty() {
            return Err(IndexError::Conflict { ids: conflicts });
        }

        let mut written = Vec::with_capacity(docs.len());
        for mut doc in docs {
            state.last_version += 1;
            doc.version = state.last_version;
            let text = serde_json::to_string(&doc)?;
            state.docs.insert(doc.id.clone(), text);
            written.push(doc);
        }
        Ok(written)
    }

    fn delete(&self, id: &str) -> Result<bool, IndexError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        Ok(state.docs.remove(id).is_some())
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, IndexError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        let joined = match &request.query {
            IndexQuery::Join {
                from_id,
                from_field,
                ..
            } => match state.docs.get(from_id) {
                Some(text) => Self::decode(text)?.field(from_field).to_vec(),
                None => Vec::new(),
            },
            _ => Vec::new(),
        };

        let mut matching = Vec::new();
        for text in state.docs.values() {
            let doc = Self::decode(text)?;
            let filtered = request
                .filter
                .as_ref()
                .map_or(true, |(field, value)| doc.field(field).contains(value));
            if filtered && matches(&request.query, &doc, &joined) {
                matching.push(doc);
            }
        }
        let num_found = matching.len();
        let page = matching.into_iter().skip(request.start);
        let docs = match request.rows {
            Some(rows) => page.take(rows).collect(),
            None => page.collect(),
        };
        Ok(SearchResponse { num_found, docs })
    }

    fn clear(&self) -> Result<(), IndexError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        state.docs.clear();
        Ok(())
    }
}
