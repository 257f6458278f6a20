use super::{expect_type, strings, title};
use crate::error::CatalogError;
use chrono::{DateTime, Utc};
use reliquary::schema::{ResourceSchema, ValueType};
use reliquary::{ChangeSet, Id, Resource, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const BOOK: &str = "Book";

pub(super) fn schema() -> Arc<ResourceSchema> {
    ResourceSchema::builder(BOOK)
        .multiple("title", ValueType::String)
        .required()
        .multiple("creator", ValueType::String)
        .single("pages", ValueType::Integer)
        .single("issued", ValueType::DateTime)
        .alternate_ids()
        .optimistic_locking()
        .build()
}

/// A catalogued book. Loaded copies keep their lock token in `resource`, so
/// edits made from one are checked against concurrent writers.
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: Id,
    pub title: String,
    pub creators: Vec<String>,
    pub pages: Option<i64>,
    pub issued: Option<DateTime<Utc>>,
    pub resource: Resource,
}

impl TryFrom<Resource> for Book {
    type Error = CatalogError;

    fn try_from(resource: Resource) -> Result<Self, Self::Error> {
        expect_type(&resource, BOOK)?;
        Ok(Self {
            id: resource.require_id()?.clone(),
            title: title(&resource)?,
            creators: strings(&resource, "creator"),
            pages: match resource.first("pages") {
                Some(Value::Integer(pages)) => Some(*pages),
                _ => None,
            },
            issued: match resource.first("issued") {
                Some(Value::DateTime(issued)) => Some(*issued),
                _ => None,
            },
            resource,
        })
    }
}

/// DTO for cataloguing a new book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookCreate {
    pub title: String,
    #[serde(default)]
    pub creators: Vec<String>,
    pub pages: Option<i64>,
    pub issued: Option<DateTime<Utc>>,
    /// Identifiers minted elsewhere, such as an ARK or a barcode.
    #[serde(default)]
    pub alternate_ids: Vec<String>,
}

impl BookCreate {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            creators: Vec::new(),
            pages: None,
            issued: None,
            alternate_ids: Vec::new(),
        }
    }

    /// Fills a change set for a fresh book resource.
    pub(crate) fn apply(&self, change_set: &mut ChangeSet) -> Result<(), CatalogError> {
        change_set.set("title", [self.title.as_str()])?;
        change_set.set("creator", self.creators.iter().map(String::as_str))?;
        change_set.set("pages", self.pages)?;
        change_set.set("issued", self.issued)?;
        change_set.set(
            "alternate_ids",
            self.alternate_ids.iter().map(|id| Id::new(id.as_str())),
        )?;
        Ok(())
    }
}
