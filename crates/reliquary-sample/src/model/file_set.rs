use super::{expect_type, strings};
use crate::error::CatalogError;
use reliquary::schema::{ResourceSchema, ValueType};
use reliquary::{Id, Resource, Value};
use std::sync::Arc;

pub const FILE_SET: &str = "FileSet";

pub(super) fn schema() -> Arc<ResourceSchema> {
    ResourceSchema::builder(FILE_SET)
        .multiple("label", ValueType::String)
        .multiple("file_identifiers", ValueType::Uri)
        .single("size", ValueType::Integer)
        .single("part_of", ValueType::Id)
        .build()
}

/// Metadata for one uploaded file, attached to a book through `part_of`.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSet {
    pub id: Id,
    pub label: Option<String>,
    pub file_ids: Vec<String>,
    pub size: Option<i64>,
    pub book_id: Option<Id>,
}

impl TryFrom<Resource> for FileSet {
    type Error = CatalogError;

    fn try_from(resource: Resource) -> Result<Self, Self::Error> {
        expect_type(&resource, FILE_SET)?;
        Ok(Self {
            id: resource.require_id()?.clone(),
            label: strings(&resource, "label").into_iter().next(),
            file_ids: resource
                .get("file_identifiers")
                .iter()
                .filter_map(|value| match value {
                    Value::Uri(id) => Some(id.clone()),
                    _ => None,
                })
                .collect(),
            size: match resource.first("size") {
                Some(Value::Integer(size)) => Some(*size),
                _ => None,
            },
            book_id: resource.ids_in("part_of").into_iter().next(),
        })
    }
}
