use super::{expect_type, title};
use crate::error::CatalogError;
use reliquary::schema::{ResourceSchema, ValueType};
use reliquary::{Id, Resource};
use std::sync::Arc;

pub const COLLECTION: &str = "Collection";

pub(super) fn schema() -> Arc<ResourceSchema> {
    ResourceSchema::builder(COLLECTION)
        .multiple("title", ValueType::String)
        .required()
        .members()
        .build()
}

/// An ordered grouping of books.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub id: Id,
    pub title: String,
    pub member_ids: Vec<Id>,
}

impl TryFrom<Resource> for Collection {
    type Error = CatalogError;

    fn try_from(resource: Resource) -> Result<Self, Self::Error> {
        expect_type(&resource, COLLECTION)?;
        Ok(Self {
            id: resource.require_id()?.clone(),
            title: title(&resource)?,
            member_ids: resource.member_ids(),
        })
    }
}
