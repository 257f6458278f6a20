//! Typed views over the catalog's resources.
//!
//! Each model declares its [`ResourceSchema`](reliquary::schema::ResourceSchema)
//! and converts from a loaded [`Resource`](reliquary::Resource) with `TryFrom`.

mod book;
mod collection;
mod file_set;

pub use book::{Book, BookCreate, BOOK};
pub use collection::{Collection, COLLECTION};
pub use file_set::{FileSet, FILE_SET};

use crate::error::CatalogError;
use reliquary::schema::SchemaRegistry;
use reliquary::Resource;

/// Every schema the catalog stores.
pub fn schemas() -> SchemaRegistry {
    SchemaRegistry::new()
        .with(book::schema())
        .with(collection::schema())
        .with(file_set::schema())
}

fn expect_type(resource: &Resource, expected: &'static str) -> Result<(), CatalogError> {
    if resource.internal_resource() == expected {
        return Ok(());
    }
    Err(CatalogError::WrongType {
        id: resource.id().map(ToString::to_string).unwrap_or_default(),
        expected,
        actual: resource.internal_resource().to_string(),
    })
}

fn strings(resource: &Resource, name: &str) -> Vec<String> {
    resource
        .get(name)
        .iter()
        .filter_map(|value| value.as_str())
        .map(str::to_string)
        .collect()
}

fn title(resource: &Resource) -> Result<String, CatalogError> {
    strings(resource, "title")
        .into_iter()
        .next()
        .ok_or_else(|| {
            CatalogError::Untitled(resource.id().map(ToString::to_string).unwrap_or_default())
        })
}
