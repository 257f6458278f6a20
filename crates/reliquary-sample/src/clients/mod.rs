//! # Catalog Clients
//!
//! Domain-level wrappers over a persister and a query service. Clients speak in
//! [`model`](crate::model) types and never expose raw resources except where a
//! caller needs one to edit.

mod catalog_client;
mod file_client;

pub use catalog_client::CatalogClient;
pub use file_client::FileClient;
