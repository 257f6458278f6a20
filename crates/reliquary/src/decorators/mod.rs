//! # Persister Decorators
//!
//! Decorators wrap one or more [`Persister`](crate::adapter::Persister)s and are
//! persisters themselves, so they stack:
//!
//! ```rust
//! use reliquary::decorators::{IndexingPersister, ParentCleanupPersister};
//! use reliquary::memory::MemoryAdapter;
//! use reliquary::MetadataAdapter;
//! use std::sync::Arc;
//!
//! let primary = MemoryAdapter::with_id("primary");
//! let index = MemoryAdapter::with_id("index");
//! let persister = ParentCleanupPersister::new(
//!     Arc::new(IndexingPersister::new(primary.persister(), index.persister())),
//!     primary.query_service(),
//! );
//! # let _ = persister;
//! ```
//!
//! None of them retries or invents new errors. An inner failure is logged at
//! `warn` and returned as is.

mod appending;
mod buffered;
mod composite;
mod indexing;
mod parent_cleanup;

pub use appending::AppendingPersister;
pub use buffered::BufferedPersister;
pub use composite::CompositePersister;
pub use indexing::IndexingPersister;
pub use parent_cleanup::ParentCleanupPersister;

use crate::error::Result;
use tracing::warn;

/// Logs a failed inner call before handing the error back.
pub(crate) fn logged<T>(decorator: &'static str, result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        warn!(decorator, error = %err, "Inner persister failed");
    }
    result
}
