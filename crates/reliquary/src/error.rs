//! # Persistence Errors
//!
//! This module defines the error taxonomy shared by every adapter, serializer and
//! decorator. Backend-native failures (a missing row, a search miss, a graph 404 or
//! 410) are translated into these variants at the persister boundary, so callers
//! match on one enum regardless of which store they talk to.

use crate::id::Id;

/// Errors that can occur while reading or writing resources.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PersistenceError {
    /// No resource (or alternate identifier) matched.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A write carried a lock token older than the stored version.
    #[error("Stale object: {}", join_ids(.ids))]
    StaleObject { ids: Vec<Id> },

    /// A value reached a serializer in a shape the backend cannot store.
    #[error("Unsupported datatype: {0}")]
    UnsupportedDatatype(String),

    /// The caller passed a malformed identifier or an unusable argument.
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// No binary storage adapter holds the requested file.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Opaque engine failure (connection loss, timeout, corrupt payload).
    #[error("Backend error: {0}")]
    Backend(String),
}

impl PersistenceError {
    pub fn stale(ids: impl IntoIterator<Item = Id>) -> Self {
        PersistenceError::StaleObject {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn not_found(id: &Id) -> Self {
        PersistenceError::NotFound(id.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PersistenceError::NotFound(_))
    }
}

fn join_ids(ids: &[Id]) -> String {
    ids.iter()
        .map(Id::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_error_names_every_resource() {
        let err = PersistenceError::stale([Id::new("a"), Id::new("b")]);
        assert_eq!(err.to_string(), "Stale object: a, b");
    }
}
