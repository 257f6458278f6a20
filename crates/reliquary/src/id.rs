//! Opaque resource identifiers.

use crate::error::{PersistenceError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a persisted resource.
///
/// Ids are opaque strings. Adapters assign a fresh UUID v4 when a resource is saved
/// without one; a caller-supplied id is kept as is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Rejects blank identifiers with [`PersistenceError::Argument`].
    pub fn validate(&self) -> Result<&Self> {
        if self.is_blank() {
            return Err(PersistenceError::Argument(
                "identifier must not be blank".to_string(),
            ));
        }
        Ok(self)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(Id::generate(), Id::generate());
    }

    #[test]
    fn blank_ids_are_rejected() {
        assert!(matches!(
            Id::new("  ").validate(),
            Err(PersistenceError::Argument(_))
        ));
        assert!(Id::new("abc").validate().is_ok());
    }
}
