//! Optimistic lock tokens.

use crate::error::{PersistenceError, Result};
use std::fmt;

const PREFIX: &str = "lock_token";

/// A backend-scoped version stamp.
///
/// Tokens are only comparable within the adapter that issued them: a persister
/// ignores tokens whose `adapter_id` is not its own, which lets a resource loaded
/// from one backend be written to another and pick up a fresh local token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OptimisticLockToken {
    pub adapter_id: String,
    pub token: String,
}

impl OptimisticLockToken {
    pub fn new(adapter_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            token: token.into(),
        }
    }

    /// Single-string form used when a token is stored inside a resource field.
    pub fn serialize(&self) -> String {
        format!("{PREFIX}:{}:{}", self.adapter_id, self.token)
    }

    pub fn deserialize(serialized: &str) -> Result<Self> {
        let malformed =
            || PersistenceError::Argument(format!("malformed lock token: {serialized}"));
        let rest = serialized
            .strip_prefix(PREFIX)
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or_else(malformed)?;
        let (adapter_id, token) = rest.split_once(':').ok_or_else(malformed)?;
        if adapter_id.is_empty() || token.is_empty() {
            return Err(malformed());
        }
        Ok(Self::new(adapter_id, token))
    }
}

impl fmt::Display for OptimisticLockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

/// Finds the token issued by `adapter_id`, if any.
pub fn token_for<'a>(
    tokens: &'a [OptimisticLockToken],
    adapter_id: &str,
) -> Option<&'a OptimisticLockToken> {
    tokens.iter().find(|token| token.adapter_id == adapter_id)
}

/// Replaces the local token, keeping tokens issued by other adapters.
pub fn restamp(
    tokens: &[OptimisticLockToken],
    adapter_id: &str,
    token: impl Into<String>,
) -> Vec<OptimisticLockToken> {
    let mut stamped: Vec<_> = tokens
        .iter()
        .filter(|existing| existing.adapter_id != adapter_id)
        .cloned()
        .collect();
    stamped.push(OptimisticLockToken::new(adapter_id, token));
    stamped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_token_parses_back() {
        let token = OptimisticLockToken::new("document", "3");
        assert_eq!(token.serialize(), "lock_token:document:3");
        assert_eq!(
            OptimisticLockToken::deserialize("lock_token:document:3").unwrap(),
            token
        );
    }

    #[test]
    fn token_values_may_contain_separators() {
        let parsed = OptimisticLockToken::deserialize("lock_token:graph:W/\"a:b\"").unwrap();
        assert_eq!(parsed.adapter_id, "graph");
        assert_eq!(parsed.token, "W/\"a:b\"");
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for bad in ["", "lock_token", "lock_token:graph", "other:graph:1"] {
            assert!(OptimisticLockToken::deserialize(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn restamp_keeps_foreign_tokens() {
        let tokens = vec![
            OptimisticLockToken::new("search", "17"),
            OptimisticLockToken::new("document", "1"),
        ];
        let stamped = restamp(&tokens, "document", "2");
        assert_eq!(
            stamped,
            vec![
                OptimisticLockToken::new("search", "17"),
                OptimisticLockToken::new("document", "2"),
            ]
        );
    }
}
