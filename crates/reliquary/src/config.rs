//! # Adapter Configuration
//!
//! Connection-independent settings for the three backends. Every field has a
//! default, so an empty JSON object or an empty environment yields a working
//! configuration.
//!
//! Environment variables override the defaults one field at a time:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `RELIQUARY_DOCUMENT_ADAPTER_ID` | `document.adapter_id` |
//! | `RELIQUARY_DOCUMENT_PAGE_SIZE` | `document.page_size` |
//! | `RELIQUARY_SEARCH_ADAPTER_ID` | `search.adapter_id` |
//! | `RELIQUARY_SEARCH_PAGE_SIZE` | `search.page_size` |
//! | `RELIQUARY_SEARCH_FIXED_FIELD_LIMIT` | `search.fixed_field_limit` |
//! | `RELIQUARY_GRAPH_ADAPTER_ID` | `graph.adapter_id` |
//! | `RELIQUARY_GRAPH_BASE_IRI` | `graph.base_iri` |
//! | `RELIQUARY_GRAPH_NAMESPACE` | `graph.namespace` |

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{name}: {value:?} is not a valid value")]
    InvalidVar { name: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliquaryConfig {
    pub document: DocumentSettings,
    pub search: SearchSettings,
    pub graph: GraphSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentSettings {
    pub adapter_id: String,
    /// Rows fetched per round trip by lazy scans.
    pub page_size: usize,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            adapter_id: "document".to_string(),
            page_size: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub adapter_id: String,
    pub page_size: usize,
    /// Strings longer than this many characters are kept only in the full-text
    /// field.
    pub fixed_field_limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            adapter_id: "search".to_string(),
            page_size: 100,
            fixed_field_limit: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    pub adapter_id: String,
    /// Container IRIs are minted under this base.
    pub base_iri: String,
    /// Attribute predicates are `{namespace}{attribute}`.
    pub namespace: String,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            adapter_id: "graph".to_string(),
            base_iri: "http://localhost:8080/rest".to_string(),
            namespace: "http://reliquary.example/ns#".to_string(),
        }
    }
}

impl ReliquaryConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults overridden by `RELIQUARY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        override_with(&lookup, "RELIQUARY_DOCUMENT_ADAPTER_ID", &mut config.document.adapter_id)?;
        override_with(&lookup, "RELIQUARY_DOCUMENT_PAGE_SIZE", &mut config.document.page_size)?;
        override_with(&lookup, "RELIQUARY_SEARCH_ADAPTER_ID", &mut config.search.adapter_id)?;
        override_with(&lookup, "RELIQUARY_SEARCH_PAGE_SIZE", &mut config.search.page_size)?;
        override_with(
            &lookup,
            "RELIQUARY_SEARCH_FIXED_FIELD_LIMIT",
            &mut config.search.fixed_field_limit,
        )?;
        override_with(&lookup, "RELIQUARY_GRAPH_ADAPTER_ID", &mut config.graph.adapter_id)?;
        override_with(&lookup, "RELIQUARY_GRAPH_BASE_IRI", &mut config.graph.base_iri)?;
        override_with(&lookup, "RELIQUARY_GRAPH_NAMESPACE", &mut config.graph.namespace)?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let zero = |name: &str, value: usize| ConfigError::InvalidVar {
            name: name.to_string(),
            value: value.to_string(),
        };
        if self.document.page_size == 0 {
            return Err(zero("RELIQUARY_DOCUMENT_PAGE_SIZE", 0));
        }
        if self.search.page_size == 0 {
            return Err(zero("RELIQUARY_SEARCH_PAGE_SIZE", 0));
        }
        Ok(())
    }
}

fn override_with<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    field: &mut T,
) -> Result<(), ConfigError> {
    if let Some(value) = lookup(name) {
        *field = value.parse().map_err(|_| ConfigError::InvalidVar {
            name: name.to_string(),
            value,
        })?;
    }
    Ok(())
}
