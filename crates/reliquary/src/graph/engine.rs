//! The graph store boundary.
//!
//! The store holds one container per resource, each a [`Graph`] addressed by its
//! IRI and versioned by an ETag. It mirrors the HTTP semantics of a linked-data
//! platform server: a missing container is a 404, a deleted one leaves a
//! tombstone answering 410, and a conditional put whose `If-Match` no longer
//! matches fails with 412.

use super::term::{Graph, Term};
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("404 Not Found: {0}")]
    NotFound(String),

    #[error("410 Gone: {0}")]
    Gone(String),

    #[error("412 Precondition Failed: {0}")]
    PreconditionFailed(String),

    #[error("graph encoding failed: {0}")]
    Encoding(String),

    #[error("graph store unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::Encoding(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphRecord {
    pub graph: Graph,
    pub etag: String,
}

pub trait TripleStore: Send + Sync {
    fn get(&self, container: &str) -> Result<GraphRecord, GraphError>;

    /// Replaces a container's graph, creating it when absent. With `if_match`, an
    /// existing container must still carry that ETag. Returns the new ETag.
    fn put(&self, container: &str, graph: Graph, if_match: Option<&str>)
        -> Result<String, GraphError>;

    /// Deletes a container, leaving a tombstone. Returns whether it was live.
    fn delete(&self, container: &str) -> Result<bool, GraphError>;

    /// Live containers, ordered by IRI.
    fn list(&self) -> Result<Vec<String>, GraphError>;

    /// Live containers whose graph has `object` as the object of some triple.
    fn inbound(&self, object: &Term) -> Result<Vec<String>, GraphError>;

    fn clear(&self) -> Result<(), GraphError>;
}

#[derive(Debug)]
enum Slot {
    Live { body: String, etag: String },
    Tombstone,
}

#[derive(Debug, Default)]
struct StoreState {
    containers: BTreeMap<String, Slot>,
    last_etag: u64,
}

/// In-process graph store. Graphs are held as serialized JSON.
#[derive(Debug, Default)]
pub struct MemoryTripleStore {
    state: RwLock<StoreState>,
}

impl MemoryTripleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> GraphError {
        GraphError::Unavailable("container lock poisoned".to_string())
    }
}

impl TripleStore for MemoryTripleStore {
    fn get(&self, container: &str) -> Result<GraphRecord, GraphError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        match state.containers.get(container) {
            Some(Slot::Live { body, etag }) => Ok(GraphRecord {
                graph: serde_json::from_str(body)?,
                etag: etag.clone(),
            }),
            Some(Slot::Tombstone) => Err(GraphError::Gone(container.to_string())),
            None => Err(GraphError::NotFound(container.to_string())),
        }
    }

    fn put(
        &self,
        container: &str,
        graph: Graph,
        if_match: Option<&str>,
    ) -> Result<String, GraphError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        if let (Some(expected), Some(Slot::Live { etag, .. })) =
            (if_match, state.containers.get(container))
        {
            if expected != etag {
                return Err(GraphError::PreconditionFailed(container.to_string()));
            }
        }
        let body = serde_json::to_string(&graph)?;
        state.last_etag += 1;
        let etag = format!("W/\"{}\"", state.last_etag);
        state.containers.insert(
            container.to_string(),
            Slot::Live {
                body,
                etag: etag.clone(),
            },
        );
        Ok(etag)
    }

    fn delete(&self, container: &str) -> Result<bool, GraphError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        let was_live = matches!(state.containers.get(container), Some(Slot::Live { .. }));
        if was_live {
            state
                .containers
                .insert(container.to_string(), Slot::Tombstone);
        }
        Ok(was_live)
    }

    fn list(&self) -> Result<Vec<String>, GraphError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state
            .containers
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Live { .. }))
            .map(|(container, _)| container.clone())
            .collect())
    }

    fn inbound(&self, object: &Term) -> Result<Vec<String>, GraphError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        let mut found = Vec::new();
        for (container, slot) in &state.containers {
            if let Slot::Live { body, .. } = slot {
                let graph: Graph = serde_json::from_str(body)?;
                if graph.mentions(object) {
                    found.push(container.clone());
                }
            }
        }
        Ok(found)
    }

    fn clear(&self) -> Result<(), GraphError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        state.containers.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(object: &str) -> Graph {
        let mut graph = Graph::new();
        graph.add(Term::iri("http://repo/s"), "http://p", Term::iri(object));
        graph
    }

    #[test]
    fn deleted_containers_answer_gone() {
        let store = MemoryTripleStore::new();
        assert_eq!(
            store.get("http://repo/a"),
            Err(GraphError::NotFound("http://repo/a".to_string()))
        );
        store.put("http://repo/a", graph("http://x"), None).unwrap();
        assert!(store.delete("http://repo/a").unwrap());
        assert!(!store.delete("http://repo/a").unwrap());
        assert_eq!(
            store.get("http://repo/a"),
            Err(GraphError::Gone("http://repo/a".to_string()))
        );
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn conditional_puts_check_the_etag() {
        let store = MemoryTripleStore::new();
        let first = store.put("http://repo/a", graph("http://x"), None).unwrap();
        let second = store
            .put("http://repo/a", graph("http://y"), Some(&first))
            .unwrap();
        assert_ne!(first, second);
        assert!(matches!(
            store.put("http://repo/a", graph("http://z"), Some(&first)),
            Err(GraphError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn inbound_finds_referencing_containers() {
        let store = MemoryTripleStore::new();
        store.put("http://repo/a", graph("http://x"), None).unwrap();
        store.put("http://repo/b", graph("http://y"), None).unwrap();
        assert_eq!(
            store.inbound(&Term::iri("http://y")).unwrap(),
            vec!["http://repo/b".to_string()]
        );
    }
}
