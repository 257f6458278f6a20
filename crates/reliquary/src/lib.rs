//! # Reliquary
//!
//! A persistence layer for digital-repository resources. Application code works
//! with one canonical [`Resource`] model and one adapter contract, and the same
//! calls run against a relational document store, a search index, a linked-data
//! graph store or an in-process memory store.
//!
//! ## Architecture Overview
//!
//! The crate is layered leaf to root:
//!
//! 1. **Casting** ([`cast`]) - ordered predicate-dispatch chains used for attribute
//!    coercion and by every serializer
//! 2. **Model** ([`Resource`], [`schema`], [`ChangeSet`]) - typed, multi-valued
//!    attributes with ordered `member_ids`
//! 3. **Backends** ([`document`], [`search`], [`graph`], [`memory`]) - a serializer
//!    plus a [`Persister`] / [`QueryService`] pair per store
//! 4. **Decorators** ([`decorators`]) - persisters that compose persisters
//! 5. **Registries** ([`registry`], [`storage`]) - name-keyed adapters and binary
//!    file routing, assembled once at start-up
//!
//! ## Quick Start
//!
//! ```rust
//! use reliquary::memory::MemoryAdapter;
//! use reliquary::schema::{ResourceSchema, SchemaRegistry, ValueType};
//! use reliquary::{MetadataAdapter, Persister, QueryService};
//!
//! let schemas = SchemaRegistry::new().with(
//!     ResourceSchema::builder("Collection")
//!         .multiple("title", ValueType::String)
//!         .members()
//!         .build(),
//! );
//! let adapter = MemoryAdapter::new();
//! let (persister, queries) = (adapter.persister(), adapter.query_service());
//!
//! let page = persister.save(&schemas.new_resource("Collection")).unwrap();
//! let mut parent = schemas.new_resource("Collection").with("title", ["Maps"]).unwrap();
//! parent.set_member_ids(vec![page.id().unwrap().clone()]).unwrap();
//! let parent = persister.save(&parent).unwrap();
//!
//! assert_eq!(queries.find_members(&parent, None).unwrap(), vec![page.clone()]);
//! assert_eq!(queries.find_parents(&page).unwrap(), vec![parent]);
//! ```
//!
//! ## Optimistic Locking
//!
//! Types built with [`optimistic_locking`](schema::SchemaBuilder::optimistic_locking)
//! carry a version token per adapter. Saving a copy whose token is older than the
//! stored one fails with [`PersistenceError::StaleObject`]; tokens from other
//! adapters never conflict.
//!
//! ## Testing
//!
//! [`mock::MockPersister`] records the calls that reach it, which is how the
//! decorator tests observe batching and cascades.

pub mod adapter;
pub mod cast;
pub mod change_set;
pub mod config;
pub mod decorators;
pub mod document;
pub mod error;
pub mod graph;
pub mod id;
pub mod lock;
pub mod memory;
pub mod mock;
pub mod registry;
pub mod resource;
pub mod schema;
pub mod search;
pub mod storage;
pub mod tracing;
pub mod value;

// Re-export core types for convenience
pub use adapter::{MetadataAdapter, Persister, QueryService, ResourceIter};
pub use change_set::ChangeSet;
pub use config::ReliquaryConfig;
pub use error::{PersistenceError, Result};
pub use id::Id;
pub use lock::OptimisticLockToken;
pub use registry::AdapterRegistry;
pub use resource::Resource;
pub use value::{Literal, LiteralTag, Value};
