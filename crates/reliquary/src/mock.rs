//! # Recording Persister for Tests
//!
//! [`MockPersister`] implements [`Persister`] over a private
//! [`MemoryAdapter`](crate::memory::MemoryAdapter) and records every call it
//! receives. Tests wrap it in a decorator and then assert on what reached the
//! bottom of the stack:
//!
//! ```rust
//! use reliquary::decorators::BufferedPersister;
//! use reliquary::mock::{Call, MockPersister};
//! use reliquary::schema::ResourceSchema;
//! use reliquary::{Persister, Resource};
//! use std::sync::Arc;
//!
//! let mock = MockPersister::new();
//! let buffered = BufferedPersister::new(Arc::new(mock.clone()));
//! let book = Resource::new(ResourceSchema::permissive("Book"));
//!
//! buffered
//!     .with_buffer(|buffer| {
//!         let persister = buffer.memory_persister();
//!         persister.save(&book)?;
//!         persister.save(&book)?;
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! assert_eq!(mock.calls(), vec![Call::SaveAll { count: 2 }]);
//! ```
//!
//! ## Error Injection
//!
//! Queue a failure for the next call of one operation with
//! [`expect`](MockPersister::expect):
//!
//! ```rust
//! use reliquary::mock::{MockPersister, Operation};
//! use reliquary::schema::ResourceSchema;
//! use reliquary::{PersistenceError, Persister, Resource};
//!
//! let mock = MockPersister::new();
//! mock.expect(Operation::Save)
//!     .return_err(PersistenceError::Backend("connection reset".into()));
//!
//! let book = Resource::new(ResourceSchema::permissive("Book"));
//! assert!(mock.save(&book).is_err());
//! assert!(mock.save(&book).is_ok());
//! mock.verify();
//! ```

use crate::adapter::{Persister, QueryService};
use crate::error::{PersistenceError, Result};
use crate::id::Id;
use crate::memory::{MemoryAdapter, MemoryPersister};
use crate::resource::Resource;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Save,
    SaveAll,
    Delete,
    Wipe,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Save { id: Option<Id> },
    SaveAll { count: usize },
    Delete { id: Option<Id> },
    Wipe,
}

impl Call {
    fn operation(&self) -> Operation {
        match self {
            Call::Save { .. } => Operation::Save,
            Call::SaveAll { .. } => Operation::SaveAll,
            Call::Delete { .. } => Operation::Delete,
            Call::Wipe => Operation::Wipe,
        }
    }
}

struct Expectation {
    operation: Operation,
    error: PersistenceError,
}

#[derive(Default)]
struct Recorder {
    calls: Vec<Call>,
    expectations: VecDeque<Expectation>,
}

/// A recording persister. Clones share their recording and backing store.
#[derive(Clone)]
pub struct MockPersister {
    backing: MemoryAdapter,
    recorder: Arc<Mutex<Recorder>>,
}

impl Default for MockPersister {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPersister {
    pub fn new() -> Self {
        Self {
            backing: MemoryAdapter::with_id("mock"),
            recorder: Arc::new(Mutex::new(Recorder::default())),
        }
    }

    /// Query service over everything successfully written through the mock.
    pub fn query_service(&self) -> Arc<dyn QueryService> {
        Arc::new(self.backing.memory_query_service())
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.recorder().calls.clone()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.recorder()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    pub fn clear_calls(&self) {
        self.recorder().calls.clear();
    }

    /// Queues an outcome for the next call of `operation`.
    pub fn expect(&self, operation: Operation) -> ExpectationBuilder<'_> {
        ExpectationBuilder {
            mock: self,
            operation,
        }
    }

    /// Panics when a queued failure was never consumed.
    pub fn verify(&self) {
        let recorder = self.recorder();
        if !recorder.expectations.is_empty() {
            panic!(
                "Not all expectations were met. {} remaining",
                recorder.expectations.len()
            );
        }
    }

    fn recorder(&self) -> MutexGuard<'_, Recorder> {
        // A test that panicked mid-call still leaves a readable recording.
        self.recorder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: Call) -> Result<MemoryPersister> {
        let mut recorder = self.recorder();
        let operation = call.operation();
        recorder.calls.push(call);
        let queued = recorder
            .expectations
            .iter()
            .position(|expectation| expectation.operation == operation);
        match queued.and_then(|index| recorder.expectations.remove(index)) {
            Some(expectation) => Err(expectation.error),
            None => Ok(self.backing.memory_persister()),
        }
    }
}

pub struct ExpectationBuilder<'m> {
    mock: &'m MockPersister,
    operation: Operation,
}

impl ExpectationBuilder<'_> {
    pub fn return_err(self, error: PersistenceError) {
        self.mock.recorder().expectations.push_back(Expectation {
            operation: self.operation,
            error,
        });
    }
}

impl Persister for MockPersister {
    fn save(&self, resource: &Resource) -> Result<Resource> {
        self.record(Call::Save {
            id: resource.id().cloned(),
        })?
        .save(resource)
    }

    fn save_all(&self, resources: &[Resource]) -> Result<Vec<Resource>> {
        self.record(Call::SaveAll {
            count: resources.len(),
        })?
        .save_all(resources)
    }

    fn delete(&self, resource: &Resource) -> Result<Resource> {
        self.record(Call::Delete {
            id: resource.id().cloned(),
        })?
        .delete(resource)
    }

    fn wipe(&self) -> Result<()> {
        self.record(Call::Wipe)?.wipe()
    }
}
