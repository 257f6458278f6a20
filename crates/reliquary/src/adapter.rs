//! # Adapter Contract
//!
//! Every backend implements the same pair of traits: a [`Persister`] for the write
//! path and a [`QueryService`] for the read path, bundled by a [`MetadataAdapter`].
//! Code written against these traits runs unchanged on the document store, the
//! search index, the graph store and the in-process memory adapter, and the
//! decorators in [`crate::decorators`] wrap any of them.
//!
//! ## Save semantics
//!
//! - A resource without an id gets a fresh UUID v4; a caller-supplied id is kept.
//! - `created_at` is set on first write and kept afterwards; `updated_at` moves on
//!   every save.
//! - For schemas with optimistic locking, the save carries the token this adapter
//!   issued last time. A mismatch with the stored version fails with
//!   [`PersistenceError::StaleObject`] and writes nothing. Tokens issued by other
//!   adapters are ignored, and a resource with no local token skips the check.
//!
//! ## Ordering
//!
//! Backends return query results in whatever order their engine produces.
//! [`order_by_ids`] joins such a result set back against an ordered id list, which
//! is how `find_members` and `find_references_by` honour `member_ids` order.

use crate::change_set::ChangeSet;
use crate::error::{PersistenceError, Result};
use crate::id::Id;
use crate::lock::{restamp, token_for};
use crate::resource::Resource;
use crate::schema::MEMBER_IDS;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Lazy sequence of query results. Backends that page through their engine fetch
/// the next page only when the iterator reaches it.
pub type ResourceIter<'a> = Box<dyn Iterator<Item = Result<Resource>> + 'a>;

/// Write path of one backend.
pub trait Persister: Send + Sync {
    /// Persists one resource and returns the stored copy.
    fn save(&self, resource: &Resource) -> Result<Resource>;

    /// Persists a batch with one engine round trip where the backend allows it.
    fn save_all(&self, resources: &[Resource]) -> Result<Vec<Resource>>;

    /// Removes a resource. Deleting an id the backend does not hold is not an error.
    fn delete(&self, resource: &Resource) -> Result<Resource>;

    /// Removes everything this persister has written.
    fn wipe(&self) -> Result<()>;

    /// Validates a change set and saves the resource it produces.
    fn save_change_set(&self, change_set: &ChangeSet) -> Result<Resource> {
        change_set.validate()?;
        self.save(&change_set.sync())
    }
}

/// Read path of one backend.
pub trait QueryService: Send + Sync {
    fn find_by(&self, id: &Id) -> Result<Resource>;

    /// Resources for `ids` in request order. Repeated ids are returned once and
    /// unknown ids are skipped.
    fn find_many_by_ids(&self, ids: &[Id]) -> Result<Vec<Resource>>;

    /// The resource whose `alternate_ids` contains `id`.
    fn find_by_alternate_identifier(&self, id: &Id) -> Result<Resource>;

    fn find_all(&self) -> ResourceIter<'_>;

    fn find_all_of_type(&self, internal_resource: &str) -> ResourceIter<'_>;

    fn count_all_of_type(&self, internal_resource: &str) -> Result<usize> {
        self.find_all_of_type(internal_resource)
            .try_fold(0, |count, resource| resource.map(|_| count + 1))
    }

    /// Members of `resource` in exact `member_ids` order, optionally limited to
    /// one type. Duplicated member ids yield the member once per occurrence.
    fn find_members(
        &self,
        resource: &Resource,
        internal_resource: Option<&str>,
    ) -> Result<Vec<Resource>> {
        let members = self.find_references_by(resource, MEMBER_IDS)?;
        Ok(filter_type(members, internal_resource))
    }

    /// Resources referenced by `property`, in the order `resource` holds them.
    fn find_references_by(&self, resource: &Resource, property: &str) -> Result<Vec<Resource>> {
        let ids = resource.ids_in(property);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let found = self.find_many_by_ids(&ids)?;
        Ok(order_by_ids(&ids, found))
    }

    /// Every resource whose `property` references `resource`.
    fn find_inverse_references_by(
        &self,
        resource: &Resource,
        property: &str,
    ) -> Result<Vec<Resource>>;

    fn find_parents(&self, resource: &Resource) -> Result<Vec<Resource>> {
        self.find_inverse_references_by(resource, MEMBER_IDS)
    }
}

/// One backend: a persister and a query service over the same store.
pub trait MetadataAdapter: Send + Sync {
    /// Identity stamped into the lock tokens this adapter issues.
    fn id(&self) -> &str;

    fn persister(&self) -> Arc<dyn Persister>;

    fn query_service(&self) -> Arc<dyn QueryService>;
}

/// Reorders `found` to follow `ids`. Ids repeated in `ids` repeat in the output;
/// ids with no matching resource are skipped.
pub fn order_by_ids(ids: &[Id], found: Vec<Resource>) -> Vec<Resource> {
    let by_id: HashMap<Id, Resource> = found
        .into_iter()
        .filter_map(|resource| resource.id().cloned().map(|id| (id, resource)))
        .collect();
    ids.iter().filter_map(|id| by_id.get(id).cloned()).collect()
}

/// `ids` with later repetitions removed.
pub fn unique_ids(ids: &[Id]) -> Vec<Id> {
    let mut seen = BTreeSet::new();
    ids.iter()
        .filter(|id| seen.insert((*id).clone()))
        .cloned()
        .collect()
}

pub(crate) fn filter_type(resources: Vec<Resource>, internal_resource: Option<&str>) -> Vec<Resource> {
    match internal_resource {
        Some(kind) => resources
            .into_iter()
            .filter(|resource| resource.internal_resource() == kind)
            .collect(),
        None => resources,
    }
}

/// A copy of `resource` ready to write: the id is assigned when missing and
/// rejected when blank.
pub(crate) fn prepare(resource: &Resource) -> Result<Resource> {
    let mut prepared = resource.clone();
    match resource.id() {
        Some(id) => {
            id.validate()?;
        }
        None => prepared.set_id(Id::generate()),
    }
    Ok(prepared)
}

/// Sets timestamps on a prepared resource. `stored_created_at` comes from the copy
/// already held by the backend, if any.
pub(crate) fn touch(
    resource: &mut Resource,
    stored_created_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) {
    let created_at = stored_created_at
        .or(resource.created_at())
        .unwrap_or(now);
    resource.set_timestamps(Some(created_at), Some(now));
}

/// The token this adapter must check before overwriting, if the type is locked.
pub(crate) fn expected_token<'a>(resource: &'a Resource, adapter_id: &str) -> Option<&'a str> {
    if !resource.schema().optimistic_locking() {
        return None;
    }
    token_for(resource.optimistic_lock_token(), adapter_id).map(|token| token.token.as_str())
}

/// Whether the stored version rules out this write.
pub(crate) fn is_stale(resource: &Resource, adapter_id: &str, stored: Option<&str>) -> bool {
    match (expected_token(resource, adapter_id), stored) {
        (Some(expected), Some(current)) => expected != current,
        _ => false,
    }
}

/// Stamps the freshly stored version onto a save result, keeping tokens issued by
/// other adapters that the input carried.
pub(crate) fn stamp_token(
    output: &mut Resource,
    input: &Resource,
    adapter_id: &str,
    version: impl Into<String>,
) {
    if output.schema().optimistic_locking() {
        output.set_optimistic_lock_token(restamp(
            input.optimistic_lock_token(),
            adapter_id,
            version,
        ));
    }
}

/// Whether a batch names a locked resource after an earlier entry with the same
/// id, whose write moves the version the later entry's token was issued for.
pub(crate) fn repeats_locked(resources: &[Resource], adapter_id: &str) -> bool {
    let mut seen = BTreeSet::new();
    resources.iter().any(|resource| match resource.id() {
        Some(id) => !seen.insert(id) && expected_token(resource, adapter_id).is_some(),
        None => false,
    })
}

pub(crate) fn stale_batch(resources: &[Resource]) -> PersistenceError {
    PersistenceError::stale(resources.iter().filter_map(Resource::id).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::OptimisticLockToken;
    use crate::schema::{ResourceSchema, ValueType};

    fn locked() -> Resource {
        Resource::new(
            ResourceSchema::builder("Locked")
                .multiple("title", ValueType::String)
                .optimistic_locking()
                .build(),
        )
    }

    fn resource(id: &str) -> Resource {
        locked().with_id(id)
    }

    #[test]
    fn order_by_ids_repeats_and_skips() {
        let ids = vec![Id::new("b"), Id::new("x"), Id::new("a"), Id::new("b")];
        let ordered = order_by_ids(&ids, vec![resource("a"), resource("b")]);
        let got: Vec<_> = ordered.iter().filter_map(Resource::id).cloned().collect();
        assert_eq!(got, vec![Id::new("b"), Id::new("a"), Id::new("b")]);
    }

    #[test]
    fn prepare_assigns_missing_ids_and_rejects_blank_ones() {
        assert!(prepare(&locked()).unwrap().id().is_some());
        assert_eq!(prepare(&resource("kept")).unwrap().id(), Some(&Id::new("kept")));
        assert!(matches!(
            prepare(&resource(" ")),
            Err(PersistenceError::Argument(_))
        ));
    }

    #[test]
    fn foreign_and_missing_tokens_never_conflict() {
        let mut foreign = resource("a");
        foreign.set_optimistic_lock_token(vec![OptimisticLockToken::new("other", "9")]);
        assert!(!is_stale(&foreign, "mine", Some("1")));
        assert!(!is_stale(&resource("a"), "mine", Some("1")));

        let mut local = resource("a");
        local.set_optimistic_lock_token(vec![OptimisticLockToken::new("mine", "1")]);
        assert!(!is_stale(&local, "mine", Some("1")));
        assert!(is_stale(&local, "mine", Some("2")));
        assert!(!is_stale(&local, "mine", None));
    }

    #[test]
    fn repeated_locked_entries_are_flagged() {
        let mut local = resource("a");
        local.set_optimistic_lock_token(vec![OptimisticLockToken::new("mine", "1")]);
        assert!(repeats_locked(&[local.clone(), local.clone()], "mine"));
        assert!(repeats_locked(&[resource("a"), local.clone()], "mine"));
        assert!(!repeats_locked(&[local.clone(), resource("a")], "mine"));
        assert!(!repeats_locked(&[local.clone(), local], "other"));
        assert!(!repeats_locked(&[locked(), locked()], "mine"));
    }

    #[test]
    fn touch_keeps_the_first_creation_time() {
        let first = Utc::now();
        let later = first + chrono::Duration::seconds(5);
        let mut resource = resource("a");
        touch(&mut resource, Some(first), later);
        assert_eq!(resource.created_at(), Some(first));
        assert_eq!(resource.updated_at(), Some(later));
    }
}
