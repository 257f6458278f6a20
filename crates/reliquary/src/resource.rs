//! # Resource
//!
//! The canonical in-memory entity. A resource carries its type tag through its
//! [`ResourceSchema`], an optional id (unset until first save), timestamps, the
//! optimistic lock tokens stamped by the adapters it was saved through, and named
//! attributes holding lists of [`Value`]s.
//!
//! Persisters never mutate the resource they are given; they return a new instance
//! bearing the assigned id, timestamps and token.

use crate::error::{PersistenceError, Result};
use crate::id::Id;
use crate::lock::OptimisticLockToken;
use crate::schema::{ResourceSchema, MEMBER_IDS};
use crate::value::Value;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    id: Option<Id>,
    schema: Arc<ResourceSchema>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    optimistic_lock_token: Vec<OptimisticLockToken>,
    attributes: BTreeMap<String, Vec<Value>>,
}

impl Resource {
    pub fn new(schema: Arc<ResourceSchema>) -> Self {
        Self {
            id: None,
            schema,
            created_at: None,
            updated_at: None,
            optimistic_lock_token: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// The type tag used for polymorphic reconstruction.
    pub fn internal_resource(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &Arc<ResourceSchema> {
        &self.schema
    }

    pub fn id(&self) -> Option<&Id> {
        self.id.as_ref()
    }

    /// The id, or [`PersistenceError::Argument`] for a resource never saved.
    pub fn require_id(&self) -> Result<&Id> {
        self.id.as_ref().ok_or_else(|| {
            PersistenceError::Argument(format!(
                "{} has no id; save it before using it as a reference",
                self.internal_resource()
            ))
        })
    }

    pub fn set_id(&mut self, id: Id) {
        self.id = Some(id);
    }

    pub fn with_id(mut self, id: impl Into<Id>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some() && self.created_at.is_some()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn set_timestamps(
        &mut self,
        created_at: Option<DateTime<Utc>>,
        updated_at: Option<DateTime<Utc>>,
    ) {
        self.created_at = created_at;
        self.updated_at = updated_at;
    }

    pub fn optimistic_lock_token(&self) -> &[OptimisticLockToken] {
        &self.optimistic_lock_token
    }

    pub fn set_optimistic_lock_token(&mut self, tokens: Vec<OptimisticLockToken>) {
        self.optimistic_lock_token = tokens;
    }

    /// Values of an attribute; empty when unset.
    pub fn get(&self, name: &str) -> &[Value] {
        self.attributes.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first(&self, name: &str) -> Option<&Value> {
        self.get(name).first()
    }

    /// Sets an attribute, coercing every value to the schema's declared type.
    pub fn set<V: Into<Value>>(
        &mut self,
        name: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<()> {
        let values = values.into_iter().map(Into::into).collect();
        let coerced = self.schema.coerce(name, values)?;
        self.set_raw(name, coerced);
        Ok(())
    }

    pub fn with<V: Into<Value>>(
        mut self,
        name: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Self> {
        self.set(name, values)?;
        Ok(self)
    }

    /// Stores values without coercion. Serializers use this when loading, where
    /// stored data may predate the current schema.
    pub(crate) fn set_raw(&mut self, name: &str, values: Vec<Value>) {
        if values.is_empty() {
            self.attributes.remove(name);
        } else {
            self.attributes.insert(name.to_string(), values);
        }
    }

    pub fn attributes(&self) -> &BTreeMap<String, Vec<Value>> {
        &self.attributes
    }

    /// The ids held by an attribute, in stored order, skipping non-id values.
    pub fn ids_in(&self, name: &str) -> Vec<Id> {
        self.get(name).iter().filter_map(Value::as_id).cloned().collect()
    }

    pub fn member_ids(&self) -> Vec<Id> {
        self.ids_in(MEMBER_IDS)
    }

    pub fn set_member_ids(&mut self, ids: Vec<Id>) -> Result<()> {
        self.set(MEMBER_IDS, ids)
    }

    pub fn append_member(&mut self, id: Id) -> Result<()> {
        let mut ids = self.member_ids();
        ids.push(id);
        self.set_member_ids(ids)
    }

    /// Removes every occurrence of `id`, keeping the remaining order.
    pub fn remove_member(&mut self, id: &Id) -> Result<()> {
        let ids = self
            .member_ids()
            .into_iter()
            .filter(|member| member != id)
            .collect();
        self.set_member_ids(ids)
    }

    /// Whether an attribute references `id`.
    pub fn references(&self, name: &str, id: &Id) -> bool {
        self.get(name).iter().any(|value| value.as_id() == Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ValueType;

    fn collection() -> Resource {
        Resource::new(
            ResourceSchema::builder("Collection")
                .multiple("title", ValueType::String)
                .members()
                .build(),
        )
    }

    #[test]
    fn new_resources_are_transient() {
        let resource = collection();
        assert_eq!(resource.id(), None);
        assert!(!resource.is_persisted());
        assert!(resource.require_id().is_err());
        assert_eq!(resource.internal_resource(), "Collection");
    }

    #[test]
    fn member_edits_preserve_order() {
        let mut resource = collection();
        resource
            .set_member_ids(vec![Id::new("b"), Id::new("a"), Id::new("c")])
            .unwrap();
        resource.append_member(Id::new("d")).unwrap();
        assert_eq!(
            resource.member_ids(),
            vec![Id::new("b"), Id::new("a"), Id::new("c"), Id::new("d")]
        );
        resource.remove_member(&Id::new("a")).unwrap();
        assert_eq!(
            resource.member_ids(),
            vec![Id::new("b"), Id::new("c"), Id::new("d")]
        );
    }

    #[test]
    fn clearing_an_attribute_removes_it() {
        let mut resource = collection().with("title", ["Maps"]).unwrap();
        assert_eq!(resource.get("title"), &[Value::from("Maps")]);
        resource.set("title", Vec::<Value>::new()).unwrap();
        assert!(resource.get("title").is_empty());
        assert!(resource.attributes().is_empty());
    }
}
