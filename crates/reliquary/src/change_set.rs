//! # Change Sets
//!
//! A [`ChangeSet`] wraps a resource for one write: it records which attributes
//! changed, validates required attributes before anything reaches a persister, and
//! carries the virtual `append_id` that asks an
//! [`AppendingPersister`](crate::decorators::AppendingPersister) to add the saved
//! resource to a parent's members. Change sets are never persisted themselves;
//! [`ChangeSet::sync`] produces the resource to write.

use crate::error::{PersistenceError, Result};
use crate::id::Id;
use crate::resource::Resource;
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
pub struct ChangeSet {
    resource: Resource,
    fields: Option<BTreeSet<String>>,
    changes: BTreeMap<String, Vec<Value>>,
    append_id: Option<Id>,
}

impl ChangeSet {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            fields: None,
            changes: BTreeMap::new(),
            append_id: None,
        }
    }

    /// A change set that only accepts edits to the named attributes.
    pub fn with_fields<'a>(resource: Resource, fields: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            fields: Some(fields.into_iter().map(str::to_string).collect()),
            ..Self::new(resource)
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Sets an attribute. Values are coerced immediately; setting the value the
    /// resource already holds leaves the field clean.
    pub fn set<V: Into<Value>>(
        &mut self,
        name: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<&mut Self> {
        if let Some(fields) = &self.fields {
            if !fields.contains(name) {
                return Err(PersistenceError::Argument(format!(
                    "{name} is not editable through this change set"
                )));
            }
        }
        let values = values.into_iter().map(Into::into).collect();
        let coerced = self.resource.schema().coerce(name, values)?;
        if coerced.as_slice() == self.resource.get(name) {
            self.changes.remove(name);
        } else {
            self.changes.insert(name.to_string(), coerced);
        }
        Ok(self)
    }

    /// Current value of a field, pending changes included.
    pub fn get(&self, name: &str) -> &[Value] {
        self.changes
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_else(|| self.resource.get(name))
    }

    pub fn is_changed(&self, name: &str) -> bool {
        self.changes.contains_key(name)
    }

    pub fn changed(&self) -> Vec<&str> {
        self.changes.keys().map(String::as_str).collect()
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn set_append_id(&mut self, parent: Id) -> &mut Self {
        self.append_id = Some(parent);
        self
    }

    pub fn append_id(&self) -> Option<&Id> {
        self.append_id.as_ref()
    }

    /// Messages for every failed validation rule.
    pub fn errors(&self) -> Vec<String> {
        let mut errors: Vec<String> = self
            .resource
            .schema()
            .attributes()
            .iter()
            .filter(|attribute| attribute.required && self.get(&attribute.name).is_empty())
            .map(|attribute| format!("{} is required", attribute.name))
            .collect();
        if let Some(parent) = &self.append_id {
            if parent.is_blank() {
                errors.push("append_id must not be blank".to_string());
            }
        }
        errors
    }

    pub fn validate(&self) -> Result<()> {
        let errors = self.errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(PersistenceError::Argument(errors.join("; ")))
        }
    }

    /// The resource with every pending change applied.
    pub fn sync(&self) -> Resource {
        let mut resource = self.resource.clone();
        for (name, values) in &self.changes {
            resource.set_raw(name, values.clone());
        }
        resource
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ResourceSchema, ValueType};

    fn page() -> Resource {
        Resource::new(
            ResourceSchema::builder("Page")
                .multiple("title", ValueType::String)
                .required()
                .single("position", ValueType::Integer)
                .build(),
        )
    }

    #[test]
    fn tracks_changed_fields() {
        let mut change_set = ChangeSet::new(page().with("title", ["One"]).unwrap());
        assert!(!change_set.has_changes());

        change_set.set("title", ["One"]).unwrap();
        assert!(!change_set.is_changed("title"));

        change_set.set("position", ["4"]).unwrap();
        assert_eq!(change_set.changed(), vec!["position"]);
        assert_eq!(change_set.get("position"), &[Value::Integer(4)]);

        let synced = change_set.sync();
        assert_eq!(synced.get("position"), &[Value::Integer(4)]);
        assert_eq!(change_set.resource().get("position"), &[] as &[Value]);
    }

    #[test]
    fn required_fields_are_validated() {
        let change_set = ChangeSet::new(page());
        assert_eq!(change_set.errors(), vec!["title is required".to_string()]);
        assert!(matches!(
            change_set.validate(),
            Err(PersistenceError::Argument(_))
        ));
    }

    #[test]
    fn restricted_change_sets_reject_other_fields() {
        let mut change_set = ChangeSet::with_fields(page(), ["position"]);
        assert!(change_set.set("position", [2_i64]).is_ok());
        assert!(change_set.set("title", ["Two"]).is_err());
    }
}
