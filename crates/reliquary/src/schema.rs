//! # Attribute Schemas
//!
//! A [`ResourceSchema`] names a resource type (its `internal_resource` tag), lists
//! the attributes that type accepts, and says whether saves of that type are
//! optimistically locked. The [`SchemaRegistry`] maps type tags back to schemas so
//! serializers can rebuild the right kind of resource from a stored record.
//!
//! Setting an attribute runs each value through a coercion [`CastRegistry`]:
//! strings become ids, URIs, integers, booleans or datetimes when the attribute
//! asks for one, and anything that still does not fit is rejected.

use crate::cast::CastRegistry;
use crate::error::{PersistenceError, Result};
use crate::id::Id;
use crate::resource::Resource;
use crate::value::Value;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tracing::warn;

/// Attribute holding the ordered child references of a resource.
pub const MEMBER_IDS: &str = "member_ids";

/// Attribute holding secondary identifiers, searchable with
/// `find_by_alternate_identifier`.
pub const ALTERNATE_IDS: &str = "alternate_ids";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// At most one value.
    Single,
    /// Any number of values; backends may not keep their order.
    Multiple,
    /// Any number of values, order and duplicates preserved by every backend.
    Ordered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Any,
    /// Plain or tagged strings.
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
    Id,
    Uri,
    Nested,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDef {
    pub name: String,
    pub value_type: ValueType,
    pub cardinality: Cardinality,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSchema {
    name: String,
    attributes: Vec<AttributeDef>,
    optimistic_locking: bool,
    permissive: bool,
}

impl ResourceSchema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            schema: ResourceSchema {
                name: name.into(),
                attributes: Vec::new(),
                optimistic_locking: false,
                permissive: false,
            },
        }
    }

    /// A schema accepting any attribute as an unordered list of any value.
    pub fn permissive(name: impl Into<String>) -> Arc<Self> {
        Arc::new(ResourceSchema {
            name: name.into(),
            attributes: Vec::new(),
            optimistic_locking: false,
            permissive: true,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &[AttributeDef] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|attribute| attribute.name == name)
    }

    pub fn optimistic_locking(&self) -> bool {
        self.optimistic_locking
    }

    pub fn is_permissive(&self) -> bool {
        self.permissive
    }

    pub fn is_ordered(&self, name: &str) -> bool {
        self.attribute(name)
            .is_some_and(|attribute| attribute.cardinality == Cardinality::Ordered)
    }

    /// Coerces `values` to the declared type of attribute `name`.
    pub fn coerce(&self, name: &str, values: Vec<Value>) -> Result<Vec<Value>> {
        let (value_type, cardinality) = match self.attribute(name) {
            Some(attribute) => (attribute.value_type, attribute.cardinality),
            None if self.permissive => (ValueType::Any, Cardinality::Multiple),
            None => {
                return Err(PersistenceError::Argument(format!(
                    "{} has no attribute named {name}",
                    self.name
                )))
            }
        };
        if cardinality == Cardinality::Single && values.len() > 1 {
            return Err(PersistenceError::Argument(format!(
                "{}.{name} holds a single value, got {}",
                self.name,
                values.len()
            )));
        }
        values
            .into_iter()
            .map(|value| {
                coercions().cast(Coercion {
                    target: value_type,
                    value,
                })
            })
            .collect()
    }
}

pub struct SchemaBuilder {
    schema: ResourceSchema,
}

impl SchemaBuilder {
    pub fn attribute(
        mut self,
        name: impl Into<String>,
        value_type: ValueType,
        cardinality: Cardinality,
    ) -> Self {
        self.schema.attributes.push(AttributeDef {
            name: name.into(),
            value_type,
            cardinality,
            required: false,
        });
        self
    }

    pub fn single(self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.attribute(name, value_type, Cardinality::Single)
    }

    pub fn multiple(self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.attribute(name, value_type, Cardinality::Multiple)
    }

    pub fn ordered(self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.attribute(name, value_type, Cardinality::Ordered)
    }

    /// Declares the ordered `member_ids` attribute.
    pub fn members(self) -> Self {
        self.ordered(MEMBER_IDS, ValueType::Id)
    }

    /// Declares the `alternate_ids` attribute.
    pub fn alternate_ids(self) -> Self {
        self.multiple(ALTERNATE_IDS, ValueType::Id)
    }

    /// Marks the most recently declared attribute as required.
    pub fn required(mut self) -> Self {
        if let Some(last) = self.schema.attributes.last_mut() {
            last.required = true;
        }
        self
    }

    pub fn optimistic_locking(mut self) -> Self {
        self.schema.optimistic_locking = true;
        self
    }

    pub fn build(self) -> Arc<ResourceSchema> {
        Arc::new(self.schema)
    }
}

/// Type-tag → schema map, populated once at start-up.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Arc<ResourceSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: Arc<ResourceSchema>) -> &mut Self {
        self.schemas.insert(schema.name().to_string(), schema);
        self
    }

    pub fn with(mut self, schema: Arc<ResourceSchema>) -> Self {
        self.register(schema);
        self
    }

    pub fn get(&self, internal_resource: &str) -> Option<Arc<ResourceSchema>> {
        self.schemas.get(internal_resource).cloned()
    }

    /// Looks up a schema, falling back to a permissive one for unknown tags.
    pub fn resolve(&self, internal_resource: &str) -> Arc<ResourceSchema> {
        self.get(internal_resource).unwrap_or_else(|| {
            warn!(internal_resource, "No schema registered, loading permissively");
            ResourceSchema::permissive(internal_resource)
        })
    }

    /// Builds an empty resource of the given type.
    pub fn new_resource(&self, internal_resource: &str) -> Resource {
        Resource::new(self.resolve(internal_resource))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}

/// Input of the coercion registry.
pub struct Coercion {
    pub target: ValueType,
    pub value: Value,
}

fn matches_type(target: ValueType, value: &Value) -> bool {
    matches!(
        (target, value),
        (ValueType::Any, _)
            | (ValueType::String, Value::Str(_) | Value::Literal(_))
            | (ValueType::Integer, Value::Integer(_))
            | (ValueType::Float, Value::Float(_))
            | (ValueType::Boolean, Value::Boolean(_))
            | (ValueType::DateTime, Value::DateTime(_))
            | (ValueType::Id, Value::Id(_))
            | (ValueType::Uri, Value::Uri(_))
            | (ValueType::Nested, Value::Nested(_))
    )
}

fn check_type(coercion: Coercion) -> Result<Value> {
    if matches_type(coercion.target, &coercion.value) {
        Ok(coercion.value)
    } else {
        Err(PersistenceError::UnsupportedDatatype(format!(
            "{} is not a valid {:?} value",
            coercion.value.kind(),
            coercion.target
        )))
    }
}

fn string_to(target: ValueType) -> impl Fn(&Coercion) -> bool + Send + Sync {
    move |coercion| coercion.target == target && matches!(coercion.value, Value::Str(_))
}

fn unparsable(raw: &str, target: ValueType) -> PersistenceError {
    PersistenceError::UnsupportedDatatype(format!("{raw:?} is not a valid {target:?} value"))
}

fn coercions() -> &'static CastRegistry<Coercion, Result<Value>> {
    static REGISTRY: OnceLock<CastRegistry<Coercion, Result<Value>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut registry = CastRegistry::with_fallback("coercion", check_type);
        registry
            .register_fn(string_to(ValueType::Id), |coercion, _| match coercion.value {
                Value::Str(raw) => Ok(Value::Id(Id::new(raw))),
                other => Ok(other),
            })
            .register_fn(string_to(ValueType::Uri), |coercion, _| match coercion.value {
                Value::Str(raw) => Ok(Value::Uri(raw)),
                other => Ok(other),
            })
            .register_fn(string_to(ValueType::Integer), |coercion, _| {
                match coercion.value {
                    Value::Str(raw) => raw
                        .trim()
                        .parse()
                        .map(Value::Integer)
                        .map_err(|_| unparsable(&raw, ValueType::Integer)),
                    other => Ok(other),
                }
            })
            .register_fn(string_to(ValueType::Float), |coercion, _| match coercion.value {
                Value::Str(raw) => raw
                    .trim()
                    .parse()
                    .map(Value::Float)
                    .map_err(|_| unparsable(&raw, ValueType::Float)),
                other => Ok(other),
            })
            .register_fn(string_to(ValueType::Boolean), |coercion, _| {
                match coercion.value {
                    Value::Str(raw) => match raw.trim() {
                        "true" => Ok(Value::Boolean(true)),
                        "false" => Ok(Value::Boolean(false)),
                        _ => Err(unparsable(&raw, ValueType::Boolean)),
                    },
                    other => Ok(other),
                }
            })
            .register_fn(string_to(ValueType::DateTime), |coercion, _| {
                match coercion.value {
                    Value::Str(raw) => DateTime::parse_from_rfc3339(raw.trim())
                        .map(|parsed| Value::DateTime(parsed.with_timezone(&Utc)))
                        .map_err(|_| unparsable(&raw, ValueType::DateTime)),
                    other => Ok(other),
                }
            })
            .register_fn(
                |coercion| {
                    coercion.target == ValueType::Float
                        && matches!(coercion.value, Value::Integer(_))
                },
                |coercion, _| match coercion.value {
                    Value::Integer(n) => Ok(Value::Float(n as f64)),
                    other => Ok(other),
                },
            );
        registry
    })
}
