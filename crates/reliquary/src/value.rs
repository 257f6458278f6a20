//! Typed attribute values.
//!
//! Every attribute of a [`Resource`] is a list of [`Value`]s. The variants cover the
//! scalars each backend must round-trip exactly, RDF-style tagged literals, and
//! nested resources for attributes the schema declares as nested.

use crate::id::Id;
use crate::resource::Resource;
use chrono::{DateTime, Utc};

/// The tag carried by a [`Literal`]. A literal has either a language or a datatype,
/// never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiteralTag {
    Language(String),
    Datatype(String),
}

/// A language- or datatype-tagged string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal {
    pub value: String,
    pub tag: LiteralTag,
}

impl Literal {
    pub fn language(value: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            tag: LiteralTag::Language(language.into()),
        }
    }

    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            tag: LiteralTag::Datatype(datatype.into()),
        }
    }

    pub fn language_tag(&self) -> Option<&str> {
        match &self.tag {
            LiteralTag::Language(language) => Some(language),
            LiteralTag::Datatype(_) => None,
        }
    }

    pub fn datatype(&self) -> Option<&str> {
        match &self.tag {
            LiteralTag::Datatype(datatype) => Some(datatype),
            LiteralTag::Language(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Id(Id),
    Uri(String),
    Literal(Literal),
    Nested(Box<Resource>),
}

impl Value {
    pub fn uri(value: impl Into<String>) -> Self {
        Value::Uri(value.into())
    }

    /// Short name of the variant, used in error messages and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::DateTime(_) => "datetime",
            Value::Id(_) => "id",
            Value::Uri(_) => "uri",
            Value::Literal(_) => "literal",
            Value::Nested(_) => "nested resource",
        }
    }

    pub fn as_id(&self) -> Option<&Id> {
        match self {
            Value::Id(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Literal(literal) => Some(&literal.value),
            _ => None,
        }
    }

    pub fn as_nested(&self) -> Option<&Resource> {
        match self {
            Value::Nested(resource) => Some(resource),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::DateTime(value)
    }
}

impl From<Id> for Value {
    fn from(value: Id) -> Self {
        Value::Id(value)
    }
}

impl From<&Id> for Value {
    fn from(value: &Id) -> Self {
        Value::Id(value.clone())
    }
}

impl From<Literal> for Value {
    fn from(value: Literal) -> Self {
        Value::Literal(value)
    }
}

impl From<Resource> for Value {
    fn from(value: Resource) -> Self {
        Value::Nested(Box::new(value))
    }
}
