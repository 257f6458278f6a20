//! Resource ⇄ search document conversion.
//!
//! Each attribute fans out across suffix-convention fields:
//!
//! | Field | Contents |
//! |-------|----------|
//! | `{a}_ssim` | exact values, stored (used for term and join queries) |
//! | `{a}_sim` | exact values, facet only |
//! | `{a}_tesim` | values as English text |
//! | `{a}_tsim` | every value, stored; the field documents are loaded from |
//! | `{a}_lang_ssm` | language tag per `_tsim` position, `-` when untagged |
//! | `{a}_type_ssm` | datatype per `_tsim` position, `-` when untagged |
//!
//! No attribute writes a bare `_ssm` field, so the sidecars never shadow an
//! attribute whose name ends in `_lang` or `_type`.
//!
//! Values longer than the fixed-field limit are only written to `_tsim`. Scalars
//! are written as prefixed strings (`id-…`, `uri-…`, `integer-…`, `float-…`,
//! `boolean-…`, `datetime-…`, `serialized-…`); a plain string that happens to
//! start with one of those prefixes is escaped as `string-…`.

use super::engine::SearchDocument;
use crate::cast::CastRegistry;
use crate::document::DocumentSerializer;
use crate::error::{PersistenceError, Result};
use crate::id::Id;
use crate::lock::OptimisticLockToken;
use crate::resource::Resource;
use crate::schema::SchemaRegistry;
use crate::value::{Literal, LiteralTag, Value};
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;

pub const JOIN_ID: &str = "join_id_ssi";
pub const INTERNAL_RESOURCE: &str = "internal_resource_ssim";
pub const CREATED_AT: &str = "created_at_dtsi";
pub const UPDATED_AT: &str = "updated_at_dtsi";

const ABSENT: &str = "-";
const RESERVED_PREFIXES: [&str; 8] = [
    "id-",
    "uri-",
    "integer-",
    "float-",
    "boolean-",
    "datetime-",
    "serialized-",
    "string-",
];

/// Field holding exact values of attribute `name`, as queried by term and join
/// requests.
pub fn exact_field(name: &str) -> String {
    format!("{name}_ssim")
}

/// Encoding of an id as it appears in `_ssim` and `join_id_ssi` fields.
pub fn id_term(id: &Id) -> String {
    format!("id-{id}")
}

/// One attribute value as written to the index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedValue {
    pub text: String,
    pub tag: Option<LiteralTag>,
}

impl IndexedValue {
    fn plain(text: String) -> Self {
        Self { text, tag: None }
    }
}

type DumpRegistry = CastRegistry<Value, Result<IndexedValue>>;
type LoadRegistry = CastRegistry<IndexedValue, Result<Value>>;

pub struct SearchSerializer {
    schemas: Arc<SchemaRegistry>,
    fixed_field_limit: usize,
    dump: DumpRegistry,
    load: LoadRegistry,
}

impl SearchSerializer {
    pub fn new(schemas: Arc<SchemaRegistry>, fixed_field_limit: usize) -> Self {
        let nested = Arc::new(DocumentSerializer::new(schemas.clone()));
        Self {
            dump: dump_registry(nested.clone()),
            load: load_registry(nested),
            schemas,
            fixed_field_limit,
        }
    }

    pub fn dump_value(&self, value: Value) -> Result<IndexedValue> {
        self.dump.cast(value)
    }

    pub fn load_value(&self, value: IndexedValue) -> Result<Value> {
        self.load.cast(value)
    }

    pub fn to_document(&self, resource: &Resource) -> Result<SearchDocument> {
        let id = resource.require_id()?;
        let mut doc = SearchDocument::new(id.as_str());
        doc.push(JOIN_ID, id_term(id));
        doc.push(INTERNAL_RESOURCE, resource.internal_resource());
        if let Some(created_at) = resource.created_at() {
            doc.push(CREATED_AT, index_time(created_at));
        }
        if let Some(updated_at) = resource.updated_at() {
            doc.push(UPDATED_AT, index_time(updated_at));
        }

        for (name, values) in resource.attributes() {
            let indexed = values
                .iter()
                .map(|value| self.dump.cast(value.clone()))
                .collect::<Result<Vec<_>>>()?;
            self.write_attribute(&mut doc, name, indexed);
        }
        Ok(doc)
    }

    fn write_attribute(&self, doc: &mut SearchDocument, name: &str, values: Vec<IndexedValue>) {
        let tagged = values.iter().any(|value| value.tag.is_some());
        for value in values {
            if value.text.chars().count() <= self.fixed_field_limit {
                doc.push(exact_field(name), value.text.clone());
                doc.push(format!("{name}_sim"), value.text.clone());
                doc.push(format!("{name}_tesim"), value.text.clone());
            }
            if tagged {
                let (language, datatype) = match &value.tag {
                    Some(LiteralTag::Language(language)) => (language.as_str(), ABSENT),
                    Some(LiteralTag::Datatype(datatype)) => (ABSENT, datatype.as_str()),
                    None => (ABSENT, ABSENT),
                };
                doc.push(language_field(name), language);
                doc.push(datatype_field(name), datatype);
            }
            doc.push(format!("{name}_tsim"), value.text);
        }
    }

    pub fn from_document(&self, doc: SearchDocument, adapter_id: &str) -> Result<Resource> {
        let kind = doc.first(INTERNAL_RESOURCE).ok_or_else(|| {
            PersistenceError::UnsupportedDatatype(format!(
                "indexed document {} has no {INTERNAL_RESOURCE}",
                doc.id
            ))
        })?;
        let mut resource = self.schemas.new_resource(kind);
        resource.set_id(Id::new(doc.id.as_str()));
        resource.set_timestamps(
            doc.first(CREATED_AT).map(parse_time).transpose()?,
            doc.first(UPDATED_AT).map(parse_time).transpose()?,
        );

        for (field, texts) in &doc.fields {
            let Some(name) = field.strip_suffix("_tsim") else {
                continue;
            };
            let languages = doc.field(&language_field(name));
            let datatypes = doc.field(&datatype_field(name));
            let values = texts
                .iter()
                .enumerate()
                .map(|(position, text)| {
                    let tag = match (
                        languages.get(position).map(String::as_str),
                        datatypes.get(position).map(String::as_str),
                    ) {
                        (Some(language), _) if language != ABSENT => {
                            Some(LiteralTag::Language(language.to_string()))
                        }
                        (_, Some(datatype)) if datatype != ABSENT => {
                            Some(LiteralTag::Datatype(datatype.to_string()))
                        }
                        _ => None,
                    };
                    self.load.cast(IndexedValue {
                        text: text.clone(),
                        tag,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            resource.set_raw(name, values);
        }

        if resource.schema().optimistic_locking() {
            resource.set_optimistic_lock_token(vec![OptimisticLockToken::new(
                adapter_id,
                doc.version.to_string(),
            )]);
        }
        Ok(resource)
    }
}

/// Search date fields hold millisecond precision.
fn language_field(name: &str) -> String {
    format!("{name}_lang_ssm")
}

fn datatype_field(name: &str) -> String {
    format!("{name}_type_ssm")
}

fn index_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| PersistenceError::UnsupportedDatatype(format!("{raw:?} is not a date")))
}

fn escape(text: String) -> String {
    if RESERVED_PREFIXES.iter().any(|prefix| text.starts_with(prefix)) {
        format!("string-{text}")
    } else {
        text
    }
}

fn unescape(text: String) -> String {
    match text.strip_prefix("string-") {
        Some(rest) => rest.to_string(),
        None => text,
    }
}

fn unindexable(value: Value) -> Result<IndexedValue> {
    Err(PersistenceError::UnsupportedDatatype(format!(
        "{} cannot be indexed",
        value.kind()
    )))
}

fn dump_registry(nested: Arc<DocumentSerializer>) -> DumpRegistry {
    let mut registry = CastRegistry::with_fallback("search-dump", unindexable);
    registry
        .register_fn(
            |value| matches!(value, Value::Str(_)),
            |value, _| match value {
                Value::Str(s) => Ok(IndexedValue::plain(escape(s))),
                other => unindexable(other),
            },
        )
        .register_fn(
            |value| matches!(value, Value::Literal(_)),
            |value, _| match value {
                Value::Literal(Literal { value, tag }) => Ok(IndexedValue {
                    text: escape(value),
                    tag: Some(tag),
                }),
                other => unindexable(other),
            },
        )
        .register_fn(
            |value| {
                matches!(
                    value,
                    Value::Id(_) | Value::Uri(_) | Value::Integer(_) | Value::Boolean(_)
                )
            },
            |value, _| {
                let text = match value {
                    Value::Id(id) => id_term(&id),
                    Value::Uri(uri) => format!("uri-{uri}"),
                    Value::Integer(n) => format!("integer-{n}"),
                    Value::Boolean(b) => format!("boolean-{b}"),
                    other => return unindexable(other),
                };
                Ok(IndexedValue::plain(text))
            },
        )
        .register_fn(
            |value| matches!(value, Value::Float(f) if f.is_finite()),
            |value, _| match value {
                Value::Float(f) => Ok(IndexedValue::plain(format!("float-{f:?}"))),
                other => unindexable(other),
            },
        )
        .register_fn(
            |value| matches!(value, Value::DateTime(_)),
            |value, _| match value {
                Value::DateTime(at) => Ok(IndexedValue::plain(format!(
                    "datetime-{}",
                    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
                ))),
                other => unindexable(other),
            },
        )
        .register_fn(
            |value| matches!(value, Value::Nested(_)),
            move |value, _| {
                let blob = nested.dump_value(value)?;
                Ok(IndexedValue::plain(format!("serialized-{blob}")))
            },
        );
    registry
}

fn malformed(text: &str) -> PersistenceError {
    PersistenceError::UnsupportedDatatype(format!("indexed value {text:?} is malformed"))
}

/// Registers a loader for values written as `{prefix}{rest}`.
fn prefixed<F>(registry: &mut LoadRegistry, prefix: &'static str, parse: F)
where
    F: Fn(&str) -> Option<Value> + Send + Sync + 'static,
{
    registry.register_fn(
        move |value| value.tag.is_none() && value.text.starts_with(prefix),
        move |value, _| {
            value
                .text
                .strip_prefix(prefix)
                .and_then(&parse)
                .ok_or_else(|| malformed(&value.text))
        },
    );
}

fn plain_text(value: IndexedValue) -> Result<Value> {
    let text = unescape(value.text);
    Ok(match value.tag {
        Some(tag) => Value::Literal(Literal { value: text, tag }),
        None => Value::Str(text),
    })
}

fn load_registry(nested: Arc<DocumentSerializer>) -> LoadRegistry {
    // Tagged text and unprefixed strings reach the fallback.
    let mut registry = CastRegistry::with_fallback("search-load", plain_text);
    prefixed(&mut registry, "id-", |rest| Some(Value::Id(Id::new(rest))));
    prefixed(&mut registry, "uri-", |rest| Some(Value::Uri(rest.to_string())));
    prefixed(&mut registry, "integer-", |rest| {
        rest.parse().ok().map(Value::Integer)
    });
    prefixed(&mut registry, "float-", |rest| rest.parse().ok().map(Value::Float));
    prefixed(&mut registry, "boolean-", |rest| {
        rest.parse().ok().map(Value::Boolean)
    });
    prefixed(&mut registry, "datetime-", |rest| {
        DateTime::parse_from_rfc3339(rest)
            .ok()
            .map(|at| Value::DateTime(at.with_timezone(&Utc)))
    });
    prefixed(&mut registry, "serialized-", move |rest| {
        serde_json::from_str(rest)
            .ok()
            .and_then(|blob| nested.load_value(blob).ok())
    });
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ResourceSchema, ValueType};

    fn serializer(limit: usize) -> SearchSerializer {
        let schemas = SchemaRegistry::new().with(
            ResourceSchema::builder("Book")
                .multiple("title", ValueType::String)
                .multiple("note", ValueType::Any)
                .multiple("resource_type", ValueType::String)
                .multiple("primary_lang", ValueType::String)
                .build(),
        );
        SearchSerializer::new(Arc::new(schemas), limit)
    }

    fn book(serializer: &SearchSerializer) -> Resource {
        serializer.schemas.new_resource("Book").with_id("b1")
    }

    #[test]
    fn scalars_are_prefixed() {
        let serializer = serializer(1000);
        let cases = [
            (Value::Id(Id::new("x")), "id-x"),
            (Value::uri("http://a/b"), "uri-http://a/b"),
            (Value::Integer(-3), "integer--3"),
            (Value::Float(1.0), "float-1.0"),
            (Value::Boolean(true), "boolean-true"),
            (Value::from("id-like"), "string-id-like"),
        ];
        for (value, text) in cases {
            let indexed = serializer.dump_value(value.clone()).unwrap();
            assert_eq!(indexed.text, text);
            assert_eq!(serializer.load_value(indexed).unwrap(), value);
        }
    }

    #[test]
    fn long_strings_stay_in_full_text_only() {
        let serializer = serializer(5);
        let resource = book(&serializer)
            .with("title", ["short", "much too long"])
            .unwrap();
        let doc = serializer.to_document(&resource).unwrap();
        assert_eq!(doc.field("title_ssim"), &["short".to_string()]);
        assert_eq!(doc.field("title_tsim").len(), 2);

        let loaded = serializer.from_document(doc, "search").unwrap();
        assert_eq!(loaded.get("title"), resource.get("title"));
    }

    #[test]
    fn sidecars_align_with_text_positions() {
        let serializer = serializer(1000);
        let resource = book(&serializer)
            .with(
                "title",
                [
                    Value::from("plain"),
                    Value::Literal(Literal::language("Zèbre", "fr")),
                    Value::Literal(Literal::typed("x", "http://types/t")),
                ],
            )
            .unwrap();
        let doc = serializer.to_document(&resource).unwrap();
        assert_eq!(doc.field("title_lang_ssm"), &["-", "fr", "-"]);
        assert_eq!(doc.field("title_type_ssm"), &["-", "-", "http://types/t"]);

        let loaded = serializer.from_document(doc, "search").unwrap();
        assert_eq!(loaded.get("title"), resource.get("title"));
    }

    #[test]
    fn attributes_named_like_sidecars_survive_reload() {
        let serializer = serializer(1000);
        let resource = book(&serializer)
            .with("title", [Value::Literal(Literal::language("Zèbre", "fr"))])
            .unwrap()
            .with("resource_type", ["Text"])
            .unwrap()
            .with("primary_lang", ["eng"])
            .unwrap();
        let doc = serializer.to_document(&resource).unwrap();
        let loaded = serializer.from_document(doc, "search").unwrap();

        assert_eq!(loaded.get("resource_type"), &[Value::from("Text")]);
        assert_eq!(loaded.get("primary_lang"), &[Value::from("eng")]);
        assert_eq!(loaded.get("title"), resource.get("title"));
    }

    #[test]
    fn malformed_prefixed_values_are_rejected() {
        let serializer = serializer(1000);
        let err = serializer
            .load_value(IndexedValue::plain("integer-twelve".to_string()))
            .unwrap_err();
        assert!(matches!(err, PersistenceError::UnsupportedDatatype(_)));
    }
}
