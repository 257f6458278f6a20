//! Resource ⇄ row conversion.
//!
//! Attribute values become JSON through a dump [`CastRegistry`] and come back
//! through a load registry. Every attribute is stored as a JSON array; values that
//! JSON cannot represent natively are wrapped in small tagged objects:
//!
//! | Value | JSON |
//! |-------|------|
//! | `Id` | `{"id": "…"}` |
//! | `Uri` | `{"uri": "…"}` |
//! | `DateTime` | `{"datetime": "2021-03-04T05:06:07.123Z"}` |
//! | `Literal` | `{"value": "…", "language": "fr"}` or `{"value": "…", "type": "…"}` |
//! | `Nested` | `{"internal_resource": "…", "id": "…", "metadata": {…}}` |

use super::engine::DocumentRow;
use crate::cast::CastRegistry;
use crate::error::{PersistenceError, Result};
use crate::id::Id;
use crate::lock::OptimisticLockToken;
use crate::resource::Resource;
use crate::schema::SchemaRegistry;
use crate::value::{Literal, LiteralTag, Value};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Number, Value as Json};
use std::collections::BTreeMap;
use std::sync::Arc;

type DumpRegistry = CastRegistry<Value, Result<Json>>;
type LoadRegistry = CastRegistry<Json, Result<Value>>;

pub struct DocumentSerializer {
    schemas: Arc<SchemaRegistry>,
    dump: DumpRegistry,
    load: LoadRegistry,
}

impl DocumentSerializer {
    pub fn new(schemas: Arc<SchemaRegistry>) -> Self {
        Self {
            dump: dump_registry(),
            load: load_registry(schemas.clone()),
            schemas,
        }
    }

    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    /// Encodes one value the way it appears inside a metadata array.
    pub fn dump_value(&self, value: Value) -> Result<Json> {
        self.dump.cast(value)
    }

    pub fn load_value(&self, json: Json) -> Result<Value> {
        self.load.cast(json)
    }

    /// Builds the row for a resource that already has an id and timestamps.
    pub fn to_row(&self, resource: &Resource) -> Result<DocumentRow> {
        let id = resource.require_id()?;
        let (created_at, updated_at) = match (resource.created_at(), resource.updated_at()) {
            (Some(created_at), Some(updated_at)) => (created_at, updated_at),
            _ => {
                return Err(PersistenceError::Argument(format!(
                    "{id} has no timestamps to write"
                )))
            }
        };
        Ok(DocumentRow {
            id: id.to_string(),
            internal_resource: resource.internal_resource().to_string(),
            created_at,
            updated_at,
            lock_version: 0,
            metadata: dump_metadata(resource.attributes(), &self.dump)?,
        })
    }

    /// Rebuilds a resource, stamping `lock_version` as this adapter's token when
    /// the type is locked.
    pub fn from_row(&self, row: DocumentRow, adapter_id: &str) -> Result<Resource> {
        let mut resource = self.schemas.new_resource(&row.internal_resource);
        resource.set_id(Id::new(row.id));
        resource.set_timestamps(Some(row.created_at), Some(row.updated_at));
        load_metadata(&mut resource, row.metadata, &self.load)?;
        if resource.schema().optimistic_locking() {
            resource.set_optimistic_lock_token(vec![OptimisticLockToken::new(
                adapter_id,
                row.lock_version.to_string(),
            )]);
        }
        Ok(resource)
    }
}

fn dump_metadata(
    attributes: &BTreeMap<String, Vec<Value>>,
    registry: &DumpRegistry,
) -> Result<Map<String, Json>> {
    attributes
        .iter()
        .map(|(name, values)| {
            let encoded = values
                .iter()
                .map(|value| registry.cast(value.clone()))
                .collect::<Result<Vec<_>>>()?;
            Ok((name.clone(), Json::Array(encoded)))
        })
        .collect()
}

fn load_metadata(
    resource: &mut Resource,
    metadata: Map<String, Json>,
    registry: &LoadRegistry,
) -> Result<()> {
    for (name, values) in metadata {
        let Json::Array(values) = values else {
            return Err(PersistenceError::UnsupportedDatatype(format!(
                "metadata field {name} of {} is not an array",
                resource.internal_resource()
            )));
        };
        let decoded = values
            .into_iter()
            .map(|value| registry.cast(value))
            .collect::<Result<Vec<_>>>()?;
        resource.set_raw(&name, decoded);
    }
    Ok(())
}

fn unwritable(value: Value) -> Result<Json> {
    Err(PersistenceError::UnsupportedDatatype(format!(
        "{} cannot be written to a document row",
        value.kind()
    )))
}

fn unreadable(json: Json) -> Result<Value> {
    Err(PersistenceError::UnsupportedDatatype(format!(
        "unrecognised metadata value {json}"
    )))
}

fn dump_registry() -> DumpRegistry {
    let mut registry = CastRegistry::with_fallback("document-dump", unwritable);
    registry
        .register_fn(
            |value| matches!(value, Value::Str(_) | Value::Integer(_) | Value::Boolean(_)),
            |value, _| {
                Ok(match value {
                    Value::Str(s) => Json::String(s),
                    Value::Integer(n) => Json::from(n),
                    Value::Boolean(b) => Json::Bool(b),
                    other => return unwritable(other),
                })
            },
        )
        // Non-finite floats have no JSON form and reach the fallback.
        .register_fn(
            |value| matches!(value, Value::Float(f) if f.is_finite()),
            |value, _| match value {
                Value::Float(f) => Number::from_f64(f)
                    .map(Json::Number)
                    .ok_or_else(|| PersistenceError::UnsupportedDatatype(f.to_string())),
                other => unwritable(other),
            },
        )
        .register_fn(
            |value| matches!(value, Value::DateTime(_)),
            |value, _| match value {
                Value::DateTime(at) => Ok(json!({
                    "datetime": at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
                })),
                other => unwritable(other),
            },
        )
        .register_fn(
            |value| matches!(value, Value::Id(_) | Value::Uri(_)),
            |value, _| match value {
                Value::Id(id) => Ok(json!({ "id": id.as_str() })),
                Value::Uri(uri) => Ok(json!({ "uri": uri })),
                other => unwritable(other),
            },
        )
        .register_fn(
            |value| matches!(value, Value::Literal(_)),
            |value, _| match value {
                Value::Literal(Literal { value, tag }) => Ok(match tag {
                    LiteralTag::Language(language) => json!({ "value": value, "language": language }),
                    LiteralTag::Datatype(datatype) => json!({ "value": value, "type": datatype }),
                }),
                other => unwritable(other),
            },
        )
        .register_fn(
            |value| matches!(value, Value::Nested(_)),
            |value, registry| match value {
                Value::Nested(nested) => {
                    let mut object = Map::new();
                    object.insert(
                        "internal_resource".to_string(),
                        Json::String(nested.internal_resource().to_string()),
                    );
                    if let Some(id) = nested.id() {
                        object.insert("id".to_string(), Json::String(id.to_string()));
                    }
                    object.insert(
                        "metadata".to_string(),
                        Json::Object(dump_metadata(nested.attributes(), registry)?),
                    );
                    Ok(Json::Object(object))
                }
                other => unwritable(other),
            },
        );
    registry
}

fn has_only(json: &Json, keys: &[&str]) -> bool {
    json.as_object().is_some_and(|object| {
        object.len() == keys.len() && keys.iter().all(|key| object.contains_key(*key))
    })
}

fn text(object: &Json, key: &str) -> Option<String> {
    object.get(key).and_then(Json::as_str).map(str::to_string)
}

fn load_registry(schemas: Arc<SchemaRegistry>) -> LoadRegistry {
    let mut registry = CastRegistry::with_fallback("document-load", unreadable);
    registry
        .register_fn(
            |json| matches!(json, Json::String(_) | Json::Bool(_) | Json::Number(_)),
            |json, _| match json {
                Json::String(s) => Ok(Value::Str(s)),
                Json::Bool(b) => Ok(Value::Boolean(b)),
                Json::Number(n) => match (n.as_i64(), n.as_f64()) {
                    (Some(i), _) if !n.is_f64() => Ok(Value::Integer(i)),
                    (_, Some(f)) => Ok(Value::Float(f)),
                    _ => unreadable(Json::Number(n)),
                },
                other => unreadable(other),
            },
        )
        .register_fn(
            |json| has_only(json, &["id"]),
            |json, _| match text(&json, "id") {
                Some(id) => Ok(Value::Id(Id::new(id))),
                None => unreadable(json),
            },
        )
        .register_fn(
            |json| has_only(json, &["uri"]),
            |json, _| match text(&json, "uri") {
                Some(uri) => Ok(Value::Uri(uri)),
                None => unreadable(json),
            },
        )
        .register_fn(
            |json| has_only(json, &["datetime"]),
            |json, _| {
                let parsed = text(&json, "datetime")
                    .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok());
                match parsed {
                    Some(at) => Ok(Value::DateTime(at.with_timezone(&Utc))),
                    None => unreadable(json),
                }
            },
        )
        .register_fn(
            |json| has_only(json, &["value", "language"]) || has_only(json, &["value", "type"]),
            |json, _| {
                let value = text(&json, "value");
                match (value, text(&json, "language"), text(&json, "type")) {
                    (Some(value), Some(language), _) => {
                        Ok(Value::Literal(Literal::language(value, language)))
                    }
                    (Some(value), None, Some(datatype)) => {
                        Ok(Value::Literal(Literal::typed(value, datatype)))
                    }
                    _ => unreadable(json),
                }
            },
        )
        .register_fn(
            |json| json.get("internal_resource").is_some() && json.get("metadata").is_some(),
            move |json, registry| {
                let mut object = match json {
                    Json::Object(object) => object,
                    other => return unreadable(other),
                };
                let Some(kind) = object
                    .get("internal_resource")
                    .and_then(Json::as_str)
                    .map(str::to_string)
                else {
                    return unreadable(Json::Object(object));
                };
                let mut nested = schemas.new_resource(&kind);
                if let Some(id) = object.get("id").and_then(Json::as_str) {
                    nested.set_id(Id::new(id));
                }
                match object.remove("metadata") {
                    Some(Json::Object(metadata)) => {
                        load_metadata(&mut nested, metadata, registry)?;
                    }
                    _ => {
                        return Err(PersistenceError::UnsupportedDatatype(format!(
                            "nested {kind} metadata is not an object"
                        )))
                    }
                }
                Ok(Value::Nested(Box::new(nested)))
            },
        );
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ResourceSchema, ValueType};

    fn schemas() -> Arc<SchemaRegistry> {
        Arc::new(
            SchemaRegistry::new()
                .with(
                    ResourceSchema::builder("Book")
                        .multiple("title", ValueType::String)
                        .multiple("author", ValueType::Nested)
                        .single("rating", ValueType::Float)
                        .optimistic_locking()
                        .build(),
                )
                .with(
                    ResourceSchema::builder("Author")
                        .multiple("name", ValueType::String)
                        .build(),
                ),
        )
    }

    fn stamped(resource: Resource) -> Resource {
        let mut resource = resource.with_id("b1");
        resource.set_timestamps(Some(Utc::now()), Some(Utc::now()));
        resource
    }

    #[test]
    fn tagged_values_use_small_objects() {
        let serializer = DocumentSerializer::new(schemas());
        assert_eq!(
            serializer.dump_value(Value::Id(Id::new("x"))).unwrap(),
            json!({"id": "x"})
        );
        assert_eq!(
            serializer
                .dump_value(Value::Literal(Literal::language("Zèbre", "fr")))
                .unwrap(),
            json!({"value": "Zèbre", "language": "fr"})
        );
        assert!(matches!(
            serializer.dump_value(Value::Float(f64::NAN)),
            Err(PersistenceError::UnsupportedDatatype(_))
        ));
    }

    #[test]
    fn nested_resources_round_trip() {
        let schemas = schemas();
        let serializer = DocumentSerializer::new(schemas.clone());
        let author = schemas
            .new_resource("Author")
            .with("name", ["Le Guin"])
            .unwrap();
        let book = stamped(
            schemas
                .new_resource("Book")
                .with("author", [author])
                .unwrap()
                .with("rating", [4.5])
                .unwrap(),
        );

        let row = serializer.to_row(&book).unwrap();
        assert_eq!(row.metadata["author"][0]["internal_resource"], "Author");
        let loaded = serializer.from_row(row, "document").unwrap();
        assert_eq!(loaded.get("author"), book.get("author"));
        assert_eq!(loaded.get("rating"), &[Value::Float(4.5)]);
        assert_eq!(loaded.optimistic_lock_token()[0].token, "0");
    }

    #[test]
    fn non_array_metadata_is_rejected() {
        let serializer = DocumentSerializer::new(schemas());
        let mut row = serializer.to_row(&stamped(schemas().new_resource("Book"))).unwrap();
        row.metadata.insert("title".to_string(), json!("flat"));
        assert!(matches!(
            serializer.from_row(row, "document"),
            Err(PersistenceError::UnsupportedDatatype(_))
        ));
    }
}
