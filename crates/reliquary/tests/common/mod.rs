//! The adapter contract, written once against `&dyn MetadataAdapter` and stamped
//! out per backend by [`persister_contract_tests!`].
#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use reliquary::schema::{ResourceSchema, SchemaRegistry, ValueType};
use reliquary::{
    ChangeSet, Id, Literal, MetadataAdapter, OptimisticLockToken, PersistenceError, Resource,
    Value,
};
use std::sync::Arc;

/// Expands to one `#[test]` per contract case, named `{backend}_{case}`.
macro_rules! persister_contract_tests {
    ($backend:ident, $factory:expr) => {
        persister_contract_tests!(@cases $backend, $factory,
            assigns_ids_and_timestamps,
            keeps_caller_ids,
            rejects_blank_ids,
            missing_resources_are_not_found,
            round_trips_every_value_type,
            member_order_follows_member_ids,
            duplicate_members_repeat,
            finds_references_both_ways,
            find_parents_tracks_membership,
            resaving_an_old_copy_is_stale,
            foreign_tokens_are_ignored,
            cleared_tokens_skip_the_check,
            save_all_assigns_distinct_ids,
            bulk_stale_names_every_resource,
            repeating_a_locked_resource_writes_nothing,
            delete_is_final_and_idempotent,
            finds_all_and_by_type,
            finds_by_alternate_identifier,
            find_many_by_ids_follows_request_order,
            saves_change_sets,
            wipe_removes_everything,
        );
    };
    (@cases $backend:ident, $factory:expr, $($case:ident),+ $(,)?) => {
        paste::paste! {
            $(
                #[test]
                fn [<$backend _ $case>]() {
                    let schemas = common::schemas();
                    let adapter: std::sync::Arc<dyn reliquary::MetadataAdapter> =
                        ($factory)(schemas.clone());
                    common::$case(adapter.as_ref(), &schemas);
                }
            )+
        }
    };
}

pub fn schemas() -> Arc<SchemaRegistry> {
    Arc::new(
        SchemaRegistry::new()
            .with(
                ResourceSchema::builder("Book")
                    .multiple("title", ValueType::String)
                    .required()
                    .single("pages", ValueType::Integer)
                    .single("rating", ValueType::Float)
                    .single("in_print", ValueType::Boolean)
                    .single("issued", ValueType::DateTime)
                    .multiple("see_also", ValueType::Uri)
                    .multiple("author", ValueType::Nested)
                    .single("part_of", ValueType::Id)
                    .alternate_ids()
                    .optimistic_locking()
                    .build(),
            )
            .with(
                ResourceSchema::builder("Collection")
                    .multiple("title", ValueType::String)
                    .members()
                    .alternate_ids()
                    .build(),
            )
            .with(
                ResourceSchema::builder("Page")
                    .multiple("title", ValueType::String)
                    .build(),
            )
            .with(
                ResourceSchema::builder("Author")
                    .multiple("name", ValueType::String)
                    .build(),
            ),
    )
}

fn ids(resources: &[Resource]) -> Vec<Id> {
    resources.iter().filter_map(Resource::id).cloned().collect()
}

fn token<'a>(resource: &'a Resource, adapter: &dyn MetadataAdapter) -> Option<&'a str> {
    resource
        .optimistic_lock_token()
        .iter()
        .find(|token| token.adapter_id == adapter.id())
        .map(|token| token.token.as_str())
}

fn page(adapter: &dyn MetadataAdapter, schemas: &SchemaRegistry, title: &str) -> Resource {
    let page = schemas.new_resource("Page").with("title", [title]).unwrap();
    adapter.persister().save(&page).unwrap()
}

fn book(schemas: &SchemaRegistry) -> Resource {
    schemas.new_resource("Book").with("title", ["Earthsea"]).unwrap()
}

pub fn assigns_ids_and_timestamps(adapter: &dyn MetadataAdapter, schemas: &SchemaRegistry) {
    let persister = adapter.persister();
    let saved = persister.save(&schemas.new_resource("Page")).unwrap();
    let id = saved.id().cloned().unwrap();
    assert!(!id.is_blank());
    assert!(saved.created_at().is_some());
    assert!(saved.updated_at().is_some());

    let found = adapter.query_service().find_by(&id).unwrap();
    assert_eq!(found.id(), Some(&id));
    let resaved = persister.save(&found).unwrap();
    assert_eq!(resaved.id(), Some(&id));
    assert_eq!(resaved.created_at(), saved.created_at());
    assert!(resaved.updated_at() >= saved.updated_at());
}

pub fn keeps_caller_ids(adapter: &dyn MetadataAdapter, schemas: &SchemaRegistry) {
    let chosen = schemas.new_resource("Page").with_id("caller-chosen");
    let saved = adapter.persister().save(&chosen).unwrap();
    assert_eq!(saved.id(), Some(&Id::new("caller-chosen")));
    assert!(adapter
        .query_service()
        .find_by(&Id::new("caller-chosen"))
        .is_ok());
}

pub fn rejects_blank_ids(adapter: &dyn MetadataAdapter, schemas: &SchemaRegistry) {
    assert!(matches!(
        adapter.query_service().find_by(&Id::new("  ")),
        Err(PersistenceError::Argument(_))
    ));
    assert!(matches!(
        adapter.persister().save(&schemas.new_resource("Page").with_id("")),
        Err(PersistenceError::Argument(_))
    ));
}

pub fn missing_resources_are_not_found(adapter: &dyn MetadataAdapter, _: &SchemaRegistry) {
    assert!(matches!(
        adapter.query_service().find_by(&Id::new("nowhere")),
        Err(PersistenceError::NotFound(_))
    ));
}

pub fn round_trips_every_value_type(adapter: &dyn MetadataAdapter, schemas: &SchemaRegistry) {
    let author = schemas
        .new_resource("Author")
        .with("name", ["Ursula K. Le Guin"])
        .unwrap();
    let issued = Utc.with_ymd_and_hms(1968, 9, 1, 12, 30, 0).unwrap();
    let original = schemas
        .new_resource("Book")
        .with(
            "title",
            [
                Value::from("A Wizard of Earthsea"),
                Value::Literal(Literal::language("Le Sorcier de Terremer", "fr")),
                Value::Literal(Literal::typed("AWOE", "http://example.org/types#code")),
            ],
        )
        .unwrap()
        .with("pages", [183_i64])
        .unwrap()
        .with("rating", [4.25])
        .unwrap()
        .with("in_print", [true])
        .unwrap()
        .with("issued", [issued])
        .unwrap()
        .with("see_also", [Value::uri("http://example.org/earthsea")])
        .unwrap()
        .with("author", [author])
        .unwrap()
        .with("part_of", [Id::new("series-1")])
        .unwrap();

    let saved = adapter.persister().save(&original).unwrap();
    let found = adapter.query_service().find_by(saved.id().unwrap()).unwrap();
    assert_eq!(found.internal_resource(), "Book");
    assert_eq!(found.attributes(), original.attributes());
    assert_eq!(saved.attributes(), original.attributes());
}

pub fn member_order_follows_member_ids(adapter: &dyn MetadataAdapter, schemas: &SchemaRegistry) {
    let persister = adapter.persister();
    let queries = adapter.query_service();
    let a = page(adapter, schemas, "a");
    let b = page(adapter, schemas, "b");
    let c = page(adapter, schemas, "c");
    let d = page(adapter, schemas, "d");

    let mut parent = schemas.new_resource("Collection");
    parent.set_member_ids(ids(&[b.clone(), a.clone(), c.clone()])).unwrap();
    let mut parent = persister.save(&parent).unwrap();
    assert_eq!(
        ids(&queries.find_members(&parent, None).unwrap()),
        ids(&[b.clone(), a.clone(), c.clone()])
    );

    parent.append_member(d.id().cloned().unwrap()).unwrap();
    let mut parent = persister.save(&parent).unwrap();
    assert_eq!(
        ids(&queries.find_members(&parent, None).unwrap()),
        ids(&[b.clone(), a.clone(), c.clone(), d.clone()])
    );

    parent.remove_member(a.id().unwrap()).unwrap();
    let parent = persister.save(&parent).unwrap();
    assert_eq!(
        ids(&queries.find_members(&parent, None).unwrap()),
        ids(&[b, c, d])
    );
    assert!(queries.find_members(&parent, Some("Book")).unwrap().is_empty());
}

pub fn duplicate_members_repeat(adapter: &dyn MetadataAdapter, schemas: &SchemaRegistry) {
    let x = page(adapter, schemas, "x");
    let y = page(adapter, schemas, "y");
    let mut parent = schemas.new_resource("Collection");
    let order = ids(&[x.clone(), y, x]);
    parent.set_member_ids(order.clone()).unwrap();
    let parent = adapter.persister().save(&parent).unwrap();

    let found = adapter.query_service().find_by(parent.id().unwrap()).unwrap();
    assert_eq!(found.member_ids(), order);
    assert_eq!(
        ids(&adapter.query_service().find_members(&found, None).unwrap()),
        order
    );
}

pub fn finds_references_both_ways(adapter: &dyn MetadataAdapter, schemas: &SchemaRegistry) {
    let persister = adapter.persister();
    let queries = adapter.query_service();
    let series = persister.save(&schemas.new_resource("Collection")).unwrap();
    let series_id = series.id().cloned().unwrap();
    let volume = persister
        .save(&book(schemas).with("part_of", [series_id.clone()]).unwrap())
        .unwrap();
    persister.save(&book(schemas)).unwrap();

    assert_eq!(
        ids(&queries.find_references_by(&volume, "part_of").unwrap()),
        vec![series_id]
    );
    assert_eq!(
        ids(&queries.find_inverse_references_by(&series, "part_of").unwrap()),
        ids(&[volume])
    );
}

pub fn find_parents_tracks_membership(adapter: &dyn MetadataAdapter, schemas: &SchemaRegistry) {
    let persister = adapter.persister();
    let queries = adapter.query_service();
    let child = page(adapter, schemas, "child");
    let mut parent = schemas.new_resource("Collection");
    parent.append_member(child.id().cloned().unwrap()).unwrap();
    let mut parent = persister.save(&parent).unwrap();

    assert_eq!(ids(&queries.find_parents(&child).unwrap()), ids(&[parent.clone()]));

    parent.remove_member(child.id().unwrap()).unwrap();
    persister.save(&parent).unwrap();
    assert!(queries.find_parents(&child).unwrap().is_empty());
}

pub fn resaving_an_old_copy_is_stale(adapter: &dyn MetadataAdapter, schemas: &SchemaRegistry) {
    let persister = adapter.persister();
    let first = persister.save(&book(schemas)).unwrap();
    let second = persister.save(&first).unwrap();
    assert!(token(&first, adapter).is_some());
    assert_ne!(token(&first, adapter), token(&second, adapter));

    match persister.save(&first) {
        Err(PersistenceError::StaleObject { ids }) => {
            assert_eq!(ids, vec![first.id().cloned().unwrap()]);
        }
        other => panic!("expected a stale write, got {other:?}"),
    }
    assert!(persister.save(&second).is_ok());
}

pub fn foreign_tokens_are_ignored(adapter: &dyn MetadataAdapter, schemas: &SchemaRegistry) {
    let persister = adapter.persister();
    let saved = persister.save(&book(schemas)).unwrap();
    let mut imported = saved.clone();
    imported.set_optimistic_lock_token(vec![OptimisticLockToken::new("elsewhere", "99")]);

    let resaved = persister.save(&imported).unwrap();
    assert!(token(&resaved, adapter).is_some());
    assert!(resaved
        .optimistic_lock_token()
        .contains(&OptimisticLockToken::new("elsewhere", "99")));
}

pub fn cleared_tokens_skip_the_check(adapter: &dyn MetadataAdapter, schemas: &SchemaRegistry) {
    let persister = adapter.persister();
    let first = persister.save(&book(schemas)).unwrap();
    persister.save(&first).unwrap();
    let mut cleared = first.clone();
    cleared.set_optimistic_lock_token(Vec::new());
    assert!(persister.save(&cleared).is_ok());
}

pub fn save_all_assigns_distinct_ids(adapter: &dyn MetadataAdapter, schemas: &SchemaRegistry) {
    let saved = adapter
        .persister()
        .save_all(&[schemas.new_resource("Page"), schemas.new_resource("Page")])
        .unwrap();
    let saved_ids = ids(&saved);
    assert_eq!(saved_ids.len(), 2);
    assert_ne!(saved_ids[0], saved_ids[1]);
    assert!(saved_ids.iter().all(|id| !id.is_blank()));
    assert_eq!(
        ids(&adapter.query_service().find_many_by_ids(&saved_ids).unwrap()),
        saved_ids
    );
}

pub fn bulk_stale_names_every_resource(adapter: &dyn MetadataAdapter, schemas: &SchemaRegistry) {
    let persister = adapter.persister();
    let stale = persister.save(&book(schemas)).unwrap();
    persister.save(&stale).unwrap();
    let fresh = persister.save(&book(schemas)).unwrap();

    match persister.save_all(&[stale.clone(), fresh.clone()]) {
        Err(PersistenceError::StaleObject { ids: reported }) => {
            assert_eq!(reported, ids(&[stale, fresh.clone()]));
        }
        other => panic!("expected a stale batch, got {other:?}"),
    }
    let untouched = adapter.query_service().find_by(fresh.id().unwrap()).unwrap();
    assert_eq!(token(&untouched, adapter), token(&fresh, adapter));
}

pub fn repeating_a_locked_resource_writes_nothing(
    adapter: &dyn MetadataAdapter,
    schemas: &SchemaRegistry,
) {
    let persister = adapter.persister();
    let saved = persister.save(&book(schemas)).unwrap();
    let edited = saved.clone().with("title", ["Tehanu"]).unwrap();

    match persister.save_all(&[edited.clone(), edited]) {
        Err(PersistenceError::StaleObject { ids }) => {
            assert_eq!(ids, vec![saved.id().cloned().unwrap(); 2]);
        }
        other => panic!("expected a stale batch, got {other:?}"),
    }
    let stored = adapter.query_service().find_by(saved.id().unwrap()).unwrap();
    assert_eq!(stored.get("title"), &[Value::from("Earthsea")]);
    assert_eq!(token(&stored, adapter), token(&saved, adapter));
}

pub fn delete_is_final_and_idempotent(adapter: &dyn MetadataAdapter, schemas: &SchemaRegistry) {
    let persister = adapter.persister();
    let saved = page(adapter, schemas, "doomed");
    persister.delete(&saved).unwrap();
    assert!(matches!(
        adapter.query_service().find_by(saved.id().unwrap()),
        Err(PersistenceError::NotFound(_))
    ));
    assert!(persister.delete(&saved).is_ok());
}

pub fn finds_all_and_by_type(adapter: &dyn MetadataAdapter, schemas: &SchemaRegistry) {
    let queries = adapter.query_service();
    for title in ["one", "two", "three"] {
        page(adapter, schemas, title);
    }
    adapter
        .persister()
        .save(&schemas.new_resource("Collection"))
        .unwrap();

    let all = queries.find_all().collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(all.len(), 4);
    let pages = queries
        .find_all_of_type("Page")
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(pages.len(), 3);
    assert!(pages.iter().all(|page| page.internal_resource() == "Page"));
    assert_eq!(queries.count_all_of_type("Page").unwrap(), 3);
    assert_eq!(queries.count_all_of_type("Book").unwrap(), 0);
}

pub fn finds_by_alternate_identifier(adapter: &dyn MetadataAdapter, schemas: &SchemaRegistry) {
    let ark = Id::new("ark:/13030/tf5p30086k");
    let collection = schemas
        .new_resource("Collection")
        .with("alternate_ids", [ark.clone()])
        .unwrap();
    let saved = adapter.persister().save(&collection).unwrap();
    page(adapter, schemas, "unrelated");

    let found = adapter.query_service().find_by_alternate_identifier(&ark).unwrap();
    assert_eq!(found.id(), saved.id());
    assert!(matches!(
        adapter
            .query_service()
            .find_by_alternate_identifier(&Id::new("ark:/none")),
        Err(PersistenceError::NotFound(_))
    ));
}

pub fn find_many_by_ids_follows_request_order(
    adapter: &dyn MetadataAdapter,
    schemas: &SchemaRegistry,
) {
    let a = page(adapter, schemas, "a");
    let c = page(adapter, schemas, "c");
    let request = vec![
        c.id().cloned().unwrap(),
        Id::new("missing"),
        a.id().cloned().unwrap(),
        c.id().cloned().unwrap(),
    ];
    assert_eq!(
        ids(&adapter.query_service().find_many_by_ids(&request).unwrap()),
        ids(&[c, a])
    );
}

pub fn saves_change_sets(adapter: &dyn MetadataAdapter, schemas: &SchemaRegistry) {
    let persister = adapter.persister();
    let mut change_set = ChangeSet::new(schemas.new_resource("Book"));
    assert!(matches!(
        persister.save_change_set(&change_set),
        Err(PersistenceError::Argument(_))
    ));

    change_set.set("title", ["The Tombs of Atuan"]).unwrap();
    let saved = persister.save_change_set(&change_set).unwrap();
    let found = adapter.query_service().find_by(saved.id().unwrap()).unwrap();
    assert_eq!(found.get("title"), &[Value::from("The Tombs of Atuan")]);
}

pub fn wipe_removes_everything(adapter: &dyn MetadataAdapter, schemas: &SchemaRegistry) {
    let saved = page(adapter, schemas, "gone");
    adapter.persister().wipe().unwrap();
    assert!(adapter.query_service().find_all().next().is_none());
    assert!(adapter.query_service().find_by(saved.id().unwrap()).is_err());
}
