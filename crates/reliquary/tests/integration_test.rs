use reliquary::config::ReliquaryConfig;
use reliquary::decorators::{IndexingPersister, ParentCleanupPersister};
use reliquary::document::DocumentAdapter;
use reliquary::graph::GraphAdapter;
use reliquary::memory::MemoryAdapter;
use reliquary::schema::{ResourceSchema, SchemaRegistry, ValueType};
use reliquary::search::SearchAdapter;
use reliquary::storage::{MemoryStorage, StorageRouter};
use reliquary::{AdapterRegistry, Id, MetadataAdapter, PersistenceError, Persister, QueryService};
use std::collections::HashMap;
use std::sync::Arc;

fn schemas() -> Arc<SchemaRegistry> {
    Arc::new(
        SchemaRegistry::new()
            .with(
                ResourceSchema::builder("Collection")
                    .multiple("title", ValueType::String)
                    .members()
                    .build(),
            )
            .with(
                ResourceSchema::builder("FileSet")
                    .multiple("title", ValueType::String)
                    .multiple("file_identifiers", ValueType::Uri)
                    .build(),
            ),
    )
}

fn registry(config: &ReliquaryConfig, schemas: &Arc<SchemaRegistry>) -> AdapterRegistry {
    AdapterRegistry::builder()
        .register("memory", Arc::new(MemoryAdapter::new()))
        .register(
            "postgres",
            Arc::new(DocumentAdapter::in_memory(schemas.clone(), &config.document)),
        )
        .register(
            "index_solr",
            Arc::new(SearchAdapter::in_memory(schemas.clone(), &config.search)),
        )
        .register(
            "fedora",
            Arc::new(GraphAdapter::in_memory(schemas.clone(), &config.graph)),
        )
        .build()
        .unwrap()
}

#[test]
fn configured_adapters_are_registered_by_name() {
    let overrides: HashMap<&str, &str> = [
        ("RELIQUARY_DOCUMENT_PAGE_SIZE", "3"),
        ("RELIQUARY_GRAPH_ADAPTER_ID", "fcrepo"),
    ]
    .into_iter()
    .collect();
    let config =
        ReliquaryConfig::from_lookup(|name| overrides.get(name).map(|value| value.to_string()))
            .unwrap();
    let registry = registry(&config, &schemas());

    assert_eq!(
        registry.names().collect::<Vec<_>>(),
        vec!["fedora", "index_solr", "memory", "postgres"]
    );
    assert_eq!(registry.get("fedora").unwrap().id(), "fcrepo");
    assert!(matches!(
        registry.get("cassandra"),
        Err(PersistenceError::Argument(_))
    ));
}

#[test]
fn indexed_writes_are_queryable_from_the_index() {
    let schemas = schemas();
    let registry = registry(&ReliquaryConfig::default(), &schemas);
    let index_queries = registry.query_service("index_solr").unwrap();
    let persister = ParentCleanupPersister::new(
        Arc::new(IndexingPersister::new(
            registry.persister("postgres").unwrap(),
            registry.persister("index_solr").unwrap(),
        )),
        index_queries.clone(),
    );

    let pages = persister
        .save_all(&[
            schemas.new_resource("FileSet").with("title", ["recto"]).unwrap(),
            schemas.new_resource("FileSet").with("title", ["verso"]).unwrap(),
        ])
        .unwrap();
    let mut volume = schemas.new_resource("Collection").with("title", ["Folio"]).unwrap();
    volume
        .set_member_ids(pages.iter().filter_map(|page| page.id().cloned()).collect())
        .unwrap();
    let volume = persister.save(&volume).unwrap();

    let primary = registry.query_service("postgres").unwrap();
    assert_eq!(
        primary.find_by(volume.id().unwrap()).unwrap().member_ids(),
        index_queries.find_by(volume.id().unwrap()).unwrap().member_ids()
    );

    persister.delete(&pages[0]).unwrap();
    let expected: Vec<Id> = vec![pages[1].id().cloned().unwrap()];
    for queries in [&primary, &index_queries] {
        assert_eq!(queries.find_by(volume.id().unwrap()).unwrap().member_ids(), expected);
        assert!(queries.find_by(pages[0].id().unwrap()).is_err());
    }
}

#[test]
fn uploaded_files_are_referenced_from_metadata() {
    let schemas = schemas();
    let adapter = MemoryAdapter::new();
    let storage = StorageRouter::new().with(Arc::new(MemoryStorage::new()));

    let file_set = adapter
        .persister()
        .save(&schemas.new_resource("FileSet"))
        .unwrap();
    let handle = storage
        .upload(&mut "%PDF-1.7".as_bytes(), "scan.pdf", &file_set)
        .unwrap();
    let file_set = adapter
        .persister()
        .save(
            &file_set
                .with("file_identifiers", [reliquary::Value::uri(handle.id.clone())])
                .unwrap(),
        )
        .unwrap();

    let stored = adapter.query_service().find_by(file_set.id().unwrap()).unwrap();
    let Some(reliquary::Value::Uri(file_id)) = stored.first("file_identifiers") else {
        panic!("file identifier was not stored");
    };
    assert_eq!(storage.find_by(file_id).unwrap().bytes, b"%PDF-1.7");
}
