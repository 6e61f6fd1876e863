//! Integration tests for GraphQL execution.
//!
//! These tests run queries and mutations through the live schema handle
//! against an in-memory store.

use std::sync::Arc;

use async_graphql::Request;
use bson::oid::ObjectId;
use bson::{Document, doc};
use bucket_core::{BUCKETS_COLLECTION, BucketSchema, ChangeBroadcaster, Properties};
use bucket_graphql::{GraphQLContext, GraphQLSchemaHandle, SchemaBuilderConfig};
use bucket_pipeline::{AclEngine, AclError};
use bucket_service::{BucketChangeListener, BucketService, SchemaRegistry};
use bucket_storage::{DocumentStore, EventedStore, FindOptions, MemoryStore};
use serde_json::{Value, json};

// =============================================================================
// Fixtures
// =============================================================================

struct MockAcl;

impl AclEngine for MockAcl {
    fn extract_property_map(&self, _expression: &str) -> Result<Vec<String>, AclError> {
        Ok(Vec::new())
    }

    fn aggregate(&self, _expression: &str, _context: &Document) -> Result<Document, AclError> {
        Ok(doc! {})
    }

    fn run(&self, expression: &str, _context: &Document) -> Result<bool, AclError> {
        Ok(expression.trim() == "true")
    }
}

struct Fixture {
    store: Arc<EventedStore<MemoryStore>>,
    service: Arc<BucketService>,
    handle: Arc<GraphQLSchemaHandle>,
}

async fn fixture() -> Fixture {
    let store = Arc::new(EventedStore::new(
        MemoryStore::new(),
        ChangeBroadcaster::new_shared(),
    ));
    let registry = Arc::new(SchemaRegistry::new(store.clone(), BUCKETS_COLLECTION));
    let service = Arc::new(BucketService::new(
        store.clone(),
        registry.clone(),
        Arc::new(MockAcl),
    ));
    let handle = Arc::new(GraphQLSchemaHandle::new(
        service.clone(),
        SchemaBuilderConfig::default(),
    ));
    registry
        .register_listener(handle.clone() as Arc<dyn BucketChangeListener>)
        .await;
    Fixture {
        store,
        service,
        handle,
    }
}

fn properties(value: Value) -> Properties {
    serde_json::from_value(value).unwrap()
}

async fn posts(f: &Fixture) -> BucketSchema {
    let bucket = BucketSchema::new(ObjectId::new(), "Posts").with_properties(properties(json!({
        "title": {"type": "string"},
        "views": {"type": "number"},
        "status": {"type": "string", "enum": ["draft", "published"]}
    })));
    f.service.insert_schema(bucket.clone()).await.unwrap();
    bucket
}

async fn execute(f: &Fixture, query: &str) -> Value {
    let context = GraphQLContext::new(f.service.clone()).with_request_id("test");
    let response = f.handle.execute(Request::new(query), context).await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    response.data.into_json().unwrap()
}

// =============================================================================
// Schema lifecycle
// =============================================================================

#[tokio::test]
async fn test_schema_follows_bucket_changes() {
    let f = fixture().await;
    assert!(f.handle.snapshot().is_none());

    let bucket = posts(&f).await;
    let snapshot = f.handle.snapshot().expect("listener installs a snapshot");
    assert_eq!(snapshot.bucket_count, 1);
    assert!(snapshot.sdl.contains(&format!("type Bucket_{}", bucket.id_hex())));

    f.service.remove_schema(&bucket.id_hex()).await.unwrap();
    let snapshot = f.handle.snapshot().unwrap();
    assert_eq!(snapshot.bucket_count, 0);
    assert!(!snapshot.sdl.contains(&bucket.id_hex()));
}

#[tokio::test]
async fn test_execute_builds_schema_on_first_request() {
    let f = fixture().await;
    let data = execute(&f, "{ _placeholder }").await;
    assert_eq!(data, json!({"_placeholder": null}));
    assert!(f.handle.snapshot().is_some());
}

#[tokio::test]
async fn test_invalid_property_names_are_diagnosed_not_fatal() {
    let f = fixture().await;
    let bucket = BucketSchema::new(ObjectId::new(), "Odd").with_properties(properties(json!({
        "123invalid,name?*.": {"type": "string"},
        "level": {"type": "string", "enum": ["very high", "low"]}
    })));
    f.service.insert_schema(bucket).await.unwrap();

    let diagnostics = f.handle.diagnostics();
    assert_eq!(diagnostics.len(), 2);
    assert!(f.handle.sdl().unwrap().contains("_123invalid_name___: String"));
}

// =============================================================================
// Queries
// =============================================================================

#[tokio::test]
async fn test_find_with_filter_sort_and_pagination() {
    let f = fixture().await;
    let bucket = posts(&f).await;
    f.store
        .inner()
        .seed(
            &bucket.collection_name(),
            vec![
                doc! {"_id": ObjectId::new(), "title": "a", "views": 1, "status": "draft"},
                doc! {"_id": ObjectId::new(), "title": "b", "views": 10, "status": "published"},
                doc! {"_id": ObjectId::new(), "title": "c", "views": 20, "status": "published"},
            ],
        )
        .await;

    let query = format!(
        r#"{{ FindBucket_{id}(query: {{views_gte: 5}}, sort: {{views: -1}}, limit: 1) {{
            meta {{ total }}
            data {{ title views status }}
        }} }}"#,
        id = bucket.id_hex()
    );
    let data = execute(&f, &query).await;

    assert_eq!(
        data[format!("FindBucket_{}", bucket.id_hex())],
        json!({
            "meta": {"total": 2},
            "data": [{"title": "c", "views": 20, "status": "published"}]
        })
    );
}

#[tokio::test]
async fn test_find_by_id_of_missing_document_is_null() {
    let f = fixture().await;
    let bucket = posts(&f).await;

    let field = format!("FindByBucket_{}Id", bucket.id_hex());
    let query = format!(
        r#"{{ {field}(_id: "{}") {{ title }} }}"#,
        ObjectId::new().to_hex()
    );
    let data = execute(&f, &query).await;
    assert_eq!(data[field.as_str()], Value::Null);
}

// =============================================================================
// Mutations
// =============================================================================

#[tokio::test]
async fn test_insert_patch_and_delete() {
    let f = fixture().await;
    let bucket = posts(&f).await;
    let name = format!("Bucket_{}", bucket.id_hex());

    let data = execute(
        &f,
        &format!(
            r#"mutation {{ insert{name}(input: {{title: "hello", views: 3, status: draft}}) {{
                _id title views status
            }} }}"#
        ),
    )
    .await;
    let inserted = &data[format!("insert{name}")];
    assert_eq!(inserted["title"], "hello");
    assert_eq!(inserted["views"], 3);
    assert_eq!(inserted["status"], "draft");
    let id = inserted["_id"].as_str().unwrap().to_string();

    let data = execute(
        &f,
        &format!(
            r#"mutation {{ patch{name}(_id: "{id}", input: {{views: 4, status: null}}) {{
                title views status
            }} }}"#
        ),
    )
    .await;
    assert_eq!(
        data[format!("patch{name}")],
        json!({"title": "hello", "views": 4, "status": null})
    );

    let data = execute(&f, &format!(r#"mutation {{ delete{name}(_id: "{id}") }}"#)).await;
    assert_eq!(data[format!("delete{name}")], json!(id));

    let remaining = f
        .store
        .find(&bucket.collection_name(), doc! {}, FindOptions::default())
        .await
        .unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn test_invalid_input_date_is_rejected() {
    let f = fixture().await;
    let bucket = BucketSchema::new(ObjectId::new(), "Events").with_properties(properties(json!({
        "at": {"type": "date"}
    })));
    f.service.insert_schema(bucket.clone()).await.unwrap();

    let context = GraphQLContext::new(f.service.clone());
    let response = f
        .handle
        .execute(
            Request::new(format!(
                r#"mutation {{ insertBucket_{}(input: {{at: "yesterday"}}) {{ _id }} }}"#,
                bucket.id_hex()
            )),
            context,
        )
        .await;

    assert_eq!(response.errors.len(), 1);
    let extensions = response.errors[0].extensions.as_ref().unwrap();
    assert_eq!(
        extensions.get("code"),
        Some(&async_graphql::Value::from("INVALID_ARGUMENT"))
    );
}
