//! Schema writes: ACL validation, diff-driven unsets and removal cascades.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Document, doc};
use bucket_core::{
    BUCKETS_COLLECTION, BucketSchema, ChangeBroadcaster, Properties, PropertySpec, PropertyType,
    RelationKind,
};
use bucket_pipeline::{AclEngine, AclError};
use bucket_service::{
    BucketChangeListener, BucketService, HistorySink, SchemaRegistry, ServiceError,
};
use bucket_storage::{EventedStore, MemoryStore, StorageError};

// ==================== Collaborators ====================

/// `!!` fails to parse, rules reading `auth.` fail to evaluate on an empty
/// context, everything else evaluates to `rule == "true"`.
struct MockAcl;

impl AclEngine for MockAcl {
    fn extract_property_map(&self, _expression: &str) -> Result<Vec<String>, AclError> {
        Ok(Vec::new())
    }

    fn aggregate(&self, expression: &str, _context: &Document) -> Result<Document, AclError> {
        if expression.contains("!!") {
            return Err(AclError::parse("unexpected token"));
        }
        Ok(doc! { "$expr": true })
    }

    fn run(&self, expression: &str, context: &Document) -> Result<bool, AclError> {
        if expression.contains("!!") {
            return Err(AclError::parse("unexpected token"));
        }
        if expression.contains("auth.") && !context.contains_key("auth") {
            return Err(AclError::evaluation("auth is undefined"));
        }
        Ok(expression.trim() == "true")
    }
}

#[derive(Default)]
struct RecordingHistory {
    calls: Mutex<Vec<String>>,
}

impl RecordingHistory {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistorySink for RecordingHistory {
    async fn record(&self, bucket_id: &str, _: &Document, _: &Document) -> Result<(), StorageError> {
        self.calls.lock().unwrap().push(format!("record:{bucket_id}"));
        Ok(())
    }

    async fn delete_document(&self, bucket_id: &str, document_id: &str) -> Result<(), StorageError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("delete:{bucket_id}:{document_id}"));
        Ok(())
    }

    async fn clear_bucket(&self, bucket_id: &str) -> Result<(), StorageError> {
        self.calls.lock().unwrap().push(format!("clear:{bucket_id}"));
        Ok(())
    }
}

#[derive(Default)]
struct CountingListener {
    seen: Mutex<Vec<usize>>,
}

#[async_trait]
impl BucketChangeListener for CountingListener {
    async fn on_buckets_changed(&self, buckets: &[Arc<BucketSchema>]) {
        self.seen.lock().unwrap().push(buckets.len());
    }
}

// ==================== Fixtures ====================

struct Harness {
    store: Arc<EventedStore<MemoryStore>>,
    registry: Arc<SchemaRegistry>,
    history: Arc<RecordingHistory>,
    service: BucketService,
}

fn harness() -> Harness {
    let store = Arc::new(EventedStore::new(
        MemoryStore::new(),
        ChangeBroadcaster::new_shared(),
    ));
    let registry = Arc::new(SchemaRegistry::new(store.clone(), BUCKETS_COLLECTION));
    let history = Arc::new(RecordingHistory::default());
    let service = BucketService::new(store.clone(), registry.clone(), Arc::new(MockAcl))
        .with_history(history.clone());
    Harness {
        store,
        registry,
        history,
        service,
    }
}

fn props(entries: Vec<(&str, PropertySpec)>) -> Properties {
    entries
        .into_iter()
        .map(|(name, spec)| (name.to_string(), spec))
        .collect()
}

fn string() -> PropertySpec {
    PropertySpec::of(PropertyType::String)
}

fn number() -> PropertySpec {
    PropertySpec::of(PropertyType::Number)
}

// ==================== Replace ====================

#[tokio::test]
async fn test_retyped_property_is_unset_and_added_property_is_not() {
    let h = harness();
    let people = BucketSchema::new(ObjectId::new(), "People")
        .with_properties(props(vec![("name", string()), ("age", number())]));
    let collection = people.collection_name();
    h.service.insert_schema(people.clone()).await.unwrap();
    h.store
        .inner()
        .seed(&collection, vec![doc! {"name": "ada", "age": 36}])
        .await;

    let retyped = people.clone().with_properties(props(vec![
        ("name", string()),
        ("age", string()),
        ("nickname", string()),
    ]));
    h.service.replace_schema(retyped).await.unwrap();

    let unsets: Vec<Document> = h
        .store
        .inner()
        .updates()
        .await
        .into_iter()
        .filter(|update| update.collection == collection)
        .map(|update| update.update)
        .collect();
    assert_eq!(unsets, vec![doc! {"$unset": {"age": ""}}]);
    assert_eq!(
        h.store.inner().documents(&collection).await,
        vec![doc! {"name": "ada"}]
    );

    let cached = h.registry.get(&people.id_hex()).await.unwrap().unwrap();
    assert_eq!(cached.properties.len(), 3);
}

#[tokio::test]
async fn test_additions_alone_touch_no_documents() {
    let h = harness();
    let people = BucketSchema::new(ObjectId::new(), "People")
        .with_properties(props(vec![("name", string())]));
    h.service.insert_schema(people.clone()).await.unwrap();

    let extended = people
        .clone()
        .with_properties(props(vec![("name", string()), ("nickname", string())]));
    h.service.replace_schema(extended).await.unwrap();

    assert!(h.store.inner().updates().await.is_empty());
}

#[tokio::test]
async fn test_replacing_missing_bucket_fails() {
    let h = harness();
    let err = h
        .service
        .replace_schema(BucketSchema::new(ObjectId::new(), "Ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::BucketNotFound { .. }));
}

#[tokio::test]
async fn test_disabling_history_clears_it() {
    let h = harness();
    let notes = BucketSchema::new(ObjectId::new(), "Notes").with_history(true);
    h.service.insert_schema(notes.clone()).await.unwrap();
    h.service
        .replace_schema(notes.clone().with_history(false))
        .await
        .unwrap();

    assert_eq!(h.history.calls(), vec![format!("clear:{}", notes.id_hex())]);
}

// ==================== ACL validation ====================

#[tokio::test]
async fn test_unparsable_rule_is_rejected_before_persistence() {
    let h = harness();
    let schema = BucketSchema::new(ObjectId::new(), "Broken").with_acl("!! nope", "");

    let err = h.service.insert_schema(schema).await.unwrap_err();
    assert!(matches!(err, ServiceError::SchemaValidation { .. }));
    assert!(err.is_client_error());
    assert!(
        h.store
            .inner()
            .documents(BUCKETS_COLLECTION)
            .await
            .is_empty()
    );
}

#[tokio::test]
async fn test_rule_failing_only_on_empty_context_is_accepted() {
    let h = harness();
    let schema = BucketSchema::new(ObjectId::new(), "Owned")
        .with_acl("auth.id == document.owner", "auth.role == 'admin'");
    assert!(h.service.insert_schema(schema).await.is_ok());
}

// ==================== Remove ====================

#[tokio::test]
async fn test_remove_clears_relations_in_sibling_buckets() {
    let h = harness();
    let users = BucketSchema::new(ObjectId::new(), "Users")
        .with_properties(props(vec![("name", string())]));
    let users_id = users.id_hex();
    let posts = BucketSchema::new(ObjectId::new(), "Posts").with_properties(props(vec![
        ("title", string()),
        (
            "author",
            PropertySpec::relation(users_id.clone(), RelationKind::OneToOne),
        ),
        (
            "meta",
            PropertySpec {
                properties: Some(props(vec![(
                    "editors",
                    PropertySpec::relation(users_id.clone(), RelationKind::OneToMany),
                )])),
                ..PropertySpec::of(PropertyType::Object)
            },
        ),
    ]));
    h.service.insert_schema(users.clone()).await.unwrap();
    h.service.insert_schema(posts.clone()).await.unwrap();
    h.store
        .inner()
        .seed(&users.collection_name(), vec![doc! {"name": "ada"}])
        .await;
    h.store
        .inner()
        .seed(
            &posts.collection_name(),
            vec![doc! {"title": "t", "author": users_id.as_str(), "meta": {"editors": [users_id.as_str()]}}],
        )
        .await;

    h.service.remove_schema(&users_id).await.unwrap();

    assert!(!h.store.inner().has_collection(&users.collection_name()).await);
    assert!(h.registry.get(&users_id).await.unwrap().is_none());

    let posts_schema = h.registry.get(&posts.id_hex()).await.unwrap().unwrap();
    assert!(!posts_schema.properties.contains_key("author"));
    assert!(
        posts_schema.properties["meta"]
            .properties
            .as_ref()
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        h.store.inner().documents(&posts.collection_name()).await,
        vec![doc! {"title": "t", "meta": {}}]
    );
    assert_eq!(h.history.calls(), vec![format!("clear:{users_id}")]);
}

#[tokio::test]
async fn test_remove_missing_bucket_fails() {
    let h = harness();
    let err = h
        .service
        .remove_schema(&ObjectId::new().to_hex())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

// ==================== Listeners ====================

#[tokio::test]
async fn test_listeners_receive_full_bucket_list() {
    let h = harness();
    let listener = Arc::new(CountingListener::default());
    h.registry.register_listener(listener.clone()).await;

    let first = BucketSchema::new(ObjectId::new(), "First");
    h.service.insert_schema(first.clone()).await.unwrap();
    h.service
        .insert_schema(BucketSchema::new(ObjectId::new(), "Second"))
        .await
        .unwrap();
    h.service.remove_schema(&first.id_hex()).await.unwrap();

    assert_eq!(*listener.seen.lock().unwrap(), vec![1, 2, 1]);
}
