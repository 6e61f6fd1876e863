//! Scheduled publication, with a paused clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use bucket_core::{BUCKETS_COLLECTION, BucketSchema, ChangeBroadcaster};
use bucket_pipeline::{AclEngine, AclError};
use bucket_service::{BucketEngine, DocumentScheduler, EngineConfig, SchemaRegistry};
use bucket_storage::{
    ChangeStream, DocumentStore, EventedStore, FindOptions, MemoryStore, StorageError,
    UpdateOptions, UpdateResult, WatchFilter,
};

struct Fixture {
    store: Arc<EventedStore<MemoryStore>>,
    bucket: BucketSchema,
    scheduler: Arc<DocumentScheduler>,
}

async fn fixture() -> Fixture {
    let store = Arc::new(EventedStore::new(
        MemoryStore::new(),
        ChangeBroadcaster::new_shared(),
    ));
    let bucket = BucketSchema::new(ObjectId::new(), "Posts");
    store
        .inner()
        .seed(BUCKETS_COLLECTION, vec![bucket.to_document().unwrap()])
        .await;
    let registry = Arc::new(SchemaRegistry::new(store.clone(), BUCKETS_COLLECTION));
    let scheduler = Arc::new(DocumentScheduler::new(store.clone(), registry));
    Fixture {
        store,
        bucket,
        scheduler,
    }
}

fn in_seconds(seconds: i64) -> bson::DateTime {
    bson::DateTime::from_millis(bson::DateTime::now().timestamp_millis() + seconds * 1000)
}

async fn stored(f: &Fixture, id: ObjectId) -> Document {
    f.store
        .find_one(&f.bucket.collection_name(), doc! {"_id": id})
        .await
        .unwrap()
        .unwrap()
}

/// Lets the watcher task drain pending events.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_recover_publishes_overdue_documents() {
    let f = fixture().await;
    let (past, future) = (ObjectId::new(), ObjectId::new());
    f.store
        .inner()
        .seed(
            &f.bucket.collection_name(),
            vec![
                doc! {"_id": past, "_schedule": in_seconds(-60)},
                doc! {"_id": future, "_schedule": in_seconds(3600)},
                doc! {"_id": ObjectId::new(), "title": "live"},
            ],
        )
        .await;

    assert_eq!(f.scheduler.recover().await.unwrap(), 1);
    assert!(!stored(&f, past).await.contains_key("_schedule"));
    assert!(stored(&f, future).await.contains_key("_schedule"));
}

#[tokio::test(start_paused = true)]
async fn test_timer_publishes_at_schedule() {
    let f = fixture().await;
    let _shutdown = f.scheduler.clone().start().await.unwrap();
    let id = ObjectId::new();
    let bucket_id = f.bucket.id_hex();

    f.store
        .insert_one(
            &f.bucket.collection_name(),
            doc! {"_id": id, "title": "soon", "_schedule": in_seconds(60)},
        )
        .await
        .unwrap();
    settle().await;
    assert!(f.scheduler.is_scheduled(&bucket_id, &id.to_hex()));

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(!stored(&f, id).await.contains_key("_schedule"));
    assert!(!f.scheduler.is_scheduled(&bucket_id, &id.to_hex()));
}

#[tokio::test(start_paused = true)]
async fn test_due_schedule_is_published_without_timer() {
    let f = fixture().await;
    let _shutdown = f.scheduler.clone().start().await.unwrap();
    let id = ObjectId::new();

    f.store
        .insert_one(
            &f.bucket.collection_name(),
            doc! {"_id": id, "_schedule": in_seconds(-1)},
        )
        .await
        .unwrap();
    settle().await;

    assert!(!stored(&f, id).await.contains_key("_schedule"));
    assert_eq!(f.scheduler.scheduled_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rescheduling_replaces_the_timer() {
    let f = fixture().await;
    let _shutdown = f.scheduler.clone().start().await.unwrap();
    let id = ObjectId::new();
    let collection = f.bucket.collection_name();

    f.store
        .insert_one(&collection, doc! {"_id": id, "_schedule": in_seconds(60)})
        .await
        .unwrap();
    settle().await;
    f.store
        .find_one_and_replace(
            &collection,
            doc! {"_id": id},
            doc! {"_schedule": in_seconds(120)},
        )
        .await
        .unwrap();
    settle().await;
    assert_eq!(f.scheduler.scheduled_count(), 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(stored(&f, id).await.contains_key("_schedule"));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(!stored(&f, id).await.contains_key("_schedule"));
}

#[tokio::test(start_paused = true)]
async fn test_delete_and_drop_cancel_timers() {
    let f = fixture().await;
    let _shutdown = f.scheduler.clone().start().await.unwrap();
    let collection = f.bucket.collection_name();
    let (first, second) = (ObjectId::new(), ObjectId::new());

    for id in [first, second] {
        f.store
            .insert_one(&collection, doc! {"_id": id, "_schedule": in_seconds(60)})
            .await
            .unwrap();
    }
    settle().await;
    assert_eq!(f.scheduler.scheduled_count(), 2);

    f.store
        .find_one_and_delete(&collection, doc! {"_id": first})
        .await
        .unwrap();
    settle().await;
    assert_eq!(f.scheduler.scheduled_count(), 1);

    f.store.drop_collection(&collection).await.unwrap();
    settle().await;
    assert_eq!(f.scheduler.scheduled_count(), 0);
}

struct AllowAll;

impl AclEngine for AllowAll {
    fn extract_property_map(&self, _: &str) -> Result<Vec<String>, AclError> {
        Ok(Vec::new())
    }

    fn aggregate(&self, _: &str, _: &Document) -> Result<Document, AclError> {
        Ok(doc! {})
    }

    fn run(&self, _: &str, _: &Document) -> Result<bool, AclError> {
        Ok(true)
    }
}

#[tokio::test(start_paused = true)]
async fn test_engine_start_recovers_then_watches() {
    let f = fixture().await;
    let overdue = ObjectId::new();
    f.store
        .inner()
        .seed(
            &f.bucket.collection_name(),
            vec![doc! {"_id": overdue, "_schedule": in_seconds(-5)}],
        )
        .await;

    let engine = BucketEngine::builder(EngineConfig::default(), f.store.clone(), Arc::new(AllowAll))
        .build();
    engine.start().await.unwrap();
    assert!(!stored(&f, overdue).await.contains_key("_schedule"));

    let later = ObjectId::new();
    f.store
        .insert_one(
            &f.bucket.collection_name(),
            doc! {"_id": later, "_schedule": in_seconds(30)},
        )
        .await
        .unwrap();
    settle().await;
    assert!(engine.scheduler().is_scheduled(&f.bucket.id_hex(), &later.to_hex()));

    engine.shutdown().await;
    assert_eq!(engine.scheduler().scheduled_count(), 0);
}

/// Lands one scheduled insert while overdue documents are being published.
struct WriteDuringRecovery {
    inner: Arc<EventedStore<MemoryStore>>,
    write: Mutex<Option<(String, Document)>>,
}

#[async_trait]
impl DocumentStore for WriteDuringRecovery {
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>, StorageError> {
        self.inner.find(collection, filter, options).await
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>, StorageError> {
        self.inner.aggregate(collection, pipeline).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<Bson, StorageError> {
        self.inner.insert_one(collection, document).await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> Result<UpdateResult, StorageError> {
        let pending = self.write.lock().unwrap().take();
        if let Some((target, document)) = pending {
            self.inner.insert_one(&target, document).await?;
        }
        self.inner.update_many(collection, filter, update, options).await
    }

    async fn find_one_and_replace(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> Result<Option<Document>, StorageError> {
        self.inner
            .find_one_and_replace(collection, filter, replacement)
            .await
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<Option<Document>, StorageError> {
        self.inner.find_one_and_update(collection, filter, update).await
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, StorageError> {
        self.inner.find_one_and_delete(collection, filter).await
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), StorageError> {
        self.inner.drop_collection(collection).await
    }

    async fn watch(&self, filter: WatchFilter) -> Result<ChangeStream, StorageError> {
        self.inner.watch(filter).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_document_scheduled_during_recovery_gets_a_timer() {
    let f = fixture().await;
    let during = ObjectId::new();
    let store = Arc::new(WriteDuringRecovery {
        inner: f.store.clone(),
        write: Mutex::new(Some((
            f.bucket.collection_name(),
            doc! {"_id": during, "_schedule": in_seconds(30)},
        ))),
    });

    let engine = BucketEngine::builder(EngineConfig::default(), store, Arc::new(AllowAll)).build();
    engine.start().await.unwrap();
    settle().await;

    assert!(engine.scheduler().is_scheduled(&f.bucket.id_hex(), &during.to_hex()));
    engine.shutdown().await;
}
