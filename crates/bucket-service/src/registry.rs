//! Compiled-schema registry.
//!
//! Schemas are read through a [`DashMap`] cache keyed by bucket id. Writes
//! made through the orchestrator invalidate eagerly; writes made elsewhere
//! are picked up by [`SchemaRegistry::watch`] one change-stream round trip
//! later.

use std::sync::Arc;

use async_trait::async_trait;
use bson::doc;
use bucket_core::{BucketSchema, ChangeOperation, ID_FIELD};
use bucket_pipeline::SchemaResolver;
use bucket_storage::{DynStore, FindOptions, StorageError, WatchFilter};
use dashmap::DashMap;
use futures_util::StreamExt;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

/// Receives the complete bucket list after every schema change.
#[async_trait]
pub trait BucketChangeListener: Send + Sync {
    async fn on_buckets_changed(&self, buckets: &[Arc<BucketSchema>]);
}

pub struct SchemaRegistry {
    store: DynStore,
    collection: String,
    cache: DashMap<String, Arc<BucketSchema>>,
    listeners: RwLock<Vec<Arc<dyn BucketChangeListener>>>,
}

impl SchemaRegistry {
    pub fn new(store: DynStore, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            cache: DashMap::new(),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Name of the collection holding bucket schemas.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn store(&self) -> &DynStore {
        &self.store
    }

    /// Returns a schema, loading it on a cache miss.
    ///
    /// Ids that are not valid object ids resolve to `None`.
    pub async fn get(&self, bucket_id: &str) -> Result<Option<Arc<BucketSchema>>, StorageError> {
        if let Some(schema) = self.cache.get(bucket_id) {
            return Ok(Some(schema.clone()));
        }
        let Ok(id) = bson::oid::ObjectId::parse_str(bucket_id) else {
            return Ok(None);
        };

        let Some(document) = self
            .store
            .find_one(&self.collection, doc! { ID_FIELD: id })
            .await?
        else {
            return Ok(None);
        };
        let schema = BucketSchema::from_document(document)
            .map_err(|e| StorageError::invalid_document(e.to_string()))?;

        let schema = Arc::new(schema);
        self.cache.insert(bucket_id.to_string(), schema.clone());
        debug!(bucket_id = %bucket_id, "Schema cached");
        Ok(Some(schema))
    }

    /// Returns every schema ordered by `order` and refreshes the cache.
    ///
    /// Documents that do not deserialize are skipped.
    pub async fn all(&self) -> Result<Vec<Arc<BucketSchema>>, StorageError> {
        let documents = self
            .store
            .find(
                &self.collection,
                doc! {},
                FindOptions::new().with_sort(doc! { "order": 1 }),
            )
            .await?;

        let mut schemas = Vec::with_capacity(documents.len());
        for document in documents {
            match BucketSchema::from_document(document) {
                Ok(schema) => {
                    let schema = Arc::new(schema);
                    self.cache.insert(schema.id_hex(), schema.clone());
                    schemas.push(schema);
                }
                Err(e) => warn!(error = %e, "Skipping unreadable bucket schema"),
            }
        }
        Ok(schemas)
    }

    pub fn invalidate(&self, bucket_id: &str) {
        if self.cache.remove(bucket_id).is_some() {
            debug!(bucket_id = %bucket_id, "Schema invalidated");
        }
    }

    pub fn invalidate_all(&self) {
        self.cache.clear();
        debug!("Schema cache cleared");
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    pub async fn register_listener(&self, listener: Arc<dyn BucketChangeListener>) {
        self.listeners.write().await.push(listener);
    }

    /// Sends the current bucket list to every listener.
    pub async fn notify(&self) -> Result<(), StorageError> {
        let listeners = self.listeners.read().await.clone();
        if listeners.is_empty() {
            return Ok(());
        }
        let buckets = self.all().await?;
        for listener in listeners {
            listener.on_buckets_changed(&buckets).await;
        }
        Ok(())
    }

    /// Subscribes to schema collection changes and keeps the cache and the
    /// listeners in sync until the returned sender signals shutdown.
    pub async fn watch(self: Arc<Self>) -> Result<watch::Sender<bool>, StorageError> {
        let mut changes = self
            .store
            .watch(WatchFilter::collection(self.collection.clone()))
            .await?;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            info!(collection = %self.collection, "Schema registry watcher started");
            loop {
                tokio::select! {
                    change = changes.next() => {
                        let Some(change) = change else {
                            debug!("Schema change stream ended");
                            break;
                        };
                        match change {
                            Ok(event) => {
                                match (event.operation, event.document_id_hex()) {
                                    (ChangeOperation::Drop, _) | (_, None) => self.invalidate_all(),
                                    (_, Some(id)) => self.invalidate(&id),
                                }
                                if let Err(e) = self.notify().await {
                                    warn!(error = %e, "Failed to notify bucket listeners");
                                }
                            }
                            Err(e) => warn!(error = %e, category = %e.category(), "Schema change stream error"),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Schema registry watcher shutting down");
                            break;
                        }
                    }
                }
            }
        });

        Ok(shutdown_tx)
    }
}

#[async_trait]
impl SchemaResolver for SchemaRegistry {
    async fn resolve(&self, bucket_id: &str) -> Result<Option<Arc<BucketSchema>>, StorageError> {
        self.get(bucket_id).await
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("collection", &self.collection)
            .field("cached", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;
    use bucket_core::BUCKETS_COLLECTION;
    use bucket_storage::{DocumentStore, MemoryStore};

    async fn registry_with(schemas: Vec<BucketSchema>) -> (Arc<MemoryStore>, SchemaRegistry) {
        let store = Arc::new(MemoryStore::new());
        let documents: Vec<_> = schemas.iter().map(|s| s.to_document().unwrap()).collect();
        store.seed(BUCKETS_COLLECTION, documents).await;
        let registry = SchemaRegistry::new(store.clone(), BUCKETS_COLLECTION);
        (store, registry)
    }

    #[tokio::test]
    async fn test_get_is_cached_until_invalidated() {
        let id = ObjectId::new();
        let (store, registry) = registry_with(vec![BucketSchema::new(id, "Posts")]).await;

        let first = registry.get(&id.to_hex()).await.unwrap().unwrap();
        assert_eq!(first.title, "Posts");
        assert_eq!(registry.cached_count(), 1);

        store
            .find_one_and_replace(
                BUCKETS_COLLECTION,
                doc! {"_id": id},
                BucketSchema::new(id, "Articles").to_document().unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(registry.get(&id.to_hex()).await.unwrap().unwrap().title, "Posts");

        registry.invalidate(&id.to_hex());
        assert_eq!(
            registry.get(&id.to_hex()).await.unwrap().unwrap().title,
            "Articles"
        );
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_ids_resolve_to_none() {
        let (_, registry) = registry_with(Vec::new()).await;
        assert!(registry.get("not-an-id").await.unwrap().is_none());
        assert!(
            registry
                .get(&ObjectId::new().to_hex())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_all_is_ordered() {
        let mut second = BucketSchema::new(ObjectId::new(), "Second");
        second.order = 2;
        let mut first = BucketSchema::new(ObjectId::new(), "First");
        first.order = 1;
        let (_, registry) = registry_with(vec![second, first]).await;

        let titles: Vec<_> = registry
            .all()
            .await
            .unwrap()
            .iter()
            .map(|s| s.title.clone())
            .collect();
        assert_eq!(titles, vec!["First", "Second"]);
        assert_eq!(registry.cached_count(), 2);
    }
}
