//! EventedStore - a store wrapper that publishes change events after writes.
//!
//! The wrapper delegates every operation to an inner store and publishes a
//! [`ChangeEvent`] to the broadcaster once a write has succeeded. Its
//! [`watch`](DocumentStore::watch) is served from the same broadcaster, which
//! gives backends without a native change stream (and tests) one.
//!
//! # Example
//!
//! ```ignore
//! use bucket_core::ChangeBroadcaster;
//! use bucket_storage::{EventedStore, MemoryStore};
//!
//! let store = EventedStore::new(MemoryStore::new(), ChangeBroadcaster::new_shared());
//! let mut changes = store.watch(WatchFilter::bucket_data()).await?;
//! ```

use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use bson::{Bson, Document, doc};
use bucket_core::{ChangeBroadcaster, ChangeEvent, ID_FIELD};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::error::StorageError;
use crate::traits::{ChangeStream, DocumentStore};
use crate::types::{FindOptions, UpdateOptions, UpdateResult, WatchFilter};

/// A store wrapper that emits change events after successful writes.
///
/// Events are emitted **after** the operation succeeds, so every event
/// corresponds to an actual change in the store.
pub struct EventedStore<S: DocumentStore> {
    inner: S,
    broadcaster: Arc<ChangeBroadcaster>,
}

impl<S: DocumentStore> EventedStore<S> {
    pub fn new(inner: S, broadcaster: Arc<ChangeBroadcaster>) -> Self {
        Self { inner, broadcaster }
    }

    /// Get a reference to the inner store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn broadcaster(&self) -> &Arc<ChangeBroadcaster> {
        &self.broadcaster
    }

    fn emit(&self, event: ChangeEvent) {
        let operation = event.operation;
        let collection = event.collection.clone();
        let count = self.broadcaster.send(event);
        debug!(
            operation = %operation,
            collection = %collection,
            subscribers = count,
            "Emitted change event"
        );
    }

    /// Re-reads documents by id so update events carry the post-image.
    async fn emit_updated_ids(&self, collection: &str, ids: Vec<Bson>) -> Result<(), StorageError> {
        if ids.is_empty() {
            return Ok(());
        }
        let current = self
            .inner
            .find(
                collection,
                doc! { ID_FIELD: { "$in": ids } },
                FindOptions::default(),
            )
            .await?;
        for document in current {
            self.emit(ChangeEvent::updated(collection, document));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for EventedStore<S> {
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>, StorageError> {
        self.inner.find(collection, filter, options).await
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, StorageError> {
        self.inner.find_one(collection, filter).await
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>, StorageError> {
        self.inner.aggregate(collection, pipeline).await
    }

    async fn insert_one(
        &self,
        collection: &str,
        mut document: Document,
    ) -> Result<Bson, StorageError> {
        let id = self.inner.insert_one(collection, document.clone()).await?;

        if self.broadcaster.has_subscribers() {
            document.insert(ID_FIELD, id.clone());
            self.emit(ChangeEvent::inserted(collection, document));
        }
        Ok(id)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> Result<UpdateResult, StorageError> {
        if !self.broadcaster.has_subscribers() {
            return self
                .inner
                .update_many(collection, filter, update, options)
                .await;
        }

        // The filter may stop matching once the update is applied, so the
        // affected ids are captured up front.
        let ids: Vec<Bson> = self
            .inner
            .find(
                collection,
                filter.clone(),
                FindOptions::new().with_projection(doc! { ID_FIELD: 1 }),
            )
            .await?
            .into_iter()
            .filter_map(|document| document.get(ID_FIELD).cloned())
            .collect();

        let result = self
            .inner
            .update_many(collection, filter, update, options)
            .await?;
        if result.modified_count > 0 {
            self.emit_updated_ids(collection, ids).await?;
        }
        Ok(result)
    }

    async fn find_one_and_replace(
        &self,
        collection: &str,
        filter: Document,
        mut replacement: Document,
    ) -> Result<Option<Document>, StorageError> {
        let previous = self
            .inner
            .find_one_and_replace(collection, filter, replacement.clone())
            .await?;

        if let Some(previous) = &previous {
            if let Some(id) = previous.get(ID_FIELD) {
                replacement.insert(ID_FIELD, id.clone());
            }
            self.emit(ChangeEvent::replaced(collection, replacement));
        }
        Ok(previous)
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<Option<Document>, StorageError> {
        let previous = self
            .inner
            .find_one_and_update(collection, filter, update)
            .await?;

        if self.broadcaster.has_subscribers()
            && let Some(id) = previous.as_ref().and_then(|p| p.get(ID_FIELD))
        {
            self.emit_updated_ids(collection, vec![id.clone()]).await?;
        }
        Ok(previous)
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, StorageError> {
        let deleted = self.inner.find_one_and_delete(collection, filter).await?;

        if let Some(id) = deleted.as_ref().and_then(|d| d.get(ID_FIELD)) {
            self.emit(ChangeEvent::deleted(collection, id.clone()));
        }
        Ok(deleted)
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), StorageError> {
        self.inner.drop_collection(collection).await?;
        self.emit(ChangeEvent::dropped(collection));
        Ok(())
    }

    async fn watch(&self, filter: WatchFilter) -> Result<ChangeStream, StorageError> {
        let mut receiver = self.broadcaster.subscribe();
        let changes = stream! {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if !filter.matches(&event) {
                            continue;
                        }
                        trace!(
                            operation = %event.operation,
                            collection = %event.collection,
                            "Emitting change stream event"
                        );
                        yield Ok(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        warn!(count, "Change stream lagged, some events were dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Change stream channel closed");
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(changes))
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}
