//! The document store port.

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document};
use bucket_core::ChangeEvent;
use futures_util::stream::BoxStream;

use crate::error::StorageError;
use crate::types::{FindOptions, UpdateOptions, UpdateResult, WatchFilter};

/// Stream of change events produced by [`DocumentStore::watch`].
pub type ChangeStream = BoxStream<'static, Result<ChangeEvent, StorageError>>;

/// Shared handle to a document store.
pub type DynStore = Arc<dyn DocumentStore>;

/// The storage collaborator used by every engine component.
///
/// Filters, updates and pipeline stages follow MongoDB semantics
/// (`$match`, `$lookup`, `$facet`, `$unwind`, `$set`, `$unset`, ...).
/// Implementations must be thread-safe (`Send + Sync`).
///
/// # Example
///
/// ```ignore
/// use bucket_storage::{DocumentStore, StorageError};
///
/// async fn count(store: &dyn DocumentStore, collection: &str) -> Result<usize, StorageError> {
///     Ok(store.find(collection, doc! {}, FindOptions::default()).await?.len())
/// }
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns every document matching `filter`.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>, StorageError>;

    /// Returns the first document matching `filter`.
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, StorageError> {
        let mut found = self
            .find(collection, filter, FindOptions::new().with_limit(1))
            .await?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }

    /// Runs an aggregation pipeline as a single call.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidPipeline` for malformed stages.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>, StorageError>;

    /// Inserts a document, returning its `_id`.
    ///
    /// The backend generates an object id when the document has none.
    async fn insert_one(&self, collection: &str, document: Document)
    -> Result<Bson, StorageError>;

    /// Applies `update` to every document matching `filter`.
    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> Result<UpdateResult, StorageError>;

    /// Replaces the first matching document, returning the previous version.
    async fn find_one_and_replace(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> Result<Option<Document>, StorageError>;

    /// Updates the first matching document, returning the previous version.
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<Option<Document>, StorageError>;

    /// Deletes the first matching document, returning it.
    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, StorageError>;

    /// Drops a collection. Dropping a missing collection is not an error.
    async fn drop_collection(&self, collection: &str) -> Result<(), StorageError>;

    /// Opens a change stream over the collections selected by `filter`.
    async fn watch(&self, filter: WatchFilter) -> Result<ChangeStream, StorageError>;

    /// Returns the name of the storage backend.
    fn backend_name(&self) -> &'static str {
        "unknown"
    }
}
