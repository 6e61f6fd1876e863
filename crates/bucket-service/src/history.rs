//! History sink port.
//!
//! Version history lives outside the engine. The orchestrator reports
//! document changes to a [`HistorySink`] and never fails a write because
//! the sink did.

use async_trait::async_trait;
use bson::Document;
use bucket_storage::StorageError;

#[async_trait]
pub trait HistorySink: Send + Sync {
    /// Records a document change on a history-enabled bucket.
    async fn record(
        &self,
        bucket_id: &str,
        previous: &Document,
        current: &Document,
    ) -> Result<(), StorageError>;

    /// Removes the history of a deleted document.
    async fn delete_document(&self, bucket_id: &str, document_id: &str) -> Result<(), StorageError>;

    /// Removes the history of a whole bucket.
    async fn clear_bucket(&self, bucket_id: &str) -> Result<(), StorageError>;
}

/// Sink that keeps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHistory;

#[async_trait]
impl HistorySink for NoopHistory {
    async fn record(&self, _: &str, _: &Document, _: &Document) -> Result<(), StorageError> {
        Ok(())
    }

    async fn delete_document(&self, _: &str, _: &str) -> Result<(), StorageError> {
        Ok(())
    }

    async fn clear_bucket(&self, _: &str) -> Result<(), StorageError> {
        Ok(())
    }
}
