//! Scheduled publication of documents.
//!
//! A document carrying a `_schedule` date stays hidden from regular finds
//! until the scheduler unsets the field at that date. Timers are armed from
//! the storage change stream, one per document, keyed `{bucketId}_{documentId}`.
//! Re-scheduling a document replaces its timer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bson::oid::ObjectId;
use bson::{Bson, doc};
use bucket_core::{ChangeEvent, ChangeOperation, ID_FIELD, SCHEDULE_FIELD, bucket_collection};
use bucket_storage::{DynStore, StorageError, UpdateOptions, WatchFilter};
use dashmap::DashMap;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::registry::SchemaRegistry;

/// Schedules within this margin are published right away.
const DUE_MARGIN_MS: i64 = 1;

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct DocumentScheduler {
    store: DynStore,
    registry: Arc<SchemaRegistry>,
    timers: DashMap<String, ArmedTimer>,
    generation: AtomicU64,
}

impl DocumentScheduler {
    pub fn new(store: DynStore, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            store,
            registry,
            timers: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn timer_key(bucket_id: &str, document_id: &str) -> String {
        format!("{bucket_id}_{document_id}")
    }

    /// Publishes every document whose schedule passed while nothing was
    /// watching. Returns the number of published documents.
    pub async fn recover(&self) -> Result<u64, StorageError> {
        let now = bson::DateTime::now();
        let mut published = 0;
        for bucket in self.registry.all().await? {
            let result = self
                .store
                .update_many(
                    &bucket.collection_name(),
                    doc! { SCHEDULE_FIELD: { "$lte": now } },
                    doc! { "$unset": { SCHEDULE_FIELD: "" } },
                    UpdateOptions::default(),
                )
                .await?;
            published += result.modified_count;
        }
        info!(published, "Published overdue scheduled documents");
        Ok(published)
    }

    /// Watches bucket data collections and arms timers until the returned
    /// sender signals shutdown. Armed timers are aborted on shutdown.
    pub async fn start(self: Arc<Self>) -> Result<watch::Sender<bool>, StorageError> {
        let mut changes = self.store.watch(WatchFilter::bucket_data()).await?;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            info!("Document scheduler started");
            loop {
                tokio::select! {
                    change = changes.next() => {
                        match change {
                            Some(Ok(event)) => self.handle_event(event).await,
                            Some(Err(e)) => warn!(error = %e, "Scheduler change stream error"),
                            None => {
                                debug!("Scheduler change stream ended");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Document scheduler shutting down");
                            break;
                        }
                    }
                }
            }
            self.cancel_all();
        });

        Ok(shutdown_tx)
    }

    /// Arms, re-arms or cancels timers for one change event.
    pub async fn handle_event(self: &Arc<Self>, event: ChangeEvent) {
        let Some(bucket_id) = event.bucket_id().map(str::to_string) else {
            return;
        };
        if event.operation == ChangeOperation::Drop {
            self.cancel_bucket(&bucket_id);
            return;
        }
        let Some(document_id) = event.document_id_hex() else {
            return;
        };

        match (event.operation, event.schedule()) {
            (ChangeOperation::Delete, _) | (_, None) => {
                self.cancel(&bucket_id, &document_id);
            }
            (_, Some(at)) => {
                if let Err(e) = self.schedule(&bucket_id, &document_id, at).await {
                    error!(
                        bucket_id = %bucket_id,
                        document_id = %document_id,
                        error = %e,
                        "Failed to publish scheduled document"
                    );
                }
            }
        }
    }

    /// Publishes the document at `at`, replacing any earlier timer.
    pub async fn schedule(
        self: &Arc<Self>,
        bucket_id: &str,
        document_id: &str,
        at: bson::DateTime,
    ) -> Result<(), StorageError> {
        let key = Self::timer_key(bucket_id, document_id);
        let delay = at.timestamp_millis() - bson::DateTime::now().timestamp_millis();

        if delay <= DUE_MARGIN_MS {
            self.cancel(bucket_id, document_id);
            publish(&self.store, bucket_id, document_id).await?;
            return Ok(());
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let scheduler = Arc::clone(self);
        let (bucket, document) = (bucket_id.to_string(), document_id.to_string());
        let timer_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay.unsigned_abs())).await;
            scheduler
                .timers
                .remove_if(&timer_key, |_, timer| timer.generation == generation);
            if let Err(e) = publish(&scheduler.store, &bucket, &document).await {
                error!(
                    bucket_id = %bucket,
                    document_id = %document,
                    error = %e,
                    "Failed to publish scheduled document"
                );
            }
        });

        if let Some(previous) = self.timers.insert(key, ArmedTimer { generation, handle }) {
            previous.handle.abort();
        }
        debug!(
            bucket_id = %bucket_id,
            document_id = %document_id,
            delay_ms = delay,
            "Publication timer armed"
        );
        Ok(())
    }

    /// Cancels the timer of one document. Returns true if one was armed.
    pub fn cancel(&self, bucket_id: &str, document_id: &str) -> bool {
        match self.timers.remove(&Self::timer_key(bucket_id, document_id)) {
            Some((_, timer)) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels every timer of a bucket.
    pub fn cancel_bucket(&self, bucket_id: &str) {
        let prefix = format!("{bucket_id}_");
        self.timers.retain(|key, timer| {
            if key.starts_with(&prefix) {
                timer.handle.abort();
                false
            } else {
                true
            }
        });
    }

    pub fn cancel_all(&self) {
        self.timers.retain(|_, timer| {
            timer.handle.abort();
            false
        });
    }

    pub fn is_scheduled(&self, bucket_id: &str, document_id: &str) -> bool {
        self.timers
            .contains_key(&Self::timer_key(bucket_id, document_id))
    }

    pub fn scheduled_count(&self) -> usize {
        self.timers.len()
    }
}

/// Unsets `_schedule`. Returns false when the document is gone or already
/// published.
async fn publish(store: &DynStore, bucket_id: &str, document_id: &str) -> Result<bool, StorageError> {
    let id = ObjectId::parse_str(document_id)
        .map(Bson::ObjectId)
        .unwrap_or_else(|_| Bson::String(document_id.to_string()));
    let previous = store
        .find_one_and_update(
            &bucket_collection(bucket_id),
            doc! { ID_FIELD: id, SCHEDULE_FIELD: { "$exists": true } },
            doc! { "$unset": { SCHEDULE_FIELD: "" } },
        )
        .await?;
    if previous.is_some() {
        info!(bucket_id = %bucket_id, document_id = %document_id, "Scheduled document published");
    }
    Ok(previous.is_some())
}

impl std::fmt::Debug for DocumentScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentScheduler")
            .field("scheduled", &self.timers.len())
            .finish()
    }
}
