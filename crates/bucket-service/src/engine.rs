//! Engine wiring.
//!
//! [`BucketEngine`] assembles the registry, the orchestrator and the
//! scheduler over one store and runs their background tasks.

use std::sync::Arc;

use bucket_pipeline::{AclEngine, PreferenceSource, StaticPreferences};
use bucket_storage::DynStore;
use tokio::sync::{Mutex, watch};
use tracing::info;

use crate::config::EngineConfig;
use crate::crud::BucketService;
use crate::differ::{SchemaDiffer, StructuralDiffer};
use crate::error::Result;
use crate::history::{HistorySink, NoopHistory};
use crate::observability::apply_logging_level;
use crate::registry::SchemaRegistry;
use crate::scheduler::DocumentScheduler;

pub struct BucketEngineBuilder {
    config: EngineConfig,
    store: DynStore,
    acl: Arc<dyn AclEngine>,
    differ: Arc<dyn SchemaDiffer>,
    history: Arc<dyn HistorySink>,
    preferences: Arc<dyn PreferenceSource>,
}

impl BucketEngineBuilder {
    pub fn differ(mut self, differ: Arc<dyn SchemaDiffer>) -> Self {
        self.differ = differ;
        self
    }

    pub fn history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = history;
        self
    }

    pub fn preferences(mut self, preferences: Arc<dyn PreferenceSource>) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn build(self) -> BucketEngine {
        let registry = Arc::new(SchemaRegistry::new(
            self.store.clone(),
            self.config.storage.buckets_collection.clone(),
        ));
        let service = BucketService::new(self.store.clone(), registry.clone(), self.acl)
            .with_differ(self.differ)
            .with_history(self.history)
            .with_preferences(self.preferences)
            .with_query_settings(self.config.query.clone());
        let scheduler = DocumentScheduler::new(self.store, registry.clone());

        BucketEngine {
            config: self.config,
            registry,
            service: Arc::new(service),
            scheduler: Arc::new(scheduler),
            shutdown: Mutex::new(Vec::new()),
        }
    }
}

pub struct BucketEngine {
    config: EngineConfig,
    registry: Arc<SchemaRegistry>,
    service: Arc<BucketService>,
    scheduler: Arc<DocumentScheduler>,
    shutdown: Mutex<Vec<watch::Sender<bool>>>,
}

impl BucketEngine {
    pub fn builder(
        config: EngineConfig,
        store: DynStore,
        acl: Arc<dyn AclEngine>,
    ) -> BucketEngineBuilder {
        BucketEngineBuilder {
            config,
            store,
            acl,
            differ: Arc::new(StructuralDiffer),
            history: Arc::new(NoopHistory),
            preferences: Arc::new(StaticPreferences::default()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn service(&self) -> &Arc<BucketService> {
        &self.service
    }

    pub fn scheduler(&self) -> &Arc<DocumentScheduler> {
        &self.scheduler
    }

    /// Starts the background tasks enabled in the configuration.
    ///
    /// The scheduler subscribes to changes before overdue documents are
    /// published, so a document scheduled during recovery still gets a
    /// timer.
    pub async fn start(&self) -> Result<()> {
        apply_logging_level(&self.config.logging.level);
        let mut shutdown = self.shutdown.lock().await;

        if self.config.registry.watch {
            shutdown.push(self.registry.clone().watch().await?);
        }
        if self.config.scheduler.enabled {
            shutdown.push(self.scheduler.clone().start().await?);
            if self.config.scheduler.recover_on_start {
                self.scheduler.recover().await?;
            }
        }

        info!(
            backend = self.registry.store().backend_name(),
            registry_watch = self.config.registry.watch,
            scheduler = self.config.scheduler.enabled,
            "Bucket engine started"
        );
        Ok(())
    }

    /// Stops the background tasks and aborts armed timers.
    pub async fn shutdown(&self) {
        for sender in self.shutdown.lock().await.drain(..) {
            let _ = sender.send(true);
        }
        self.scheduler.cancel_all();
        info!("Bucket engine stopped");
    }
}
