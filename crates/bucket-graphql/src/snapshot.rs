//! Live schema snapshot.
//!
//! [`GraphQLSchemaHandle`] owns the executable schema for the current bucket
//! set. It listens to the schema registry and swaps in a new snapshot after
//! every bucket change; requests already running keep the snapshot they
//! started with.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_graphql::dynamic::Schema;
use async_graphql::{Request, Response, ServerError};
use async_trait::async_trait;
use bucket_core::BucketSchema;
use bucket_service::{BucketChangeListener, BucketEngine, BucketService};
use tracing::{error, info, warn};

use crate::config::SchemaBuilderConfig;
use crate::context::GraphQLContext;
use crate::error::GraphQLError;
use crate::schema::ast::Diagnostic;
use crate::schema::builder::BucketSchemaBuilder;
use crate::schema::synthesizer::synthesize;

/// One built schema and what it was built from.
pub struct SchemaSnapshot {
    pub sdl: String,
    pub schema: Schema,
    pub diagnostics: Vec<Diagnostic>,
    pub bucket_count: usize,
}

impl std::fmt::Debug for SchemaSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaSnapshot")
            .field("bucket_count", &self.bucket_count)
            .field("diagnostics", &self.diagnostics.len())
            .finish_non_exhaustive()
    }
}

pub struct GraphQLSchemaHandle {
    service: Arc<BucketService>,
    config: SchemaBuilderConfig,
    current: ArcSwapOption<SchemaSnapshot>,
}

impl GraphQLSchemaHandle {
    pub fn new(service: Arc<BucketService>, config: SchemaBuilderConfig) -> Self {
        Self {
            service,
            config,
            current: ArcSwapOption::empty(),
        }
    }

    /// Creates a handle for an engine, builds the first snapshot and
    /// subscribes to bucket changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket list cannot be read or the first
    /// schema fails to build.
    pub async fn from_engine(engine: &BucketEngine) -> Result<Arc<Self>, GraphQLError> {
        let config = SchemaBuilderConfig::from(&engine.config().graphql);
        let handle = Arc::new(Self::new(engine.service().clone(), config));
        handle.rebuild().await?;
        engine
            .registry()
            .register_listener(handle.clone() as Arc<dyn BucketChangeListener>)
            .await;
        Ok(handle)
    }

    /// Reads every bucket and installs a fresh snapshot.
    pub async fn rebuild(&self) -> Result<Arc<SchemaSnapshot>, GraphQLError> {
        let buckets = self.service.registry().all().await?;
        self.install(&buckets)
    }

    /// Builds a snapshot for `buckets` and makes it current. On failure the
    /// previous snapshot stays in place.
    pub fn install(&self, buckets: &[Arc<BucketSchema>]) -> Result<Arc<SchemaSnapshot>, GraphQLError> {
        let synthesis = synthesize(buckets);
        let schema = match BucketSchemaBuilder::new(self.config.clone()).build(&synthesis, buckets)
        {
            Ok(schema) => schema,
            Err(e) => {
                error!(error = %e, buckets = buckets.len(), "GraphQL schema rebuild failed, keeping previous schema");
                return Err(e);
            }
        };

        let snapshot = Arc::new(SchemaSnapshot {
            sdl: synthesis.sdl,
            schema,
            diagnostics: synthesis.diagnostics,
            bucket_count: buckets.len(),
        });
        self.current.store(Some(snapshot.clone()));
        info!(
            buckets = snapshot.bucket_count,
            diagnostics = snapshot.diagnostics.len(),
            "GraphQL schema installed"
        );
        Ok(snapshot)
    }

    pub fn snapshot(&self) -> Option<Arc<SchemaSnapshot>> {
        self.current.load_full()
    }

    /// SDL of the current snapshot.
    pub fn sdl(&self) -> Option<String> {
        self.snapshot().map(|snapshot| snapshot.sdl.clone())
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.snapshot()
            .map(|snapshot| snapshot.diagnostics.clone())
            .unwrap_or_default()
    }

    /// Executes a request against the current snapshot, building one first
    /// if none exists yet.
    pub async fn execute(&self, request: Request, context: GraphQLContext) -> Response {
        let snapshot = match self.snapshot() {
            Some(snapshot) => snapshot,
            None => match self.rebuild().await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(error = %e, "No GraphQL schema available");
                    return Response::from_errors(vec![ServerError::new(e.to_string(), None)]);
                }
            },
        };
        snapshot.schema.execute(request.data(context)).await
    }
}

impl std::fmt::Debug for GraphQLSchemaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphQLSchemaHandle")
            .field("config", &self.config)
            .field("current", &self.snapshot())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BucketChangeListener for GraphQLSchemaHandle {
    async fn on_buckets_changed(&self, buckets: &[Arc<BucketSchema>]) {
        // Failures are logged by install and leave the old snapshot serving.
        let _ = self.install(buckets);
    }
}
