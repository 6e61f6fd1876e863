//! Bucket and document CRUD.
//!
//! Schema writes follow a fixed sequence: validate the ACL rules, persist,
//! migrate stored documents, invalidate the registry, notify listeners.
//! None of it is transactional; a failure between persisting and migrating
//! leaves stale fields behind until the write is retried.

use std::sync::Arc;

use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use bucket_core::{BucketSchema, ID_FIELD, RelationKind, bucket_collection, parse_object_id};
use bucket_pipeline::{
    AclEngine, BucketQuery, FindResult, Locale, PaginatedResult, PipelineBuilder,
    PreferenceSource, StaticPreferences,
};
use bucket_storage::{DynStore, UpdateOptions};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::QuerySettings;
use crate::differ::{SchemaDiffer, StructuralDiffer};
use crate::error::{Result, ServiceError};
use crate::history::{HistorySink, NoopHistory};
use crate::migration::{find_relations, unset_document, unset_paths};
use crate::registry::SchemaRegistry;

/// A document find.
#[derive(Debug, Clone, Default)]
pub struct FindRequest {
    pub query: BucketQuery,
    /// Authenticated principal exposed to ACL rules as `auth`.
    pub auth: Document,
    pub accept_language: Option<String>,
    /// Authorization filter applied ahead of everything else.
    pub resource_filter: Option<Document>,
    /// Dotted paths the caller selected. `None` selects every field.
    pub requested_fields: Option<Vec<String>>,
}

impl FindRequest {
    pub fn new(query: BucketQuery) -> Self {
        Self {
            query,
            ..Self::default()
        }
    }

    pub fn with_auth(mut self, auth: Document) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_language(mut self, accept_language: impl Into<String>) -> Self {
        self.accept_language = Some(accept_language.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindResponse {
    pub result: FindResult,
    /// Locale the documents were merged in, for `Content-Language`.
    pub locale: Option<Locale>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentResponse {
    pub document: Document,
    pub locale: Option<Locale>,
}

/// The CRUD orchestrator.
pub struct BucketService {
    store: DynStore,
    registry: Arc<SchemaRegistry>,
    acl: Arc<dyn AclEngine>,
    differ: Arc<dyn SchemaDiffer>,
    history: Arc<dyn HistorySink>,
    preferences: Arc<dyn PreferenceSource>,
    query: QuerySettings,
}

impl BucketService {
    pub fn new(store: DynStore, registry: Arc<SchemaRegistry>, acl: Arc<dyn AclEngine>) -> Self {
        Self {
            store,
            registry,
            acl,
            differ: Arc::new(StructuralDiffer),
            history: Arc::new(NoopHistory),
            preferences: Arc::new(StaticPreferences::default()),
            query: QuerySettings::default(),
        }
    }

    pub fn with_differ(mut self, differ: Arc<dyn SchemaDiffer>) -> Self {
        self.differ = differ;
        self
    }

    pub fn with_history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = history;
        self
    }

    pub fn with_preferences(mut self, preferences: Arc<dyn PreferenceSource>) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn with_query_settings(mut self, query: QuerySettings) -> Self {
        self.query = query;
        self
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn query_settings(&self) -> &QuerySettings {
        &self.query
    }

    // ==================== Schemas ====================

    /// Rejects schemas whose ACL rules do not parse.
    ///
    /// Rules are run against an empty context, so evaluation failures are
    /// expected and ignored. Empty rules are not validated.
    pub fn validate_acl(&self, schema: &BucketSchema) -> Result<()> {
        let empty = Document::new();
        for (name, rule) in [("read", &schema.acl.read), ("write", &schema.acl.write)] {
            if rule.trim().is_empty() {
                continue;
            }
            if let Err(e) = self.acl.run(rule, &empty)
                && e.is_parse()
            {
                return Err(ServiceError::schema_validation(format!(
                    "acl.{name}: {e}"
                )));
            }
        }
        Ok(())
    }

    pub async fn insert_schema(&self, schema: BucketSchema) -> Result<BucketSchema> {
        self.validate_acl(&schema)?;
        self.store
            .insert_one(self.registry.collection(), schema.to_document()?)
            .await?;
        info!(bucket_id = %schema.id_hex(), title = %schema.title, "Bucket created");

        self.registry.invalidate(&schema.id_hex());
        self.notify().await;
        Ok(schema)
    }

    /// Replaces a schema and unsets document fields it invalidated.
    pub async fn replace_schema(&self, schema: BucketSchema) -> Result<BucketSchema> {
        self.validate_acl(&schema)?;
        let bucket_id = schema.id_hex();

        let previous = self
            .store
            .find_one_and_replace(
                self.registry.collection(),
                doc! { ID_FIELD: schema.id },
                schema.to_document()?,
            )
            .await?
            .ok_or_else(|| ServiceError::bucket_not_found(&bucket_id))?;
        let previous = BucketSchema::from_document(previous)?;

        let changes = self.differ.diff(&previous, &schema);
        let paths = unset_paths(&changes);
        if let Some(update) = unset_document(&paths) {
            let result = self
                .store
                .update_many(
                    &schema.collection_name(),
                    Document::new(),
                    update,
                    UpdateOptions::default(),
                )
                .await?;
            info!(
                bucket_id = %bucket_id,
                fields = ?paths,
                modified = result.modified_count,
                "Unset fields invalidated by schema change"
            );
        }

        if previous.history
            && !schema.history
            && let Err(e) = self.history.clear_bucket(&bucket_id).await
        {
            warn!(bucket_id = %bucket_id, error = %e, "Failed to clear bucket history");
        }

        self.registry.invalidate(&bucket_id);
        self.notify().await;
        Ok(schema)
    }

    /// Removes a schema with its documents and history, then clears
    /// relations pointing at it from every other bucket.
    pub async fn remove_schema(&self, bucket_id: &str) -> Result<()> {
        let id = parse_object_id(bucket_id)?;
        let removed = self
            .store
            .find_one_and_delete(self.registry.collection(), doc! { ID_FIELD: id })
            .await?
            .ok_or_else(|| ServiceError::bucket_not_found(bucket_id))?;

        self.store.drop_collection(&bucket_collection(bucket_id)).await?;
        if let Err(e) = self.history.clear_bucket(bucket_id).await {
            warn!(bucket_id = %bucket_id, error = %e, "Failed to clear bucket history");
        }
        self.registry.invalidate(bucket_id);
        info!(
            bucket_id = %bucket_id,
            title = removed.get_str("title").unwrap_or_default(),
            "Bucket removed"
        );

        for sibling in self.registry.all().await? {
            let references = find_relations(&sibling.properties, bucket_id);
            if references.is_empty() {
                continue;
            }
            let schema_paths: Vec<String> =
                references.iter().map(|r| r.schema_path.clone()).collect();
            let data_paths: Vec<String> = references.iter().map(|r| r.data_path.clone()).collect();

            if let Some(update) = unset_document(&schema_paths) {
                self.store
                    .update_many(
                        self.registry.collection(),
                        doc! { ID_FIELD: sibling.id },
                        update,
                        UpdateOptions::default(),
                    )
                    .await?;
            }
            if let Some(update) = unset_document(&data_paths) {
                self.store
                    .update_many(
                        &sibling.collection_name(),
                        Document::new(),
                        update,
                        UpdateOptions::default(),
                    )
                    .await?;
            }
            self.registry.invalidate(&sibling.id_hex());
            debug!(
                bucket_id = %sibling.id_hex(),
                fields = ?data_paths,
                "Cleared relations to removed bucket"
            );
        }

        self.notify().await;
        Ok(())
    }

    async fn notify(&self) {
        if let Err(e) = self.registry.notify().await {
            warn!(error = %e, "Failed to notify bucket listeners");
        }
    }

    // ==================== Documents ====================

    pub async fn schema(&self, bucket_id: &str) -> Result<Arc<BucketSchema>> {
        self.registry
            .get(bucket_id)
            .await?
            .ok_or_else(|| ServiceError::bucket_not_found(bucket_id))
    }

    /// Runs a find through the full pipeline.
    pub async fn find(&self, bucket_id: &str, request: &FindRequest) -> Result<FindResponse> {
        let schema = self.schema(bucket_id).await?;
        let preferences = self.preferences.bucket_preferences().await?;
        let query = &request.query;

        let mut builder =
            PipelineBuilder::new(schema.clone(), self.registry.as_ref(), self.acl.as_ref());
        builder
            .filter_resources(request.resource_filter.clone())
            .filter_scheduled(query.schedule)
            .localize(
                query.localize,
                request.accept_language.as_deref(),
                &preferences.language,
                request.requested_fields.as_deref(),
            );
        builder.rules(&request.auth).await?;
        builder
            .filter_by_user_request(query.filter.as_ref(), &request.auth)
            .await?;
        builder
            .resolve_relation_path(&query.relation.paths(&schema))
            .await?;
        builder
            .sort(query.sort.clone())
            .skip(query.skip)
            .limit(self.query.effective_limit(query.limit))
            .paginate(query.paginate);

        let pipeline = builder.result();
        let locale = builder.locale().cloned();
        debug!(bucket_id = %bucket_id, stages = pipeline.len(), "Running find");

        let documents = self
            .store
            .aggregate(&schema.collection_name(), pipeline)
            .await?;
        let result = if query.paginate {
            FindResult::Paginated(PaginatedResult::from_facet(documents))
        } else {
            FindResult::List(documents)
        };
        Ok(FindResponse { result, locale })
    }

    /// Fetches one document, scheduled or not.
    pub async fn find_by_id(
        &self,
        bucket_id: &str,
        document_id: &str,
        request: &FindRequest,
    ) -> Result<DocumentResponse> {
        let id = parse_object_id(document_id)?;
        let schema = self.schema(bucket_id).await?;
        let preferences = self.preferences.bucket_preferences().await?;
        let query = &request.query;

        let mut builder =
            PipelineBuilder::new(schema.clone(), self.registry.as_ref(), self.acl.as_ref());
        builder
            .find_one_if_requested(Some(id))
            .filter_resources(request.resource_filter.clone())
            .localize(
                query.localize,
                request.accept_language.as_deref(),
                &preferences.language,
                request.requested_fields.as_deref(),
            );
        builder.rules(&request.auth).await?;
        builder
            .resolve_relation_path(&query.relation.paths(&schema))
            .await?;

        let pipeline = builder.result();
        let locale = builder.locale().cloned();
        let document = self
            .store
            .aggregate(&schema.collection_name(), pipeline)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::document_not_found(bucket_id, document_id))?;
        Ok(DocumentResponse { document, locale })
    }

    pub async fn insert_document(
        &self,
        bucket_id: &str,
        mut document: Document,
        auth: &Document,
    ) -> Result<Document> {
        let schema = self.schema(bucket_id).await?;
        self.authorize_write(&schema, auth, &document)?;

        let id = self
            .store
            .insert_one(&schema.collection_name(), document.clone())
            .await?;
        debug!(bucket_id = %bucket_id, document_id = %id, "Document inserted");
        document.insert(ID_FIELD, id);
        Ok(document)
    }

    pub async fn replace_document(
        &self,
        bucket_id: &str,
        document_id: &str,
        mut document: Document,
        auth: &Document,
    ) -> Result<Document> {
        let id = parse_object_id(document_id)?;
        let schema = self.schema(bucket_id).await?;
        document.remove(ID_FIELD);
        let current = with_id(document.clone(), id);
        self.authorize_write(&schema, auth, &current)?;

        let previous = self
            .store
            .find_one_and_replace(&schema.collection_name(), doc! { ID_FIELD: id }, document)
            .await?
            .ok_or_else(|| ServiceError::document_not_found(bucket_id, document_id))?;

        self.record_history(&schema, &previous, &current).await;
        Ok(current)
    }

    /// Applies a JSON merge patch; `null` members remove fields.
    pub async fn patch_document(
        &self,
        bucket_id: &str,
        document_id: &str,
        patch: &Value,
        auth: &Document,
    ) -> Result<Document> {
        let id = parse_object_id(document_id)?;
        let schema = self.schema(bucket_id).await?;
        let collection = schema.collection_name();

        let previous = self
            .store
            .find_one(&collection, doc! { ID_FIELD: id })
            .await?
            .ok_or_else(|| ServiceError::document_not_found(bucket_id, document_id))?;

        let mut target = Bson::Document(previous.clone()).into_relaxed_extjson();
        json_patch::merge(&mut target, patch);
        let Bson::Document(mut patched) =
            Bson::try_from(target).map_err(|e| ServiceError::invalid_document(e.to_string()))?
        else {
            return Err(ServiceError::invalid_document("patch must produce an object"));
        };
        patched.remove(ID_FIELD);
        let current = with_id(patched.clone(), id);
        self.authorize_write(&schema, auth, &current)?;

        self.store
            .find_one_and_replace(&collection, doc! { ID_FIELD: id }, patched)
            .await?
            .ok_or_else(|| ServiceError::document_not_found(bucket_id, document_id))?;

        self.record_history(&schema, &previous, &current).await;
        Ok(current)
    }

    /// Deletes a document, its history and every relation value pointing
    /// at it.
    pub async fn delete_document(
        &self,
        bucket_id: &str,
        document_id: &str,
        auth: &Document,
    ) -> Result<()> {
        let id = parse_object_id(document_id)?;
        let schema = self.schema(bucket_id).await?;
        let collection = schema.collection_name();

        let existing = self
            .store
            .find_one(&collection, doc! { ID_FIELD: id })
            .await?
            .ok_or_else(|| ServiceError::document_not_found(bucket_id, document_id))?;
        self.authorize_write(&schema, auth, &existing)?;

        self.store
            .find_one_and_delete(&collection, doc! { ID_FIELD: id })
            .await?
            .ok_or_else(|| ServiceError::document_not_found(bucket_id, document_id))?;

        if let Err(e) = self.history.delete_document(bucket_id, document_id).await {
            warn!(bucket_id = %bucket_id, document_id = %document_id, error = %e, "Failed to delete document history");
        }

        let id_hex = id.to_hex();
        for bucket in self.registry.all().await? {
            for reference in find_relations(&bucket.properties, bucket_id) {
                let path = reference.data_path.as_str();
                let update = match reference.kind {
                    RelationKind::OneToMany => doc! { "$pull": { path: id_hex.as_str() } },
                    _ => doc! { "$unset": { path: "" } },
                };
                let result = self
                    .store
                    .update_many(
                        &bucket.collection_name(),
                        doc! { path: id_hex.as_str() },
                        update,
                        UpdateOptions::default(),
                    )
                    .await?;
                if result.modified_count > 0 {
                    debug!(
                        bucket_id = %bucket.id_hex(),
                        field = %path,
                        modified = result.modified_count,
                        "Cleared references to deleted document"
                    );
                }
            }
        }
        Ok(())
    }

    fn authorize_write(
        &self,
        schema: &BucketSchema,
        auth: &Document,
        document: &Document,
    ) -> Result<()> {
        let rule = schema.acl.write.trim();
        if rule.is_empty() {
            return Ok(());
        }
        let context = doc! { "auth": auth.clone(), "document": document.clone() };
        if self.acl.run(rule, &context)? {
            Ok(())
        } else {
            Err(ServiceError::forbidden(format!(
                "write rule of bucket {} denied the request",
                schema.id_hex()
            )))
        }
    }

    async fn record_history(&self, schema: &BucketSchema, previous: &Document, current: &Document) {
        if !schema.history {
            return;
        }
        if let Err(e) = self
            .history
            .record(&schema.id_hex(), previous, current)
            .await
        {
            warn!(bucket_id = %schema.id_hex(), error = %e, "Failed to record history");
        }
    }
}

fn with_id(document: Document, id: ObjectId) -> Document {
    let mut identified = doc! { ID_FIELD: id };
    for (key, value) in document {
        identified.insert(key, value);
    }
    identified
}

impl std::fmt::Debug for BucketService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketService")
            .field("backend", &self.store.backend_name())
            .field("registry", &self.registry)
            .finish()
    }
}
