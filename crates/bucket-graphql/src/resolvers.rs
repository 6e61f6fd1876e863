//! Root field resolvers.
//!
//! Each bucket contributes `Find`, `FindBy..Id`, `insert`, `replace`,
//! `patch` and `delete` root fields. Resolvers translate arguments, call the
//! [`BucketService`](bucket_service::BucketService) from the request's
//! [`GraphQLContext`], and convert results through the shared
//! [`TypeIndex`].

use std::collections::HashMap;
use std::sync::Arc;

use async_graphql::dynamic::{FieldFuture, ResolverContext};
use async_graphql::{ErrorExtensions, Name, Number, Value};
use bson::{Bson, Document};
use bucket_core::{BucketSchema, ID_FIELD};
use bucket_pipeline::{BucketQuery, FindResult, RelationRequest, UserFilter};
use bucket_service::{FindRequest, ServiceError};
use tracing::debug;

use crate::context::GraphQLContext;
use crate::error::GraphQLError;
use crate::filter::translate_filter;
use crate::selection::{FieldTree, requested_fields};
use crate::value::TypeIndex;

/// Helper to extract GraphQL context from resolver context.
pub(crate) fn get_graphql_context<'a>(
    ctx: &'a ResolverContext<'_>,
) -> Result<&'a GraphQLContext, async_graphql::Error> {
    ctx.data::<GraphQLContext>()
        .map_err(|_| GraphQLError::ContextMissing.extend())
}

fn service_error(err: ServiceError) -> async_graphql::Error {
    GraphQLError::from(err).extend()
}

fn id_arg<'a>(ctx: &'a ResolverContext<'_>) -> Result<&'a str, async_graphql::Error> {
    ctx.args
        .get(ID_FIELD)
        .and_then(|v| v.string().ok())
        .ok_or_else(|| {
            GraphQLError::InvalidArgument("missing required argument '_id'".to_string()).extend()
        })
}

fn string_arg(ctx: &ResolverContext<'_>, name: &str) -> Option<String> {
    ctx.args
        .get(name)
        .and_then(|v| v.string().ok())
        .map(str::to_string)
}

fn count_arg(ctx: &ResolverContext<'_>, name: &str) -> Option<u64> {
    ctx.args
        .get(name)
        .and_then(|v| v.i64().ok())
        .and_then(|n| u64::try_from(n).ok())
}

fn json_arg(ctx: &ResolverContext<'_>, name: &str) -> Option<serde_json::Value> {
    ctx.args
        .get(name)
        .filter(|v| !v.is_null())
        .and_then(|v| v.as_value().clone().into_json().ok())
}

fn value_arg(ctx: &ResolverContext<'_>, name: &str) -> Value {
    ctx.args
        .get(name)
        .map(|v| v.as_value().clone())
        .unwrap_or(Value::Null)
}

/// Everything a bucket's resolvers share.
#[derive(Clone)]
pub(crate) struct BucketOperations {
    pub bucket_id: String,
    pub type_name: String,
    pub input_name: String,
    pub index: Arc<TypeIndex>,
    pub buckets: Arc<HashMap<String, Arc<BucketSchema>>>,
}

impl BucketOperations {
    /// Document paths selected under the current field.
    fn requested(&self, ctx: &ResolverContext<'_>, flatten: Option<&str>) -> Vec<String> {
        let tree = FieldTree::from_selection(ctx.field());
        let paths = requested_fields(&tree.children, flatten);
        self.index.source_paths(&self.type_name, &paths)
    }

    fn filter(&self, ctx: &ResolverContext<'_>) -> Option<UserFilter> {
        let query = json_arg(ctx, "query")?;
        let properties = self
            .buckets
            .get(&self.bucket_id)
            .map(|bucket| &bucket.properties)?;
        let translated = translate_filter(&query, properties, &self.buckets);
        (!translated.is_empty()).then_some(UserFilter::Document(translated))
    }

    fn request(
        &self,
        gql: &GraphQLContext,
        query: BucketQuery,
        language: Option<String>,
        requested: Vec<String>,
    ) -> FindRequest {
        FindRequest {
            query,
            auth: gql.auth.clone(),
            accept_language: language.or_else(|| gql.accept_language.clone()),
            resource_filter: None,
            requested_fields: Some(requested),
        }
    }

    fn output(&self, document: &Document) -> Value {
        self.index.output_document(document, &self.type_name)
    }

    fn input(&self, value: &Value) -> Result<Document, async_graphql::Error> {
        if matches!(value, Value::Null) {
            return Ok(Document::new());
        }
        self.index
            .input_document(value, &self.input_name)
            .map_err(|e| e.extend())
    }

    /// Re-reads a written document so relations and locale apply. A
    /// document the read rule hides is returned as written.
    async fn respond(
        &self,
        gql: &GraphQLContext,
        requested: Vec<String>,
        written: Document,
    ) -> Result<Option<Value>, async_graphql::Error> {
        let Ok(id) = written.get_object_id(ID_FIELD) else {
            return Ok(Some(self.output(&written)));
        };
        let query = BucketQuery {
            relation: RelationRequest::Paths(requested.clone()),
            ..BucketQuery::default()
        };
        let request = self.request(gql, query, None, requested);
        match gql
            .service
            .find_by_id(&self.bucket_id, &id.to_hex(), &request)
            .await
        {
            Ok(response) => Ok(Some(self.output(&response.document))),
            Err(e) if e.is_not_found() => Ok(Some(self.output(&written))),
            Err(e) => Err(service_error(e)),
        }
    }
}

/// Builds the `{ meta { total } data [...] }` value of a find.
fn find_response(total: i64, data: Vec<Value>) -> Value {
    let meta = Value::Object(
        [(Name::new("total"), Value::Number(Number::from(total)))]
            .into_iter()
            .collect(),
    );
    Value::Object(
        [(Name::new("meta"), meta), (Name::new("data"), Value::List(data))]
            .into_iter()
            .collect(),
    )
}

/// Resolver for `Find{Bucket}`.
pub(crate) fn find(
    ops: BucketOperations,
) -> impl Fn(ResolverContext<'_>) -> FieldFuture<'_> + Send + Sync + Clone {
    move |ctx| {
        let ops = ops.clone();
        FieldFuture::new(async move {
            let gql = get_graphql_context(&ctx)?;
            let requested = ops.requested(&ctx, Some("data"));
            let sort = json_arg(&ctx, "sort").and_then(|json| match Bson::try_from(json) {
                Ok(Bson::Document(sort)) => Some(sort),
                _ => None,
            });
            let query = BucketQuery {
                relation: RelationRequest::Paths(requested.clone()),
                paginate: true,
                schedule: ctx
                    .args
                    .get("schedule")
                    .and_then(|v| v.boolean().ok())
                    .unwrap_or(false),
                localize: true,
                filter: ops.filter(&ctx),
                limit: count_arg(&ctx, "limit"),
                skip: count_arg(&ctx, "skip"),
                sort,
            };

            debug!(
                bucket_id = %ops.bucket_id,
                request_id = %gql.request_id,
                requested = ?requested,
                "Resolving find"
            );
            let request = ops.request(gql, query, string_arg(&ctx, "language"), requested);
            let response = gql
                .service
                .find(&ops.bucket_id, &request)
                .await
                .map_err(service_error)?;

            let (total, documents) = match response.result {
                FindResult::Paginated(page) => (page.meta.total, page.data),
                FindResult::List(documents) => (documents.len() as i64, documents),
            };
            let data = documents.iter().map(|d| ops.output(d)).collect();
            Ok(Some(find_response(total, data)))
        })
    }
}

/// Resolver for `FindBy{Bucket}Id`. A missing document resolves to null.
pub(crate) fn find_by_id(
    ops: BucketOperations,
) -> impl Fn(ResolverContext<'_>) -> FieldFuture<'_> + Send + Sync + Clone {
    move |ctx| {
        let ops = ops.clone();
        FieldFuture::new(async move {
            let gql = get_graphql_context(&ctx)?;
            let id = id_arg(&ctx)?;
            let requested = ops.requested(&ctx, None);
            let query = BucketQuery {
                relation: RelationRequest::Paths(requested.clone()),
                ..BucketQuery::default()
            };
            let request = ops.request(gql, query, string_arg(&ctx, "language"), requested);

            match gql.service.find_by_id(&ops.bucket_id, id, &request).await {
                Ok(response) => Ok(Some(ops.output(&response.document))),
                Err(e) if e.is_not_found() => {
                    debug!(bucket_id = %ops.bucket_id, document_id = %id, "Document not found");
                    Ok(None)
                }
                Err(e) => Err(service_error(e)),
            }
        })
    }
}

/// Resolver for `insert{Bucket}`.
pub(crate) fn insert(
    ops: BucketOperations,
) -> impl Fn(ResolverContext<'_>) -> FieldFuture<'_> + Send + Sync + Clone {
    move |ctx| {
        let ops = ops.clone();
        FieldFuture::new(async move {
            let gql = get_graphql_context(&ctx)?;
            let document = ops.input(&value_arg(&ctx, "input"))?;
            let requested = ops.requested(&ctx, None);

            let inserted = gql
                .service
                .insert_document(&ops.bucket_id, document, &gql.auth)
                .await
                .map_err(service_error)?;
            ops.respond(gql, requested, inserted).await
        })
    }
}

/// Resolver for `replace{Bucket}`.
pub(crate) fn replace(
    ops: BucketOperations,
) -> impl Fn(ResolverContext<'_>) -> FieldFuture<'_> + Send + Sync + Clone {
    move |ctx| {
        let ops = ops.clone();
        FieldFuture::new(async move {
            let gql = get_graphql_context(&ctx)?;
            let id = id_arg(&ctx)?;
            let document = ops.input(&value_arg(&ctx, "input"))?;
            let requested = ops.requested(&ctx, None);

            let replaced = gql
                .service
                .replace_document(&ops.bucket_id, id, document, &gql.auth)
                .await
                .map_err(service_error)?;
            ops.respond(gql, requested, replaced).await
        })
    }
}

/// Resolver for `patch{Bucket}`. The input is a JSON merge patch keyed by
/// document property names.
pub(crate) fn patch(
    ops: BucketOperations,
) -> impl Fn(ResolverContext<'_>) -> FieldFuture<'_> + Send + Sync + Clone {
    move |ctx| {
        let ops = ops.clone();
        FieldFuture::new(async move {
            let gql = get_graphql_context(&ctx)?;
            let id = id_arg(&ctx)?;
            let patch = json_arg(&ctx, "input").unwrap_or(serde_json::Value::Null);
            if !patch.is_object() {
                return Err(
                    GraphQLError::InvalidArgument("patch input must be an object".to_string())
                        .extend(),
                );
            }
            let requested = ops.requested(&ctx, None);

            let patched = gql
                .service
                .patch_document(&ops.bucket_id, id, &patch, &gql.auth)
                .await
                .map_err(service_error)?;
            ops.respond(gql, requested, patched).await
        })
    }
}

/// Resolver for `delete{Bucket}`. Returns the deleted id.
pub(crate) fn delete(
    ops: BucketOperations,
) -> impl Fn(ResolverContext<'_>) -> FieldFuture<'_> + Send + Sync + Clone {
    move |ctx| {
        let ops = ops.clone();
        FieldFuture::new(async move {
            let gql = get_graphql_context(&ctx)?;
            let id = id_arg(&ctx)?;
            gql.service
                .delete_document(&ops.bucket_id, id, &gql.auth)
                .await
                .map_err(service_error)?;
            Ok(Some(Value::String(id.to_string())))
        })
    }
}
