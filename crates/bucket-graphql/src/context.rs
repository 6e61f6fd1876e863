//! GraphQL execution context.
//!
//! The context is constructed per request and attached to the request with
//! `Request::data`. Resolvers reach the engine only through it.

use std::sync::Arc;

use bson::Document;
use bucket_service::BucketService;

/// Per-request execution context.
#[derive(Clone)]
pub struct GraphQLContext {
    pub service: Arc<BucketService>,

    /// Authenticated principal, exposed to ACL rules as `auth`.
    pub auth: Document,

    /// `Accept-Language` of the request; a `language` argument wins over it.
    pub accept_language: Option<String>,

    /// Request ID for tracing and correlation.
    pub request_id: String,
}

impl GraphQLContext {
    pub fn new(service: Arc<BucketService>) -> Self {
        Self {
            service,
            auth: Document::new(),
            accept_language: None,
            request_id: String::new(),
        }
    }

    pub fn with_auth(mut self, auth: Document) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_accept_language(mut self, accept_language: impl Into<String>) -> Self {
        self.accept_language = Some(accept_language.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

impl std::fmt::Debug for GraphQLContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphQLContext")
            .field("auth", &self.auth)
            .field("accept_language", &self.accept_language)
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}
