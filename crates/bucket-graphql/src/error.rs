//! Error types for GraphQL operations.
//!
//! Errors are converted to `async_graphql::Error` at the resolver boundary
//! through [`ErrorExtensions::extend`], carrying [`GraphQLError::error_code`]
//! as the `code` extension.

use std::fmt;

use async_graphql::ErrorExtensions;
use bucket_service::ServiceError;
use bucket_storage::StorageError;

/// Errors that can occur during GraphQL operations.
#[derive(Debug)]
pub enum GraphQLError {
    /// The executable schema could not be built.
    SchemaBuildFailed(String),

    /// The per-request context was not attached to the request.
    ContextMissing,

    /// An argument could not be interpreted.
    InvalidArgument(String),

    /// The bucket's write rule denied the operation.
    Forbidden(String),

    NotFound {
        bucket_id: String,
        document_id: Option<String>,
    },

    /// Storage error.
    Storage(String),

    /// Internal error.
    Internal(String),
}

impl fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemaBuildFailed(msg) => {
                write!(f, "Failed to build GraphQL schema: {msg}")
            }
            Self::ContextMissing => write!(f, "GraphQL context not available"),
            Self::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            Self::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            Self::NotFound {
                bucket_id,
                document_id: Some(document_id),
            } => write!(f, "{bucket_id}/{document_id} not found"),
            Self::NotFound {
                bucket_id,
                document_id: None,
            } => write!(f, "Bucket {bucket_id} not found"),
            Self::Storage(msg) => write!(f, "Storage error: {msg}"),
            Self::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for GraphQLError {}

impl GraphQLError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::SchemaBuildFailed(_) | Self::ContextMissing => 500,
            Self::InvalidArgument(_) => 400,
            Self::Forbidden(_) => 403,
            Self::NotFound { .. } => 404,
            Self::Storage(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns the error code for GraphQL error extensions.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SchemaBuildFailed(_) => "SCHEMA_BUILD_FAILED",
            Self::ContextMissing => "CONTEXT_MISSING",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<ServiceError> for GraphQLError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Forbidden { message } => Self::Forbidden(message),
            ServiceError::BucketNotFound { bucket_id } => Self::NotFound {
                bucket_id,
                document_id: None,
            },
            ServiceError::DocumentNotFound {
                bucket_id,
                document_id,
            } => Self::NotFound {
                bucket_id,
                document_id: Some(document_id),
            },
            ServiceError::Storage(e) => Self::Storage(e.to_string()),
            other if other.is_client_error() => Self::InvalidArgument(other.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<StorageError> for GraphQLError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl ErrorExtensions for GraphQLError {
    fn extend(&self) -> async_graphql::Error {
        let code = self.error_code();
        async_graphql::Error::new(self.to_string()).extend_with(|_, ext| ext.set("code", code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucket_pipeline::AclError;

    #[test]
    fn test_status_codes() {
        assert_eq!(GraphQLError::InvalidArgument("x".into()).status_code(), 400);
        assert_eq!(GraphQLError::Forbidden("x".into()).status_code(), 403);
        assert_eq!(
            GraphQLError::NotFound {
                bucket_id: "b".into(),
                document_id: None
            }
            .status_code(),
            404
        );
    }

    #[test]
    fn test_service_error_mapping() {
        let err = GraphQLError::from(ServiceError::document_not_found("b", "d"));
        assert_eq!(err.to_string(), "b/d not found");

        let err = GraphQLError::from(ServiceError::from(AclError::parse("bad")));
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");

        let err = GraphQLError::from(ServiceError::forbidden("no"));
        assert_eq!(err.error_code(), "FORBIDDEN");
    }

    #[test]
    fn test_conversion_carries_code() {
        let err = GraphQLError::ContextMissing.extend();
        assert_eq!(err.message, "GraphQL context not available");
        assert!(err.extensions.is_some());
    }
}
