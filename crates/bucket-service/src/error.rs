//! Service error types.

use bucket_core::CoreError;
use bucket_pipeline::{AclError, PipelineError};
use bucket_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// A schema's ACL rules failed to parse; nothing was persisted.
    #[error("Schema validation failed: {message}")]
    SchemaValidation { message: String },

    #[error("Bucket not found: {bucket_id}")]
    BucketNotFound { bucket_id: String },

    #[error("Document not found: {bucket_id}/{document_id}")]
    DocumentNotFound {
        bucket_id: String,
        document_id: String,
    },

    /// The bucket's write rule denied the operation.
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Invalid document: {message}")]
    InvalidDocument { message: String },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ServiceError {
    pub fn schema_validation(message: impl Into<String>) -> Self {
        Self::SchemaValidation {
            message: message.into(),
        }
    }

    pub fn bucket_not_found(bucket_id: impl Into<String>) -> Self {
        Self::BucketNotFound {
            bucket_id: bucket_id.into(),
        }
    }

    pub fn document_not_found(bucket_id: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self::DocumentNotFound {
            bucket_id: bucket_id.into(),
            document_id: document_id.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::BucketNotFound { .. } | Self::DocumentNotFound { .. }
        ) || matches!(self, Self::Storage(err) if err.is_not_found())
    }

    /// Returns true for errors caused by the request rather than the engine.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::SchemaValidation { .. }
            | Self::BucketNotFound { .. }
            | Self::DocumentNotFound { .. }
            | Self::Forbidden { .. }
            | Self::InvalidDocument { .. } => true,
            Self::Pipeline(PipelineError::Acl(_)) => true,
            Self::Core(err) => err.is_client_error(),
            _ => false,
        }
    }
}

impl From<AclError> for ServiceError {
    fn from(err: AclError) -> Self {
        Self::Pipeline(PipelineError::Acl(err))
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(ServiceError::forbidden("no").is_client_error());
        assert!(ServiceError::from(AclError::parse("bad")).is_client_error());
        assert!(!ServiceError::from(StorageError::connection_error("down")).is_client_error());
        assert!(ServiceError::from(CoreError::invalid_id("zz")).is_client_error());
    }

    #[test]
    fn test_not_found() {
        assert!(ServiceError::document_not_found("b", "d").is_not_found());
        assert!(ServiceError::from(StorageError::not_found("bucket_b", "d")).is_not_found());
        assert_eq!(
            ServiceError::bucket_not_found("abc").to_string(),
            "Bucket not found: abc"
        );
    }
}
