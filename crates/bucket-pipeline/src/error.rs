//! Pipeline error types.

use bucket_core::CoreError;
use bucket_storage::StorageError;
use thiserror::Error;

use crate::acl::AclError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The ACL engine rejected or failed to evaluate an expression.
    #[error(transparent)]
    Acl(#[from] AclError),

    /// Storage errors bubble up unchanged.
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl PipelineError {
    pub fn is_acl(&self) -> bool {
        matches!(self, Self::Acl(_))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
