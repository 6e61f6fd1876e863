use thiserror::Error;

/// Core error types for bucket engine operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid object id: {0}")]
    InvalidId(String),

    #[error("Invalid bucket schema: {message}")]
    InvalidSchema { message: String },

    #[error("BSON serialization error: {0}")]
    BsonSerialization(#[from] bson::ser::Error),

    #[error("BSON deserialization error: {0}")]
    BsonDeserialization(#[from] bson::de::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a new InvalidId error
    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId(id.into())
    }

    /// Create a new InvalidSchema error
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    /// Check if this error was caused by caller input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidId(_) | Self::InvalidSchema { .. } | Self::JsonError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::invalid_id("zzz");
        assert_eq!(err.to_string(), "Invalid object id: zzz");

        let err = CoreError::invalid_schema("missing title");
        assert_eq!(err.to_string(), "Invalid bucket schema: missing title");
    }

    #[test]
    fn test_client_error_classification() {
        assert!(CoreError::invalid_id("x").is_client_error());
        assert!(CoreError::invalid_schema("x").is_client_error());
    }
}
