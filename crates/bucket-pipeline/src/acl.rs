//! Port to the ACL expression engine.
//!
//! ACL rules are boolean expressions over `{auth, document}`. Parsing and
//! evaluating them is the engine's job; the pipeline only needs three
//! operations from it.

use bson::Document;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AclError {
    /// The expression is not syntactically valid.
    #[error("Invalid ACL expression: {message}")]
    Parse { message: String },

    /// The expression parsed but could not be evaluated in the given context.
    #[error("ACL evaluation failed: {message}")]
    Evaluation { message: String },
}

impl AclError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
        }
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}

/// The ACL expression engine.
pub trait AclEngine: Send + Sync {
    /// Document property paths the expression reads, relative to
    /// `document` and dotted (`author.name`).
    fn extract_property_map(&self, expression: &str) -> Result<Vec<String>, AclError>;

    /// Compiles the expression into a `$match` condition, binding every
    /// non-document identifier from `context` (usually `{auth}`).
    fn aggregate(&self, expression: &str, context: &Document) -> Result<Document, AclError>;

    /// Evaluates the expression against `context` (`{auth, document}`).
    fn run(&self, expression: &str, context: &Document) -> Result<bool, AclError>;
}
