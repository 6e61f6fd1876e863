//! # bucket-pipeline
//!
//! Turns a bucket schema plus a request into a document-store aggregation
//! pipeline.
//!
//! - [`relation`] - relation maps bounded by requested paths, and the
//!   `$lookup` stages they produce
//! - [`locale`] - language negotiation and the i18n merge stage
//! - [`builder`] - the ordered, conditional [`PipelineBuilder`]
//! - [`acl`] - the port to the ACL expression engine
//! - [`filter`] - REST filter parsing with typed-literal revival
//! - [`query`] - REST query parameters
//! - [`result`] - normalization of paginated results

pub mod acl;
pub mod builder;
pub mod error;
pub mod filter;
pub mod locale;
pub mod query;
pub mod relation;
pub mod result;

pub use acl::{AclEngine, AclError};
pub use builder::PipelineBuilder;
pub use error::{PipelineError, Result};
pub use filter::{UserFilter, parse_filter, property_paths};
pub use locale::{Locale, PreferenceSource, StaticPreferences, find_locale};
pub use query::{BucketQuery, RelationRequest};
pub use relation::{
    LookupSource, RelationMap, RelationNode, SchemaResolver, create_relation_map,
    get_relation_pipeline,
};
pub use result::{FindResult, Meta, PaginatedResult};
