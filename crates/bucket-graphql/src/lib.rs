//! # bucket-graphql
//!
//! GraphQL API over bucket schemas.
//!
//! Every live bucket becomes an object type `Bucket_{id}` with an input
//! type, a paginated find, a find by id and four mutations. The schema is
//! synthesized from the bucket definitions and rebuilt whenever they
//! change:
//!
//! - Property names that are not valid GraphQL names are sanitized
//! - Enum members that are not valid GraphQL enum values degrade the field
//!   to `String` on the query side
//! - Relations to missing buckets degrade to id strings
//!
//! Each degradation is reported as a [`Diagnostic`] instead of failing the
//! whole schema.
//!
//! ## Configuration
//!
//! ```toml
//! [graphql]
//! enabled = true
//! max_depth = 15
//! max_complexity = 500
//! introspection = true
//! ```
//!
//! `enabled` is for the embedding server to decide whether to mount the
//! schema; the limits apply to every snapshot.
//!
//! ## Modules
//!
//! - [`schema`] - type synthesis, SDL rendering and the executable schema
//! - [`snapshot`] - the live schema, rebuilt on bucket changes
//! - [`filter`] - translation of the `query` argument
//! - [`value`] - document and GraphQL value conversion
//! - [`context`] - per-request execution context
//! - [`error`] - error types for GraphQL operations

pub mod config;
pub mod context;
pub mod error;
pub mod filter;
mod resolvers;
pub mod schema;
pub mod selection;
pub mod snapshot;
pub mod value;

pub use config::{GraphQLConfig, SchemaBuilderConfig};
pub use context::GraphQLContext;
pub use error::GraphQLError;
pub use filter::translate_filter;
pub use schema::{BucketSchemaBuilder, Diagnostic, Synthesis, create_schema, synthesize};
pub use snapshot::{GraphQLSchemaHandle, SchemaSnapshot};

/// Result type for GraphQL operations.
pub type Result<T> = std::result::Result<T, GraphQLError>;
