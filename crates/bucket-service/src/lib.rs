//! # bucket-service
//!
//! Orchestration layer of the bucket engine:
//!
//! - [`crud`] - bucket schema and document CRUD with ACL checks
//! - [`differ`] / [`migration`] - schema diffs and the field unsets they imply
//! - [`registry`] - the compiled-schema cache and change listeners
//! - [`scheduler`] - future publication of scheduled documents
//! - [`history`] - the history sink port
//! - [`engine`] - wiring of all of the above from an [`EngineConfig`]
//! - [`config`] / [`observability`] - configuration loading and tracing setup

pub mod config;
pub mod crud;
pub mod differ;
pub mod engine;
pub mod error;
pub mod history;
pub mod migration;
pub mod observability;
pub mod registry;
pub mod scheduler;

pub use config::{EngineConfig, GraphQLConfig};
pub use crud::{BucketService, DocumentResponse, FindRequest, FindResponse};
pub use differ::{ChangeKind, ChangeRecord, SchemaDiffer, StructuralDiffer};
pub use engine::{BucketEngine, BucketEngineBuilder};
pub use error::{Result, ServiceError};
pub use history::{HistorySink, NoopHistory};
pub use registry::{BucketChangeListener, SchemaRegistry};
pub use scheduler::DocumentScheduler;
