//! Document store abstraction for the bucket engine.
//!
//! The engine never talks to a database directly. Everything it needs from
//! the document store (finds, aggregation pipelines, bulk updates, change
//! streams) goes through the [`DocumentStore`] trait defined here.
//!
//! # Overview
//!
//! - [`DocumentStore`] - the storage port every backend implements
//! - [`EventedStore`] - wrapper publishing [`ChangeEvent`]s after writes
//! - [`MemoryStore`] - in-memory store for embedding and tests
//! - [`StorageError`] - errors surfaced by backends
//!
//! Filters, updates and pipeline stages are BSON documents, so a
//! MongoDB-compatible backend can forward them untouched.

pub mod error;
pub mod evented;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::{ErrorCategory, StorageError};
pub use evented::EventedStore;
pub use memory::{MemoryStore, RecordedUpdate};
pub use traits::{ChangeStream, DocumentStore, DynStore};
pub use types::{FindOptions, UpdateOptions, UpdateResult, WatchFilter};

pub use bucket_core::events::{ChangeEvent, ChangeOperation};
