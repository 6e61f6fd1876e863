//! # bucket-core
//!
//! Core types shared by every bucket engine crate:
//!
//! - [`schema`] - bucket schema and property definitions
//! - [`document`] - well-known document fields and collection naming
//! - [`preferences`] - language preferences used for localization
//! - [`events`] - storage change events and their broadcaster
//! - [`error`] - core error type

pub mod document;
pub mod error;
pub mod events;
pub mod preferences;
pub mod schema;

pub use document::{
    BUCKET_COLLECTION_PREFIX, BUCKETS_COLLECTION, ID_FIELD, SCHEDULE_FIELD, bucket_collection,
    bucket_id_from_collection, parse_object_id,
};
pub use error::{CoreError, Result};
pub use events::{ChangeBroadcaster, ChangeEvent, ChangeOperation};
pub use preferences::{BucketPreferences, LanguagePreference};
pub use schema::{
    BucketAcl, BucketSchema, Properties, PropertyOptions, PropertySpec, PropertyType, RelationKind,
};
