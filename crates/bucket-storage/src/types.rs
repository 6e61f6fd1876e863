//! Option and result types used by the storage port.

use bson::Document;
use bucket_core::{BUCKET_COLLECTION_PREFIX, ChangeEvent};
use serde::{Deserialize, Serialize};

/// Options for [`DocumentStore::find`](crate::DocumentStore::find).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub projection: Option<Document>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }
}

/// Options for bulk updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOptions {
    /// Filters binding `$[identifier]` placeholders in the update paths.
    pub array_filters: Option<Vec<Document>>,
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn with_array_filters(array_filters: Vec<Document>) -> Self {
        Self {
            array_filters: Some(array_filters),
            upsert: false,
        }
    }
}

/// Outcome of a bulk update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

impl UpdateResult {
    pub fn new(matched_count: u64, modified_count: u64) -> Self {
        Self {
            matched_count,
            modified_count,
        }
    }
}

/// Selects which collections a change stream reports on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchFilter {
    /// Every collection.
    All,
    /// A single collection.
    Collection(String),
    /// Every collection whose name starts with the prefix.
    Prefix(String),
}

impl WatchFilter {
    /// Watches every bucket data collection.
    pub fn bucket_data() -> Self {
        Self::Prefix(BUCKET_COLLECTION_PREFIX.to_string())
    }

    pub fn collection(name: impl Into<String>) -> Self {
        Self::Collection(name.into())
    }

    /// Returns true if the event belongs to this stream.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        match self {
            Self::All => true,
            Self::Collection(name) => event.collection == *name,
            Self::Prefix(prefix) => event.collection.starts_with(prefix.as_str()),
        }
    }
}
