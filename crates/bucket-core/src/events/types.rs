//! Change event types.

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::document::{SCHEDULE_FIELD, bucket_id_from_collection};

/// Kind of write that produced a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Insert,
    Update,
    Replace,
    Delete,
    /// The whole collection was dropped.
    Drop,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Insert => "insert",
            ChangeOperation::Update => "update",
            ChangeOperation::Replace => "replace",
            ChangeOperation::Delete => "delete",
            ChangeOperation::Drop => "drop",
        }
    }
}

impl std::fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single change on a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub operation: ChangeOperation,
    /// Collection the change happened in.
    pub collection: String,
    /// `_id` of the affected document (None for drops).
    pub document_key: Option<Bson>,
    /// Document after the change (None for deletes and drops).
    pub full_document: Option<Document>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl ChangeEvent {
    pub fn new(
        operation: ChangeOperation,
        collection: impl Into<String>,
        document_key: Option<Bson>,
        full_document: Option<Document>,
    ) -> Self {
        Self {
            operation,
            collection: collection.into(),
            document_key,
            full_document,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn inserted(collection: impl Into<String>, document: Document) -> Self {
        let key = document.get("_id").cloned();
        Self::new(ChangeOperation::Insert, collection, key, Some(document))
    }

    pub fn replaced(collection: impl Into<String>, document: Document) -> Self {
        let key = document.get("_id").cloned();
        Self::new(ChangeOperation::Replace, collection, key, Some(document))
    }

    pub fn updated(collection: impl Into<String>, document: Document) -> Self {
        let key = document.get("_id").cloned();
        Self::new(ChangeOperation::Update, collection, key, Some(document))
    }

    pub fn deleted(collection: impl Into<String>, document_key: Bson) -> Self {
        Self::new(ChangeOperation::Delete, collection, Some(document_key), None)
    }

    pub fn dropped(collection: impl Into<String>) -> Self {
        Self::new(ChangeOperation::Drop, collection, None, None)
    }

    /// Bucket id, when the change happened in a bucket data collection.
    pub fn bucket_id(&self) -> Option<&str> {
        bucket_id_from_collection(&self.collection)
    }

    /// Publication date of the changed document, if it is scheduled.
    pub fn schedule(&self) -> Option<bson::DateTime> {
        match self.full_document.as_ref()?.get(SCHEDULE_FIELD)? {
            Bson::DateTime(at) => Some(*at),
            _ => None,
        }
    }

    /// Hex id of the affected document, when the key is an object id.
    pub fn document_id_hex(&self) -> Option<String> {
        match self.document_key.as_ref()? {
            Bson::ObjectId(oid) => Some(oid.to_hex()),
            Bson::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use bson::oid::ObjectId;

    #[test]
    fn test_inserted_event_carries_key() {
        let id = ObjectId::new();
        let event = ChangeEvent::inserted("bucket_abc", doc! {"_id": id, "title": "x"});
        assert_eq!(event.operation, ChangeOperation::Insert);
        assert_eq!(event.bucket_id(), Some("abc"));
        assert_eq!(event.document_id_hex(), Some(id.to_hex()));
        assert!(event.schedule().is_none());
    }

    #[test]
    fn test_schedule_requires_date() {
        let at = bson::DateTime::from_millis(1_700_000_000_000);
        let event = ChangeEvent::replaced(
            "bucket_abc",
            doc! {"_id": ObjectId::new(), "_schedule": at},
        );
        assert_eq!(event.schedule(), Some(at));

        let event = ChangeEvent::replaced(
            "bucket_abc",
            doc! {"_id": ObjectId::new(), "_schedule": "tomorrow"},
        );
        assert!(event.schedule().is_none());
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(ChangeOperation::Replace.to_string(), "replace");
        assert_eq!(ChangeOperation::Drop.as_str(), "drop");
    }
}
