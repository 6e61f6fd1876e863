//! Well-known document fields and collection naming.

use bson::oid::ObjectId;

use crate::error::CoreError;

/// Primary key of every stored document.
pub const ID_FIELD: &str = "_id";

/// Date at which a scheduled document becomes published.
pub const SCHEDULE_FIELD: &str = "_schedule";

/// Collection holding the bucket schemas themselves.
pub const BUCKETS_COLLECTION: &str = "buckets";

/// Prefix of every bucket data collection.
pub const BUCKET_COLLECTION_PREFIX: &str = "bucket_";

/// Returns the data collection name of a bucket.
pub fn bucket_collection(bucket_id: &str) -> String {
    format!("{BUCKET_COLLECTION_PREFIX}{bucket_id}")
}

/// Extracts the bucket id from a data collection name.
///
/// Returns `None` for collections that are not bucket data collections.
pub fn bucket_id_from_collection(collection: &str) -> Option<&str> {
    collection
        .strip_prefix(BUCKET_COLLECTION_PREFIX)
        .filter(|id| !id.is_empty())
}

/// Parses a hex object id.
pub fn parse_object_id(id: &str) -> Result<ObjectId, CoreError> {
    ObjectId::parse_str(id).map_err(|_| CoreError::invalid_id(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_naming() {
        assert_eq!(bucket_collection("abc"), "bucket_abc");
        assert_eq!(bucket_id_from_collection("bucket_abc"), Some("abc"));
        assert_eq!(bucket_id_from_collection("bucket_"), None);
        assert_eq!(bucket_id_from_collection("buckets"), None);
    }

    #[test]
    fn test_parse_object_id() {
        assert!(parse_object_id("5f1b0c8e9d3b2a1f0c8e9d3b").is_ok());
        assert!(matches!(
            parse_object_id("not-an-id"),
            Err(CoreError::InvalidId(_))
        ));
    }
}
