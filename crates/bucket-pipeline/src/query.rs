//! REST query parameters for bucket document finds.

use bson::Document;
use bucket_core::BucketSchema;
use serde_json::Value;
use tracing::debug;

use crate::filter::{UserFilter, parse_filter};

/// Which relations to expand in the response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RelationRequest {
    #[default]
    None,
    /// Every top-level relation of the bucket.
    All,
    /// Explicit dotted paths.
    Paths(Vec<String>),
}

impl RelationRequest {
    /// Dotted paths to resolve for `schema`.
    pub fn paths(&self, schema: &BucketSchema) -> Vec<String> {
        match self {
            Self::None => Vec::new(),
            Self::All => schema.relation_paths(),
            Self::Paths(paths) => paths.clone(),
        }
    }
}

/// Parsed query parameters of a document find.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketQuery {
    pub relation: RelationRequest,
    pub paginate: bool,
    pub schedule: bool,
    pub localize: bool,
    pub filter: Option<UserFilter>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub sort: Option<Document>,
}

impl Default for BucketQuery {
    fn default() -> Self {
        Self {
            relation: RelationRequest::None,
            paginate: false,
            schedule: false,
            localize: true,
            filter: None,
            limit: None,
            skip: None,
            sort: None,
        }
    }
}

impl BucketQuery {
    /// Parses repeated `key=value` pairs. Unknown keys and invalid values
    /// are ignored; `limit` is clamped to `max_limit`.
    pub fn from_pairs<I, K, V>(pairs: I, max_limit: Option<u64>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut query = Self::default();
        for (key, value) in pairs {
            let value = value.as_ref();
            match key.as_ref() {
                "relation" => query.relation = merge_relation(query.relation, value),
                "paginate" => query.paginate = parse_flag(value).unwrap_or(query.paginate),
                "schedule" => query.schedule = parse_flag(value).unwrap_or(query.schedule),
                "localize" => query.localize = parse_flag(value).unwrap_or(query.localize),
                "filter" => {
                    let filter = parse_filter(value);
                    query.filter = (!filter.is_empty()).then_some(filter);
                }
                "limit" => {
                    if let Ok(limit) = value.parse::<u64>() {
                        query.limit = Some(max_limit.map_or(limit, |max| limit.min(max)));
                    }
                }
                "skip" => query.skip = value.parse::<u64>().ok().or(query.skip),
                "sort" => query.sort = parse_sort(value).or(query.sort),
                other => debug!(key = %other, "Ignoring unknown query parameter"),
            }
        }
        query
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn merge_relation(current: RelationRequest, value: &str) -> RelationRequest {
    match parse_flag(value) {
        Some(true) => RelationRequest::All,
        Some(false) => RelationRequest::None,
        None if value.is_empty() => current,
        None => match current {
            RelationRequest::Paths(mut paths) => {
                paths.push(value.to_string());
                RelationRequest::Paths(paths)
            }
            _ => RelationRequest::Paths(vec![value.to_string()]),
        },
    }
}

/// Parses `{"field": 1 | -1}`.
fn parse_sort(value: &str) -> Option<Document> {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(value) else {
        return None;
    };
    let mut sort = Document::new();
    for (field, direction) in map {
        match direction.as_i64() {
            Some(1) => sort.insert(field, 1_i32),
            Some(-1) => sort.insert(field, -1_i32),
            _ => return None,
        };
    }
    (!sort.is_empty()).then_some(sort)
}
