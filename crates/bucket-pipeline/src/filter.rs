//! REST filters.
//!
//! A `filter` query parameter is either a JSON object, used as a `$match`
//! condition, or an ACL-style expression string compiled by the ACL engine.
//! JSON string literals of the form `Date("...")` and `ObjectId("...")` are
//! revived into BSON dates and object ids.

use std::sync::LazyLock;

use bson::oid::ObjectId;
use bson::{Bson, Document};
use regex::Regex;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

static TYPED_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(Date|ObjectId)\(\s*['"]?(.*?)['"]?\s*\)$"#).expect("valid literal regex")
});

/// A user supplied filter.
#[derive(Debug, Clone, PartialEq)]
pub enum UserFilter {
    Document(Document),
    Expression(String),
}

impl UserFilter {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Document(document) => document.is_empty(),
            Self::Expression(expression) => expression.trim().is_empty(),
        }
    }
}

/// Parses a raw `filter` parameter.
pub fn parse_filter(raw: &str) -> UserFilter {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Object(map)) => {
            let mut document = Document::new();
            for (key, value) in map {
                document.insert(key, revive(value));
            }
            UserFilter::Document(document)
        }
        _ => UserFilter::Expression(raw.to_string()),
    }
}

/// Converts JSON into BSON, reviving typed literals.
pub fn revive(value: Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(flag) => Bson::Boolean(flag),
        Value::Number(number) => match number.as_i64() {
            Some(n) => Bson::Int64(n),
            None => Bson::Double(number.as_f64().unwrap_or_default()),
        },
        Value::String(text) => revive_literal(&text).unwrap_or(Bson::String(text)),
        Value::Array(items) => Bson::Array(items.into_iter().map(revive).collect()),
        Value::Object(map) => {
            let mut document = Document::new();
            for (key, value) in map {
                document.insert(key, revive(value));
            }
            Bson::Document(document)
        }
    }
}

fn revive_literal(text: &str) -> Option<Bson> {
    let captures = TYPED_LITERAL.captures(text)?;
    let argument = captures.get(2)?.as_str();
    match captures.get(1)?.as_str() {
        "Date" => parse_date(argument).map(Bson::DateTime),
        "ObjectId" => ObjectId::parse_str(argument).ok().map(Bson::ObjectId),
        _ => None,
    }
}

/// Parses an RFC 3339 timestamp or epoch milliseconds.
pub fn parse_date(text: &str) -> Option<bson::DateTime> {
    if let Ok(parsed) = OffsetDateTime::parse(text, &Rfc3339) {
        let millis = parsed.unix_timestamp_nanos() / 1_000_000;
        return i64::try_from(millis).ok().map(bson::DateTime::from_millis);
    }
    text.parse::<i64>().ok().map(bson::DateTime::from_millis)
}

/// Property paths a filter document reads, in first-seen order.
///
/// Operator keys are skipped, but the clauses of `$and`, `$or` and `$nor`
/// are searched.
pub fn property_paths(filter: &Document) -> Vec<String> {
    fn collect(filter: &Document, out: &mut Vec<String>) {
        for (key, value) in filter {
            if key.starts_with('$') {
                if let Bson::Array(clauses) = value {
                    for clause in clauses {
                        if let Bson::Document(clause) = clause {
                            collect(clause, out);
                        }
                    }
                }
            } else if !out.contains(key) {
                out.push(key.clone());
            }
        }
    }
    let mut paths = Vec::new();
    collect(filter, &mut paths);
    paths
}
