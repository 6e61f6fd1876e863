//! Translation of the `query` argument into a document filter.
//!
//! Keys are either a property name (equality) or `{property}_{operator}`,
//! split on the last underscore. Literals are cast to the property's stored
//! type. Object properties and relations are recursed into with dotted
//! paths; relations are matched against the related bucket's properties.
//! `OR` and `AND` combine their clauses. Keys that match nothing are
//! dropped.

use std::collections::HashMap;
use std::sync::Arc;

use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use bucket_core::{BucketSchema, ID_FIELD, Properties, PropertySpec, PropertyType};
use bucket_pipeline::filter::parse_date;
use serde_json::{Map, Value};
use tracing::trace;

const OPERATORS: [&str; 11] = [
    "eq", "ne", "gt", "gte", "lt", "lte", "in", "nin", "regex", "exists", "all",
];

/// What a filter key resolved to.
#[derive(Clone, Copy)]
enum Target<'a> {
    /// The document id, present on every bucket.
    Id,
    Property(&'a PropertySpec),
}

/// Translates a GraphQL `query` argument for a bucket with `properties`.
///
/// `buckets` must hold every bucket a relation may point to.
pub fn translate_filter(
    query: &Value,
    properties: &Properties,
    buckets: &HashMap<String, Arc<BucketSchema>>,
) -> Document {
    let mut out = Document::new();
    if let Value::Object(map) = query {
        Translator { buckets }.translate(map, properties, "", &mut out);
    }
    out
}

struct Translator<'a> {
    buckets: &'a HashMap<String, Arc<BucketSchema>>,
}

impl Translator<'_> {
    fn translate(
        &self,
        map: &Map<String, Value>,
        properties: &Properties,
        prefix: &str,
        out: &mut Document,
    ) {
        for (key, value) in map {
            if key == "OR" || key == "AND" {
                let clauses: Vec<Bson> = value
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_object)
                    .map(|clause| {
                        let mut translated = Document::new();
                        self.translate(clause, properties, prefix, &mut translated);
                        translated
                    })
                    .filter(|clause| !clause.is_empty())
                    .map(Bson::Document)
                    .collect();
                if !clauses.is_empty() {
                    let operator = if key == "OR" { "$or" } else { "$and" };
                    out.insert(operator, clauses);
                }
                continue;
            }

            let Some((mut target, field, operator)) = resolve_key(key, properties) else {
                trace!(key = %key, "Dropping unknown filter key");
                continue;
            };
            let mut path = if prefix.is_empty() {
                field.to_string()
            } else {
                format!("{prefix}.{field}")
            };

            if operator.is_none()
                && let Target::Property(spec) = target
            {
                match (&spec.kind, value) {
                    (PropertyType::Object, Value::Object(nested)) => {
                        if let Some(nested_properties) = &spec.properties {
                            self.translate(nested, nested_properties, &path, out);
                        }
                        continue;
                    }
                    (PropertyType::Relation, Value::Object(nested)) => {
                        if let Some(related) = spec
                            .bucket_id
                            .as_deref()
                            .and_then(|id| self.buckets.get(id))
                        {
                            self.translate(nested, &related.properties, &path, out);
                        }
                        continue;
                    }
                    _ => {}
                }
            }

            // Relations are joined before matching, so ids compare against
            // the joined document's id.
            if let Target::Property(spec) = target
                && spec.kind == PropertyType::Relation
            {
                path.push_str(".");
                path.push_str(ID_FIELD);
                target = Target::Id;
            }

            insert_condition(out, path, operator, cast_operand(operator, value, target));
        }
    }
}

/// Splits a key into its target property and optional operator.
fn resolve_key<'a, 'k>(
    key: &'k str,
    properties: &'a Properties,
) -> Option<(Target<'a>, &'k str, Option<&'k str>)> {
    let lookup = |name: &str| -> Option<Target<'a>> {
        if name == ID_FIELD {
            Some(Target::Id)
        } else {
            properties.get(name).map(Target::Property)
        }
    };

    if let Some(target) = lookup(key) {
        return Some((target, key, None));
    }
    let (field, operator) = key.rsplit_once('_')?;
    if !OPERATORS.contains(&operator) {
        return None;
    }
    lookup(field).map(|target| (target, field, Some(operator)))
}

fn insert_condition(out: &mut Document, path: String, operator: Option<&str>, operand: Bson) {
    let Some(operator) = operator else {
        out.insert(path, operand);
        return;
    };
    let key = format!("${operator}");
    if let Some(Bson::Document(existing)) = out.get_mut(&path)
        && existing.keys().all(|k| k.starts_with('$'))
    {
        existing.insert(key, operand);
        return;
    }
    out.insert(path, doc! { key: operand });
}

fn cast_operand(operator: Option<&str>, value: &Value, target: Target<'_>) -> Bson {
    match operator {
        Some("regex") | Some("exists") => plain(value),
        _ => cast(value, target),
    }
}

fn plain(value: &Value) -> Bson {
    Bson::try_from(value.clone()).unwrap_or(Bson::Null)
}

/// Casts a literal to the target's stored type, element-wise for arrays.
fn cast(value: &Value, target: Target<'_>) -> Bson {
    if let Value::Array(items) = value {
        return Bson::Array(items.iter().map(|item| cast(item, target)).collect());
    }
    match target {
        Target::Id => match value {
            Value::String(text) => ObjectId::parse_str(text)
                .map(Bson::ObjectId)
                .unwrap_or_else(|_| Bson::String(text.clone())),
            other => plain(other),
        },
        Target::Property(spec) => cast_property(value, spec),
    }
}

fn cast_property(value: &Value, spec: &PropertySpec) -> Bson {
    match (&spec.kind, value) {
        (PropertyType::Date, Value::String(text)) => parse_date(text)
            .map(Bson::DateTime)
            .unwrap_or_else(|| Bson::String(text.clone())),
        (PropertyType::Number, Value::Number(n)) => cast_number(n),
        (PropertyType::Number, Value::String(text)) => text
            .parse::<serde_json::Number>()
            .map(|n| cast_number(&n))
            .unwrap_or_else(|_| Bson::String(text.clone())),
        (PropertyType::Array, value) => match &spec.items {
            Some(items) => cast_property(value, items),
            None => plain(value),
        },
        (_, value) => plain(value),
    }
}

fn cast_number(n: &serde_json::Number) -> Bson {
    match n.as_i64() {
        Some(i) => i32::try_from(i).map(Bson::Int32).unwrap_or(Bson::Int64(i)),
        None => Bson::Double(n.as_f64().unwrap_or_default()),
    }
}
