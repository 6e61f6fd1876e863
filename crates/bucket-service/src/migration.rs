//! Document migrations derived from schema changes.

use std::collections::BTreeSet;

use bson::{Bson, Document, doc};
use bucket_core::{Properties, PropertyType, RelationKind};

use crate::differ::{ChangeKind, ChangeRecord};

/// Attributes whose change invalidates stored values.
const BREAKING_ATTRIBUTES: [&str; 3] = ["type", "bucketId", "relationType"];

/// Document field paths to unset after a schema replace.
///
/// Deleted properties and properties whose type or relation target changed
/// are unset. Object nesting becomes a dotted path and array nesting a
/// `$[]` segment. Added properties never produce an unset.
pub fn unset_paths(changes: &[ChangeRecord]) -> Vec<String> {
    let paths: BTreeSet<String> = changes
        .iter()
        .filter(|change| match change.kind {
            ChangeKind::Delete => true,
            ChangeKind::Edit => change
                .last_path
                .as_deref()
                .is_some_and(|attribute| BREAKING_ATTRIBUTES.contains(&attribute)),
            ChangeKind::Add => false,
        })
        .filter_map(|change| document_path(&change.path))
        .collect();

    // A parent unset covers its children.
    paths
        .iter()
        .filter(|path| {
            !paths
                .iter()
                .any(|parent| path.starts_with(&format!("{parent}.")))
        })
        .cloned()
        .collect()
}

/// Maps a schema-relative path to a document path.
fn document_path(schema_path: &[String]) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();
    let mut iter = schema_path.iter();
    while let Some(segment) = iter.next() {
        match segment.as_str() {
            "properties" => segments.push(iter.next()?.as_str()),
            "items" => segments.push("$[]"),
            _ => return None,
        }
    }
    while segments.last() == Some(&"$[]") {
        segments.pop();
    }
    (!segments.is_empty()).then(|| segments.join("."))
}

/// Builds the `$unset` update for the given paths.
pub fn unset_document(paths: &[String]) -> Option<Document> {
    if paths.is_empty() {
        return None;
    }
    let fields: Document = paths.iter().map(|path| (path.clone(), Bson::String(String::new()))).collect();
    Some(doc! { "$unset": fields })
}

/// A relation property pointing at a given bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationReference {
    /// Path within the schema document, `properties.a.properties.b`.
    pub schema_path: String,
    /// Path within the bucket's documents, `a.b`.
    pub data_path: String,
    pub kind: RelationKind,
}

/// Finds relation properties targeting `target_bucket_id`, including ones
/// nested in objects.
pub fn find_relations(properties: &Properties, target_bucket_id: &str) -> Vec<RelationReference> {
    fn walk(
        properties: &Properties,
        target: &str,
        schema_prefix: &str,
        data_prefix: &str,
        found: &mut Vec<RelationReference>,
    ) {
        for (name, spec) in properties {
            let schema_path = format!("{schema_prefix}properties.{name}");
            let data_path = format!("{data_prefix}{name}");
            match spec.kind {
                PropertyType::Relation if spec.bucket_id.as_deref() == Some(target) => {
                    found.push(RelationReference {
                        schema_path,
                        data_path,
                        kind: spec
                            .relation_type
                            .clone()
                            .unwrap_or(RelationKind::OneToOne),
                    });
                }
                PropertyType::Object => {
                    if let Some(nested) = &spec.properties {
                        walk(
                            nested,
                            target,
                            &format!("{schema_path}."),
                            &format!("{data_path}."),
                            found,
                        );
                    }
                }
                _ => {}
            }
        }
    }

    let mut found = Vec::new();
    walk(properties, target_bucket_id, "", "", &mut found);
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucket_core::PropertySpec;

    fn change(kind: ChangeKind, path: &[&str], last_path: Option<&str>) -> ChangeRecord {
        ChangeRecord {
            kind,
            path: path.iter().map(|s| s.to_string()).collect(),
            last_path: last_path.map(str::to_string),
        }
    }

    #[test]
    fn test_unset_paths() {
        let changes = vec![
            change(ChangeKind::Edit, &["properties", "age"], Some("type")),
            change(ChangeKind::Add, &["properties", "nickname"], None),
            change(ChangeKind::Edit, &["properties", "title"], Some("title")),
            change(
                ChangeKind::Edit,
                &["properties", "tags", "items", "properties", "label"],
                Some("type"),
            ),
            change(ChangeKind::Delete, &["properties", "meta"], None),
            change(
                ChangeKind::Edit,
                &["properties", "meta", "properties", "owner"],
                Some("bucketId"),
            ),
            change(ChangeKind::Edit, &["properties", "scores", "items"], Some("type")),
        ];

        assert_eq!(
            unset_paths(&changes),
            vec!["age", "meta", "scores", "tags.$[].label"]
        );
    }

    #[test]
    fn test_unset_document() {
        assert_eq!(unset_document(&[]), None);
        assert_eq!(
            unset_document(&["age".to_string()]),
            Some(doc! {"$unset": {"age": ""}})
        );
    }

    #[test]
    fn test_find_nested_relations() {
        let nested: Properties = [(
            "owner".to_string(),
            PropertySpec::relation("target", RelationKind::OneToMany),
        )]
        .into_iter()
        .collect();
        let properties: Properties = [
            (
                "author".to_string(),
                PropertySpec::relation("target", RelationKind::OneToOne),
            ),
            (
                "other".to_string(),
                PropertySpec::relation("elsewhere", RelationKind::OneToOne),
            ),
            (
                "meta".to_string(),
                PropertySpec {
                    properties: Some(nested),
                    ..PropertySpec::of(PropertyType::Object)
                },
            ),
        ]
        .into_iter()
        .collect();

        let found = find_relations(&properties, "target");
        assert_eq!(
            found,
            vec![
                RelationReference {
                    schema_path: "properties.author".into(),
                    data_path: "author".into(),
                    kind: RelationKind::OneToOne,
                },
                RelationReference {
                    schema_path: "properties.meta.properties.owner".into(),
                    data_path: "meta.owner".into(),
                    kind: RelationKind::OneToMany,
                },
            ]
        );
    }
}
