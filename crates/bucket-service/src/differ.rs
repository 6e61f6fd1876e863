//! Structural diff of bucket schemas.
//!
//! A [`ChangeRecord`] names the property that changed with a schema-relative
//! path (`["properties", "meta", "properties", "age"]`, array element
//! definitions end in `"items"`) and, for edits, the attribute that changed.

use bucket_core::{BucketSchema, Properties, PropertySpec};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Edit,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    pub path: Vec<String>,
    /// Changed attribute of an edited property (`type`, `bucketId`, ...).
    /// `None` when the whole property was added or deleted.
    pub last_path: Option<String>,
}

impl ChangeRecord {
    fn new(kind: ChangeKind, path: Vec<String>, last_path: Option<&str>) -> Self {
        Self {
            kind,
            path,
            last_path: last_path.map(str::to_string),
        }
    }
}

/// Port of the schema differ.
pub trait SchemaDiffer: Send + Sync {
    fn diff(&self, previous: &BucketSchema, current: &BucketSchema) -> Vec<ChangeRecord>;
}

/// Differ comparing property trees attribute by attribute.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralDiffer;

impl SchemaDiffer for StructuralDiffer {
    fn diff(&self, previous: &BucketSchema, current: &BucketSchema) -> Vec<ChangeRecord> {
        let mut changes = Vec::new();
        diff_properties(&previous.properties, &current.properties, &[], &mut changes);
        changes
    }
}

fn child_path(prefix: &[String], segments: &[&str]) -> Vec<String> {
    prefix
        .iter()
        .cloned()
        .chain(segments.iter().map(|s| s.to_string()))
        .collect()
}

fn diff_properties(
    previous: &Properties,
    current: &Properties,
    prefix: &[String],
    changes: &mut Vec<ChangeRecord>,
) {
    for (name, spec) in previous {
        let path = child_path(prefix, &["properties", name]);
        match current.get(name) {
            Some(next) => diff_spec(spec, next, path, changes),
            None => changes.push(ChangeRecord::new(ChangeKind::Delete, path, None)),
        }
    }
    for name in current.keys().filter(|name| !previous.contains_key(*name)) {
        changes.push(ChangeRecord::new(
            ChangeKind::Add,
            child_path(prefix, &["properties", name]),
            None,
        ));
    }
}

fn diff_spec(
    previous: &PropertySpec,
    current: &PropertySpec,
    path: Vec<String>,
    changes: &mut Vec<ChangeRecord>,
) {
    let edit = |attribute: &str, changes: &mut Vec<ChangeRecord>| {
        changes.push(ChangeRecord::new(
            ChangeKind::Edit,
            path.clone(),
            Some(attribute),
        ))
    };

    if previous.kind != current.kind {
        // The nested definition is replaced as a whole.
        edit("type", changes);
        return;
    }
    if previous.bucket_id != current.bucket_id {
        edit("bucketId", changes);
    }
    if previous.relation_type != current.relation_type {
        edit("relationType", changes);
    }
    if previous.enum_values != current.enum_values {
        edit("enum", changes);
    }
    if previous.title != current.title {
        edit("title", changes);
    }
    if previous.description != current.description {
        edit("description", changes);
    }
    if previous.options != current.options {
        edit("options", changes);
    }

    let empty = Properties::new();
    if previous.properties.is_some() || current.properties.is_some() {
        diff_properties(
            previous.properties.as_ref().unwrap_or(&empty),
            current.properties.as_ref().unwrap_or(&empty),
            &path,
            changes,
        );
    }

    let items_path = child_path(&path, &["items"]);
    match (&previous.items, &current.items) {
        (Some(prev), Some(next)) => diff_spec(prev, next, items_path, changes),
        (Some(_), None) => changes.push(ChangeRecord::new(ChangeKind::Delete, items_path, None)),
        (None, Some(_)) => changes.push(ChangeRecord::new(ChangeKind::Add, items_path, None)),
        (None, None) => {}
    }
}
