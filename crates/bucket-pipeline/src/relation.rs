//! Relation maps.
//!
//! A relation map is the tree of relation hops a query has to join. It is
//! built lazily from the requested field paths: a relation property is only
//! resolved when it is a prefix of at least one requested path, and every
//! level of recursion consumes at least one path segment. Recursion depth is
//! therefore bounded by the longest requested path, which keeps cyclic bucket
//! graphs finite.

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Document, doc};
use bucket_core::{
    BucketSchema, ID_FIELD, Properties, PropertyType, RelationKind, bucket_collection,
};
use bucket_storage::StorageError;
use futures_util::future::{BoxFuture, join_all};
use tracing::debug;

use crate::locale::{Locale, build_i18n_stage};

/// Looks up bucket schemas by id.
#[async_trait]
pub trait SchemaResolver: Send + Sync {
    /// Returns `None` when the bucket does not exist.
    async fn resolve(&self, bucket_id: &str) -> Result<Option<Arc<BucketSchema>>, StorageError>;
}

/// What the relation field holds when its lookup runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LookupSource {
    /// Stored id strings.
    #[default]
    Reference,
    /// Documents embedded by an earlier lookup.
    Embedded,
}

/// One relation hop.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationNode {
    /// Dotted path from the root document.
    pub path: String,
    /// Dotted path inside the document the lookup runs on.
    pub field: String,
    /// Target bucket id.
    pub target: String,
    pub kind: RelationKind,
    pub target_schema: Arc<BucketSchema>,
    pub source: LookupSource,
    pub children: Vec<RelationNode>,
}

impl RelationNode {
    /// Whether every hop below `other` is already below `self`.
    fn covers(&self, other: &RelationNode) -> bool {
        other.children.iter().all(|wanted| {
            self.children
                .iter()
                .any(|child| child.path == wanted.path && child.covers(wanted))
        })
    }

    fn merge(&mut self, other: RelationNode) {
        for wanted in other.children {
            match self.children.iter_mut().find(|child| child.path == wanted.path) {
                Some(child) => child.merge(wanted),
                None => self.children.push(wanted),
            }
        }
    }
}

/// The relation hops required by a set of requested paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationMap {
    pub nodes: Vec<RelationNode>,
}

impl RelationMap {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Paths of every node, depth first.
    pub fn paths(&self) -> Vec<String> {
        fn collect(nodes: &[RelationNode], out: &mut Vec<String>) {
            for node in nodes {
                out.push(node.path.clone());
                collect(&node.children, out);
            }
        }
        let mut paths = Vec::new();
        collect(&self.nodes, &mut paths);
        paths
    }

    /// Records `requested` as joined and returns the lookups still needed.
    ///
    /// New hops are returned as they are. A joined hop that gains hops below
    /// it is returned merged, to be looked up again from the embedded
    /// documents with every hop below it nested. The lookup replaces the
    /// embedded value, so a missing parent stays missing instead of turning
    /// into an empty object. Fully joined hops are dropped.
    pub fn absorb(&mut self, requested: RelationMap) -> RelationMap {
        let mut lookups = Vec::new();
        for node in requested.nodes {
            match self.nodes.iter_mut().find(|joined| joined.path == node.path) {
                None => {
                    lookups.push(node.clone());
                    self.nodes.push(node);
                }
                Some(joined) if joined.covers(&node) => {}
                Some(joined) => {
                    joined.merge(node);
                    lookups.push(RelationNode {
                        source: LookupSource::Embedded,
                        ..joined.clone()
                    });
                }
            }
        }
        RelationMap { nodes: lookups }
    }
}

/// Splits dotted paths into segments, dropping empty ones.
pub fn split_paths(paths: &[String]) -> Vec<Vec<String>> {
    paths
        .iter()
        .map(|path| {
            path.split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|segments| !segments.is_empty())
        .collect()
}

/// Builds the relation map for `requested` paths (as segments).
///
/// Relations to missing buckets, without a target or with an invalid
/// relation type are omitted.
pub async fn create_relation_map(
    properties: &Properties,
    requested: &[Vec<String>],
    resolver: &dyn SchemaResolver,
) -> Result<RelationMap, StorageError> {
    let nodes = build_nodes(properties, requested, "", resolver).await?;
    Ok(RelationMap { nodes })
}

/// A relation property matched by at least one requested path.
struct Candidate<'a> {
    /// Dotted path relative to the properties being walked.
    field: String,
    spec: &'a bucket_core::PropertySpec,
    /// What the requested paths ask for below the relation.
    remainders: Vec<Vec<String>>,
}

fn build_nodes<'a>(
    properties: &'a Properties,
    requested: &'a [Vec<String>],
    base: &'a str,
    resolver: &'a dyn SchemaResolver,
) -> BoxFuture<'a, Result<Vec<RelationNode>, StorageError>> {
    Box::pin(async move {
        let candidates = find_candidates(properties, requested);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // Siblings resolve concurrently, one fetch per hop.
        let lookups = candidates.iter().map(|candidate| async move {
            match (&candidate.spec.bucket_id, &candidate.spec.relation_type) {
                (Some(target), Some(kind)) if kind.is_valid() => resolver.resolve(target).await,
                _ => Ok(None),
            }
        });
        let resolved = join_all(lookups).await;

        let mut nodes = Vec::with_capacity(candidates.len());
        for (candidate, schema) in candidates.iter().zip(resolved) {
            let Some(target_schema) = schema? else {
                debug!(field = %candidate.field, "Skipping relation to unknown bucket");
                continue;
            };
            let (Some(target), Some(kind)) =
                (&candidate.spec.bucket_id, &candidate.spec.relation_type)
            else {
                continue;
            };

            let path = join_path(base, &candidate.field);
            let deeper: Vec<Vec<String>> = candidate
                .remainders
                .iter()
                .filter(|rest| !rest.is_empty())
                .cloned()
                .collect();
            let children = if deeper.is_empty() {
                Vec::new()
            } else {
                build_nodes(&target_schema.properties, &deeper, &path, resolver).await?
            };

            nodes.push(RelationNode {
                path,
                field: candidate.field.clone(),
                target: target.clone(),
                kind: kind.clone(),
                target_schema,
                source: LookupSource::Reference,
                children,
            });
        }
        Ok(nodes)
    })
}

/// Walks each requested path through object properties until it reaches a
/// relation, grouping matches by relation in first-seen order.
fn find_candidates<'a>(properties: &'a Properties, requested: &[Vec<String>]) -> Vec<Candidate<'a>> {
    let mut candidates: Vec<Candidate<'a>> = Vec::new();

    for segments in requested {
        let mut current = properties;
        for (index, segment) in segments.iter().enumerate() {
            let Some(spec) = current.get(segment) else {
                break;
            };
            match spec.kind {
                PropertyType::Relation => {
                    let field = segments[..=index].join(".");
                    let rest = segments[index + 1..].to_vec();
                    match candidates.iter_mut().find(|c| c.field == field) {
                        Some(existing) => existing.remainders.push(rest),
                        None => candidates.push(Candidate {
                            field,
                            spec,
                            remainders: vec![rest],
                        }),
                    }
                    break;
                }
                PropertyType::Object => match spec.nested() {
                    Some(nested) => current = nested,
                    None => break,
                },
                _ => break,
            }
        }
    }
    candidates
}

fn join_path(base: &str, field: &str) -> String {
    if base.is_empty() {
        field.to_string()
    } else {
        format!("{base}.{field}")
    }
}

/// Emits one `$lookup` per node, nesting child lookups inside the parent's
/// sub-pipeline. `onetoone` lookups are followed by an `$unwind` that keeps
/// documents whose relation is empty.
pub fn get_relation_pipeline(map: &RelationMap, locale: Option<&Locale>) -> Vec<Document> {
    let mut stages = Vec::new();
    for node in &map.nodes {
        append_lookup(node, locale, &mut stages);
    }
    stages
}

fn append_lookup(node: &RelationNode, locale: Option<&Locale>, stages: &mut Vec<Document>) {
    let field_ref = format!("${}", node.field);

    let (bindings, matcher) = match (&node.kind, node.source) {
        (RelationKind::OneToMany, LookupSource::Reference) => (
            doc! { "documentIds": { "$ifNull": [field_ref.as_str(), []] } },
            doc! {
                "$match": {
                    "$expr": {
                        "$in": [
                            "$_id",
                            {
                                "$map": {
                                    "input": "$$documentIds",
                                    "in": { "$toObjectId": "$$this" }
                                }
                            }
                        ]
                    }
                }
            },
        ),
        (RelationKind::OneToMany, LookupSource::Embedded) => (
            doc! {
                "documentIds": {
                    "$map": {
                        "input": { "$ifNull": [field_ref.as_str(), []] },
                        "in": "$$this._id"
                    }
                }
            },
            doc! { "$match": { "$expr": { "$in": ["$_id", "$$documentIds"] } } },
        ),
        (_, LookupSource::Reference) => (
            doc! { "documentId": { "$toObjectId": field_ref.as_str() } },
            doc! { "$match": { "$expr": { "$eq": ["$_id", "$$documentId"] } } },
        ),
        (_, LookupSource::Embedded) => (
            doc! { "documentId": format!("{field_ref}.{ID_FIELD}") },
            doc! { "$match": { "$expr": { "$eq": ["$_id", "$$documentId"] } } },
        ),
    };

    let mut inner = vec![matcher];
    if let Some(locale) = locale
        && let Some(i18n) = build_i18n_stage(&node.target_schema.properties, locale, None)
    {
        inner.push(i18n);
    }
    for child in &node.children {
        append_lookup(child, locale, &mut inner);
    }

    stages.push(doc! {
        "$lookup": {
            "from": bucket_collection(&node.target),
            "let": bindings,
            "pipeline": inner,
            "as": node.field.as_str(),
        }
    });

    if node.kind == RelationKind::OneToOne {
        stages.push(doc! {
            "$unwind": { "path": field_ref, "preserveNullAndEmptyArrays": true }
        });
    }
}
