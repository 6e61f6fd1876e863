//! Pipeline builder and relation map behaviour against in-test collaborators.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use bucket_core::{
    BucketSchema, LanguagePreference, Properties, PropertySpec, PropertyType, RelationKind,
};
use bucket_pipeline::relation::split_paths;
use bucket_pipeline::{
    AclEngine, AclError, PipelineBuilder, SchemaResolver, UserFilter, create_relation_map,
    get_relation_pipeline,
};
use bucket_storage::{DocumentStore, MemoryStore, StorageError};

// ==================== Collaborators ====================

#[derive(Default)]
struct MockResolver {
    schemas: HashMap<String, Arc<BucketSchema>>,
    calls: AtomicUsize,
}

impl MockResolver {
    fn with(schemas: Vec<BucketSchema>) -> Self {
        Self {
            schemas: schemas
                .into_iter()
                .map(|schema| (schema.id_hex(), Arc::new(schema)))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SchemaResolver for MockResolver {
    async fn resolve(&self, bucket_id: &str) -> Result<Option<Arc<BucketSchema>>, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.schemas.get(bucket_id).cloned())
    }
}

/// Reads `document.<path>` tokens and compiles to a tagged `$expr`.
struct MockAcl;

impl AclEngine for MockAcl {
    fn extract_property_map(&self, expression: &str) -> Result<Vec<String>, AclError> {
        Ok(expression
            .split_whitespace()
            .filter_map(|token| token.strip_prefix("document."))
            .map(str::to_string)
            .collect())
    }

    fn aggregate(&self, expression: &str, context: &Document) -> Result<Document, AclError> {
        if expression.contains("!!") {
            return Err(AclError::parse("unexpected token"));
        }
        Ok(doc! { "$expr": { "rule": expression, "context": context.clone() } })
    }

    fn run(&self, expression: &str, _context: &Document) -> Result<bool, AclError> {
        Ok(expression.trim() == "true")
    }
}

// ==================== Fixtures ====================

fn props(entries: Vec<(&str, PropertySpec)>) -> Properties {
    entries
        .into_iter()
        .map(|(name, spec)| (name.to_string(), spec))
        .collect()
}

fn translatable() -> PropertySpec {
    let mut spec = PropertySpec::of(PropertyType::String);
    spec.options.translate = true;
    spec
}

/// Two buckets referencing each other: posts.author -> users, users.favorite -> posts.
fn cyclic_buckets() -> (BucketSchema, BucketSchema) {
    let post_id = ObjectId::new();
    let user_id = ObjectId::new();

    let users = BucketSchema::new(user_id, "Users").with_properties(props(vec![
        ("name", PropertySpec::of(PropertyType::String)),
        (
            "favorite",
            PropertySpec::relation(post_id.to_hex(), RelationKind::OneToOne),
        ),
    ]));
    let posts = BucketSchema::new(post_id, "Posts").with_properties(props(vec![
        ("title", translatable()),
        (
            "author",
            PropertySpec::relation(user_id.to_hex(), RelationKind::OneToOne),
        ),
        (
            "editors",
            PropertySpec::relation(user_id.to_hex(), RelationKind::OneToMany),
        ),
        (
            "ghost",
            PropertySpec::relation(ObjectId::new().to_hex(), RelationKind::OneToOne),
        ),
    ]));
    (posts, users)
}

fn lookup_targets(pipeline: &[Document]) -> Vec<String> {
    pipeline
        .iter()
        .filter_map(|stage| stage.get_document("$lookup").ok())
        .map(|lookup| lookup.get_str("as").unwrap_or_default().to_string())
        .collect()
}

fn paths(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

// ==================== Relation map ====================

#[tokio::test]
async fn test_relation_map_is_bounded_by_requested_paths_on_cycles() {
    let (posts, users) = cyclic_buckets();
    let resolver = MockResolver::with(vec![posts.clone(), users]);

    let requested = split_paths(&paths(&[
        "author.favorite.author.name",
        "title",
    ]));
    let map = create_relation_map(&posts.properties, &requested, &resolver)
        .await
        .unwrap();

    assert_eq!(
        map.paths(),
        vec!["author", "author.favorite", "author.favorite.author"]
    );
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_unreferenced_and_missing_relations_are_not_resolved() {
    let (posts, users) = cyclic_buckets();
    let resolver = MockResolver::with(vec![posts.clone(), users]);

    let requested = split_paths(&paths(&["ghost", "title"]));
    let map = create_relation_map(&posts.properties, &requested, &resolver)
        .await
        .unwrap();

    assert!(map.is_empty());
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_nested_lookup_lives_inside_parent_pipeline() {
    let (posts, users) = cyclic_buckets();
    let resolver = MockResolver::with(vec![posts.clone(), users]);

    let requested = split_paths(&paths(&["author.favorite"]));
    let map = create_relation_map(&posts.properties, &requested, &resolver)
        .await
        .unwrap();
    let stages = get_relation_pipeline(&map, None);

    // author lookup + unwind at the root
    assert_eq!(stages.len(), 2);
    let lookup = stages[0].get_document("$lookup").unwrap();
    let inner: Vec<Document> = lookup
        .get_array("pipeline")
        .unwrap()
        .iter()
        .filter_map(|stage| stage.as_document().cloned())
        .collect();
    assert_eq!(lookup_targets(&inner), vec!["favorite"]);
}

// ==================== Builder ====================

fn preference() -> LanguagePreference {
    LanguagePreference::new([("en_US", "English"), ("tr_TR", "Turkish")], "en_US")
}

#[tokio::test]
async fn test_stage_order_and_relation_dedup() {
    let (posts, users) = cyclic_buckets();
    let posts = posts.with_acl("document.author.name == auth.name", "true");
    let resolver = MockResolver::with(vec![posts.clone(), users]);
    let auth = doc! { "name": "jane" };
    let id = ObjectId::new();

    let mut builder = PipelineBuilder::new(Arc::new(posts), &resolver, &MockAcl);
    builder
        .find_one_if_requested(Some(id))
        .filter_resources(Some(doc! { "team": "a" }))
        .filter_scheduled(false)
        .localize(true, Some("tr"), &preference(), None);
    builder.rules(&auth).await.unwrap();
    builder
        .filter_by_user_request(
            Some(&UserFilter::Document(doc! { "editors.name": "joe" })),
            &auth,
        )
        .await
        .unwrap();
    builder
        .resolve_relation_path(&paths(&["author", "editors"]))
        .await
        .unwrap();
    builder.sort(Some(doc! { "title": 1 })).skip(Some(5)).limit(Some(10));
    builder.paginate(false);

    let pipeline = builder.result();
    let first_keys: Vec<&str> = pipeline
        .iter()
        .map(|stage| stage.keys().next().map(String::as_str).unwrap_or_default())
        .collect();

    assert_eq!(pipeline[0], doc! { "$match": { "_id": id } });
    assert_eq!(pipeline[1], doc! { "$match": { "team": "a" } });
    assert_eq!(
        pipeline[2],
        doc! { "$match": { "_schedule": { "$exists": false } } }
    );
    assert_eq!(first_keys[3], "$set");
    // author joined for the rule, editors for the user filter, nothing new for display
    assert_eq!(lookup_targets(&pipeline), vec!["author", "editors"]);
    assert_eq!(
        &first_keys[4..],
        &[
            "$lookup", "$unwind", "$match", "$lookup", "$match", "$sort", "$skip", "$limit"
        ]
    );
    assert_eq!(builder.locale().unwrap().best, "tr_TR");
}

#[tokio::test]
async fn test_empty_inputs_are_noops() {
    let (posts, users) = cyclic_buckets();
    let resolver = MockResolver::with(vec![posts.clone(), users]);
    let auth = Document::new();

    let mut builder = PipelineBuilder::new(Arc::new(posts), &resolver, &MockAcl);
    builder
        .find_one_if_requested(None)
        .filter_resources(Some(Document::new()))
        .localize(false, Some("tr"), &preference(), None)
        .sort(None)
        .skip(Some(0))
        .limit(None);
    builder.rules(&auth).await.unwrap();
    builder
        .filter_by_user_request(Some(&UserFilter::Expression(" ".into())), &auth)
        .await
        .unwrap();
    builder.resolve_relation_path(&[]).await.unwrap();

    assert!(builder.result().is_empty());
    assert!(builder.locale().is_none());
}

#[tokio::test]
async fn test_localize_skipped_when_no_translatable_field_requested() {
    let (posts, users) = cyclic_buckets();
    let resolver = MockResolver::with(vec![posts.clone(), users]);

    let mut builder = PipelineBuilder::new(Arc::new(posts), &resolver, &MockAcl);
    builder.localize(true, None, &preference(), Some(&paths(&["author"])));

    assert!(builder.result().is_empty());
    assert_eq!(builder.locale().unwrap().best, "en_US");
}

#[tokio::test]
async fn test_paginate_wraps_data_stages() {
    let (posts, users) = cyclic_buckets();
    let resolver = MockResolver::with(vec![posts.clone(), users]);

    let mut builder = PipelineBuilder::new(Arc::new(posts), &resolver, &MockAcl);
    builder.skip(Some(20)).limit(Some(10)).paginate(true);

    assert_eq!(
        builder.result(),
        vec![
            doc! {"$facet": {
                "meta": [{"$count": "total"}],
                "data": [{"$skip": 20_i64}, {"$limit": 10_i64}],
            }},
            doc! {"$unwind": {"path": "$meta", "preserveNullAndEmptyArrays": true}},
        ]
    );
}

#[tokio::test]
async fn test_acl_parse_errors_propagate() {
    let (posts, users) = cyclic_buckets();
    let posts = posts.with_acl("!! broken", "");
    let resolver = MockResolver::with(vec![posts.clone(), users]);

    let mut builder = PipelineBuilder::new(Arc::new(posts), &resolver, &MockAcl);
    let err = builder.rules(&Document::new()).await.err().unwrap();
    assert!(err.is_acl());
}

#[tokio::test]
async fn test_rule_lookup_includes_locale_merge_of_target() {
    let (posts, users) = cyclic_buckets();
    let users = users.with_properties(props(vec![("bio", translatable())]));
    let posts = posts.with_acl("document.author.bio", "");
    let resolver = MockResolver::with(vec![posts.clone(), users]);

    let mut builder = PipelineBuilder::new(Arc::new(posts), &resolver, &MockAcl);
    builder.localize(true, Some("tr-TR"), &preference(), None);
    builder.rules(&Document::new()).await.unwrap();

    let pipeline = builder.result();
    let lookup = pipeline[1].get_document("$lookup").unwrap();
    let inner = lookup.get_array("pipeline").unwrap();
    assert_eq!(
        inner[1],
        Bson::Document(doc! {"$set": {
            "bio": {"$ifNull": ["$bio.tr_TR", "$bio.en_US", "$bio"]}
        }})
    );
}

// ==================== Execution ====================

/// Seeds the cyclic buckets and runs `builder`'s pipeline over posts.
async fn execute(
    posts: &BucketSchema,
    users: &BucketSchema,
    post_docs: Vec<Document>,
    user_docs: Vec<Document>,
    builder: &PipelineBuilder<'_>,
) -> Vec<Document> {
    let store = MemoryStore::new();
    store.seed(&posts.collection_name(), post_docs).await;
    store.seed(&users.collection_name(), user_docs).await;
    store
        .aggregate(&posts.collection_name(), builder.result())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_relations_resolve_to_single_or_null_and_arrays() {
    let (posts, users) = cyclic_buckets();
    let resolver = MockResolver::with(vec![posts.clone(), users.clone()]);
    let (post, lonely, ada) = (ObjectId::new(), ObjectId::new(), ObjectId::new());

    let mut builder = PipelineBuilder::new(Arc::new(posts.clone()), &resolver, &MockAcl);
    builder
        .resolve_relation_path(&paths(&["author", "editors"]))
        .await
        .unwrap();
    builder.sort(Some(doc! { "title": 1 }));

    let output = execute(
        &posts,
        &users,
        vec![
            doc! {"_id": post, "title": "a", "author": ada.to_hex(), "editors": [ada.to_hex()]},
            doc! {"_id": lonely, "title": "b"},
        ],
        vec![doc! {"_id": ada, "name": "ada"}],
        &builder,
    )
    .await;

    assert_eq!(
        output,
        vec![
            doc! {
                "_id": post,
                "title": "a",
                "author": {"_id": ada, "name": "ada"},
                "editors": [{"_id": ada, "name": "ada"}]
            },
            doc! {"_id": lonely, "title": "b", "editors": []},
        ]
    );
}

#[tokio::test]
async fn test_display_relations_below_filtered_onetomany_are_joined() {
    let (posts, users) = cyclic_buckets();
    let resolver = MockResolver::with(vec![posts.clone(), users.clone()]);
    let (first, second) = (ObjectId::new(), ObjectId::new());
    let (joe, ann) = (ObjectId::new(), ObjectId::new());

    let mut builder = PipelineBuilder::new(Arc::new(posts.clone()), &resolver, &MockAcl);
    builder
        .filter_by_user_request(
            Some(&UserFilter::Document(doc! { "editors.name": "joe" })),
            &Document::new(),
        )
        .await
        .unwrap();
    builder
        .resolve_relation_path(&paths(&["editors.favorite"]))
        .await
        .unwrap();

    assert_eq!(lookup_targets(&builder.result()), vec!["editors", "editors"]);
    assert_eq!(
        builder.joined_relations().paths(),
        vec!["editors", "editors.favorite"]
    );

    let output = execute(
        &posts,
        &users,
        vec![
            doc! {"_id": first, "title": "a", "editors": [joe.to_hex(), ann.to_hex()]},
            doc! {"_id": second, "title": "b"},
        ],
        vec![
            doc! {"_id": joe, "name": "joe", "favorite": second.to_hex()},
            doc! {"_id": ann, "name": "ann"},
        ],
        &builder,
    )
    .await;

    assert_eq!(
        output,
        vec![doc! {
            "_id": first,
            "title": "a",
            "editors": [
                {"_id": joe, "name": "joe", "favorite": {"_id": second, "title": "b"}},
                {"_id": ann, "name": "ann"}
            ]
        }]
    );
}

#[tokio::test]
async fn test_display_relations_below_filtered_onetoone_keep_missing_parent_null() {
    let (posts, users) = cyclic_buckets();
    let resolver = MockResolver::with(vec![posts.clone(), users.clone()]);
    let (first, lonely, ada) = (ObjectId::new(), ObjectId::new(), ObjectId::new());

    let mut builder = PipelineBuilder::new(Arc::new(posts.clone()), &resolver, &MockAcl);
    builder
        .filter_by_user_request(
            Some(&UserFilter::Document(
                doc! { "$or": [{ "author.name": "ada" }, { "title": "lonely" }] },
            )),
            &Document::new(),
        )
        .await
        .unwrap();
    builder
        .resolve_relation_path(&paths(&["author.favorite"]))
        .await
        .unwrap();
    builder.sort(Some(doc! { "title": 1 }));

    let output = execute(
        &posts,
        &users,
        vec![
            doc! {"_id": first, "title": "first", "author": ada.to_hex()},
            doc! {"_id": lonely, "title": "lonely"},
        ],
        vec![doc! {"_id": ada, "name": "ada", "favorite": first.to_hex()}],
        &builder,
    )
    .await;

    assert_eq!(
        output,
        vec![
            doc! {
                "_id": first,
                "title": "first",
                "author": {
                    "_id": ada,
                    "name": "ada",
                    "favorite": {"_id": first, "title": "first", "author": ada.to_hex()}
                }
            },
            doc! {"_id": lonely, "title": "lonely"},
        ]
    );
}
