//! In-memory document store.
//!
//! Holds collections as ordered document vectors behind a `tokio` lock and
//! understands the subset of query, update and pipeline operators the engine
//! emits: comparison and logical filters, `$set`, `$unset` (including `$[]`
//! paths) and `$pull`, plus the `$match`, `$sort`, `$skip`, `$limit`,
//! `$count`, `$facet`, `$unwind` and `$lookup` stages. Joins only take the
//! `let`/`pipeline` form, and `$expr` knows `$eq`, `$in`, `$map`, `$ifNull`
//! and `$toObjectId`. Every aggregation and bulk update is recorded so
//! callers can inspect what was sent.
//!
//! Other stages and operators fail with [`StorageError::InvalidPipeline`].

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use bucket_core::ID_FIELD;
use tokio::sync::{Mutex, RwLock};

use crate::error::StorageError;
use crate::traits::{ChangeStream, DocumentStore};
use crate::types::{FindOptions, UpdateOptions, UpdateResult, WatchFilter};

/// A bulk update as received by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedUpdate {
    pub collection: String,
    pub filter: Document,
    pub update: Document,
}

/// In-memory implementation of [`DocumentStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    aggregations: Mutex<Vec<(String, Vec<Document>)>>,
    updates: Mutex<Vec<RecordedUpdate>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends documents to a collection without emitting anything.
    pub async fn seed(&self, collection: &str, documents: impl IntoIterator<Item = Document>) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
    }

    /// Snapshot of a collection's documents.
    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn has_collection(&self, collection: &str) -> bool {
        self.collections.read().await.contains_key(collection)
    }

    /// Pipelines received by `aggregate`, oldest first.
    pub async fn aggregations(&self) -> Vec<(String, Vec<Document>)> {
        self.aggregations.lock().await.clone()
    }

    /// Updates received by `update_many`, oldest first.
    pub async fn updates(&self) -> Vec<RecordedUpdate> {
        self.updates.lock().await.clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>, StorageError> {
        let collections = self.collections.read().await;
        let mut found = Vec::new();
        for document in collections.get(collection).into_iter().flatten() {
            if matches(document, &filter)? {
                found.push(document.clone());
            }
        }
        drop(collections);

        if let Some(sort) = &options.sort {
            sort_documents(&mut found, sort);
        }
        let skip = options.skip.unwrap_or(0) as usize;
        let mut found: Vec<Document> = found.into_iter().skip(skip).collect();
        if let Some(limit) = options.limit.filter(|limit| *limit > 0) {
            found.truncate(limit as usize);
        }
        if let Some(projection) = &options.projection {
            found = found.iter().map(|d| project(d, projection)).collect();
        }
        Ok(found)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>, StorageError> {
        self.aggregations
            .lock()
            .await
            .push((collection.to_string(), pipeline.clone()));
        let collections = self.collections.read().await;
        let documents = collections.get(collection).cloned().unwrap_or_default();
        let scope = Scope {
            collections: &*collections,
            vars: Document::new(),
        };
        run_pipeline(documents, &pipeline, &scope)
    }

    async fn insert_one(
        &self,
        collection: &str,
        mut document: Document,
    ) -> Result<Bson, StorageError> {
        let mut collections = self.collections.write().await;
        let documents = collections.entry(collection.to_string()).or_default();

        let id = match document.get(ID_FIELD) {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                document.insert(ID_FIELD, id.clone());
                id
            }
        };
        if documents.iter().any(|d| d.get(ID_FIELD) == Some(&id)) {
            return Err(StorageError::already_exists(collection, id.to_string()));
        }
        documents.push(document);
        Ok(id)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        _options: UpdateOptions,
    ) -> Result<UpdateResult, StorageError> {
        self.updates.lock().await.push(RecordedUpdate {
            collection: collection.to_string(),
            filter: filter.clone(),
            update: update.clone(),
        });

        let mut collections = self.collections.write().await;
        let mut result = UpdateResult::default();
        for document in collections.get_mut(collection).into_iter().flatten() {
            if !matches(document, &filter)? {
                continue;
            }
            result.matched_count += 1;
            let before = document.clone();
            apply_update(document, &update)?;
            if *document != before {
                result.modified_count += 1;
            }
        }
        Ok(result)
    }

    async fn find_one_and_replace(
        &self,
        collection: &str,
        filter: Document,
        mut replacement: Document,
    ) -> Result<Option<Document>, StorageError> {
        let mut collections = self.collections.write().await;
        let Some(target) = first_match(collections.get_mut(collection), &filter)? else {
            return Ok(None);
        };
        if let Some(id) = target.get(ID_FIELD) {
            replacement.insert(ID_FIELD, id.clone());
        }
        Ok(Some(std::mem::replace(target, replacement)))
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<Option<Document>, StorageError> {
        let mut collections = self.collections.write().await;
        let Some(target) = first_match(collections.get_mut(collection), &filter)? else {
            return Ok(None);
        };
        let previous = target.clone();
        apply_update(target, &update)?;
        Ok(Some(previous))
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, StorageError> {
        let mut collections = self.collections.write().await;
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(None);
        };
        for index in 0..documents.len() {
            if matches(&documents[index], &filter)? {
                return Ok(Some(documents.remove(index)));
            }
        }
        Ok(None)
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), StorageError> {
        self.collections.write().await.remove(collection);
        Ok(())
    }

    async fn watch(&self, _filter: WatchFilter) -> Result<ChangeStream, StorageError> {
        Err(StorageError::internal(
            "memory store has no change stream, wrap it in an EventedStore",
        ))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

fn first_match<'a>(
    documents: Option<&'a mut Vec<Document>>,
    filter: &Document,
) -> Result<Option<&'a mut Document>, StorageError> {
    for document in documents.into_iter().flatten() {
        if matches(document, filter)? {
            return Ok(Some(document));
        }
    }
    Ok(None)
}

// ==================== Query matching ====================

/// Evaluates a query filter against a document.
pub(crate) fn matches(document: &Document, filter: &Document) -> Result<bool, StorageError> {
    matches_in(document, filter, &Document::new())
}

/// Like [`matches`], with `$$` variables available to `$expr`.
fn matches_in(document: &Document, filter: &Document, vars: &Document) -> Result<bool, StorageError> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(condition)? {
                    all &= matches_in(document, clause, vars)?;
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(condition)? {
                    any |= matches_in(document, clause, vars)?;
                }
                any
            }
            "$expr" => truthy(&evaluate(condition, document, vars)?),
            operator if operator.starts_with('$') => {
                return Err(StorageError::invalid_document(format!(
                    "unsupported query operator {operator}"
                )));
            }
            path => matches_condition(&values_at(document, path), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses(condition: &Bson) -> Result<Vec<&Document>, StorageError> {
    let invalid = || StorageError::invalid_document("logical operators expect an array of documents");
    condition
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|clause| clause.as_document().ok_or_else(invalid))
        .collect()
}

fn matches_condition(values: &[&Bson], condition: &Bson) -> Result<bool, StorageError> {
    match condition {
        Bson::Document(operators) if operators.keys().any(|key| key.starts_with('$')) => {
            for (operator, operand) in operators {
                if !apply_operator(values, operator, operand)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        expected => Ok(values.iter().any(|value| equals(value, expected))),
    }
}

fn apply_operator(values: &[&Bson], operator: &str, operand: &Bson) -> Result<bool, StorageError> {
    let any = |accept: &dyn Fn(Ordering) -> bool| {
        values
            .iter()
            .any(|value| compare(value, operand).is_some_and(accept))
    };
    let options = || {
        operand
            .as_array()
            .ok_or_else(|| StorageError::invalid_document(format!("{operator} expects an array")))
    };

    Ok(match operator {
        "$eq" => values.iter().any(|value| equals(value, operand)),
        "$ne" => !values.iter().any(|value| equals(value, operand)),
        "$gt" => any(&|ordering| ordering == Ordering::Greater),
        "$gte" => any(&|ordering| ordering != Ordering::Less),
        "$lt" => any(&|ordering| ordering == Ordering::Less),
        "$lte" => any(&|ordering| ordering != Ordering::Greater),
        "$in" => {
            let options = options()?;
            values
                .iter()
                .any(|value| options.iter().any(|option| equals(value, option)))
        }
        "$nin" => {
            let options = options()?;
            !values
                .iter()
                .any(|value| options.iter().any(|option| equals(value, option)))
        }
        "$exists" => values.is_empty() != truthy(operand),
        other => {
            return Err(StorageError::invalid_document(format!(
                "unsupported query operator {other}"
            )));
        }
    })
}

/// Values reachable through a dotted path, fanning out over arrays.
fn values_at<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut found = Vec::new();
    collect_values(document, &segments, &mut found);
    found
}

fn collect_values<'a>(document: &'a Document, segments: &[&str], found: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let Some(value) = document.get(*head) else {
        return;
    };
    if rest.is_empty() {
        if let Bson::Array(items) = value {
            found.extend(items.iter());
        }
        found.push(value);
        return;
    }
    match value {
        Bson::Document(inner) => collect_values(inner, rest, found),
        Bson::Array(items) => {
            for item in items {
                if let Bson::Document(inner) = item {
                    collect_values(inner, rest, found);
                }
            }
        }
        _ => {}
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(flag) => *flag,
        Bson::Null | Bson::Undefined => false,
        other => number(other).is_none_or(|n| n != 0.0),
    }
}

fn number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn compare(left: &Bson, right: &Bson) -> Option<Ordering> {
    match (left, right) {
        (Bson::String(a), Bson::String(b)) => Some(a.cmp(b)),
        (Bson::DateTime(a), Bson::DateTime(b)) => Some(a.cmp(b)),
        (Bson::ObjectId(a), Bson::ObjectId(b)) => Some(a.cmp(b)),
        (Bson::Boolean(a), Bson::Boolean(b)) => Some(a.cmp(b)),
        _ => number(left)?.partial_cmp(&number(right)?),
    }
}

fn equals(left: &Bson, right: &Bson) -> bool {
    left == right || compare(left, right) == Some(Ordering::Equal)
}

// ==================== Updates ====================

fn apply_update(document: &mut Document, update: &Document) -> Result<(), StorageError> {
    for (operator, fields) in update {
        let fields = fields.as_document().ok_or_else(|| {
            StorageError::invalid_document(format!("{operator} expects a document"))
        })?;
        match operator.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(document, path, value.clone());
                }
            }
            "$unset" => {
                for path in fields.keys() {
                    let segments: Vec<&str> = path.split('.').collect();
                    unset_path(document, &segments);
                }
            }
            "$pull" => {
                for (path, condition) in fields {
                    pull_path(document, path, condition)?;
                }
            }
            other => {
                return Err(StorageError::invalid_document(format!(
                    "unsupported update operator {other}"
                )));
            }
        }
    }
    Ok(())
}

fn set_path(document: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(document.get(head), Some(Bson::Document(_))) {
                document.insert(head, Document::new());
            }
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                set_path(inner, rest, value);
            }
        }
    }
}

fn unset_path(document: &mut Document, segments: &[&str]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        document.remove(*head);
        return;
    }
    match document.get_mut(*head) {
        Some(Bson::Document(inner)) => unset_path(inner, rest),
        Some(Bson::Array(items)) if rest[0] == "$[]" => {
            for item in items.iter_mut() {
                if let Bson::Document(inner) = item {
                    unset_path(inner, &rest[1..]);
                }
            }
        }
        _ => {}
    }
}

fn pull_path(document: &mut Document, path: &str, condition: &Bson) -> Result<(), StorageError> {
    let (parent, field) = match path.rsplit_once('.') {
        Some((parent, field)) => (Some(parent), field),
        None => (None, path),
    };
    let mut target = document;
    for segment in parent.into_iter().flat_map(|p| p.split('.')) {
        match target.get_mut(segment) {
            Some(Bson::Document(inner)) => target = inner,
            _ => return Ok(()),
        }
    }
    if let Some(Bson::Array(items)) = target.get_mut(field) {
        let mut kept = Vec::with_capacity(items.len());
        for item in items.drain(..) {
            if !matches_condition(&[&item], condition)? {
                kept.push(item);
            }
        }
        *items = kept;
    }
    Ok(())
}

// ==================== Pipelines ====================

/// Collections a pipeline can join and the variables bound by the
/// enclosing `$lookup`.
struct Scope<'a> {
    collections: &'a HashMap<String, Vec<Document>>,
    vars: Document,
}

fn run_pipeline(
    mut documents: Vec<Document>,
    pipeline: &[Document],
    scope: &Scope<'_>,
) -> Result<Vec<Document>, StorageError> {
    for stage in pipeline {
        let Some((name, spec)) = stage.iter().next() else {
            return Err(StorageError::invalid_pipeline("empty pipeline stage"));
        };
        documents = match name.as_str() {
            "$match" => {
                let filter = stage_document(name, spec)?;
                let mut kept = Vec::with_capacity(documents.len());
                for document in documents {
                    if matches_in(&document, filter, &scope.vars)? {
                        kept.push(document);
                    }
                }
                kept
            }
            "$sort" => {
                sort_documents(&mut documents, stage_document(name, spec)?);
                documents
            }
            "$skip" => {
                let skip = stage_count(name, spec)?;
                documents.into_iter().skip(skip).collect()
            }
            "$limit" => {
                documents.truncate(stage_count(name, spec)?);
                documents
            }
            "$count" => {
                let field = spec.as_str().ok_or_else(|| {
                    StorageError::invalid_pipeline("$count expects a field name")
                })?;
                if documents.is_empty() {
                    Vec::new()
                } else {
                    let mut counted = Document::new();
                    counted.insert(field, documents.len() as i32);
                    vec![counted]
                }
            }
            "$facet" => {
                let mut faceted = Document::new();
                for (facet, sub_pipeline) in stage_document(name, spec)? {
                    let stages = sub_stages(name, sub_pipeline)?;
                    let output = run_pipeline(documents.clone(), &stages, scope)?;
                    faceted.insert(
                        facet.as_str(),
                        output.into_iter().map(Bson::Document).collect::<Vec<_>>(),
                    );
                }
                vec![faceted]
            }
            "$unwind" => unwind(documents, spec)?,
            "$lookup" => lookup(documents, stage_document(name, spec)?, scope)?,
            other => {
                return Err(StorageError::invalid_pipeline(format!(
                    "unsupported stage {other}"
                )));
            }
        };
    }
    Ok(documents)
}

fn stage_document<'a>(name: &str, spec: &'a Bson) -> Result<&'a Document, StorageError> {
    spec.as_document()
        .ok_or_else(|| StorageError::invalid_pipeline(format!("{name} expects a document")))
}

fn sub_stages(name: &str, spec: &Bson) -> Result<Vec<Document>, StorageError> {
    let invalid = || StorageError::invalid_pipeline(format!("{name} expects arrays of stages"));
    spec.as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|stage| stage.as_document().cloned().ok_or_else(invalid))
        .collect()
}

fn stage_count(name: &str, spec: &Bson) -> Result<usize, StorageError> {
    number(spec)
        .filter(|n| *n >= 0.0)
        .map(|n| n as usize)
        .ok_or_else(|| StorageError::invalid_pipeline(format!("{name} expects a positive number")))
}

fn unwind(documents: Vec<Document>, spec: &Bson) -> Result<Vec<Document>, StorageError> {
    let (path, preserve) = match spec {
        Bson::String(path) => (path.as_str(), false),
        Bson::Document(options) => (
            options.get_str("path").map_err(|_| {
                StorageError::invalid_pipeline("$unwind expects a path")
            })?,
            options
                .get_bool("preserveNullAndEmptyArrays")
                .unwrap_or(false),
        ),
        _ => return Err(StorageError::invalid_pipeline("$unwind expects a path")),
    };
    let field = path.trim_start_matches('$');
    let segments: Vec<&str> = field.split('.').collect();

    let mut unwound = Vec::with_capacity(documents.len());
    for mut document in documents {
        match path_value(&document, field).cloned() {
            Some(Bson::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut copy = document.clone();
                    set_path(&mut copy, field, item);
                    unwound.push(copy);
                }
            }
            Some(Bson::Array(_)) => {
                if preserve {
                    unset_path(&mut document, &segments);
                    unwound.push(document);
                }
            }
            None | Some(Bson::Null) => {
                if preserve {
                    unwound.push(document);
                }
            }
            Some(_) => unwound.push(document),
        }
    }
    Ok(unwound)
}

/// Runs a `let`/`pipeline` join, writing the matches to `as`.
fn lookup(
    documents: Vec<Document>,
    spec: &Document,
    scope: &Scope<'_>,
) -> Result<Vec<Document>, StorageError> {
    let from = spec
        .get_str("from")
        .map_err(|_| StorageError::invalid_pipeline("$lookup expects a from collection"))?;
    let target = spec
        .get_str("as")
        .map_err(|_| StorageError::invalid_pipeline("$lookup expects an as path"))?;
    let bindings = match spec.get("let") {
        None => Document::new(),
        Some(Bson::Document(bindings)) => bindings.clone(),
        Some(_) => return Err(StorageError::invalid_pipeline("$lookup let expects a document")),
    };
    let stages = match spec.get("pipeline") {
        Some(pipeline) => sub_stages("$lookup", pipeline)?,
        None => return Err(StorageError::invalid_pipeline("$lookup expects a pipeline")),
    };
    let foreign = scope.collections.get(from).map(Vec::as_slice).unwrap_or_default();

    let mut joined = Vec::with_capacity(documents.len());
    for mut document in documents {
        let mut vars = scope.vars.clone();
        for (name, expression) in &bindings {
            vars.insert(name.as_str(), evaluate(expression, &document, &scope.vars)?);
        }
        let inner = Scope {
            collections: scope.collections,
            vars,
        };
        let matched = run_pipeline(foreign.to_vec(), &stages, &inner)?;
        set_path(
            &mut document,
            target,
            Bson::Array(matched.into_iter().map(Bson::Document).collect()),
        );
        joined.push(document);
    }
    Ok(joined)
}

// ==================== Expressions ====================

/// Value of a dotted path without fanning out over arrays.
fn path_value<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut value = document.get(segments.next()?)?;
    for segment in segments {
        value = value.as_document()?.get(segment)?;
    }
    Some(value)
}

/// Evaluates an aggregation expression. Missing values evaluate to null.
fn evaluate(expression: &Bson, document: &Document, vars: &Document) -> Result<Bson, StorageError> {
    match expression {
        Bson::String(reference) if reference.starts_with("$$") => {
            Ok(path_value(vars, &reference[2..]).cloned().unwrap_or(Bson::Null))
        }
        Bson::String(reference) if reference.starts_with('$') => {
            Ok(path_value(document, &reference[1..]).cloned().unwrap_or(Bson::Null))
        }
        Bson::Array(items) => items
            .iter()
            .map(|item| evaluate(item, document, vars))
            .collect::<Result<Vec<_>, _>>()
            .map(Bson::Array),
        Bson::Document(fields) => match fields.iter().next() {
            Some((operator, operand)) if fields.len() == 1 && operator.starts_with('$') => {
                apply_expression(operator, operand, document, vars)
            }
            _ => {
                let mut evaluated = Document::new();
                for (key, value) in fields {
                    evaluated.insert(key.as_str(), evaluate(value, document, vars)?);
                }
                Ok(Bson::Document(evaluated))
            }
        },
        literal => Ok(literal.clone()),
    }
}

fn apply_expression(
    operator: &str,
    operand: &Bson,
    document: &Document,
    vars: &Document,
) -> Result<Bson, StorageError> {
    let arguments = || match evaluate(operand, document, vars)? {
        Bson::Array(items) => Ok::<Vec<Bson>, StorageError>(items),
        single => Ok(vec![single]),
    };
    let invalid = |message: &str| StorageError::invalid_pipeline(format!("{operator} {message}"));

    match operator {
        "$eq" => match arguments()?.as_slice() {
            [left, right] => Ok(Bson::Boolean(equals(left, right))),
            _ => Err(invalid("expects two arguments")),
        },
        "$in" => match arguments()?.as_slice() {
            [value, Bson::Array(options)] => Ok(Bson::Boolean(
                options.iter().any(|option| equals(value, option)),
            )),
            _ => Err(invalid("expects a value and an array")),
        },
        "$ifNull" => Ok(arguments()?
            .into_iter()
            .find(|value| !matches!(value, Bson::Null | Bson::Undefined))
            .unwrap_or(Bson::Null)),
        "$toObjectId" => match evaluate(operand, document, vars)? {
            Bson::String(hex) => ObjectId::parse_str(&hex)
                .map(Bson::ObjectId)
                .map_err(|_| invalid(&format!("cannot convert {hex:?}"))),
            Bson::ObjectId(id) => Ok(Bson::ObjectId(id)),
            Bson::Null | Bson::Undefined => Ok(Bson::Null),
            other => Err(invalid(&format!("cannot convert {other}"))),
        },
        "$map" => {
            let spec = operand.as_document().ok_or_else(|| invalid("expects a document"))?;
            let name = spec.get_str("as").unwrap_or("this");
            let body = spec.get("in").ok_or_else(|| invalid("expects an in expression"))?;
            let input = spec.get("input").ok_or_else(|| invalid("expects an input"))?;
            match evaluate(input, document, vars)? {
                Bson::Array(items) => {
                    let mut mapped = Vec::with_capacity(items.len());
                    for item in items {
                        let mut scoped = vars.clone();
                        scoped.insert(name, item);
                        mapped.push(evaluate(body, document, &scoped)?);
                    }
                    Ok(Bson::Array(mapped))
                }
                Bson::Null | Bson::Undefined => Ok(Bson::Null),
                _ => Err(invalid("expects an array input")),
            }
        }
        other => Err(StorageError::invalid_pipeline(format!(
            "unsupported expression operator {other}"
        ))),
    }
}

fn sort_documents(documents: &mut [Document], sort: &Document) {
    documents.sort_by(|left, right| {
        for (path, direction) in sort {
            let descending = number(direction).is_some_and(|n| n < 0.0);
            let a = values_at(left, path).into_iter().next();
            let b = values_at(right, path).into_iter().next();
            let ordering = match (a, b) {
                (Some(a), Some(b)) => compare(a, b).unwrap_or(Ordering::Equal),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            let ordering = if descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn project(document: &Document, projection: &Document) -> Document {
    let mut projected = Document::new();
    if let Some(id) = document.get(ID_FIELD) {
        projected.insert(ID_FIELD, id.clone());
    }
    for (field, include) in projection {
        if truthy(include)
            && let Some(value) = document.get(field)
        {
            projected.insert(field.as_str(), value.clone());
        }
    }
    projected
}
