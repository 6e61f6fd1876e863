//! The aggregation pipeline builder.
//!
//! Stages are appended in a fixed order, each depending on the previous:
//!
//! 1. [`find_one_if_requested`](PipelineBuilder::find_one_if_requested)
//! 2. [`filter_resources`](PipelineBuilder::filter_resources)
//! 3. [`filter_scheduled`](PipelineBuilder::filter_scheduled)
//! 4. [`localize`](PipelineBuilder::localize)
//! 5. [`rules`](PipelineBuilder::rules)
//! 6. [`filter_by_user_request`](PipelineBuilder::filter_by_user_request)
//! 7. [`resolve_relation_path`](PipelineBuilder::resolve_relation_path)
//! 8. [`sort`](PipelineBuilder::sort), [`skip`](PipelineBuilder::skip),
//!    [`limit`](PipelineBuilder::limit)
//! 9. [`paginate`](PipelineBuilder::paginate)
//!
//! Authorization runs before user filters and before display relations are
//! joined, so joined data never leaks ahead of the ACL match. Every method is
//! a no-op on empty input. Relation joins are deduplicated across stages: a
//! joined relation is only looked up again when a later stage asks for
//! relations below it.

use std::sync::Arc;

use bson::oid::ObjectId;
use bson::{Document, doc};
use bucket_core::{BucketSchema, ID_FIELD, LanguagePreference, SCHEDULE_FIELD};
use tracing::trace;

use crate::acl::AclEngine;
use crate::error::Result;
use crate::filter::{UserFilter, property_paths};
use crate::locale::{Locale, build_i18n_stage, find_locale, has_translated_properties};
use crate::relation::{
    RelationMap, SchemaResolver, create_relation_map, get_relation_pipeline, split_paths,
};

/// Builds the aggregation pipeline of a single find.
pub struct PipelineBuilder<'a> {
    schema: Arc<BucketSchema>,
    resolver: &'a dyn SchemaResolver,
    acl: &'a dyn AclEngine,
    pipeline: Vec<Document>,
    data_stages: Vec<Document>,
    joined: RelationMap,
    locale: Option<Locale>,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(
        schema: Arc<BucketSchema>,
        resolver: &'a dyn SchemaResolver,
        acl: &'a dyn AclEngine,
    ) -> Self {
        Self {
            schema,
            resolver,
            acl,
            pipeline: Vec::new(),
            data_stages: Vec::new(),
            joined: RelationMap::default(),
            locale: None,
        }
    }

    /// Matches a single document by id.
    pub fn find_one_if_requested(&mut self, id: Option<ObjectId>) -> &mut Self {
        if let Some(id) = id {
            self.pipeline.push(doc! { "$match": { ID_FIELD: id } });
        }
        self
    }

    /// Applies an externally supplied authorization filter.
    pub fn filter_resources(&mut self, filter: Option<Document>) -> &mut Self {
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            self.pipeline.push(doc! { "$match": filter });
        }
        self
    }

    /// Keeps either scheduled (`_schedule` present) or published documents.
    pub fn filter_scheduled(&mut self, scheduled: bool) -> &mut Self {
        self.pipeline
            .push(doc! { "$match": { SCHEDULE_FIELD: { "$exists": scheduled } } });
        self
    }

    /// Resolves the request locale and merges translatable fields.
    ///
    /// The locale is kept for relation lookups even when the bucket itself
    /// has nothing to merge. With `requested` set, only the requested
    /// translatable fields are merged and the stage is skipped entirely when
    /// none of them was requested.
    pub fn localize(
        &mut self,
        enabled: bool,
        accept_language: Option<&str>,
        preference: &LanguagePreference,
        requested: Option<&[String]>,
    ) -> &mut Self {
        if !enabled {
            return self;
        }
        let locale = find_locale(accept_language, preference);
        if has_translated_properties(&self.schema.properties)
            && let Some(stage) = build_i18n_stage(&self.schema.properties, &locale, requested)
        {
            self.pipeline.push(stage);
        }
        self.locale = Some(locale);
        self
    }

    /// Applies the bucket's read rule.
    ///
    /// Relations the rule reads are joined first so the rule can test
    /// joined fields.
    pub async fn rules(&mut self, auth: &Document) -> Result<&mut Self> {
        let expression = self.schema.acl.read.clone();
        if expression.trim().is_empty() {
            return Ok(self);
        }

        let paths = self.acl.extract_property_map(&expression)?;
        self.attach_relations(&paths).await?;

        let condition = self.acl.aggregate(&expression, &doc! { "auth": auth.clone() })?;
        self.pipeline.push(doc! { "$match": condition });
        Ok(self)
    }

    /// Applies a user supplied filter document or expression.
    pub async fn filter_by_user_request(
        &mut self,
        filter: Option<&UserFilter>,
        auth: &Document,
    ) -> Result<&mut Self> {
        let Some(filter) = filter.filter(|f| !f.is_empty()) else {
            return Ok(self);
        };

        let condition = match filter {
            UserFilter::Document(document) => {
                self.attach_relations(&property_paths(document)).await?;
                document.clone()
            }
            UserFilter::Expression(expression) => {
                let paths = self.acl.extract_property_map(expression)?;
                self.attach_relations(&paths).await?;
                self.acl.aggregate(expression, &doc! { "auth": auth.clone() })?
            }
        };
        self.pipeline.push(doc! { "$match": condition });
        Ok(self)
    }

    /// Joins relations requested for display.
    pub async fn resolve_relation_path(&mut self, paths: &[String]) -> Result<&mut Self> {
        self.attach_relations(paths).await?;
        Ok(self)
    }

    pub fn sort(&mut self, sort: Option<Document>) -> &mut Self {
        if let Some(sort) = sort.filter(|s| !s.is_empty()) {
            self.data_stages.push(doc! { "$sort": sort });
        }
        self
    }

    pub fn skip(&mut self, skip: Option<u64>) -> &mut Self {
        if let Some(skip) = skip.filter(|s| *s > 0) {
            self.data_stages.push(doc! { "$skip": clamp(skip) });
        }
        self
    }

    pub fn limit(&mut self, limit: Option<u64>) -> &mut Self {
        if let Some(limit) = limit.filter(|l| *l > 0) {
            self.data_stages.push(doc! { "$limit": clamp(limit) });
        }
        self
    }

    /// Wraps the data stages in a `$facet` computing the page and the total
    /// count in one call. The meta facet is unwound preserving nulls so an
    /// empty result still yields one document.
    pub fn paginate(&mut self, enabled: bool) -> &mut Self {
        let data = std::mem::take(&mut self.data_stages);
        if !enabled {
            self.pipeline.extend(data);
            return self;
        }
        self.pipeline.push(doc! {
            "$facet": {
                "meta": [{ "$count": "total" }],
                "data": data,
            }
        });
        self.pipeline.push(doc! {
            "$unwind": { "path": "$meta", "preserveNullAndEmptyArrays": true }
        });
        self
    }

    /// Locale resolved by [`localize`](Self::localize).
    pub fn locale(&self) -> Option<&Locale> {
        self.locale.as_ref()
    }

    /// Relations joined so far.
    pub fn joined_relations(&self) -> &RelationMap {
        &self.joined
    }

    /// Returns the built pipeline. Data stages not consumed by
    /// [`paginate`](Self::paginate) are appended.
    pub fn result(&self) -> Vec<Document> {
        let mut pipeline = self.pipeline.clone();
        pipeline.extend(self.data_stages.iter().cloned());
        pipeline
    }

    async fn attach_relations(&mut self, paths: &[String]) -> Result<()> {
        let requested = split_paths(paths);
        if requested.is_empty() {
            return Ok(());
        }

        let requested =
            create_relation_map(&self.schema.properties, &requested, self.resolver).await?;
        let map = self.joined.absorb(requested);
        if map.is_empty() {
            return Ok(());
        }

        trace!(
            bucket_id = %self.schema.id_hex(),
            relations = ?map.paths(),
            "Attaching relation lookups"
        );
        self.pipeline
            .extend(get_relation_pipeline(&map, self.locale.as_ref()));
        Ok(())
    }
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
