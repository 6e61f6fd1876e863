//! Bucket schema definitions.
//!
//! A bucket schema is a user-authored content type: a recursive map of
//! named properties plus access rules. Schemas are persisted in the
//! [`BUCKETS_COLLECTION`](crate::BUCKETS_COLLECTION) and drive every other
//! part of the engine.
//!
//! Deserialization is deliberately total for property types and relation
//! kinds: unknown values are kept as [`PropertyType::Other`] and
//! [`RelationKind::Other`] so that downstream consumers can degrade instead
//! of failing.

use std::fmt;

use bson::Document;
use bson::oid::ObjectId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::document::bucket_collection;
use crate::error::CoreError;

/// Ordered property map, keyed by property name.
pub type Properties = IndexMap<String, PropertySpec>;

/// A bucket schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSchema {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Property shown as the document label in listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub acl: BucketAcl,
    #[serde(default)]
    pub history: bool,
    #[serde(default)]
    pub order: i64,
}

impl BucketSchema {
    /// Creates an empty schema with the given id and title.
    pub fn new(id: ObjectId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: None,
            primary: None,
            properties: Properties::new(),
            required: Vec::new(),
            acl: BucketAcl::default(),
            history: false,
            order: 0,
        }
    }

    /// Replaces the property map.
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Replaces the access rules.
    pub fn with_acl(mut self, read: impl Into<String>, write: impl Into<String>) -> Self {
        self.acl = BucketAcl {
            read: read.into(),
            write: write.into(),
        };
        self
    }

    /// Sets the required property names.
    pub fn with_required(mut self, required: Vec<String>) -> Self {
        self.required = required;
        self
    }

    /// Enables or disables history tracking.
    pub fn with_history(mut self, history: bool) -> Self {
        self.history = history;
        self
    }

    /// Hex representation of the bucket id.
    pub fn id_hex(&self) -> String {
        self.id.to_hex()
    }

    /// Name of the collection holding this bucket's documents.
    pub fn collection_name(&self) -> String {
        bucket_collection(&self.id_hex())
    }

    /// Names of the top-level relation properties, in declaration order.
    pub fn relation_paths(&self) -> Vec<String> {
        self.properties
            .iter()
            .filter(|(_, spec)| spec.kind == PropertyType::Relation)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Serializes the schema for persistence.
    pub fn to_document(&self) -> Result<Document, CoreError> {
        Ok(bson::to_document(self)?)
    }

    /// Deserializes a persisted schema.
    pub fn from_document(document: Document) -> Result<Self, CoreError> {
        Ok(bson::from_document(document)?)
    }
}

/// Read and write access rules, expressed in the ACL expression language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketAcl {
    #[serde(default)]
    pub read: String,
    #[serde(default)]
    pub write: String,
}

/// Definition of a single property.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySpec {
    #[serde(rename = "type", default)]
    pub kind: PropertyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Nested properties of an `object` property.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
    /// Required nested properties of an `object` property.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    /// Element definition of an `array` property.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySpec>>,
    /// Target bucket of a `relation` property.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_type: Option<RelationKind>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub options: PropertyOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl PropertySpec {
    /// Creates a property of the given type.
    pub fn of(kind: PropertyType) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Creates a relation property.
    pub fn relation(bucket_id: impl Into<String>, relation_type: RelationKind) -> Self {
        Self {
            kind: PropertyType::Relation,
            bucket_id: Some(bucket_id.into()),
            relation_type: Some(relation_type),
            ..Self::default()
        }
    }

    /// Returns true for properties merged by the locale stage.
    pub fn is_translatable(&self) -> bool {
        self.options.translate
    }

    /// Nested properties of an object property, if any.
    pub fn nested(&self) -> Option<&Properties> {
        match self.kind {
            PropertyType::Object => self.properties.as_ref(),
            _ => None,
        }
    }

    /// Enum members, when the property declares any.
    pub fn enum_members(&self) -> Option<&[serde_json::Value]> {
        self.enum_values.as_deref().filter(|values| !values.is_empty())
    }
}

/// Extra per-property options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyOptions {
    /// Value is a map of language code to translation.
    #[serde(default)]
    pub translate: bool,
    /// Property is included in history snapshots.
    #[serde(default)]
    pub history: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
}

/// Type of a property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Date,
    Object,
    Array,
    Relation,
    Location,
    Storage,
    Color,
    Richtext,
    Textarea,
    /// Unrecognized type name, kept verbatim.
    Other(String),
}

impl PropertyType {
    /// Returns the schema spelling of the type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Object => "object",
            Self::Array => "array",
            Self::Relation => "relation",
            Self::Location => "location",
            Self::Storage => "storage",
            Self::Color => "color",
            Self::Richtext => "richtext",
            Self::Textarea => "textarea",
            Self::Other(name) => name,
        }
    }

    /// Returns true for types stored as plain strings.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            Self::String | Self::Textarea | Self::Richtext | Self::Color | Self::Storage
        )
    }
}

impl Default for PropertyType {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for PropertyType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "string" => Self::String,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            "object" => Self::Object,
            "array" => Self::Array,
            "relation" => Self::Relation,
            "location" => Self::Location,
            "storage" => Self::Storage,
            "color" => Self::Color,
            "richtext" => Self::Richtext,
            "textarea" => Self::Textarea,
            _ => Self::Other(value),
        }
    }
}

impl From<PropertyType> for String {
    fn from(value: PropertyType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cardinality of a relation property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    /// Unrecognized relation type, kept verbatim.
    Other(String),
}

impl RelationKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::OneToOne => "onetoone",
            Self::OneToMany => "onetomany",
            Self::Other(name) => name,
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<String> for RelationKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "onetoone" => Self::OneToOne,
            "onetomany" => Self::OneToMany,
            _ => Self::Other(value),
        }
    }
}

impl From<RelationKind> for String {
    fn from(value: RelationKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
