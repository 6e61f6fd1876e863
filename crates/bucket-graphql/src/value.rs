//! Conversions between stored documents and GraphQL values.
//!
//! Both directions are driven by the synthesized type AST, so sanitized
//! GraphQL names map back to the original document keys.

use std::collections::HashMap;

use async_graphql::{Name, Number, Value};
use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use bucket_pipeline::filter::parse_date;

use crate::error::GraphQLError;
use crate::schema::ast::{BucketTypes, EnumDef, ObjectDef, ScalarType, TypeNode};
use crate::schema::synthesizer::{LOCATION_INPUT_TYPE, LOCATION_TYPE};

/// Lookup of every synthesized object and enum by GraphQL name.
#[derive(Debug, Default)]
pub struct TypeIndex {
    objects: HashMap<String, ObjectDef>,
    enums: HashMap<String, EnumDef>,
}

impl TypeIndex {
    pub fn new(types: &[BucketTypes]) -> Self {
        let mut index = Self::default();
        for bucket in types {
            for object in &bucket.objects {
                index.objects.insert(object.name.clone(), object.clone());
            }
            for def in &bucket.enums {
                index.enums.insert(def.name.clone(), def.clone());
            }
        }
        index
    }

    pub fn object(&self, name: &str) -> Option<&ObjectDef> {
        self.objects.get(name)
    }

    pub fn enum_def(&self, name: &str) -> Option<&EnumDef> {
        self.enums.get(name)
    }

    /// Maps dotted GraphQL field paths to dotted document paths, following
    /// nested objects and relations. Unknown segments end the path.
    pub fn source_paths(&self, root: &str, paths: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for path in paths {
            let mut object = self.objects.get(root);
            let mut segments = Vec::new();
            for part in path.split('.') {
                let Some(field) = object
                    .and_then(|o| o.field(part))
                    .filter(|f| !f.is_synthetic())
                else {
                    break;
                };
                segments.push(field.source.as_str());
                object = field.ty.object_name().and_then(|name| self.objects.get(name));
            }
            if segments.is_empty() {
                continue;
            }
            let joined = segments.join(".");
            if !out.contains(&joined) {
                out.push(joined);
            }
        }
        out
    }

    // ==================== Output ====================

    /// Converts a stored document into the value of an output object.
    pub fn output_document(&self, document: &Document, object_name: &str) -> Value {
        let Some(object) = self.objects.get(object_name) else {
            return Value::from_json(Bson::Document(document.clone()).into_relaxed_extjson())
                .unwrap_or(Value::Null);
        };
        Value::Object(
            object
                .fields
                .iter()
                .filter(|field| !field.is_synthetic())
                .map(|field| {
                    let value = document
                        .get(&field.source)
                        .map(|v| self.output_value(v, &field.ty))
                        .unwrap_or(Value::Null);
                    (Name::new(&field.name), value)
                })
                .collect(),
        )
    }

    fn output_value(&self, value: &Bson, ty: &TypeNode) -> Value {
        match (ty, value) {
            (_, Bson::Null | Bson::Undefined) => Value::Null,
            (TypeNode::Scalar(scalar), value) => scalar_output(*scalar, value),
            (TypeNode::Enum(name), value) => {
                let json = value.clone().into_relaxed_extjson();
                self.enums
                    .get(name)
                    .and_then(|def| def.member_by_value(&json))
                    .map(|member| Value::Enum(Name::new(&member.name)))
                    .unwrap_or(Value::Null)
            }
            (TypeNode::Object(name), Bson::Document(document)) if name == LOCATION_TYPE => {
                location_output(document)
            }
            (TypeNode::Object(name), Bson::Document(document)) => {
                self.output_document(document, name)
            }
            (TypeNode::List(inner), Bson::Array(items)) => Value::List(
                items
                    .iter()
                    .map(|item| self.output_value(item, inner))
                    .collect(),
            ),
            // Unjoined relation ids resolve to null.
            (
                TypeNode::Relation {
                    type_name,
                    many: true,
                    ..
                },
                Bson::Array(items),
            ) => Value::List(
                items
                    .iter()
                    .map(|item| match item {
                        Bson::Document(document) => self.output_document(document, type_name),
                        _ => Value::Null,
                    })
                    .collect(),
            ),
            (
                TypeNode::Relation {
                    type_name,
                    many: false,
                    ..
                },
                Bson::Document(document),
            ) => self.output_document(document, type_name),
            _ => Value::Null,
        }
    }

    // ==================== Input ====================

    /// Converts an input object value into a document keyed by the original
    /// property names. Absent and null fields are left out.
    pub fn input_document(&self, value: &Value, object_name: &str) -> Result<Document, GraphQLError> {
        let Value::Object(map) = value else {
            return Err(GraphQLError::InvalidArgument(
                "input must be an object".to_string(),
            ));
        };
        let object = self
            .objects
            .get(object_name)
            .ok_or_else(|| GraphQLError::Internal(format!("unknown input type {object_name}")))?;

        let mut document = Document::new();
        for field in object.fields.iter().filter(|field| !field.is_synthetic()) {
            match map.get(field.name.as_str()) {
                None | Some(Value::Null) => {}
                Some(value) => {
                    document.insert(field.source.clone(), self.input_value(value, &field.ty)?);
                }
            }
        }
        Ok(document)
    }

    fn input_value(&self, value: &Value, ty: &TypeNode) -> Result<Bson, GraphQLError> {
        match (ty, value) {
            (_, Value::Null) => Ok(Bson::Null),
            (TypeNode::Scalar(ScalarType::Date), Value::String(text)) => parse_date(text)
                .map(Bson::DateTime)
                .ok_or_else(|| GraphQLError::InvalidArgument(format!("\"{text}\" is not a date"))),
            (TypeNode::Scalar(ScalarType::Int), Value::Number(n)) => Ok(number_input(n)),
            (TypeNode::Scalar(ScalarType::Float), Value::Number(n)) => {
                Ok(n.as_f64().map(Bson::Double).unwrap_or(Bson::Null))
            }
            (TypeNode::Scalar(ScalarType::ObjectId), Value::String(text)) => Ok(
                ObjectId::parse_str(text)
                    .map(Bson::ObjectId)
                    .unwrap_or_else(|_| Bson::String(text.clone())),
            ),
            (TypeNode::Enum(name), Value::Enum(member)) => self.enum_input(name, member.as_str()),
            (TypeNode::Enum(name), Value::String(member)) => self.enum_input(name, member),
            (TypeNode::Object(name), Value::Object(map)) if name == LOCATION_INPUT_TYPE => {
                Ok(location_input(map.get("latitude"), map.get("longitude")))
            }
            (TypeNode::Object(name), Value::Object(_)) => {
                self.input_document(value, name).map(Bson::Document)
            }
            (TypeNode::List(inner), Value::List(items)) => items
                .iter()
                .map(|item| self.input_value(item, inner))
                .collect::<Result<Vec<_>, _>>()
                .map(Bson::Array),
            (_, other) => json_input(other.clone()),
        }
    }

    fn enum_input(&self, enum_name: &str, member: &str) -> Result<Bson, GraphQLError> {
        let value = self
            .enums
            .get(enum_name)
            .and_then(|def| def.member_by_name(member))
            .map(|member| member.value.clone())
            .ok_or_else(|| {
                GraphQLError::InvalidArgument(format!("\"{member}\" is not a member of {enum_name}"))
            })?;
        Bson::try_from(value).map_err(|e| GraphQLError::InvalidArgument(e.to_string()))
    }
}

/// Converts an arbitrary GraphQL value (a `JSON` scalar argument) to BSON.
pub fn json_input(value: Value) -> Result<Bson, GraphQLError> {
    let json = value
        .into_json()
        .map_err(|e| GraphQLError::InvalidArgument(e.to_string()))?;
    Bson::try_from(json).map_err(|e| GraphQLError::InvalidArgument(e.to_string()))
}

fn number_input(n: &Number) -> Bson {
    match n.as_i64() {
        Some(i) => i32::try_from(i).map(Bson::Int32).unwrap_or(Bson::Int64(i)),
        None => n.as_f64().map(Bson::Double).unwrap_or(Bson::Null),
    }
}

fn float_output(n: f64) -> Value {
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

fn scalar_output(scalar: ScalarType, value: &Bson) -> Value {
    match (scalar, value) {
        (ScalarType::String, Bson::String(text)) => Value::String(text.clone()),
        (ScalarType::String | ScalarType::ObjectId, Bson::ObjectId(id)) => Value::String(id.to_hex()),
        (ScalarType::String, other) => Value::String(match other.clone().into_relaxed_extjson() {
            serde_json::Value::String(text) => text,
            json => json.to_string(),
        }),
        (ScalarType::Int, Bson::Int32(n)) => Value::Number(Number::from(*n)),
        (ScalarType::Int, Bson::Int64(n)) => Value::Number(Number::from(*n)),
        (ScalarType::Int, Bson::Double(n)) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
            Value::Number(Number::from(*n as i64))
        }
        (ScalarType::Int | ScalarType::Float, Bson::Double(n)) => float_output(*n),
        (ScalarType::Float, Bson::Int32(n)) => float_output(f64::from(*n)),
        (ScalarType::Float, Bson::Int64(n)) => float_output(*n as f64),
        (ScalarType::Boolean, Bson::Boolean(b)) => Value::Boolean(*b),
        (ScalarType::Date, Bson::DateTime(date)) => date
            .try_to_rfc3339_string()
            .map(Value::String)
            .unwrap_or(Value::Null),
        (ScalarType::Date | ScalarType::ObjectId, Bson::String(text)) => Value::String(text.clone()),
        (ScalarType::Json, other) => {
            Value::from_json(other.clone().into_relaxed_extjson()).unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(n) => Some(*n),
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        _ => None,
    }
}

/// Reads a GeoJSON point, `coordinates: [longitude, latitude]`.
fn location_output(document: &Document) -> Value {
    let coordinates: Vec<Option<f64>> = document
        .get_array("coordinates")
        .map(|items| items.iter().map(as_f64).collect())
        .unwrap_or_default();
    let (Some(Some(longitude)), Some(Some(latitude))) = (coordinates.first(), coordinates.get(1))
    else {
        return Value::Null;
    };
    Value::Object(
        [
            (Name::new("latitude"), float_output(*latitude)),
            (Name::new("longitude"), float_output(*longitude)),
        ]
        .into_iter()
        .collect(),
    )
}

fn location_input(latitude: Option<&Value>, longitude: Option<&Value>) -> Bson {
    let coordinate = |value: Option<&Value>| match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or_default(),
        _ => 0.0,
    };
    Bson::Document(doc! {
        "type": "Point",
        "coordinates": [coordinate(longitude), coordinate(latitude)],
    })
}
