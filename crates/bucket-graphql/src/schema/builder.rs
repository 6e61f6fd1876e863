//! Executable schema builder.
//!
//! Turns a [`Synthesis`] into an `async_graphql` dynamic schema. Object
//! fields read straight from the converted parent value; root fields are
//! wired to the resolvers in [`crate::resolvers`].

use std::collections::HashMap;
use std::sync::Arc;

use async_graphql::Value;
use async_graphql::dynamic::{
    Enum, EnumItem, Field, FieldFuture, InputObject, InputValue, Object, Scalar, Schema,
    SchemaBuilder, TypeRef,
};
use bucket_core::{BucketSchema, ID_FIELD};
use tracing::{debug, trace};

use super::ast::{BucketTypes, FieldDef, ObjectDef, TypeNode};
use super::synthesizer::{LOCATION_INPUT_TYPE, LOCATION_TYPE, PLACEHOLDER_FIELD, Synthesis};
use crate::config::SchemaBuilderConfig;
use crate::error::GraphQLError;
use crate::resolvers::{self, BucketOperations};
use crate::value::TypeIndex;

/// Builds the executable schema for a set of buckets.
///
/// # Example
///
/// ```ignore
/// let synthesis = synthesize(&buckets);
/// let schema = BucketSchemaBuilder::new(SchemaBuilderConfig::default())
///     .build(&synthesis, &buckets)?;
/// ```
pub struct BucketSchemaBuilder {
    config: SchemaBuilderConfig,
}

impl BucketSchemaBuilder {
    #[must_use]
    pub fn new(config: SchemaBuilderConfig) -> Self {
        Self { config }
    }

    /// Builds the schema. `buckets` must be the set `synthesis` was
    /// produced from.
    ///
    /// # Errors
    ///
    /// Returns [`GraphQLError::SchemaBuildFailed`] if async-graphql rejects
    /// the assembled types.
    pub fn build(
        &self,
        synthesis: &Synthesis,
        buckets: &[Arc<BucketSchema>],
    ) -> Result<Schema, GraphQLError> {
        debug!(buckets = buckets.len(), "Starting GraphQL schema build");

        let index = Arc::new(TypeIndex::new(&synthesis.types));
        let bucket_map: Arc<HashMap<String, Arc<BucketSchema>>> = Arc::new(
            buckets
                .iter()
                .map(|bucket| (bucket.id_hex(), bucket.clone()))
                .collect(),
        );

        let mut builder = Schema::build("Query", Some("Mutation"), None);
        builder = register_static_types(builder);

        let mut query = Object::new("Query").field(placeholder_field());
        let mut mutation = Object::new("Mutation").field(placeholder_field());

        for types in &synthesis.types {
            let description = bucket_map
                .get(&types.bucket_id)
                .map(|bucket| bucket.title.clone())
                .filter(|title| !title.is_empty());
            builder = register_bucket_types(builder, types, description);

            let ops = BucketOperations {
                bucket_id: types.bucket_id.clone(),
                type_name: types.type_name.clone(),
                input_name: types.input_name.clone(),
                index: index.clone(),
                buckets: bucket_map.clone(),
            };
            query = add_query_fields(query, types, &ops);
            mutation = add_mutation_fields(mutation, types, &ops);
            trace!(bucket_id = %types.bucket_id, "Registered bucket operations");
        }

        builder = builder.register(query).register(mutation);

        let mut builder = builder
            .limit_depth(self.config.max_depth)
            .limit_complexity(self.config.max_complexity);
        if !self.config.introspection_enabled {
            builder = builder.disable_introspection();
        }

        let schema = builder
            .finish()
            .map_err(|e| GraphQLError::SchemaBuildFailed(e.to_string()))?;

        debug!("GraphQL schema build complete");
        Ok(schema)
    }
}

/// Scalars, `Meta` and the location types.
fn register_static_types(mut builder: SchemaBuilder) -> SchemaBuilder {
    let scalars = [
        ("Date", "An RFC 3339 timestamp"),
        ("ObjectID", "A 24 character hexadecimal document id"),
        ("JSON", "Arbitrary JSON value"),
    ];
    for (name, description) in scalars {
        builder = builder.register(Scalar::new(name).description(description));
    }

    let float = || TypeRef::named(TypeRef::FLOAT);
    builder
        .register(Object::new("Meta").field(parent_field("total", TypeRef::named(TypeRef::INT))))
        .register(
            Object::new(LOCATION_TYPE)
                .field(parent_field("latitude", float()))
                .field(parent_field("longitude", float())),
        )
        .register(
            InputObject::new(LOCATION_INPUT_TYPE)
                .field(InputValue::new("latitude", float()))
                .field(InputValue::new("longitude", float())),
        )
}

fn register_bucket_types(
    mut builder: SchemaBuilder,
    types: &BucketTypes,
    description: Option<String>,
) -> SchemaBuilder {
    for object in &types.objects {
        if object.input {
            builder = builder.register(input_object(object));
        } else {
            let mut output = output_object(object);
            if object.name == types.type_name
                && let Some(description) = &description
            {
                output = output.description(description);
            }
            builder = builder.register(output);
        }
    }

    for def in &types.enums {
        let mut item = Enum::new(&def.name);
        for member in &def.members {
            item = item.item(EnumItem::new(&member.name));
        }
        builder = builder.register(item);
    }

    builder.register(
        Object::new(types.find_response_name())
            .field(parent_field("meta", TypeRef::named("Meta")))
            .field(parent_field("data", TypeRef::named_list(&types.type_name))),
    )
}

fn output_object(object: &ObjectDef) -> Object {
    object
        .fields
        .iter()
        .fold(Object::new(&object.name), |output, field| {
            output.field(parent_field(&field.name, field_type(field)))
        })
}

fn input_object(object: &ObjectDef) -> InputObject {
    object
        .fields
        .iter()
        .fold(InputObject::new(&object.name), |input, field| {
            input.field(InputValue::new(&field.name, field_type(field)))
        })
}

fn add_query_fields(query: Object, types: &BucketTypes, ops: &BucketOperations) -> Object {
    let optional = |name: &str, ty: &str| InputValue::new(name, TypeRef::named(ty));

    query
        .field(
            Field::new(
                types.find_field(),
                TypeRef::named(types.find_response_name()),
                resolvers::find(ops.clone()),
            )
            .argument(optional("limit", TypeRef::INT))
            .argument(optional("skip", TypeRef::INT))
            .argument(optional("sort", "JSON"))
            .argument(optional("language", TypeRef::STRING))
            .argument(optional("schedule", TypeRef::BOOLEAN))
            .argument(optional("query", "JSON")),
        )
        .field(
            Field::new(
                types.find_by_id_field(),
                TypeRef::named(&types.type_name),
                resolvers::find_by_id(ops.clone()),
            )
            .argument(id_argument())
            .argument(optional("language", TypeRef::STRING)),
        )
}

fn add_mutation_fields(mutation: Object, types: &BucketTypes, ops: &BucketOperations) -> Object {
    let output = || TypeRef::named(&types.type_name);
    let input = || InputValue::new("input", TypeRef::named(&types.input_name));

    mutation
        .field(
            Field::new(types.insert_field(), output(), resolvers::insert(ops.clone()))
                .argument(input()),
        )
        .field(
            Field::new(types.replace_field(), output(), resolvers::replace(ops.clone()))
                .argument(id_argument())
                .argument(input()),
        )
        .field(
            Field::new(types.patch_field(), output(), resolvers::patch(ops.clone()))
                .argument(id_argument())
                .argument(InputValue::new("input", TypeRef::named("JSON"))),
        )
        .field(
            Field::new(
                types.delete_field(),
                TypeRef::named(TypeRef::STRING),
                resolvers::delete(ops.clone()),
            )
            .argument(id_argument()),
        )
}

fn id_argument() -> InputValue {
    InputValue::new(ID_FIELD, TypeRef::named_nn("ObjectID"))
}

/// Root placeholder so an empty bucket set still yields a valid schema.
fn placeholder_field() -> Field {
    Field::new(PLACEHOLDER_FIELD, TypeRef::named(TypeRef::STRING), |_| {
        FieldFuture::new(async move { Ok(None::<Value>) })
    })
}

/// Field whose value is read from the parent object under `name`.
fn parent_field(name: &str, ty: TypeRef) -> Field {
    let key = name.to_string();
    Field::new(name, ty, move |ctx| {
        let key = key.clone();
        FieldFuture::new(async move {
            if let Some(Value::Object(obj)) = ctx.parent_value.as_value()
                && let Some(value) = obj.get(key.as_str())
            {
                return Ok(Some(value.clone()));
            }
            Ok(None)
        })
    })
}

fn field_type(field: &FieldDef) -> TypeRef {
    let ty = type_ref(&field.ty);
    if field.required {
        TypeRef::NonNull(Box::new(ty))
    } else {
        ty
    }
}

/// Maps a synthesized type to a dynamic schema type reference.
pub(crate) fn type_ref(ty: &TypeNode) -> TypeRef {
    match ty {
        TypeNode::Scalar(scalar) => TypeRef::named(scalar.name()),
        TypeNode::Enum(name) | TypeNode::Object(name) => TypeRef::named(name),
        TypeNode::List(inner) => TypeRef::List(Box::new(type_ref(inner))),
        TypeNode::Relation {
            type_name, many, ..
        } => {
            if *many {
                TypeRef::named_list(type_name)
            } else {
                TypeRef::named(type_name)
            }
        }
    }
}
