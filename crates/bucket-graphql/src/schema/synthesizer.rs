//! Bucket schema to GraphQL type synthesis.
//!
//! Synthesis is total: malformed property names, enum members, dangling
//! relations and unknown property types never fail. The query side
//! degrades the field to `String` and records a [`Diagnostic`]; the input
//! side sanitizes silently so mutations stay usable and nothing is reported
//! twice.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bucket_core::{BucketSchema, ID_FIELD, Properties, PropertySpec, PropertyType, RelationKind};
use tracing::{debug, warn};

use super::ast::{
    BucketTypes, Diagnostic, EnumDef, EnumMember, FieldDef, ObjectDef, ScalarType, TypeNode,
};
use super::names::{
    enum_member_text, is_valid_enum_value, is_valid_name, sanitize_enum_value, sanitize_name,
};
use super::sdl::{STATIC_TYPES, render_bucket};

/// Object type shared by every `location` property on the query side.
pub const LOCATION_TYPE: &str = "Location";
/// Input type shared by every `location` property on the mutation side.
pub const LOCATION_INPUT_TYPE: &str = "LocationInput";
/// Field added to input objects that would otherwise be empty.
pub const PLACEHOLDER_FIELD: &str = "_placeholder";

/// GraphQL type name of a bucket.
pub fn type_name(bucket_id: &str) -> String {
    format!("Bucket_{bucket_id}")
}

/// Output of a full synthesis over every live bucket.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub sdl: String,
    pub types: Vec<BucketTypes>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Synthesizes the complete SDL for a set of buckets.
pub fn synthesize(buckets: &[Arc<BucketSchema>]) -> Synthesis {
    let bucket_ids: HashSet<String> = buckets.iter().map(|bucket| bucket.id_hex()).collect();

    let mut sdl = String::from(STATIC_TYPES);
    let mut types = Vec::with_capacity(buckets.len());
    let mut diagnostics = Vec::new();
    for bucket in buckets {
        let (bucket_types, found) = synthesize_bucket(bucket, &bucket_ids);
        sdl.push('\n');
        sdl.push_str(&render_bucket(&bucket_types));
        types.push(bucket_types);
        diagnostics.extend(found);
    }

    for diagnostic in &diagnostics {
        warn!(target_field = %diagnostic.target, reason = %diagnostic.reason, "GraphQL field degraded");
    }
    debug!(
        buckets = types.len(),
        diagnostics = diagnostics.len(),
        "GraphQL types synthesized"
    );
    Synthesis {
        sdl,
        types,
        diagnostics,
    }
}

/// Renders the static types followed by the types of one bucket.
///
/// Diagnostics are appended to `diagnostics`; rendering never fails.
pub fn create_schema(
    bucket: &BucketSchema,
    static_types: &str,
    bucket_ids: &HashSet<String>,
    diagnostics: &mut Vec<Diagnostic>,
) -> String {
    let (types, found) = synthesize_bucket(bucket, bucket_ids);
    diagnostics.extend(found);
    format!("{static_types}\n{}", render_bucket(&types))
}

/// Builds the type AST of one bucket. `bucket_ids` is the set of live
/// buckets relations may point to.
pub fn synthesize_bucket(
    bucket: &BucketSchema,
    bucket_ids: &HashSet<String>,
) -> (BucketTypes, Vec<Diagnostic>) {
    let bucket_id = bucket.id_hex();
    let root = type_name(&bucket_id);
    let input_root = format!("{root}Input");

    let mut context = SynthesisContext::new(bucket_ids);
    context.query_object(&root, "", &bucket.properties);
    context.input_object(&input_root, &root, "", &bucket.properties, &bucket.required);

    let types = BucketTypes {
        bucket_id,
        type_name: root,
        input_name: input_root,
        objects: context.objects,
        enums: context.enums,
    };
    (types, context.diagnostics)
}

/// A query-side property being typed.
struct Property<'t> {
    /// Name nested types and enums are derived from.
    base: String,
    /// Dotted property path from the bucket root.
    path: String,
    /// Diagnostic target.
    target: &'t str,
}

fn property_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

/// Accumulator threaded through one bucket's synthesis.
struct SynthesisContext<'a> {
    bucket_ids: &'a HashSet<String>,
    objects: Vec<ObjectDef>,
    enums: Vec<EnumDef>,
    /// Query-side enums by dotted property path, reused by the input side.
    shared_enums: HashMap<String, String>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> SynthesisContext<'a> {
    fn new(bucket_ids: &'a HashSet<String>) -> Self {
        Self {
            bucket_ids,
            objects: Vec::new(),
            enums: Vec::new(),
            shared_enums: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    fn diagnose(&mut self, target: &str, reason: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(target, reason));
    }

    fn is_taken(&self, name: &str) -> bool {
        name == LOCATION_TYPE
            || name == LOCATION_INPUT_TYPE
            || self.objects.iter().any(|object| object.name == name)
            || self.enums.iter().any(|e| e.name == name)
    }

    fn unique_name(&self, base: String) -> String {
        if !self.is_taken(&base) {
            return base;
        }
        (2..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.is_taken(candidate))
            .unwrap_or(base)
    }

    /// Reserves a slot so a parent precedes its nested types.
    fn reserve(&mut self, name: &str, input: bool) -> usize {
        self.objects.push(ObjectDef {
            name: name.to_string(),
            fields: Vec::new(),
            input,
        });
        self.objects.len() - 1
    }

    // ==================== Query side ====================

    /// `path` is the dotted property path of the object, empty at the root.
    fn query_object(&mut self, name: &str, path: &str, properties: &Properties) {
        let slot = self.reserve(name, false);
        let mut fields = Vec::new();
        if path.is_empty() {
            fields.push(FieldDef::new(
                ID_FIELD,
                ID_FIELD,
                TypeNode::Scalar(ScalarType::ObjectId),
            ));
        }

        for (key, spec) in properties {
            let target = format!("{name}.{key}");
            let valid = is_valid_name(key);
            let field_name = if valid { key.clone() } else { sanitize_name(key) };
            if fields.iter().any(|field: &FieldDef| field.name == field_name) {
                self.diagnose(
                    &target,
                    format!("field name \"{field_name}\" is already taken"),
                );
                continue;
            }

            let ty = if valid {
                let property = Property {
                    base: format!("{name}_{key}"),
                    path: property_path(path, key),
                    target: &target,
                };
                self.query_type(&property, spec)
            } else {
                self.diagnose(&target, format!("\"{key}\" is not a valid GraphQL name"));
                TypeNode::string()
            };
            fields.push(FieldDef::new(field_name, key.clone(), ty));
        }
        self.objects[slot].fields = fields;
    }

    fn query_type(&mut self, property: &Property<'_>, spec: &PropertySpec) -> TypeNode {
        let target = property.target;
        if spec.kind.is_textual()
            && let Some(members) = spec.enum_members()
        {
            return self.query_enum(property, members);
        }

        match &spec.kind {
            kind if kind.is_textual() => TypeNode::string(),
            PropertyType::Number => TypeNode::Scalar(ScalarType::Int),
            PropertyType::Boolean => TypeNode::Scalar(ScalarType::Boolean),
            PropertyType::Date => TypeNode::Scalar(ScalarType::Date),
            PropertyType::Location => TypeNode::Object(LOCATION_TYPE.to_string()),
            PropertyType::Object => match spec.properties.as_ref().filter(|p| !p.is_empty()) {
                Some(properties) => {
                    let name = self.unique_name(property.base.clone());
                    self.query_object(&name, &property.path, properties);
                    TypeNode::Object(name)
                }
                None => TypeNode::Scalar(ScalarType::Json),
            },
            PropertyType::Array => match &spec.items {
                Some(items) => TypeNode::list(self.query_type(property, items)),
                None => TypeNode::Scalar(ScalarType::Json),
            },
            PropertyType::Relation => self.query_relation(target, spec),
            other => {
                self.diagnose(target, format!("unknown property type \"{other}\""));
                TypeNode::string()
            }
        }
    }

    fn query_relation(&mut self, target: &str, spec: &PropertySpec) -> TypeNode {
        let many = spec.relation_type == Some(RelationKind::OneToMany);
        let ids_only = if many {
            TypeNode::list(TypeNode::string())
        } else {
            TypeNode::string()
        };

        let kind = match &spec.relation_type {
            Some(kind) if kind.is_valid() => kind,
            Some(kind) => {
                self.diagnose(target, format!("invalid relation type \"{kind}\""));
                return TypeNode::string();
            }
            None => {
                self.diagnose(target, "relation type is missing");
                return TypeNode::string();
            }
        };
        let Some(bucket_id) = spec.bucket_id.as_deref() else {
            self.diagnose(target, "relation has no target bucket");
            return ids_only;
        };
        if !self.bucket_ids.contains(bucket_id) {
            self.diagnose(
                target,
                format!("related bucket \"{bucket_id}\" does not exist"),
            );
            return ids_only;
        }

        TypeNode::Relation {
            type_name: type_name(bucket_id),
            bucket_id: bucket_id.to_string(),
            many: *kind == RelationKind::OneToMany,
        }
    }

    fn query_enum(&mut self, property: &Property<'_>, members: &[serde_json::Value]) -> TypeNode {
        if let Some(invalid) = members
            .iter()
            .map(enum_member_text)
            .find(|text| !is_valid_enum_value(text))
        {
            self.diagnose(
                property.target,
                format!("enum value \"{invalid}\" is not a valid GraphQL name"),
            );
            return TypeNode::string();
        }

        let name = self.register_enum(format!("{}Enum", property.base), members, |text| {
            text.to_string()
        });
        self.shared_enums.insert(property.path.clone(), name.clone());
        TypeNode::Enum(name)
    }

    /// Registers an enum, keeping the first member for each name.
    fn register_enum(
        &mut self,
        base: String,
        members: &[serde_json::Value],
        name_of: impl Fn(&str) -> String,
    ) -> String {
        let name = self.unique_name(base);
        let mut def = EnumDef {
            name: name.clone(),
            members: Vec::new(),
        };
        for value in members {
            let member = name_of(&enum_member_text(value));
            if def.member_by_name(&member).is_none() {
                def.members.push(EnumMember {
                    name: member,
                    value: value.clone(),
                });
            }
        }
        self.enums.push(def);
        name
    }

    // ==================== Input side ====================

    fn input_object(
        &mut self,
        name: &str,
        base: &str,
        path: &str,
        properties: &Properties,
        required: &[String],
    ) {
        let slot = self.reserve(name, true);
        let mut fields: Vec<FieldDef> = Vec::new();

        for (key, spec) in properties {
            let field_name = if is_valid_name(key) {
                key.clone()
            } else {
                sanitize_name(key)
            };
            if field_name == ID_FIELD || fields.iter().any(|field| field.name == field_name) {
                continue;
            }
            let ty = self.input_type(
                &format!("{base}_{field_name}"),
                &property_path(path, key),
                spec,
            );
            fields.push(FieldDef::new(field_name, key.clone(), ty).required(required.contains(key)));
        }

        if fields.is_empty() {
            fields.push(FieldDef::new(PLACEHOLDER_FIELD, "", TypeNode::string()));
        }
        self.objects[slot].fields = fields;
    }

    fn input_type(&mut self, base: &str, path: &str, spec: &PropertySpec) -> TypeNode {
        if spec.kind.is_textual()
            && let Some(members) = spec.enum_members()
        {
            if let Some(shared) = self.shared_enums.get(path) {
                return TypeNode::Enum(shared.clone());
            }
            let name = self.register_enum(format!("{base}Enum"), members, sanitize_enum_value);
            return TypeNode::Enum(name);
        }

        match &spec.kind {
            PropertyType::Number => TypeNode::Scalar(ScalarType::Int),
            PropertyType::Boolean => TypeNode::Scalar(ScalarType::Boolean),
            PropertyType::Date => TypeNode::Scalar(ScalarType::Date),
            PropertyType::Location => TypeNode::Object(LOCATION_INPUT_TYPE.to_string()),
            PropertyType::Object => match spec.properties.as_ref().filter(|p| !p.is_empty()) {
                Some(properties) => {
                    let name = self.unique_name(format!("{base}Input"));
                    let required = spec.required.clone().unwrap_or_default();
                    self.input_object(&name, base, path, properties, &required);
                    TypeNode::Object(name)
                }
                None => TypeNode::Scalar(ScalarType::Json),
            },
            PropertyType::Array => match &spec.items {
                Some(items) => TypeNode::list(self.input_type(base, path, items)),
                None => TypeNode::Scalar(ScalarType::Json),
            },
            PropertyType::Relation if spec.relation_type == Some(RelationKind::OneToMany) => {
                TypeNode::list(TypeNode::string())
            }
            _ => TypeNode::string(),
        }
    }
}
