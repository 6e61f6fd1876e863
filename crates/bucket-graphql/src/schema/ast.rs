//! Type AST produced by the synthesizer.
//!
//! Every bucket property is turned into one [`TypeNode`] per side (query
//! output and mutation input). The SDL formatter and the executable schema
//! builder both consume the same AST, so sanitization happens exactly once.

use serde::Serialize;

/// Scalars available to bucket types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    String,
    Int,
    Float,
    Boolean,
    Date,
    ObjectId,
    Json,
}

impl ScalarType {
    /// GraphQL name of the scalar.
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::Boolean => "Boolean",
            Self::Date => "Date",
            Self::ObjectId => "ObjectID",
            Self::Json => "JSON",
        }
    }
}

/// Type of a synthesized field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeNode {
    Scalar(ScalarType),
    Enum(String),
    Object(String),
    List(Box<TypeNode>),
    /// Reference to another bucket's type, resolved from a joined value.
    Relation {
        type_name: String,
        bucket_id: String,
        many: bool,
    },
}

impl TypeNode {
    pub fn string() -> Self {
        Self::Scalar(ScalarType::String)
    }

    pub fn list(inner: TypeNode) -> Self {
        Self::List(Box::new(inner))
    }

    /// Renders the type reference in SDL notation.
    pub fn render(&self) -> String {
        match self {
            Self::Scalar(scalar) => scalar.name().to_string(),
            Self::Enum(name) | Self::Object(name) => name.clone(),
            Self::List(inner) => format!("[{}]", inner.render()),
            Self::Relation {
                type_name, many, ..
            } => {
                if *many {
                    format!("[{type_name}]")
                } else {
                    type_name.clone()
                }
            }
        }
    }

    /// Name of the object type values of this node resolve to, looking
    /// through lists.
    pub fn object_name(&self) -> Option<&str> {
        match self {
            Self::Object(name) => Some(name),
            Self::Relation { type_name, .. } => Some(type_name),
            Self::List(inner) => inner.object_name(),
            _ => None,
        }
    }
}

/// A field of an object or input object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// GraphQL field name.
    pub name: String,
    /// Document key the field is read from or written to. Empty for
    /// synthetic fields.
    pub source: String,
    pub ty: TypeNode,
    pub required: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, source: impl Into<String>, ty: TypeNode) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            ty,
            required: false,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn is_synthetic(&self) -> bool {
        self.source.is_empty()
    }
}

/// An object type or an input object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub input: bool,
}

impl ObjectDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// A member of a synthesized enum and the stored value it stands for.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumMember {
    pub name: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub name: String,
    pub members: Vec<EnumMember>,
}

impl EnumDef {
    pub fn member_by_name(&self, name: &str) -> Option<&EnumMember> {
        self.members.iter().find(|member| member.name == name)
    }

    pub fn member_by_value(&self, value: &serde_json::Value) -> Option<&EnumMember> {
        self.members.iter().find(|member| &member.value == value)
    }
}

/// A non-fatal synthesis problem. The offending field was degraded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// `{TypeName}.{property}` of the degraded field.
    pub target: String,
    pub reason: String,
}

impl Diagnostic {
    pub fn new(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

/// Every type synthesized for one bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketTypes {
    pub bucket_id: String,
    /// Root output type, `Bucket_{id}`.
    pub type_name: String,
    /// Root input type, `Bucket_{id}Input`.
    pub input_name: String,
    /// Output and input objects. Each root precedes its nested types.
    pub objects: Vec<ObjectDef>,
    pub enums: Vec<EnumDef>,
}

impl BucketTypes {
    pub fn find_response_name(&self) -> String {
        format!("{}FindResponse", self.type_name)
    }

    pub fn find_field(&self) -> String {
        format!("Find{}", self.type_name)
    }

    pub fn find_by_id_field(&self) -> String {
        format!("FindBy{}Id", self.type_name)
    }

    pub fn insert_field(&self) -> String {
        format!("insert{}", self.type_name)
    }

    pub fn replace_field(&self) -> String {
        format!("replace{}", self.type_name)
    }

    pub fn patch_field(&self) -> String {
        format!("patch{}", self.type_name)
    }

    pub fn delete_field(&self) -> String {
        format!("delete{}", self.type_name)
    }

    pub fn object(&self, name: &str) -> Option<&ObjectDef> {
        self.objects.iter().find(|object| object.name == name)
    }

    pub fn root(&self) -> Option<&ObjectDef> {
        self.object(&self.type_name)
    }

    pub fn input_root(&self) -> Option<&ObjectDef> {
        self.object(&self.input_name)
    }
}
