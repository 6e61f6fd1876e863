//! Bucket schema to GraphQL synthesis.
//!
//! - [`synthesizer`] turns bucket schemas into a type AST and SDL text
//! - [`sdl`] renders the AST
//! - [`builder`] turns the AST into an executable schema

pub mod ast;
pub mod builder;
pub mod names;
pub mod sdl;
pub mod synthesizer;

pub use ast::{BucketTypes, Diagnostic, EnumDef, FieldDef, ObjectDef, ScalarType, TypeNode};
pub use builder::BucketSchemaBuilder;
pub use names::{is_valid_enum_value, is_valid_name, sanitize_enum_value, sanitize_name};
pub use sdl::{STATIC_TYPES, render_bucket};
pub use synthesizer::{Synthesis, create_schema, synthesize, synthesize_bucket, type_name};
