//! SDL formatter.
//!
//! Pure rendering of the type AST. Every name reaching this module is
//! already valid.

use super::ast::{BucketTypes, EnumDef, FieldDef, ObjectDef};

/// Types shared by every bucket.
pub const STATIC_TYPES: &str = r#"scalar Date

scalar ObjectID

scalar JSON

type Meta {
  total: Int
}

type Location {
  latitude: Float
  longitude: Float
}

input LocationInput {
  latitude: Float
  longitude: Float
}

type Query {
  _placeholder: String
}

type Mutation {
  _placeholder: String
}
"#;

fn render_field(field: &FieldDef) -> String {
    let bang = if field.required { "!" } else { "" };
    format!("  {}: {}{bang}\n", field.name, field.ty.render())
}

fn render_object(object: &ObjectDef) -> String {
    let keyword = if object.input { "input" } else { "type" };
    let mut out = format!("{keyword} {} {{\n", object.name);
    for field in &object.fields {
        out.push_str(&render_field(field));
    }
    out.push_str("}\n");
    out
}

fn render_enum(def: &EnumDef) -> String {
    let mut out = format!("enum {} {{\n", def.name);
    for member in &def.members {
        out.push_str(&format!("  {}\n", member.name));
    }
    out.push_str("}\n");
    out
}

/// Renders the types and root operations of one bucket.
pub fn render_bucket(types: &BucketTypes) -> String {
    let name = &types.type_name;
    let input = &types.input_name;
    let response = types.find_response_name();

    let mut blocks: Vec<String> = types.objects.iter().map(render_object).collect();
    blocks.push(format!(
        "type {response} {{\n  meta: Meta\n  data: [{name}]\n}}\n"
    ));
    blocks.extend(types.enums.iter().map(render_enum));

    blocks.push(format!(
        "extend type Query {{\n  \
         {find}(limit: Int, skip: Int, sort: JSON, language: String, schedule: Boolean, query: JSON): {response}\n  \
         {find_by_id}(_id: ObjectID!, language: String): {name}\n}}\n",
        find = types.find_field(),
        find_by_id = types.find_by_id_field(),
    ));
    blocks.push(format!(
        "extend type Mutation {{\n  \
         {insert}(input: {input}): {name}\n  \
         {replace}(_id: ObjectID!, input: {input}): {name}\n  \
         {patch}(_id: ObjectID!, input: JSON): {name}\n  \
         {delete}(_id: ObjectID!): String\n}}\n",
        insert = types.insert_field(),
        replace = types.replace_field(),
        patch = types.patch_field(),
        delete = types.delete_field(),
    ));

    blocks.join("\n")
}
