//! GraphQL name validation and sanitization.

use std::sync::LazyLock;

use regex::Regex;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[_A-Za-z][_0-9A-Za-z]*$").expect("valid name pattern"));

/// Literals that match the name grammar but cannot name an enum value.
const RESERVED_ENUM_VALUES: [&str; 3] = ["true", "false", "null"];

/// Returns true when `name` is a legal GraphQL identifier.
pub fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN.is_match(name)
}

pub fn is_valid_enum_value(name: &str) -> bool {
    is_valid_name(name) && !RESERVED_ENUM_VALUES.contains(&name)
}

/// Turns an arbitrary string into a legal identifier: a leading digit is
/// prefixed with `_` and every other illegal character becomes `_`.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 1);
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        out.push('_');
    }
    out.extend(name.chars().map(|c| {
        if c.is_ascii_alphanumeric() || c == '_' {
            c
        } else {
            '_'
        }
    }));
    out
}

pub fn sanitize_enum_value(name: &str) -> String {
    let sanitized = sanitize_name(name);
    if RESERVED_ENUM_VALUES.contains(&sanitized.as_str()) {
        format!("_{sanitized}")
    } else {
        sanitized
    }
}

/// Text an enum member is named after.
pub fn enum_member_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
