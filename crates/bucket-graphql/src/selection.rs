//! Requested-field extraction.
//!
//! The selection of a GraphQL field is captured as a [`FieldTree`] and
//! flattened into dotted paths. The paths gate which translatable fields
//! are merged and which relations are joined.

use async_graphql::SelectionField;

const TYPENAME: &str = "__typename";

/// A selected field and its sub-selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTree {
    pub name: String,
    pub children: Vec<FieldTree>,
}

impl FieldTree {
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn node(name: impl Into<String>, children: Vec<FieldTree>) -> Self {
        Self {
            name: name.into(),
            children,
        }
    }

    /// Captures a selection. Fragments are already inlined.
    pub fn from_selection(field: SelectionField<'_>) -> Self {
        Self {
            name: field.name().to_string(),
            children: field.selection_set().map(Self::from_selection).collect(),
        }
    }
}

/// Flattens selections into dotted paths, in first-seen order.
///
/// With `flatten` set, only selections of that root name are read and the
/// root itself is dropped from the paths, so repeated `data { ... }`
/// selections under a pagination wrapper merge into one set.
pub fn requested_fields(fields: &[FieldTree], flatten: Option<&str>) -> Vec<String> {
    let mut paths = Vec::new();
    match flatten {
        Some(root) => {
            for field in fields.iter().filter(|f| f.name == root) {
                collect(&field.children, "", &mut paths);
            }
        }
        None => collect(fields, "", &mut paths),
    }
    paths
}

fn collect(fields: &[FieldTree], prefix: &str, paths: &mut Vec<String>) {
    for field in fields.iter().filter(|f| f.name != TYPENAME) {
        let path = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{prefix}.{}", field.name)
        };
        // A sub-selection of only `__typename` still needs the field itself.
        if field.children.iter().all(|child| child.name == TYPENAME) {
            if !paths.contains(&path) {
                paths.push(path);
            }
        } else {
            collect(&field.children, &path, paths);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_paths() {
        let fields = vec![
            FieldTree::leaf("title"),
            FieldTree::node(
                "author",
                vec![FieldTree::leaf("name"), FieldTree::leaf("__typename")],
            ),
        ];
        assert_eq!(
            requested_fields(&fields, None),
            vec!["title", "author.name"]
        );
    }

    #[test]
    fn test_flatten_merges_repeated_roots() {
        let fields = vec![
            FieldTree::node("meta", vec![FieldTree::leaf("total")]),
            FieldTree::node("data", vec![FieldTree::leaf("title")]),
            FieldTree::node(
                "data",
                vec![FieldTree::leaf("title"), FieldTree::leaf("body")],
            ),
        ];
        assert_eq!(
            requested_fields(&fields, Some("data")),
            vec!["title", "body"]
        );
    }

    #[test]
    fn test_typename_only_sub_selection_keeps_parent() {
        let fields = vec![
            FieldTree::node("author", vec![FieldTree::leaf("__typename")]),
            FieldTree::node(
                "meta",
                vec![FieldTree::node("editor", vec![FieldTree::leaf("__typename")])],
            ),
        ];
        assert_eq!(
            requested_fields(&fields, None),
            vec!["author", "meta.editor"]
        );
    }

    #[test]
    fn test_typename_only_selection_is_empty() {
        let fields = vec![FieldTree::leaf("__typename")];
        assert!(requested_fields(&fields, None).is_empty());
    }
}
