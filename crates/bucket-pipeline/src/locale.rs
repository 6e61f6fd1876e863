//! Locale negotiation and the i18n merge stage.
//!
//! Translatable properties (`options.translate`) store a map of language
//! code to value. The merge stage replaces each of them with the best
//! language, falling back to the default language and finally to the raw
//! value.

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use bucket_core::{BucketPreferences, LanguagePreference, Properties};
use bucket_storage::StorageError;
use serde::Serialize;

/// Languages a request is served in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Locale {
    pub best: String,
    pub fallback: String,
}

/// Source of the engine-wide bucket preferences.
#[async_trait]
pub trait PreferenceSource: Send + Sync {
    async fn bucket_preferences(&self) -> Result<BucketPreferences, StorageError>;
}

/// Fixed preferences.
#[derive(Debug, Clone, Default)]
pub struct StaticPreferences(pub BucketPreferences);

#[async_trait]
impl PreferenceSource for StaticPreferences {
    async fn bucket_preferences(&self) -> Result<BucketPreferences, StorageError> {
        Ok(self.0.clone())
    }
}

/// Negotiates `Accept-Language` against the available languages.
///
/// Ranges are tried by descending quality. Each range first matches a
/// language code exactly (`en-US` and `en_us` both match `en_US`), then by
/// primary subtag. Without a match the default language is used.
pub fn find_locale(accept_language: Option<&str>, preference: &LanguagePreference) -> Locale {
    let best = accept_language
        .and_then(|header| negotiate(header, preference))
        .unwrap_or_else(|| preference.default.clone());
    Locale {
        best,
        fallback: preference.default.clone(),
    }
}

fn negotiate(header: &str, preference: &LanguagePreference) -> Option<String> {
    let mut ranges: Vec<(String, f32)> = header
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.trim().split(';');
            let tag = pieces.next()?.trim();
            if tag.is_empty() {
                return None;
            }
            let quality = pieces
                .find_map(|param| param.trim().strip_prefix("q="))
                .and_then(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            (quality > 0.0).then(|| (normalize(tag), quality))
        })
        .collect();
    ranges.sort_by(|a, b| b.1.total_cmp(&a.1));

    for (range, _) in &ranges {
        if range == "*" {
            return Some(preference.default.clone());
        }
        if let Some(code) = preference
            .available
            .keys()
            .find(|code| normalize(code) == *range)
        {
            return Some(code.clone());
        }
        let primary = primary_subtag(range);
        if let Some(code) = preference
            .available
            .keys()
            .find(|code| primary_subtag(&normalize(code)) == primary)
        {
            return Some(code.clone());
        }
    }
    None
}

fn normalize(tag: &str) -> String {
    tag.replace('-', "_").to_ascii_lowercase()
}

fn primary_subtag(tag: &str) -> &str {
    tag.split('_').next().unwrap_or(tag)
}

/// Dotted paths of every translatable property, including ones nested in
/// objects.
pub fn translatable_paths(properties: &Properties) -> Vec<String> {
    fn collect(properties: &Properties, prefix: &str, out: &mut Vec<String>) {
        for (name, spec) in properties {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            if spec.is_translatable() {
                out.push(path);
            } else if let Some(nested) = spec.nested() {
                collect(nested, &path, out);
            }
        }
    }
    let mut paths = Vec::new();
    collect(properties, "", &mut paths);
    paths
}

pub fn has_translated_properties(properties: &Properties) -> bool {
    !translatable_paths(properties).is_empty()
}

fn overlaps(path: &str, requested: &str) -> bool {
    path == requested
        || path.starts_with(&format!("{requested}."))
        || requested.starts_with(&format!("{path}."))
}

/// Builds the `$set` stage merging translatable properties.
///
/// With `requested` set, only properties overlapping a requested path are
/// merged. Returns `None` when nothing needs merging.
pub fn build_i18n_stage(
    properties: &Properties,
    locale: &Locale,
    requested: Option<&[String]>,
) -> Option<Document> {
    let mut merged = Document::new();
    for path in translatable_paths(properties) {
        if let Some(requested) = requested
            && !requested.iter().any(|r| overlaps(&path, r))
        {
            continue;
        }
        let value: Bson = bson::bson!({
            "$ifNull": [
                format!("${path}.{}", locale.best),
                format!("${path}.{}", locale.fallback),
                format!("${path}"),
            ]
        });
        merged.insert(path, value);
    }
    (!merged.is_empty()).then(|| doc! { "$set": merged })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucket_core::{PropertySpec, PropertyType};

    fn preference() -> LanguagePreference {
        LanguagePreference::new([("en_US", "English"), ("tr_TR", "Turkish")], "en_US")
    }

    fn translatable(kind: PropertyType) -> PropertySpec {
        let mut spec = PropertySpec::of(kind);
        spec.options.translate = true;
        spec
    }

    #[test]
    fn test_exact_match_ignores_separator_and_case() {
        let locale = find_locale(Some("tr-tr"), &preference());
        assert_eq!(locale.best, "tr_TR");
        assert_eq!(locale.fallback, "en_US");
    }

    #[test]
    fn test_primary_subtag_match() {
        let locale = find_locale(Some("tr"), &preference());
        assert_eq!(locale.best, "tr_TR");
    }

    #[test]
    fn test_quality_ordering() {
        let locale = find_locale(Some("en-US;q=0.5, tr-TR;q=0.9"), &preference());
        assert_eq!(locale.best, "tr_TR");

        let locale = find_locale(Some("tr-TR;q=0, fr"), &preference());
        assert_eq!(locale.best, "en_US");
    }

    #[test]
    fn test_missing_header_uses_default() {
        assert_eq!(find_locale(None, &preference()).best, "en_US");
        assert_eq!(find_locale(Some("de-DE"), &preference()).best, "en_US");
    }

    #[test]
    fn test_i18n_stage_merges_schema_marked_fields() {
        let mut meta = Properties::new();
        meta.insert("summary".to_string(), translatable(PropertyType::Textarea));
        meta.insert("slug".to_string(), PropertySpec::of(PropertyType::String));

        let mut properties = Properties::new();
        properties.insert("title".to_string(), translatable(PropertyType::String));
        properties.insert("count".to_string(), PropertySpec::of(PropertyType::Number));
        properties.insert(
            "meta".to_string(),
            PropertySpec {
                properties: Some(meta),
                ..PropertySpec::of(PropertyType::Object)
            },
        );

        let locale = Locale {
            best: "tr_TR".to_string(),
            fallback: "en_US".to_string(),
        };
        let stage = build_i18n_stage(&properties, &locale, None).unwrap();
        assert_eq!(
            stage,
            doc! {"$set": {
                "title": {"$ifNull": ["$title.tr_TR", "$title.en_US", "$title"]},
                "meta.summary": {"$ifNull": ["$meta.summary.tr_TR", "$meta.summary.en_US", "$meta.summary"]},
            }}
        );

        let only_meta = build_i18n_stage(&properties, &locale, Some(&["meta".to_string()])).unwrap();
        assert_eq!(only_meta.get_document("$set").unwrap().len(), 1);

        assert!(build_i18n_stage(&properties, &locale, Some(&["count".to_string()])).is_none());
    }
}
