//! Bucket preferences.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Preferences shared by all buckets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketPreferences {
    #[serde(default)]
    pub language: LanguagePreference,
}

/// Languages content can be translated into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguagePreference {
    /// Language code (e.g. `en_US`) to display name.
    pub available: IndexMap<String, String>,
    /// Language used when negotiation finds no match.
    pub default: String,
}

impl LanguagePreference {
    pub fn new(
        available: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
        default: impl Into<String>,
    ) -> Self {
        Self {
            available: available
                .into_iter()
                .map(|(code, name)| (code.into(), name.into()))
                .collect(),
            default: default.into(),
        }
    }
}

impl Default for LanguagePreference {
    fn default() -> Self {
        Self::new([("en_US", "English")], "en_US")
    }
}
