//! Engine configuration.
//!
//! Loaded from an optional TOML file plus environment overrides of the form
//! `BUCKET__SECTION__KEY`, e.g. `BUCKET__QUERY__MAX_LIMIT=500`.
//!
//! ```toml
//! [storage]
//! buckets_collection = "buckets"
//!
//! [query]
//! default_limit = 25
//! max_limit = 1000
//!
//! [scheduler]
//! enabled = true
//! recover_on_start = true
//!
//! [registry]
//! watch = true
//!
//! [logging]
//! level = "info"
//!
//! [graphql]
//! enabled = true
//! max_depth = 15
//! ```

use bucket_core::BUCKETS_COLLECTION;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub query: QuerySettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub registry: RegistrySettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub graphql: GraphQLConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.storage.buckets_collection.trim().is_empty() {
            return Err("storage.buckets_collection must not be empty".into());
        }
        if self.query.max_limit == 0 {
            return Err("query.max_limit must be > 0".into());
        }
        if let Some(default_limit) = self.query.default_limit
            && (default_limit == 0 || default_limit > self.query.max_limit)
        {
            return Err("query.default_limit must be > 0 and <= query.max_limit".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        self.graphql.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Collection holding bucket schemas.
    #[serde(default = "default_buckets_collection")]
    pub buckets_collection: String,
}

fn default_buckets_collection() -> String {
    BUCKETS_COLLECTION.to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            buckets_collection: default_buckets_collection(),
        }
    }
}

/// Limits applied to document finds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySettings {
    /// Limit used when a request sets none. Unlimited when absent.
    #[serde(default)]
    pub default_limit: Option<u64>,
    #[serde(default = "default_max_limit")]
    pub max_limit: u64,
}

fn default_max_limit() -> u64 {
    1000
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_limit: None,
            max_limit: default_max_limit(),
        }
    }
}

impl QuerySettings {
    /// Effective limit of a request.
    pub fn effective_limit(&self, requested: Option<u64>) -> Option<u64> {
        requested
            .or(self.default_limit)
            .map(|limit| limit.min(self.max_limit))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Publish documents whose schedule passed while the engine was down.
    #[serde(default = "default_true")]
    pub recover_on_start: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            recover_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Invalidate cached schemas from the storage change stream.
    #[serde(default = "default_true")]
    pub watch: bool,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self { watch: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// GraphQL API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphQLConfig {
    /// Serve the generated GraphQL schema.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum query depth allowed.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Maximum query complexity allowed.
    #[serde(default = "default_max_complexity")]
    pub max_complexity: usize,

    /// Enable GraphQL introspection queries.
    #[serde(default = "default_true")]
    pub introspection: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_depth() -> usize {
    15
}

fn default_max_complexity() -> usize {
    500
}

impl Default for GraphQLConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_depth: default_max_depth(),
            max_complexity: default_max_complexity(),
            introspection: true,
        }
    }
}

impl GraphQLConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_depth == 0 {
            return Err("graphql.max_depth must be > 0".into());
        }
        if self.max_complexity == 0 {
            return Err("graphql.max_complexity must be > 0".into());
        }
        Ok(())
    }
}

pub mod loader {
    use super::EngineConfig;
    use anyhow::{Context, anyhow};
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default file looked up when no path is given.
    pub const DEFAULT_CONFIG_FILE: &str = "bucket.toml";

    pub fn load_config(path: Option<&str>) -> anyhow::Result<EngineConfig> {
        let mut builder = Config::builder();
        let file = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if file.exists() {
            builder = builder.add_source(File::from(file));
        }
        // Environment variable overrides, e.g., BUCKET__QUERY__MAX_LIMIT=500
        builder = builder.add_source(
            Environment::with_prefix("BUCKET")
                .try_parsing(true)
                .separator("__"),
        );
        let merged: EngineConfig = builder
            .build()
            .context("config build error")?
            .try_deserialize()
            .context("config deserialize error")?;
        merged.validate().map_err(|e| anyhow!(e))?;
        Ok(merged)
    }
}
