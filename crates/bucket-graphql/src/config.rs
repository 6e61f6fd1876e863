//! GraphQL configuration.
//!
//! [`GraphQLConfig`] lives in the engine configuration under `[graphql]`:
//!
//! ```toml
//! [graphql]
//! enabled = true
//! max_depth = 15
//! max_complexity = 500
//! introspection = true
//! ```

pub use bucket_service::GraphQLConfig;

/// Limits applied to the executable schema.
#[derive(Debug, Clone)]
pub struct SchemaBuilderConfig {
    /// Maximum query depth allowed.
    pub max_depth: usize,

    /// Maximum query complexity allowed.
    pub max_complexity: usize,

    /// Whether to enable introspection queries.
    pub introspection_enabled: bool,
}

impl Default for SchemaBuilderConfig {
    fn default() -> Self {
        Self::from(&GraphQLConfig::default())
    }
}

impl From<&GraphQLConfig> for SchemaBuilderConfig {
    fn from(config: &GraphQLConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            max_complexity: config.max_complexity,
            introspection_enabled: config.introspection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_follow_config() {
        let config: GraphQLConfig = toml::from_str(
            r#"
            max_depth = 8
            introspection = false
            "#,
        )
        .unwrap();
        let limits = SchemaBuilderConfig::from(&config);
        assert_eq!(limits.max_depth, 8);
        assert_eq!(limits.max_complexity, 500);
        assert!(!limits.introspection_enabled);
    }

    #[test]
    fn test_defaults() {
        let limits = SchemaBuilderConfig::default();
        assert_eq!(limits.max_depth, 15);
        assert!(limits.introspection_enabled);
    }
}
