//! Plugin configuration.
//!
//! Mirrors the host's configuration blob:
//! - `poolConfig`: connection pool parameters
//! - `sqlTemplates`: ordered Handlebars SQL templates
//! - `sqlGenerator`: attached in code, it cannot come from JSON

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::producer::SqlGenerator;
use crate::storage::PoolConfig;

/// Immutable configuration handed to `SqlReactorPlugin::new`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    pub pool_config: PoolConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_templates: Option<Vec<String>>,

    #[serde(skip)]
    pub sql_generator: Option<Arc<dyn SqlGenerator>>,
}

impl PluginConfig {
    pub fn new(pool_config: PoolConfig) -> Self {
        Self {
            pool_config,
            sql_templates: None,
            sql_generator: None,
        }
    }

    /// Parse the JSON form (`poolConfig`, `sqlTemplates`).
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn with_templates<I, S>(mut self, templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sql_templates = Some(templates.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_generator<G>(mut self, generator: G) -> Self
    where
        G: SqlGenerator + 'static,
    {
        self.sql_generator = Some(Arc::new(generator));
        self
    }
}

impl fmt::Debug for PluginConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginConfig")
            .field("pool_config", &self.pool_config)
            .field("sql_templates", &self.sql_templates)
            .field("sql_generator", &self.sql_generator.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::IoEvent;

    #[test]
    fn test_from_json() {
        let config = PluginConfig::from_json(
            r#"{
                "poolConfig": {"database": "/tmp/io.db", "maxSize": 4},
                "sqlTemplates": ["INSERT INTO io_event (fullPath) VALUES ('{{{fullPath}}}')"]
            }"#,
        )
        .unwrap();

        assert_eq!(config.pool_config.max_size, 4);
        assert_eq!(config.sql_templates.as_ref().map(Vec::len), Some(1));
        assert!(config.sql_generator.is_none());
    }

    #[test]
    fn test_missing_pool_config_is_rejected() {
        assert!(PluginConfig::from_json(r#"{"sqlTemplates": []}"#).is_err());
    }

    #[test]
    fn test_builder_and_debug() {
        let config = PluginConfig::new(PoolConfig::new("/tmp/io.db"))
            .with_templates(["SELECT 1"])
            .with_generator(|_: &IoEvent| -> anyhow::Result<Vec<String>> { Ok(Vec::new()) });

        let debug = format!("{config:?}");
        assert!(debug.contains("<fn>"));
        assert!(debug.contains("SELECT 1"));
    }
}
