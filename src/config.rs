//! Configuration parsing for the host binary.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - A JSON plugin config file (`poolConfig`, `sqlTemplates`)

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use crate::event::IoEventType;
use crate::evaluator::EventFilter;
use crate::plugin::PluginConfig;
use crate::storage::PoolConfig;

/// io-sql-reactor: executes SQL for filesystem events read from stdin.
#[derive(Parser, Debug, Clone)]
#[command(name = "io-sql-reactor")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// JSON plugin config; flags below override its pool settings
    #[arg(short, long, env = "IO_SQL_REACTOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database file
    #[arg(short, long, env = "IO_SQL_REACTOR_DATABASE")]
    pub database: Option<PathBuf>,

    /// Maximum pooled connections
    #[arg(long, env = "IO_SQL_REACTOR_POOL_SIZE")]
    pub pool_size: Option<u32>,

    /// Allow several statements per template
    #[arg(long, env = "IO_SQL_REACTOR_MULTIPLE_STATEMENTS")]
    pub multiple_statements: bool,

    /// SQL template, may be repeated; appended after config file templates
    #[arg(short, long = "template")]
    pub templates: Vec<String>,

    /// Only react to these event types (repeatable)
    #[arg(long = "event-type")]
    pub event_types: Vec<String>,

    /// Only react to paths matching this regex
    #[arg(long, env = "IO_SQL_REACTOR_PATH_PATTERN")]
    pub path_pattern: Option<String>,

    /// Match the path pattern case-insensitively
    #[arg(long)]
    pub ignore_case: bool,

    /// Reactions in flight at once (defaults to the pool size)
    #[arg(long, env = "IO_SQL_REACTOR_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Merge the config file (if any) with CLI overrides.
    pub fn plugin_config(&self) -> anyhow::Result<PluginConfig> {
        let mut plugin = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                PluginConfig::from_json(&json)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => {
                let database = self
                    .database
                    .clone()
                    .context("either --config or --database is required")?;
                PluginConfig::new(PoolConfig::new(database))
            }
        };

        if let Some(database) = &self.database {
            plugin.pool_config.database.clone_from(database);
        }
        if let Some(size) = self.pool_size {
            plugin.pool_config.max_size = size;
        }
        if self.multiple_statements {
            plugin.pool_config.multiple_statements = true;
        }
        if !self.templates.is_empty() {
            plugin
                .sql_templates
                .get_or_insert_with(Vec::new)
                .extend(self.templates.iter().cloned());
        }

        Ok(plugin)
    }

    pub fn event_filter(&self) -> anyhow::Result<EventFilter> {
        let types = self
            .event_types
            .iter()
            .map(|t| t.parse::<IoEventType>())
            .collect::<Result<Vec<_>, _>>()?;
        EventFilter::new(types, self.path_pattern.as_deref(), self.ignore_case)
            .context("invalid --path-pattern")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_build_plugin_config() {
        let config = Config::parse_from([
            "io-sql-reactor",
            "--database",
            "/tmp/io.db",
            "--pool-size",
            "3",
            "-t",
            "SELECT 1",
            "-t",
            "SELECT 2",
        ]);

        let plugin = config.plugin_config().unwrap();
        assert_eq!(plugin.pool_config.database, PathBuf::from("/tmp/io.db"));
        assert_eq!(plugin.pool_config.max_size, 3);
        assert_eq!(
            plugin.sql_templates,
            Some(vec!["SELECT 1".to_string(), "SELECT 2".to_string()])
        );
    }

    #[test]
    fn test_database_or_config_required() {
        let config = Config::parse_from(["io-sql-reactor"]);
        assert!(config.plugin_config().is_err());
    }

    #[test]
    fn test_event_filter_from_flags() {
        let config = Config::parse_from([
            "io-sql-reactor",
            "--event-type",
            "add",
            "--path-pattern",
            r"testFile\d+",
        ]);

        let filter = config.event_filter().unwrap();
        let accepted = crate::event::IoEvent::new(IoEventType::Created, "/tmp/testFile1");
        let rejected = crate::event::IoEvent::new(IoEventType::Removed, "/tmp/testFile1");
        assert!(filter.accepts(&accepted));
        assert!(!filter.accepts(&rejected));
    }
}
