//! Test utilities for reactor integration tests.
//!
//! Provides:
//! - Temporary database fixtures with the `io_event` table
//! - Capturing log and error sinks
//! - Plugin construction helpers

#![allow(dead_code)]

use io_sql_reactor::{
    ErrorSink, LogSink, PluginConfig, PoolConfig, ReactorError, Severity, SqlReactorPlugin,
};
use io_sql_reactor::observability::tracing::init_test_tracing;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Test fixture that manages a temporary database directory.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    /// Temporary directory for test database
    pub temp_dir: TempDir,
    /// Path to the database file
    pub db_path: PathBuf,
}

impl TestFixture {
    /// Create a new fixture with an empty `io_event` table.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let fixture = Self { temp_dir, db_path };
        fixture.execute(
            "CREATE TABLE io_event (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                eventType TEXT NOT NULL,
                fullPath TEXT NOT NULL,
                stats TEXT
            )",
        );
        fixture
    }

    /// Run setup SQL against the fixture database.
    pub fn execute(&self, sql: &str) {
        let conn = Connection::open(&self.db_path).expect("failed to open test db");
        conn.execute_batch(sql).expect("setup sql failed");
    }

    pub fn count(&self, table: &str) -> i64 {
        let conn = Connection::open(&self.db_path).expect("failed to open test db");
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })
        .expect("count query failed")
    }

    /// `(eventType, fullPath)` rows in insertion order.
    pub fn rows(&self) -> Vec<(String, String)> {
        let conn = Connection::open(&self.db_path).expect("failed to open test db");
        let mut stmt = conn
            .prepare("SELECT eventType, fullPath FROM io_event ORDER BY id")
            .expect("prepare failed");
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .expect("query failed")
            .collect::<Result<_, _>>()
            .expect("row decode failed")
    }

    /// Pool settings pointing at the fixture database.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(&self.db_path).with_connection_timeout(Duration::from_secs(2))
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A log line captured by [`CapturingSinks`].
#[derive(Debug, Clone)]
pub struct LogLine {
    pub severity: Severity,
    pub origin: String,
    pub message: String,
}

/// Log and error sinks that record everything they receive.
#[derive(Clone, Default)]
pub struct CapturingSinks {
    pub logs: Arc<Mutex<Vec<LogLine>>>,
    pub errors: Arc<Mutex<Vec<String>>>,
}

impl CapturingSinks {
    pub fn log_sink(&self) -> Arc<dyn LogSink> {
        let logs = Arc::clone(&self.logs);
        Arc::new(move |severity: Severity, origin: &str, message: &str| {
            logs.lock().unwrap().push(LogLine {
                severity,
                origin: origin.to_string(),
                message: message.to_string(),
            });
        })
    }

    pub fn error_sink(&self) -> Arc<dyn ErrorSink> {
        let errors = Arc::clone(&self.errors);
        Arc::new(move |message: &str, _cause: &ReactorError| {
            errors.lock().unwrap().push(message.to_string());
        })
    }

    pub fn logs(&self) -> Vec<LogLine> {
        self.logs.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    /// Messages logged at `severity` containing `needle`.
    pub fn logged(&self, severity: Severity, needle: &str) -> bool {
        self.logs()
            .iter()
            .any(|line| line.severity == severity && line.message.contains(needle))
    }
}

/// Build a plugin with capturing sinks and a no-op ready callback.
pub fn plugin(config: PluginConfig) -> (SqlReactorPlugin, CapturingSinks) {
    init_test_tracing();
    let sinks = CapturingSinks::default();
    let plugin = SqlReactorPlugin::new(
        "sql",
        "test-reactor",
        sinks.log_sink(),
        sinks.error_sink(),
        |_: &str| {},
        config,
    );
    (plugin, sinks)
}

/// Wait for a condition to become true with timeout.
///
/// # Returns
///
/// `true` if condition was met, `false` if timeout expired
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_table() {
        let fixture = TestFixture::new();
        assert!(fixture.temp_dir.path().exists());
        assert_eq!(fixture.count("io_event"), 0);
    }
}
