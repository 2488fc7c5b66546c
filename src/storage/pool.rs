//! Connection pool for reactions.
//!
//! Uses r2d2 with r2d2_sqlite. Every connection the pool opens is
//! customized with the configured busy timeout, foreign-key enforcement
//! and journal mode. WAL mode lets readers run beside one writer.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::TransactionBehavior;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Error type for pool construction.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to create connection pool: {0}")]
    Creation(#[from] r2d2::Error),
}

/// How a reaction's transaction acquires locks.
///
/// This is the operator's isolation choice; the plugin does not pick one
/// per statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionMode {
    Deferred,
    #[default]
    Immediate,
    Exclusive,
}

impl From<TransactionMode> for TransactionBehavior {
    fn from(mode: TransactionMode) -> Self {
        match mode {
            TransactionMode::Deferred => TransactionBehavior::Deferred,
            TransactionMode::Immediate => TransactionBehavior::Immediate,
            TransactionMode::Exclusive => TransactionBehavior::Exclusive,
        }
    }
}

/// The `poolConfig` blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    /// Path to the SQLite database file
    pub database: PathBuf,

    /// Maximum number of pooled connections
    #[serde(default = "default_max_size")]
    pub max_size: u32,

    /// Idle connections to keep open (defaults to `max_size`)
    #[serde(default)]
    pub min_idle: Option<u32>,

    /// How long to wait for a free connection
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// How long SQLite waits on a locked database
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Allow several `;`-separated statements in one SQL string
    #[serde(default)]
    pub multiple_statements: bool,

    #[serde(default = "default_true")]
    pub foreign_keys: bool,

    #[serde(default = "default_true")]
    pub wal_mode: bool,

    #[serde(default)]
    pub transaction_mode: TransactionMode,
}

fn default_max_size() -> u32 {
    10
}

fn default_connection_timeout_ms() -> u64 {
    5000
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

impl PoolConfig {
    /// Configuration with defaults for the given database file.
    pub fn new(database: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            max_size: default_max_size(),
            min_idle: None,
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            multiple_statements: false,
            foreign_keys: true,
            wal_mode: true,
            transaction_mode: TransactionMode::default(),
        }
    }

    #[must_use]
    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size;
        self
    }

    #[must_use]
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_multiple_statements(mut self, enabled: bool) -> Self {
        self.multiple_statements = enabled;
        self
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if self.database.as_os_str().is_empty() {
            return Err(PoolError::InvalidConfig("database path is required".into()));
        }
        if self.max_size == 0 {
            return Err(PoolError::InvalidConfig("maxSize must be at least 1".into()));
        }
        if self.min_idle.is_some_and(|idle| idle > self.max_size) {
            return Err(PoolError::InvalidConfig("minIdle cannot exceed maxSize".into()));
        }
        if self.connection_timeout_ms == 0 {
            return Err(PoolError::InvalidConfig(
                "connectionTimeoutMs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Pooled SQLite connection.
pub type PooledSqlite = PooledConnection<SqliteConnectionManager>;

/// Connection pool shared by all reactions of one plugin.
///
/// Cloning is cheap; clones share the same connections.
#[derive(Clone)]
pub struct ConnectionPool {
    pool: Pool<SqliteConnectionManager>,
}

impl ConnectionPool {
    /// Build the pool described by `config`.
    ///
    /// Blocks until `min_idle` connections are open or the connection
    /// timeout expires.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the database cannot be
    /// opened.
    pub fn new(config: &PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;

        let manager = SqliteConnectionManager::file(&config.database);

        let pool = Pool::builder()
            .max_size(config.max_size)
            .min_idle(config.min_idle)
            .connection_timeout(config.connection_timeout())
            .connection_customizer(Box::new(ReactorConnectionCustomizer {
                busy_timeout: Duration::from_millis(config.busy_timeout_ms),
                foreign_keys: config.foreign_keys,
                wal_mode: config.wal_mode,
            }))
            .build(manager)?;

        Ok(Self { pool })
    }

    /// Get a connection from the pool.
    ///
    /// The connection goes back to the pool when the guard is dropped.
    pub fn get(&self) -> Result<PooledSqlite, r2d2::Error> {
        self.pool.get()
    }

    /// Get the current pool state for monitoring.
    pub fn state(&self) -> r2d2::State {
        self.pool.state()
    }

    pub fn max_size(&self) -> u32 {
        self.pool.max_size()
    }
}

/// Applies per-connection pragmas when r2d2 opens a connection.
#[derive(Debug)]
struct ReactorConnectionCustomizer {
    busy_timeout: Duration,
    foreign_keys: bool,
    wal_mode: bool,
}

impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error>
    for ReactorConnectionCustomizer
{
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", self.foreign_keys)?;
        if self.wal_mode {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            tracing::trace!(journal_mode = %mode, "Connection opened");
        }
        Ok(())
    }
}
