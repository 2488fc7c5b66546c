//! io-sql-reactor: reacts to filesystem events by executing SQL.
//!
//! Each event is turned into an ordered list of SQL statements, rendered
//! from Handlebars templates and/or produced by a user generator, and the
//! list is executed atomically in one SQLite transaction drawn from an
//! r2d2 connection pool.
//!
//! # Architecture
//!
//! - **Producer**: templates first, then generator output, in order
//! - **Executor**: acquire, begin, sequential statements, commit or rollback
//! - **Plugin**: best-effort construction, dry-run validation, `react()`
//!
//! # Modules
//!
//! - [`config`]: CLI and environment configuration for the host binary
//! - [`error`]: Top-level reaction error
//! - [`evaluator`]: Upstream event filter used by hosts
//! - [`event`]: Filesystem event model
//! - [`observability`]: Tracing setup and log/error sinks
//! - [`outcome`]: Per-reaction result object
//! - [`plugin`]: Plugin lifecycle and the `react()` entry point
//! - [`producer`]: Event to SQL statement list
//! - [`storage`]: Connection pool and transactional executor

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,    // producer::ProducerError is fine
    clippy::must_use_candidate,         // Not all functions need #[must_use]
    clippy::missing_errors_doc,         // Error docs can be verbose
    clippy::missing_panics_doc,         // Panic docs can be verbose
    clippy::needless_raw_string_hashes, // r#""# is fine for SQL
    clippy::result_large_err,           // rusqlite/handlebars errors are large
    clippy::too_many_lines              // Some functions are inherently long
)]

pub mod config;
pub mod error;
pub mod evaluator;
pub mod event;
pub mod observability;
pub mod outcome;
pub mod plugin;
pub mod producer;
pub mod storage;

pub use error::ReactorError;
pub use evaluator::EventFilter;
pub use event::{FileStats, IoEvent, IoEventType};
pub use observability::sink::{ErrorSink, LogSink, Severity, TracingErrorSink, TracingLogSink};
pub use outcome::ReactionOutcome;
pub use plugin::{PluginConfig, PluginState, SqlReactorPlugin};
pub use producer::{SqlGenerator, SqlProducer};
pub use storage::{PoolConfig, TransactionMode};

use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable) reaction ID.
///
/// # Example
///
/// ```
/// let id = io_sql_reactor::generate_reaction_id();
/// assert!(id.len() == 36); // UUID string format
/// ```
#[must_use]
pub fn generate_reaction_id() -> String {
    Uuid::now_v7().to_string()
}
