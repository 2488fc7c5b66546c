//! SQLite storage layer for reactions.
//!
//! Provides:
//! - Pooled connections with per-connection pragmas
//! - Transactional, strictly sequential statement execution

pub mod executor;
pub mod pool;

pub use executor::{ExecutionSummary, ExecutorError, ExecutorOptions, TransactionalExecutor};
pub use pool::{ConnectionPool, PoolConfig, PoolError, TransactionMode};
