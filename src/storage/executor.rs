//! Transactional execution of a statement list.
//!
//! One reaction runs as: acquire a pooled connection, begin a
//! transaction, execute each statement strictly after the previous one
//! finished, then commit. The first failure rolls the transaction back and
//! skips the remaining statements. The pooled connection is a drop guard,
//! so it returns to the pool on every exit path, unwinding included.
//!
//! rusqlite is blocking, so the async entry point moves the work onto the
//! blocking thread pool. Cancellation is checked between statements and,
//! when a Tokio runtime is available, also interrupts the statement in
//! progress through the connection's interrupt handle.

use rusqlite::{Connection, ErrorCode, InterruptHandle, Transaction};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::pool::{ConnectionPool, PoolConfig, TransactionMode};

/// Error type for statement execution.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("error acquiring connection: {0}")]
    Acquire(#[source] r2d2::Error),

    #[error("error starting transaction: {0}")]
    Begin(#[source] rusqlite::Error),

    #[error("error executing SQL statement[{index}] {sql}: {source}")]
    Statement {
        index: usize,
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("error committing SQL: {0}")]
    Commit(#[source] rusqlite::Error),

    /// Cancelled before statement `at` was issued.
    #[error("reaction cancelled before statement[{at}], transaction rolled back")]
    Cancelled { at: usize },

    #[error("executor task failed: {0}")]
    Internal(String),
}

/// Execution options taken from the pool configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutorOptions {
    pub multiple_statements: bool,
    pub transaction_mode: TransactionMode,
}

impl From<&PoolConfig> for ExecutorOptions {
    fn from(config: &PoolConfig) -> Self {
        Self {
            multiple_statements: config.multiple_statements,
            transaction_mode: config.transaction_mode,
        }
    }
}

/// What a committed transaction did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub statements_executed: usize,
    pub rows_affected: usize,
}

/// Runs statement lists atomically against the pool.
#[derive(Clone)]
pub struct TransactionalExecutor {
    pool: ConnectionPool,
    options: ExecutorOptions,
}

impl TransactionalExecutor {
    pub fn new(pool: ConnectionPool, options: ExecutorOptions) -> Self {
        Self { pool, options }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Execute `statements` in one transaction on the blocking pool.
    ///
    /// The task is registered with `tracker` so teardown can wait for it.
    pub async fn execute(
        &self,
        statements: Vec<String>,
        cancel: CancellationToken,
        tracker: &TaskTracker,
    ) -> Result<ExecutionSummary, ExecutorError> {
        let executor = self.clone();
        tracker
            .spawn_blocking(move || executor.execute_blocking(&statements, &cancel))
            .await
            .map_err(|e| ExecutorError::Internal(e.to_string()))?
    }

    /// Execute `statements` in one transaction on the current thread.
    ///
    /// Inside a Tokio runtime a cancelled `cancel` also interrupts the
    /// statement that is running; otherwise it is only seen between
    /// statements.
    pub fn execute_blocking(
        &self,
        statements: &[String],
        cancel: &CancellationToken,
    ) -> Result<ExecutionSummary, ExecutorError> {
        let started = Instant::now();

        let mut conn = self.pool.get().map_err(ExecutorError::Acquire)?;
        tracing::trace!(waited = ?started.elapsed(), "Connection acquired");

        // Declared after `conn` so it disarms before the connection is released.
        let _interrupt = InterruptOnCancel::arm(conn.get_interrupt_handle(), cancel);

        let tx = conn
            .transaction_with_behavior(self.options.transaction_mode.into())
            .map_err(ExecutorError::Begin)?;

        let mut rows_affected = 0;
        for (index, sql) in statements.iter().enumerate() {
            if cancel.is_cancelled() {
                rollback(tx, "cancelled");
                return Err(ExecutorError::Cancelled { at: index });
            }

            match self.run_statement(&tx, sql) {
                Ok(rows) => {
                    rows_affected += rows;
                    tracing::debug!(index, rows, "Statement executed");
                }
                Err(source) if cancel.is_cancelled() && is_interrupt(&source) => {
                    rollback(tx, "interrupted");
                    return Err(ExecutorError::Cancelled { at: index });
                }
                Err(source) => {
                    rollback(tx, "statement failed");
                    return Err(ExecutorError::Statement {
                        index,
                        sql: sql.clone(),
                        source,
                    });
                }
            }
        }

        if cancel.is_cancelled() {
            rollback(tx, "cancelled");
            return Err(ExecutorError::Cancelled {
                at: statements.len(),
            });
        }

        // A failed COMMIT leaves the transaction open; dropping it rolls back.
        tx.commit().map_err(|source| {
            tracing::warn!(error = %source, "Commit failed, transaction rolled back");
            ExecutorError::Commit(source)
        })?;

        tracing::debug!(
            statements = statements.len(),
            rows_affected,
            elapsed = ?started.elapsed(),
            "Transaction committed"
        );

        Ok(ExecutionSummary {
            statements_executed: statements.len(),
            rows_affected,
        })
    }

    fn run_statement(&self, conn: &Connection, sql: &str) -> rusqlite::Result<usize> {
        if self.options.multiple_statements {
            let before = conn.total_changes();
            conn.execute_batch(sql)?;
            Ok(conn.total_changes().saturating_sub(before) as usize)
        } else {
            let mut stmt = conn.prepare(sql)?;
            if stmt.column_count() == 0 {
                return stmt.execute([]);
            }
            // SELECT, PRAGMA or RETURNING: step through and discard the rows.
            let readonly = stmt.readonly();
            let mut rows = stmt.query([])?;
            while rows.next()?.is_some() {}
            Ok(if readonly { 0 } else { conn.changes() as usize })
        }
    }
}

/// Interrupts the connection's running statement once `cancel` fires.
///
/// Dropping the guard disarms it: the handle is cleared under the lock, so
/// a connection already back in the pool is never interrupted.
struct InterruptOnCancel {
    handle: Arc<Mutex<Option<InterruptHandle>>>,
    watcher: Option<JoinHandle<()>>,
}

impl InterruptOnCancel {
    fn arm(handle: InterruptHandle, cancel: &CancellationToken) -> Self {
        let handle = Arc::new(Mutex::new(Some(handle)));
        let watcher = Handle::try_current().ok().map(|runtime| {
            let handle = Arc::clone(&handle);
            let cancel = cancel.clone();
            runtime.spawn(async move {
                cancel.cancelled().await;
                if let Some(handle) = handle.lock().unwrap_or_else(PoisonError::into_inner).as_ref()
                {
                    tracing::debug!("Interrupting running statement");
                    handle.interrupt();
                }
            })
        });
        Self { handle, watcher }
    }
}

impl Drop for InterruptOnCancel {
    fn drop(&mut self) {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

fn is_interrupt(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted
    )
}

fn rollback(tx: Transaction<'_>, reason: &str) {
    match tx.rollback() {
        Ok(()) => tracing::debug!(reason, "Transaction rolled back"),
        Err(e) => tracing::warn!(reason, error = %e, "Rollback failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(max_size: u32) -> (TempDir, TransactionalExecutor) {
        let temp_dir = TempDir::new().unwrap();
        let config = PoolConfig::new(temp_dir.path().join("test.db")).with_max_size(max_size);
        let pool = ConnectionPool::new(&config).unwrap();
        pool.get()
            .unwrap()
            .execute_batch("CREATE TABLE t (v INTEGER NOT NULL)")
            .unwrap();
        let executor = TransactionalExecutor::new(pool, ExecutorOptions::from(&config));
        (temp_dir, executor)
    }

    fn count(executor: &TransactionalExecutor) -> i64 {
        executor
            .pool()
            .get()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap()
    }

    fn sql(statements: &[&str]) -> Vec<String> {
        statements.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_commits_all_statements() {
        let (_dir, executor) = setup(2);
        let summary = executor
            .execute_blocking(
                &sql(&["INSERT INTO t VALUES (1)", "INSERT INTO t VALUES (2)"]),
                &CancellationToken::new(),
            )
            .unwrap();

        assert_eq!(summary.statements_executed, 2);
        assert_eq!(summary.rows_affected, 2);
        assert_eq!(count(&executor), 2);
    }

    #[test]
    fn test_failure_rolls_back_and_stops() {
        let (_dir, executor) = setup(2);
        let result = executor.execute_blocking(
            &sql(&[
                "INSERT INTO t VALUES (1)",
                "INSERT INTO missing VALUES (1)",
                "INSERT INTO t VALUES (3)",
            ]),
            &CancellationToken::new(),
        );

        match result {
            Err(ExecutorError::Statement { index, sql, .. }) => {
                assert_eq!(index, 1);
                assert!(sql.contains("missing"));
            }
            other => panic!("expected statement error, got {other:?}"),
        }
        assert_eq!(count(&executor), 0);
    }

    #[test]
    fn test_row_returning_statements() {
        let (_dir, executor) = setup(1);
        let summary = executor
            .execute_blocking(
                &sql(&[
                    "SELECT 1",
                    "INSERT INTO t VALUES (7) RETURNING v",
                    "SELECT v FROM t",
                ]),
                &CancellationToken::new(),
            )
            .unwrap();

        assert_eq!(summary.statements_executed, 3);
        assert_eq!(summary.rows_affected, 1);
        assert_eq!(count(&executor), 1);
    }

    #[test]
    fn test_empty_list_commits() {
        let (_dir, executor) = setup(1);
        let summary = executor
            .execute_blocking(&[], &CancellationToken::new())
            .unwrap();
        assert_eq!(summary.statements_executed, 0);
    }

    #[test]
    fn test_cancelled_token_rolls_back() {
        let (_dir, executor) = setup(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = executor.execute_blocking(&sql(&["INSERT INTO t VALUES (1)"]), &cancel);
        assert!(matches!(result, Err(ExecutorError::Cancelled { at: 0 })));
        assert_eq!(count(&executor), 0);
    }

    #[test]
    fn test_pool_exhaustion_is_acquire_error() {
        let temp_dir = TempDir::new().unwrap();
        let config = PoolConfig::new(temp_dir.path().join("test.db"))
            .with_max_size(1)
            .with_connection_timeout(std::time::Duration::from_millis(100));
        let pool = ConnectionPool::new(&config).unwrap();
        let executor = TransactionalExecutor::new(pool.clone(), ExecutorOptions::from(&config));

        let _held = pool.get().unwrap();
        let result = executor.execute_blocking(&sql(&["SELECT 1"]), &CancellationToken::new());
        assert!(matches!(result, Err(ExecutorError::Acquire(_))));
    }

    #[test]
    fn test_multiple_statements_flag() {
        let (_dir, single) = setup(1);
        let multi = TransactionalExecutor::new(
            single.pool().clone(),
            ExecutorOptions {
                multiple_statements: true,
                ..ExecutorOptions::default()
            },
        );

        let summary = multi
            .execute_blocking(
                &sql(&["INSERT INTO t VALUES (1); INSERT INTO t VALUES (2);"]),
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(summary.statements_executed, 1);
        assert_eq!(summary.rows_affected, 2);
        assert_eq!(count(&multi), 2);
    }

    const SLOW_QUERY: &str = "WITH RECURSIVE c(x) AS \
        (SELECT 1 UNION ALL SELECT x + 1 FROM c LIMIT 100000000) SELECT count(*) FROM c";

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_interrupts_running_statement() {
        let (_dir, executor) = setup(1);
        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let result = executor
            .execute(
                sql(&["INSERT INTO t VALUES (1)", SLOW_QUERY]),
                cancel,
                &tracker,
            )
            .await;

        assert!(
            matches!(result, Err(ExecutorError::Cancelled { at: 1 })),
            "expected interrupt at statement 1, got {result:?}"
        );
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        assert_eq!(count(&executor), 0);

        let state = executor.pool().state();
        assert_eq!(state.idle_connections, state.connections);
    }

    #[tokio::test]
    async fn test_released_connection_is_not_interrupted() {
        let (_dir, executor) = setup(1);
        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();

        executor
            .execute(sql(&["INSERT INTO t VALUES (1)"]), cancel.clone(), &tracker)
            .await
            .unwrap();
        cancel.cancel();
        tokio::task::yield_now().await;

        let summary = executor
            .execute(
                sql(&["INSERT INTO t VALUES (2)", "SELECT count(*) FROM t"]),
                CancellationToken::new(),
                &tracker,
            )
            .await
            .unwrap();
        assert_eq!(summary.statements_executed, 2);
        assert_eq!(count(&executor), 2);
    }

    #[tokio::test]
    async fn test_async_execute_releases_connection() {
        let (_dir, executor) = setup(1);
        let tracker = TaskTracker::new();

        for v in 0..3 {
            executor
                .execute(
                    vec![format!("INSERT INTO t VALUES ({v})")],
                    CancellationToken::new(),
                    &tracker,
                )
                .await
                .unwrap();
        }

        let state = executor.pool().state();
        assert_eq!(state.idle_connections, state.connections);
        assert_eq!(count(&executor), 3);
    }
}
