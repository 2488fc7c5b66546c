//! Plugin lifecycle and the `react()` entry point.
//!
//! Construction is two-phase. Required setup (identity, pool, template
//! compilation) runs synchronously and is best-effort: failures are logged
//! and reported to the error sink, never returned. Dry-run validation of
//! the generator and templates then runs as fire-and-forget tasks, and the
//! ready callback fires without waiting for them.
//!
//! States: Ready (repeatable, concurrent reactions) until `close()`, then
//! Closed.

pub mod config;
mod validate;

pub use config::PluginConfig;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::ReactorError;
use crate::event::IoEvent;
use crate::generate_reaction_id;
use crate::observability::sink::{ErrorSink, LogSink, Severity};
use crate::outcome::ReactionOutcome;
use crate::producer::SqlProducer;
use crate::storage::{
    ConnectionPool, ExecutionSummary, ExecutorError, ExecutorOptions, TransactionalExecutor,
};

/// Lifecycle state of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Ready,
    Closed,
}

/// Identity plus injected sinks, shared with background tasks.
#[derive(Clone)]
pub(crate) struct PluginContext {
    plugin_id: Arc<str>,
    reactor_id: Arc<str>,
    origin: Arc<str>,
    log_sink: Arc<dyn LogSink>,
    error_sink: Arc<dyn ErrorSink>,
}

impl PluginContext {
    fn new(
        plugin_id: String,
        reactor_id: String,
        log_sink: Arc<dyn LogSink>,
        error_sink: Arc<dyn ErrorSink>,
    ) -> Self {
        let origin = format!("SqlReactorPlugin[{reactor_id}][{plugin_id}]");
        Self {
            plugin_id: plugin_id.into(),
            reactor_id: reactor_id.into(),
            origin: origin.into(),
            log_sink,
            error_sink,
        }
    }

    /// `SqlReactorPlugin[<reactor id>][<plugin id>]`
    pub(crate) fn origin(&self) -> &str {
        &self.origin
    }

    pub(crate) fn log(&self, severity: Severity, message: &str) {
        self.log_sink.log(severity, &self.origin, message);
    }

    pub(crate) fn report_error(&self, message: &str, cause: &ReactorError) {
        self.error_sink.report(message, cause);
    }
}

/// Reacts to filesystem events by executing SQL.
pub struct SqlReactorPlugin {
    ctx: PluginContext,
    producer: SqlProducer,
    executor: Mutex<Option<TransactionalExecutor>>,
    state: Mutex<PluginState>,
    shutdown: CancellationToken,
    reactions: TaskTracker,
    validations: TaskTracker,
}

impl SqlReactorPlugin {
    /// Construct the plugin and fire `ready` with its id.
    ///
    /// Pool construction blocks until the configured idle connections are
    /// open. Dry-run validation needs a Tokio runtime; without one it runs
    /// inline before `ready` fires.
    pub fn new<R>(
        plugin_id: impl Into<String>,
        reactor_id: impl Into<String>,
        log_sink: Arc<dyn LogSink>,
        error_sink: Arc<dyn ErrorSink>,
        ready: R,
        config: PluginConfig,
    ) -> Self
    where
        R: FnOnce(&str),
    {
        let ctx = PluginContext::new(plugin_id.into(), reactor_id.into(), log_sink, error_sink);

        let executor = match ConnectionPool::new(&config.pool_config) {
            Ok(pool) => {
                ctx.log(
                    Severity::Verbose,
                    &format!(
                        "connection pool ready for {} (max {} connections)",
                        config.pool_config.database.display(),
                        pool.max_size()
                    ),
                );
                Some(TransactionalExecutor::new(
                    pool,
                    ExecutorOptions::from(&config.pool_config),
                ))
            }
            Err(e) => {
                let message = format!("{} error constructing connection pool: {e}", ctx.origin());
                ctx.log(Severity::Error, &message);
                ctx.report_error(&message, &ReactorError::Pool(e));
                None
            }
        };

        let producer = SqlProducer::new(
            config.sql_templates.as_deref(),
            config.sql_generator.clone(),
        );

        if let Some(templates) = producer.templates() {
            for e in templates.compile_errors() {
                let message = format!("{} {e}", ctx.origin());
                ctx.log(Severity::Error, &message);
                ctx.report_error(&message, &ReactorError::Producer(e));
            }
        }
        if !producer.has_strategy() {
            ctx.log(
                Severity::Warn,
                "neither sqlTemplates nor sqlGenerator configured, reactions will commit empty transactions",
            );
        }

        let plugin = Self {
            ctx,
            producer,
            executor: Mutex::new(executor),
            state: Mutex::new(PluginState::Ready),
            shutdown: CancellationToken::new(),
            reactions: TaskTracker::new(),
            validations: TaskTracker::new(),
        };

        plugin.start_validations();
        ready(plugin.id());
        plugin
    }

    fn start_validations(&self) {
        let generator = self.producer.generator().cloned();
        let templates = self.producer.templates().is_some().then(|| self.producer.clone());

        let generator_run = generator.map(|generator| {
            let ctx = self.ctx.clone();
            async move { validate::dry_run_generator(ctx, generator.as_ref()).await }
        });
        let template_run = templates.map(|producer| {
            let ctx = self.ctx.clone();
            async move {
                if let Some(templates) = producer.templates() {
                    validate::dry_run_templates(ctx, templates).await;
                }
            }
        });

        match Handle::try_current() {
            Ok(handle) => {
                if let Some(run) = generator_run {
                    self.validations.spawn_on(run, &handle);
                }
                if let Some(run) = template_run {
                    self.validations.spawn_on(run, &handle);
                }
            }
            Err(_) => {
                let inline = async move {
                    if let Some(run) = generator_run {
                        run.await;
                    }
                    if let Some(run) = template_run {
                        run.await;
                    }
                };
                match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt.block_on(inline),
                    Err(e) => self.ctx.log(
                        Severity::Warn,
                        &format!("skipping dry-run validation, no runtime available: {e}"),
                    ),
                }
            }
        }
        self.validations.close();
    }

    /// Plugin identity.
    pub fn id(&self) -> &str {
        &self.ctx.plugin_id
    }

    /// Identity of the reactor that owns this plugin.
    pub fn reactor_id(&self) -> &str {
        &self.ctx.reactor_id
    }

    pub fn state(&self) -> PluginState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log through the injected sink, tagged with plugin and reactor id.
    pub fn log(&self, severity: Severity, message: &str) {
        self.ctx.log(severity, message);
    }

    /// Forward to the injected error sink.
    pub fn report_error(&self, message: &str, cause: &ReactorError) {
        self.ctx.report_error(message, cause);
    }

    /// Pool connections and idle connections, if the pool exists.
    pub fn pool_state(&self) -> Option<r2d2::State> {
        self.current_executor().map(|e| e.pool().state())
    }

    /// Token for `react_with_cancel`; also cancelled by `close()`.
    pub fn reaction_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Wait for the construction-time dry runs to finish.
    pub async fn validations_settled(&self) {
        self.validations.wait().await;
    }

    /// React to one event: produce its SQL and execute it in one transaction.
    pub async fn react(&self, event: IoEvent) -> ReactionOutcome {
        self.run_reaction(event, self.reaction_token(), None).await
    }

    /// Like `react`, abandoning the transaction once `cancel` fires.
    ///
    /// Use a token from `reaction_token()` so plugin shutdown cancels it too.
    pub async fn react_with_cancel(
        &self,
        event: IoEvent,
        cancel: CancellationToken,
    ) -> ReactionOutcome {
        self.run_reaction(event, cancel, None).await
    }

    /// Like `react`, failing with `TimedOut` after `timeout`.
    ///
    /// On expiry the transaction is rolled back and the connection released
    /// before the outcome is returned.
    pub async fn react_with_timeout(&self, event: IoEvent, timeout: Duration) -> ReactionOutcome {
        self.run_reaction(event, self.reaction_token(), Some(timeout))
            .await
    }

    /// Stop accepting reactions, cancel in-flight ones, wait for them and
    /// the dry runs, then drop the pool.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == PluginState::Closed {
                return;
            }
            *state = PluginState::Closed;
        }

        self.shutdown.cancel();
        self.reactions.close();
        self.reactions.wait().await;
        self.validations.wait().await;

        self.executor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        self.ctx.log(Severity::Info, "closed, connection pool released");
    }

    fn current_executor(&self) -> Option<TransactionalExecutor> {
        self.executor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[tracing::instrument(
        name = "react",
        skip_all,
        fields(
            plugin_id = %self.ctx.plugin_id,
            reaction_id = tracing::field::Empty,
            event_type = %event.event_type,
            path = %event.full_path,
        )
    )]
    async fn run_reaction(
        &self,
        event: IoEvent,
        cancel: CancellationToken,
        timeout: Option<Duration>,
    ) -> ReactionOutcome {
        let started = Instant::now();
        let reaction_id = generate_reaction_id();
        tracing::Span::current().record("reaction_id", reaction_id.as_str());

        self.ctx.log(
            Severity::Info,
            &format!(
                "REACT[{}]() invoked: {} for: {}",
                self.id(),
                event.event_type,
                event.full_path
            ),
        );

        let mut statement_count = 0;
        let result = self
            .produce_and_execute(&event, cancel, timeout, &mut statement_count)
            .await;

        let (success, message, cause) = match result {
            Ok(summary) => {
                let message = format!(
                    "Executed {} SQL statements successfully ({} rows affected)",
                    summary.statements_executed, summary.rows_affected
                );
                self.ctx.log(Severity::Verbose, &message);
                (true, message, None)
            }
            Err(e) => {
                let message = e.to_string();
                self.ctx.log(
                    Severity::Error,
                    &format!("REACT[{}]() failed: {message}", self.id()),
                );
                (false, message, Some(e))
            }
        };

        ReactionOutcome {
            success,
            plugin_id: self.ctx.plugin_id.to_string(),
            reactor_id: self.ctx.reactor_id.to_string(),
            reaction_id,
            event,
            message,
            cause,
            statement_count,
            elapsed: started.elapsed(),
        }
    }

    async fn produce_and_execute(
        &self,
        event: &IoEvent,
        cancel: CancellationToken,
        timeout: Option<Duration>,
        statement_count: &mut usize,
    ) -> Result<ExecutionSummary, ReactorError> {
        if self.state() == PluginState::Closed {
            return Err(ReactorError::Closed);
        }

        let statements = self.producer.produce(event)?;
        *statement_count = statements.len();
        if statements.is_empty() {
            self.ctx.log(
                Severity::Verbose,
                "no SQL statements produced, committing empty transaction",
            );
        }

        // `close()` may have taken the pool since the check above.
        let executor = self.current_executor().ok_or_else(|| match self.state() {
            PluginState::Closed => ReactorError::Closed,
            PluginState::Ready => ReactorError::PoolUnavailable,
        })?;

        let execution = executor.execute(statements, cancel.clone(), &self.reactions);
        let Some(limit) = timeout else {
            return Ok(execution.await?);
        };

        tokio::pin!(execution);
        match tokio::time::timeout(limit, &mut execution).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                cancel.cancel();
                match execution.await {
                    Err(ExecutorError::Cancelled { .. }) => Err(ReactorError::TimedOut(limit)),
                    other => Ok(other?),
                }
            }
        }
    }
}

impl Drop for SqlReactorPlugin {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
