//! io-sql-reactor: executes SQL for filesystem events.
//!
//! Reads newline-delimited JSON events from stdin, reacts to the ones the
//! filter accepts, and writes one JSON outcome per line to stdout.
//!
//! # Usage
//!
//! ```bash
//! echo '{"eventType":"add","fullPath":"/tmp/testFile1","optionalStats":{"size":100}}' \
//!   | io-sql-reactor --database ./events.db \
//!       -t "INSERT INTO io_event (eventType, fullPath) VALUES ('{{{eventType}}}', '{{{fullPath}}}')"
//! ```
//!
//! Environment variables can also be used:
//! - `IO_SQL_REACTOR_CONFIG`: JSON plugin config file
//! - `IO_SQL_REACTOR_DATABASE`: SQLite database file
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use futures::StreamExt;
use io_sql_reactor::config::Config;
use io_sql_reactor::observability::tracing::init_tracing;
use io_sql_reactor::{IoEvent, SqlReactorPlugin, TracingErrorSink, TracingLogSink};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_stream::wrappers::LinesStream;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();

    // Initialize tracing/logging
    init_tracing(&config.log_level);

    let plugin_config = config.plugin_config()?;
    let filter = config.event_filter()?;
    let concurrency = config
        .concurrency
        .unwrap_or(plugin_config.pool_config.max_size as usize)
        .max(1);

    let plugin = Arc::new(SqlReactorPlugin::new(
        "sql",
        "io-sql-reactor",
        Arc::new(TracingLogSink),
        Arc::new(TracingErrorSink),
        |id: &str| tracing::info!(plugin_id = id, "Reactor plugin ready"),
        plugin_config,
    ));

    let lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let reactions = lines
        .filter_map(|line| {
            let parsed = match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => match serde_json::from_str::<IoEvent>(&line) {
                    Ok(event) => Some(event),
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping malformed event");
                        None
                    }
                },
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read stdin");
                    None
                }
            };
            let accepted = parsed.filter(|event| filter.accepts(event));
            async move { accepted }
        })
        .map(|event| {
            let plugin = Arc::clone(&plugin);
            async move { plugin.react(event).await }
        })
        .buffer_unordered(concurrency)
        .for_each(|outcome| async move {
            match serde_json::to_string(&outcome) {
                Ok(mut json) => {
                    json.push('\n');
                    if let Err(e) = tokio::io::stdout().write_all(json.as_bytes()).await {
                        tracing::error!(error = %e, "Failed to write outcome");
                    }
                }
                Err(e) => tracing::error!(error = %e, "Failed to serialize outcome"),
            }
        });

    tokio::select! {
        () = reactions => {
            tracing::info!("End of input");
        }
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received, abandoning in-flight reactions");
        }
    }

    plugin.close().await;
    tracing::info!("io-sql-reactor shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = sigterm.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
