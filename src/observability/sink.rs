//! Log and error sinks injected by the host.
//!
//! The plugin never logs through global state: every message goes to the
//! `LogSink` it was constructed with, and construction-time failures go to
//! its `ErrorSink`. Closures implement both traits.

use std::fmt;

use crate::error::ReactorError;

/// Severity attached to a plugin log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warn,
    Info,
    /// Chatty diagnostics hosts are expected to filter.
    Verbose,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Verbose => "verbose",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives `(severity, origin, message)` log lines.
pub trait LogSink: Send + Sync {
    fn log(&self, severity: Severity, origin: &str, message: &str);
}

impl<F> LogSink for F
where
    F: Fn(Severity, &str, &str) + Send + Sync,
{
    fn log(&self, severity: Severity, origin: &str, message: &str) {
        self(severity, origin, message);
    }
}

/// Receives configuration-time and unexpected failures.
///
/// Per-reaction failures are returned in the outcome instead.
pub trait ErrorSink: Send + Sync {
    fn report(&self, message: &str, cause: &ReactorError);
}

impl<F> ErrorSink for F
where
    F: Fn(&str, &ReactorError) + Send + Sync,
{
    fn report(&self, message: &str, cause: &ReactorError) {
        self(message, cause);
    }
}

/// Forwards plugin logs to `tracing`; `verbose` becomes `debug`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, severity: Severity, origin: &str, message: &str) {
        match severity {
            Severity::Error => tracing::error!(origin, "{message}"),
            Severity::Warn => tracing::warn!(origin, "{message}"),
            Severity::Info => tracing::info!(origin, "{message}"),
            Severity::Verbose => tracing::debug!(origin, "{message}"),
        }
    }
}

/// Reports errors as `tracing` error events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, message: &str, cause: &ReactorError) {
        tracing::error!(error = %cause, "{message}");
    }
}
