//! Top-level reaction error.

use std::time::Duration;
use thiserror::Error;

use crate::producer::ProducerError;
use crate::storage::{ExecutorError, PoolError};

/// Any failure a reaction or plugin construction can report.
#[derive(Debug, Error)]
pub enum ReactorError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Producer(#[from] ProducerError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    /// The pool failed to build at construction time.
    #[error("connection pool unavailable")]
    PoolUnavailable,

    #[error("plugin is closed")]
    Closed,

    #[error("reaction timed out after {0:?}")]
    TimedOut(Duration),
}

impl ReactorError {
    /// Whether the failure happened while deriving SQL (nothing was executed).
    pub fn is_producer_error(&self) -> bool {
        matches!(self, Self::Producer(_))
    }
}
