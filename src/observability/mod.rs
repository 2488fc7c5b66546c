//! Observability infrastructure.
//!
//! Provides:
//! - Structured tracing setup for the host binary and tests
//! - Injected log and error sinks consumed by the plugin

pub mod sink;
pub mod tracing;
