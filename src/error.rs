//! Canonical error types for pipeline setup and execution.
//!
//! Per-packet failures never reach this level; they are logged and counted
//! by the consumer. Only faults that stop the whole run are represented.

use thiserror::Error;

use crate::{config::ConfigError, pool::PoolError};

/// A resource could not be created at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error("cannot create packet pool of {count} buffers: {source}")]
    Pool { count: usize, source: PoolError },
}

/// Top-level error returned by [`Pipeline`](crate::pipeline::Pipeline).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A configuration value was out of range.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Startup allocation failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),
    /// A worker thread panicked or was aborted.
    #[error("pipeline worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
