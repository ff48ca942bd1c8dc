//! Error types
//!
//! Misses, timeouts, stale signals and session changes are expected
//! conditions handled inside the engine and never show up here.

use thiserror::Error;

/// Errors raised while configuring or feeding the engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// A tunable is out of range
    #[error("config error: {0}")]
    Config(String),

    /// Text that names no known emotion label
    #[error("unknown emotion label: {0:?}")]
    UnknownLabel(String),

    /// A sample that cannot be represented (bad line, missing field)
    #[error("invalid sample: {0}")]
    InvalidSample(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tracing subscriber could not be installed
    #[error("logging error: {0}")]
    Logging(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Failures reported by an emission consumer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The receiving side is gone
    #[error("consumer channel closed")]
    Closed,

    /// The consumer refused the emission
    #[error("consumer rejected emission: {0}")]
    Rejected(String),
}
