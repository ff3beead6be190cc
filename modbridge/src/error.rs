//! Error types for device transactions and cache operations.

use thiserror::Error;

/// A failed bus transaction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Transaction timed out after {0} ms")]
    Timeout(u64),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Device exception: {0}")]
    Exception(String),
    #[error("Short response: expected {expected} values, got {got}")]
    ShortResponse { expected: usize, got: usize },
    #[error("Device worker is not running")]
    WorkerClosed,
}

/// Errors raised by cache operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Register store unavailable: {0}")]
    Store(String),
    #[error("Invalid range: {0}")]
    InvalidRange(String),
}

impl<T> From<std::sync::PoisonError<T>> for CacheError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        CacheError::Store(err.to_string())
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
