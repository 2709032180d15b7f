//! Error types for the cache pools
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache pools and their collaborators.
///
/// Variants carry rendered messages so an error can be cloned and handed to
/// every caller waiting on the same in-flight creation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A key's factory could not produce an entry
    #[error("Creation failed: {0}")]
    Creation(String),

    /// The byte-stream producer failed before yielding a stream
    #[error("Transport error: {0}")]
    Transport(String),

    /// The bytes could not be decoded into a value
    #[error("Decode error: {0}")]
    Decode(String),

    /// Local I/O failure while reading a stream
    #[error("I/O error: {0}")]
    Io(String),

    /// Configuration values that cannot build a pool
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Transport(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache pools.
pub type Result<T> = std::result::Result<T, CacheError>;
