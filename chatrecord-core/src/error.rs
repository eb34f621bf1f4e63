//! Error types for chatrecord-core

use thiserror::Error;

/// Main error type for the chatrecord-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Key-value store failure (read, write, quota)
    #[error("store error: {0}")]
    Store(String),

    /// The host context backing the store is gone
    #[error("store context invalidated")]
    ContextInvalidated,
}

/// Result type alias for chatrecord-core
pub type Result<T> = std::result::Result<T, Error>;
