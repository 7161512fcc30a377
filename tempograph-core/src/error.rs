//! Error types for tempograph-core

use thiserror::Error;

/// Main error type for the tempograph-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Reading from the durable or ephemeral store failed.
    /// Callers recover by continuing with in-memory state.
    #[error("storage read error: {0}")]
    StorageRead(String),

    /// Writing to the durable or ephemeral store failed.
    /// Callers log and retry opportunistically on the next event.
    #[error("storage write error: {0}")]
    StorageWrite(String),

    /// Recording into or ending an absent or already-merged session
    #[error("invalid session state: {0}")]
    InvalidSession(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for tempograph-core
pub type Result<T> = std::result::Result<T, Error>;
