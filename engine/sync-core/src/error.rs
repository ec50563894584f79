//! Error types for the sync core

use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while checkpointing or running a batch
#[derive(Error, Debug)]
pub enum SyncError {
    /// I/O errors (checkpoint file reads and writes)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A job hook (plan or flush) failed; the run cannot continue
    #[error("Job error: {0}")]
    Job(#[from] anyhow::Error),
}

impl SyncError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
