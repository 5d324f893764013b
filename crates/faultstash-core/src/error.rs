use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    /// Transient HTTP transport failure. Surfaces only after the bounded
    /// retry policy is exhausted; before that the client retries silently.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed response body. Never retried.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Record could not be serialized to its wire form.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Fatal object-storage failure. Aborts the open upload sessions and
    /// halts the run.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl BackupError {
    /// Whether the bounded retry policy may re-attempt the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackupError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

// Rate-limit exhaustion and a missing ledger object are deliberately absent
// from this enum: the former is a backoff state handled inside the API
// client, the latter reads as an empty ledger on the first-ever run.
