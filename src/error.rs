//! Error types for BallotChain

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("No snapshot found at {0}")]
    SnapshotNotFound(String),
    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ChainError {
    /// Load failures that leave the ledger usable in its current state.
    pub fn is_non_fatal_load(&self) -> bool {
        matches!(
            self,
            ChainError::SnapshotNotFound(_)
                | ChainError::CorruptSnapshot(_)
                | ChainError::IoError(_)
                | ChainError::DatabaseError(_)
        )
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::SerializationError(err.to_string())
    }
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::DatabaseError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
