//! Error types for inkpost-core

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using inkpost-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in inkpost-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Draft or cache entry not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local persistence failure that is not a plain `SQLite` error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Remote blog service error
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl Error {
    /// True for failures of the local persistence layer.
    pub const fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Sqlite(_) | Self::Io(_) | Self::Storage(_)
        )
    }
}
