//! Error types for orchid-core

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using orchid-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in orchid-core operations
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

    /// Entity not found
    #[error("{table} not found: {id}")]
    NotFound { table: &'static str, id: String },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote backend error
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn not_found(table: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            table,
            id: id.to_string(),
        }
    }
}
