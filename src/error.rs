//! Error types for the voice-inventory storage layer.

use std::fmt;

/// Errors returned by product storage operations.
#[derive(Debug)]
pub enum StoreError {
    /// The referenced product id does not exist.
    NotFound(i64),
    /// Error from the underlying SQLite engine (I/O, constraint violation, ...).
    Database(String),
    /// Invalid parameters provided by the caller.
    InvalidParams(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "Product with ID {id} not found"),
            Self::Database(msg) => write!(f, "Database error: {msg}"),
            Self::InvalidParams(msg) => write!(f, "Invalid parameters: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}
