//! Storage error type.

/// Errors surfaced by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying `SQLite` error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool acquisition or construction failure.
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

/// Result alias for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
