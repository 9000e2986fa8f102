//! Error types for the hearth-store crate.

use thiserror::Error;

/// Errors that can occur in the time-series store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying SQLite operation failed.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// An external registration collides with a built-in series id.
    /// The built-in series is left untouched.
    #[error("series id '{id}' conflicts with a built-in series")]
    BuiltinConflict {
        /// The conflicting id.
        id: String,
    },
}

impl StoreError {
    /// True if the underlying failure is a transient SQLITE_BUSY/LOCKED
    /// condition that a maintenance caller may retry with backoff.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
