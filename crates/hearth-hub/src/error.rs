//! Error types for the hub.

use thiserror::Error;

use hearth_store::StoreError;

/// Errors surfaced by the hub's query and ingest API.
#[derive(Debug, Error)]
pub enum HubError {
    /// The underlying store failed, including built-in id conflicts.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The requested series is not registered anywhere. Distinct from a
    /// registered series that happens to have no data.
    #[error("series '{id}' not found")]
    SeriesNotFound {
        /// The unknown id.
        id: String,
    },

    /// The request itself is invalid and was rejected before any write.
    #[error("malformed request: {reason}")]
    Malformed {
        /// What was wrong.
        reason: String,
    },

    /// The configuration file is unreadable or invalid.
    #[error("config error: {reason}")]
    Config {
        /// What was wrong.
        reason: String,
    },
}

impl HubError {
    /// True if this is the built-in id conflict rejection.
    #[must_use]
    pub fn is_builtin_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::BuiltinConflict { .. }))
    }
}

/// Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_detection() {
        let err = HubError::Store(StoreError::BuiltinConflict {
            id: "cpu_usage".to_string(),
        });
        assert!(err.is_builtin_conflict());

        let err = HubError::SeriesNotFound {
            id: "x".to_string(),
        };
        assert!(!err.is_builtin_conflict());
    }

    #[test]
    fn not_found_display() {
        let err = HubError::SeriesNotFound {
            id: "garage_temp".to_string(),
        };
        assert_eq!(err.to_string(), "series 'garage_temp' not found");
    }
}
