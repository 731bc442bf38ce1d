//! History store error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for history store operations.
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Errors that can occur reading or writing the history file.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The store file does not exist.
    #[error("history file not found: {0}")]
    NotFound(PathBuf),

    /// The store exists but is not a JSON array of records.
    #[error("malformed history file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Serializing the history failed.
    #[error("failed to encode history: {0}")]
    Encode(#[source] serde_json::Error),

    /// IO error.
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HistoryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HistoryError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HistoryError::NotFound(PathBuf::from("chat_history.json"));
        assert_eq!(err.to_string(), "history file not found: chat_history.json");
    }
}
