//! Error types for persisted upload state.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised while reading or writing persisted state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("store io failure")]
    Io {
        /// Operation being performed.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// JSON encoding or decoding failed.
    #[error("store json failure")]
    Json {
        /// Operation being performed.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying serde error.
        source: serde_json::Error,
    },
    /// The background log writer is no longer running.
    #[error("store writer stopped")]
    WriterStopped {
        /// Operation being performed.
        operation: &'static str,
        /// Log the writer was serving.
        path: PathBuf,
    },
}

impl StoreError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: serde_json::Error,
    ) -> Self {
        Self::Json {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn writer_stopped(operation: &'static str, path: impl Into<PathBuf>) -> Self {
        Self::WriterStopped {
            operation,
            path: path.into(),
        }
    }

    /// Operation that failed.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Io { operation, .. }
            | Self::Json { operation, .. }
            | Self::WriterStopped { operation, .. } => operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_record_operation() {
        let err = StoreError::io("results.append", "/tmp/r", io::Error::other("full"));
        assert_eq!(err.operation(), "results.append");
        assert_eq!(err.to_string(), "store io failure");

        let source = match serde_json::from_str::<serde_json::Value>("[") {
            Ok(_) => return,
            Err(err) => err,
        };
        let err = StoreError::json("handler.decode", "/tmp/h", source);
        assert_eq!(err.operation(), "handler.decode");
        assert_eq!(err.to_string(), "store json failure");

        let err = StoreError::writer_stopped("results.flush", "/tmp/r");
        assert_eq!(err.operation(), "results.flush");
        assert_eq!(err.to_string(), "store writer stopped");
    }
}
