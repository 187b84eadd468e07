//! # Design
//!
//! - Keep error messages constant; the offending path travels in a field.
//! - Separate "caller gave us a bad path" from genuine IO failures so callers can map codes.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for staging operations.
pub type StagingResult<T> = Result<T, StagingError>;

/// Errors raised while validating files or writing staged bodies.
#[derive(Debug, Error)]
pub enum StagingError {
    /// A referenced file does not exist.
    #[error("staged source file missing")]
    MissingFile {
        /// Offending path.
        path: PathBuf,
    },
    /// A referenced path is a directory.
    #[error("staged source path is a directory")]
    Directory {
        /// Offending path.
        path: PathBuf,
    },
    /// No files were supplied.
    #[error("no files to stage")]
    NoFiles,
    /// Filesystem operation failed.
    #[error("staging io failure")]
    Io {
        /// Operation being performed.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
}

impl StagingError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
