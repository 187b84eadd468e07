//! Caller-facing upload errors.
//!
//! # Design
//! - Every variant maps to a stable wire code through [`UploadError::code`].
//! - Display text is the message handed back to callers, so it stays fixed per variant.

use std::error::Error as StdError;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Errors returned synchronously from enqueue operations.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The HTTP method is not one of POST, PUT or PATCH.
    #[error("Method must be either POST | PUT | PATCH")]
    InvalidMethod {
        /// Method supplied by the caller.
        method: String,
    },
    /// A multipart request carried no files.
    #[error("There are no items to upload")]
    InvalidFiles,
    /// The destination could not be parsed as an HTTP(S) URL.
    #[error("url is not a valid url")]
    InvalidUrl {
        /// URL supplied by the caller.
        url: String,
    },
    /// A raw-binary request carried an empty path.
    #[error("file is not a valid path")]
    InvalidFilePath,
    /// A raw-binary request named a file that does not exist.
    #[error("file does not exist")]
    FileNotFound {
        /// Path supplied by the caller.
        path: PathBuf,
    },
    /// A required parameter was empty or malformed.
    #[error("Invalid call parameters passed")]
    InvalidParameters {
        /// Parameter that failed validation.
        field: &'static str,
    },
    /// A boolean flag could not be parsed.
    #[error("flag must be either true or false")]
    InvalidFlag {
        /// Flag name.
        name: &'static str,
        /// Value supplied by the caller.
        value: String,
    },
    /// A multipart file is missing on disk.
    #[error("file at path {} doesn't exists", .path.display())]
    MissingFile {
        /// Offending path.
        path: PathBuf,
    },
    /// A multipart file path points at a directory.
    #[error("path {} is a directory. please provide valid file path", .path.display())]
    DirectoryPath {
        /// Offending path.
        path: PathBuf,
    },
    /// Writing the staged request body failed.
    #[error("failed to write request")]
    Staging {
        /// Underlying staging failure.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    /// The transport refused to schedule the unit.
    #[error("upload could not be scheduled")]
    Schedule {
        /// Underlying transport failure.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl UploadError {
    /// Stable machine-readable code for the error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidMethod { .. } => "invalid_method",
            Self::InvalidFiles => "invalid_files",
            Self::InvalidUrl { .. } => "invalid_url",
            Self::InvalidFilePath | Self::FileNotFound { .. } => "invalid_file",
            Self::InvalidParameters { .. } => "invalid_parameters",
            Self::InvalidFlag { .. } => "invalid_flag",
            Self::MissingFile { .. } | Self::DirectoryPath { .. } | Self::Staging { .. } => {
                "io_error"
            }
            Self::Schedule { .. } => "upload_error",
        }
    }

    /// Wrap a staging failure.
    pub fn staging(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Staging {
            source: Box::new(source),
        }
    }

    /// Wrap a transport scheduling failure.
    pub fn schedule(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Schedule {
            source: Box::new(source),
        }
    }

    /// Code and message pair returned to callers.
    #[must_use]
    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

/// Serializable `{code, message}` view of an [`UploadError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    /// Stable error code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
}

/// Convenience alias for enqueue results.
pub type UploadResult<T> = Result<T, UploadError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn codes_cover_every_caller_facing_category() {
        let cases = vec![
            (
                UploadError::InvalidMethod {
                    method: "GET".into(),
                },
                "invalid_method",
            ),
            (UploadError::InvalidFiles, "invalid_files"),
            (
                UploadError::InvalidUrl {
                    url: "nope".into(),
                },
                "invalid_url",
            ),
            (UploadError::InvalidFilePath, "invalid_file"),
            (
                UploadError::InvalidParameters { field: "task_id" },
                "invalid_parameters",
            ),
            (
                UploadError::InvalidFlag {
                    name: "allow_cellular",
                    value: "maybe".into(),
                },
                "invalid_flag",
            ),
            (
                UploadError::staging(io::Error::other("disk full")),
                "io_error",
            ),
            (
                UploadError::schedule(io::Error::other("closed")),
                "upload_error",
            ),
        ];
        for (err, code) in cases {
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn io_messages_name_the_offending_path() {
        let missing = UploadError::MissingFile {
            path: PathBuf::from("/tmp/missing.bin"),
        };
        assert_eq!(
            missing.payload(),
            ErrorPayload {
                code: "io_error",
                message: "file at path /tmp/missing.bin doesn't exists".into(),
            }
        );

        let directory = UploadError::DirectoryPath {
            path: PathBuf::from("/tmp"),
        };
        assert_eq!(
            directory.to_string(),
            "path /tmp is a directory. please provide valid file path"
        );
    }
}
