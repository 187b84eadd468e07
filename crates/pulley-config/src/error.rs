//! Error types for configuration operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Field that failed validation.
        field: &'static str,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// The configuration file could not be read.
    #[error("failed to read configuration file")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The configuration file was not valid YAML for the model.
    #[error("failed to parse configuration file")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(
        field: &'static str,
        value: Option<String>,
        reason: &'static str,
    ) -> Self {
        Self::InvalidField {
            field,
            value,
            reason,
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
