//! Error types for transport setup and unit preparation.
//!
//! Failures that happen while a unit is running are never surfaced here; they are
//! reported as [`crate::TransportOutcome`] values through the callback workers.

use thiserror::Error;

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised before a unit starts running.
#[derive(Debug, Error)]
pub enum TransportError {
    /// An HTTP client for a context could not be constructed.
    #[error("failed to build transport client")]
    ClientBuild {
        /// Context whose client failed.
        context: &'static str,
        /// Underlying client error.
        source: reqwest::Error,
    },
    /// A request header name or value was not valid HTTP.
    #[error("invalid request header")]
    InvalidHeader {
        /// Offending header name.
        name: String,
    },
    /// Session options were out of range.
    #[error("invalid transport options")]
    InvalidOptions {
        /// Offending option.
        field: &'static str,
    },
}
