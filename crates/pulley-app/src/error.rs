//! # Design
//!
//! - Centralize application-level errors for bootstrap and the CLI.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration operations failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: pulley_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: pulley_telemetry::TelemetryError,
    },
    /// The transport session could not be constructed.
    #[error("transport operation failed")]
    Transport {
        /// Operation identifier.
        operation: &'static str,
        /// Source transport error.
        source: pulley_transport::TransportError,
    },
    /// Persistent state could not be read or written.
    #[error("store operation failed")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Source store error.
        source: pulley_store::StoreError,
    },
    /// An upload request was rejected.
    #[error("upload request rejected")]
    Upload {
        /// Operation identifier.
        operation: &'static str,
        /// Source upload error.
        source: pulley_core::UploadError,
    },
    /// An event could not be encoded for output.
    #[error("event encoding failed")]
    Encode {
        /// Operation identifier.
        operation: &'static str,
        /// Source encoding error.
        source: pulley_events::EventsError,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Optional path involved in the failure.
        path: Option<PathBuf>,
        /// Source IO error.
        source: io::Error,
    },
    /// The event stream ended before the task reached a terminal state.
    #[error("event stream closed")]
    StreamClosed {
        /// Task being followed.
        task_id: String,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: pulley_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: pulley_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn transport(
        operation: &'static str,
        source: pulley_transport::TransportError,
    ) -> Self {
        Self::Transport { operation, source }
    }

    pub(crate) const fn store(operation: &'static str, source: pulley_store::StoreError) -> Self {
        Self::Store { operation, source }
    }

    pub(crate) const fn upload(operation: &'static str, source: pulley_core::UploadError) -> Self {
        Self::Upload { operation, source }
    }

    pub(crate) const fn encode(
        operation: &'static str,
        source: pulley_events::EventsError,
    ) -> Self {
        Self::Encode { operation, source }
    }

    pub(crate) const fn io(operation: &'static str, path: Option<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path,
            source,
        }
    }
}
