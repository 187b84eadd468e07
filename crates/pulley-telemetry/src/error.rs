//! Error types for logging and metrics setup.

use std::string::FromUtf8Error;

use thiserror::Error;
use tracing_subscriber::util::TryInitError;

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors raised while installing logging or building and rendering metrics.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global tracing subscriber could not be installed.
    #[error("logging subscriber install failed")]
    Logging {
        /// Underlying subscriber error.
        source: TryInitError,
    },
    /// A collector could not be created or registered.
    #[error("metric setup failed")]
    Metric {
        /// Operation being performed.
        operation: &'static str,
        /// Metric the operation targeted.
        metric: &'static str,
        /// Underlying Prometheus error.
        source: prometheus::Error,
    },
    /// The registry could not be encoded.
    #[error("metrics encoding failed")]
    Encode {
        /// Underlying Prometheus error.
        source: prometheus::Error,
    },
    /// Encoded metrics were not UTF-8.
    #[error("metrics output not utf-8")]
    Utf8 {
        /// Underlying conversion error.
        source: FromUtf8Error,
    },
}

impl TelemetryError {
    pub(crate) const fn metric(
        operation: &'static str,
        metric: &'static str,
        source: prometheus::Error,
    ) -> Self {
        Self::Metric {
            operation,
            metric,
            source,
        }
    }

    /// Operation that failed.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Logging { .. } => "logging.install",
            Self::Metric { operation, .. } => operation,
            Self::Encode { .. } => "metrics.encode",
            Self::Utf8 { .. } => "metrics.utf8",
        }
    }
}
