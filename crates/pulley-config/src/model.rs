//! Typed uploader settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// File name of the persisted result log inside the data directory.
const RESULTS_FILE: &str = "upload_results.jsonl";
/// File name of the persisted background handler inside the data directory.
const HANDLER_FILE: &str = "background_handler.json";

/// Settings shared by every uploader component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploaderConfig {
    /// Connections the transport may open to a single host.
    pub max_connections_per_host: usize,
    /// Transfers that may be active at once.
    pub max_concurrent_uploads: usize,
    /// Minimum percentage increase between two progress events.
    pub step_update: i32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Workers draining transport callbacks.
    pub callback_workers: usize,
    /// Default block size for sequential block uploads.
    pub block_size_bytes: u64,
    /// Interval between connectivity checks for constrained uploads.
    pub connectivity_poll_ms: u64,
    /// Directory where multipart bodies are staged.
    pub staging_dir: PathBuf,
    /// Directory holding persisted results and the background handler.
    pub data_dir: PathBuf,
    /// Identifier of the unrestricted transport context.
    pub session_identifier: String,
    /// Identifier of the unmetered-only transport context.
    pub constrained_session_identifier: String,
    /// Log level passed to the tracing filter.
    pub log_level: String,
    /// Log output format (`json` or `pretty`); inferred from the build when absent.
    pub log_format: Option<String>,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            max_connections_per_host: defaults::MAX_CONNECTIONS_PER_HOST,
            max_concurrent_uploads: defaults::MAX_CONCURRENT_UPLOADS,
            step_update: defaults::STEP_UPDATE,
            timeout_secs: defaults::TIMEOUT_SECS,
            callback_workers: defaults::CALLBACK_WORKERS,
            block_size_bytes: defaults::BLOCK_SIZE_BYTES,
            connectivity_poll_ms: defaults::CONNECTIVITY_POLL_MS,
            staging_dir: std::env::temp_dir().join(defaults::STAGING_DIR_NAME),
            data_dir: PathBuf::from(defaults::DATA_DIR),
            session_identifier: defaults::SESSION_IDENTIFIER.to_string(),
            constrained_session_identifier: defaults::CONSTRAINED_SESSION_IDENTIFIER.to_string(),
            log_level: defaults::LOG_LEVEL.to_string(),
            log_format: None,
        }
    }
}

impl UploaderConfig {
    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Interval between connectivity checks.
    #[must_use]
    pub const fn connectivity_poll(&self) -> Duration {
        Duration::from_millis(self.connectivity_poll_ms)
    }

    /// Location of the persisted result log.
    #[must_use]
    pub fn results_path(&self) -> PathBuf {
        self.data_dir.join(RESULTS_FILE)
    }

    /// Location of the persisted background handler.
    #[must_use]
    pub fn handler_path(&self) -> PathBuf {
        self.data_dir.join(HANDLER_FILE)
    }
}
