//! Built-in configuration values.
//!
//! # Design
//! - Keep every default in one place so the model, loader and docs agree.

/// Connections the transport may open to a single host.
pub const MAX_CONNECTIONS_PER_HOST: usize = 3;
/// Transfers that may be active at once across both contexts.
pub const MAX_CONCURRENT_UPLOADS: usize = 2;
/// Minimum percentage increase between two progress events.
pub const STEP_UPDATE: i32 = 0;
/// Per-request timeout in seconds.
pub const TIMEOUT_SECS: u64 = 3_600;
/// Workers draining transport callbacks.
pub const CALLBACK_WORKERS: usize = 2;
/// Block size for sequential block uploads.
pub const BLOCK_SIZE_BYTES: u64 = 512 * 1024;
/// Interval between connectivity checks for constrained uploads.
pub const CONNECTIVITY_POLL_MS: u64 = 1_000;
/// Identifier of the unrestricted transport context.
pub const SESSION_IDENTIFIER: &str = "pulley.upload.background";
/// Identifier of the unmetered-only transport context.
pub const CONSTRAINED_SESSION_IDENTIFIER: &str = "pulley.upload.background.wifi";
/// Directory name used under the system temp dir for staged bodies.
pub const STAGING_DIR_NAME: &str = "pulley";
/// Directory holding persisted results when none is configured.
pub const DATA_DIR: &str = ".pulley";
/// Log level applied when none is configured.
pub const LOG_LEVEL: &str = "info";
