//! Layered configuration loading.
//!
//! # Design
//! - Precedence, lowest first: built-in defaults, the YAML file named by `PULLEY_CONFIG`,
//!   individual `PULLEY_*` environment variables.
//! - The variable lookup is injected so callers and tests never mutate the process environment.
//! - The merged result is validated before it is returned.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::UploaderConfig;
use crate::validate::validate;

/// Prefix shared by every configuration variable.
pub const ENV_PREFIX: &str = "PULLEY_";
/// Variable naming an optional YAML configuration file.
pub const ENV_CONFIG_FILE: &str = "PULLEY_CONFIG";

impl UploaderConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed, a variable is
    /// malformed, or the merged settings fail validation.
    pub fn from_env() -> ConfigResult<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load configuration using the supplied variable lookup.
    ///
    /// # Errors
    ///
    /// See [`UploaderConfig::from_env`].
    pub fn load_with<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(ENV_CONFIG_FILE) {
            Some(path) if !path.trim().is_empty() => Self::from_file(Path::new(path.trim()))?,
            _ => Self::default(),
        };
        apply_env(&mut config, &lookup)?;
        validate(&config)?;
        debug!(
            max_concurrent_uploads = config.max_concurrent_uploads,
            max_connections_per_host = config.max_connections_per_host,
            timeout_secs = config.timeout_secs,
            "uploader configuration loaded"
        );
        Ok(config)
    }

    /// Read settings from a YAML file; absent keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn apply_env<F>(config: &mut UploaderConfig, lookup: &F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |suffix: &str| {
        lookup(&format!("{ENV_PREFIX}{suffix}"))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    if let Some(value) = var("MAX_CONNECTIONS_PER_HOST") {
        config.max_connections_per_host = parse("max_connections_per_host", &value)?;
    }
    if let Some(value) = var("MAX_CONCURRENT_UPLOADS") {
        config.max_concurrent_uploads = parse("max_concurrent_uploads", &value)?;
    }
    if let Some(value) = var("STEP_UPDATE") {
        config.step_update = parse("step_update", &value)?;
    }
    if let Some(value) = var("TIMEOUT_SECS") {
        config.timeout_secs = parse("timeout_secs", &value)?;
    }
    if let Some(value) = var("CALLBACK_WORKERS") {
        config.callback_workers = parse("callback_workers", &value)?;
    }
    if let Some(value) = var("BLOCK_SIZE") {
        config.block_size_bytes = parse("block_size_bytes", &value)?;
    }
    if let Some(value) = var("CONNECTIVITY_POLL_MS") {
        config.connectivity_poll_ms = parse("connectivity_poll_ms", &value)?;
    }
    if let Some(value) = var("STAGING_DIR") {
        config.staging_dir = PathBuf::from(value);
    }
    if let Some(value) = var("DATA_DIR") {
        config.data_dir = PathBuf::from(value);
    }
    if let Some(value) = var("SESSION_ID") {
        config.session_identifier = value;
    }
    if let Some(value) = var("CONSTRAINED_SESSION_ID") {
        config.constrained_session_identifier = value;
    }
    if let Some(value) = var("LOG_LEVEL") {
        config.log_level = value;
    }
    if let Some(value) = var("LOG_FORMAT") {
        config.log_format = Some(value.to_ascii_lowercase());
    }
    Ok(())
}

fn parse<T: FromStr>(field: &'static str, value: &str) -> ConfigResult<T> {
    value
        .parse()
        .map_err(|_| ConfigError::invalid(field, Some(value.to_string()), "not_a_number"))
}
