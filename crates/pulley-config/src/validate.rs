//! Validation rules for uploader settings.

use crate::error::{ConfigError, ConfigResult};
use crate::model::UploaderConfig;

/// Reject settings the transport or registry cannot operate with.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] naming the first offending field.
pub fn validate(config: &UploaderConfig) -> ConfigResult<()> {
    ensure_positive("max_connections_per_host", config.max_connections_per_host)?;
    ensure_positive("max_concurrent_uploads", config.max_concurrent_uploads)?;
    ensure_positive("callback_workers", config.callback_workers)?;
    ensure_positive_u64("timeout_secs", config.timeout_secs)?;
    ensure_positive_u64("block_size_bytes", config.block_size_bytes)?;
    ensure_positive_u64("connectivity_poll_ms", config.connectivity_poll_ms)?;
    if !(0..=100).contains(&config.step_update) {
        return Err(ConfigError::invalid(
            "step_update",
            Some(config.step_update.to_string()),
            "out_of_range",
        ));
    }
    if config.session_identifier.trim().is_empty() {
        return Err(ConfigError::invalid("session_identifier", None, "empty"));
    }
    if config.constrained_session_identifier.trim().is_empty() {
        return Err(ConfigError::invalid(
            "constrained_session_identifier",
            None,
            "empty",
        ));
    }
    if config.session_identifier == config.constrained_session_identifier {
        return Err(ConfigError::invalid(
            "constrained_session_identifier",
            Some(config.constrained_session_identifier.clone()),
            "duplicate_identifier",
        ));
    }
    if let Some(format) = config.log_format.as_deref()
        && !matches!(format, "json" | "pretty")
    {
        return Err(ConfigError::invalid(
            "log_format",
            Some(format.to_string()),
            "unknown_format",
        ));
    }
    Ok(())
}

fn ensure_positive(field: &'static str, value: usize) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::invalid(field, Some(value.to_string()), "must_be_positive"));
    }
    Ok(())
}

fn ensure_positive_u64(field: &'static str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::invalid(field, Some(value.to_string()), "must_be_positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: ConfigError) -> Option<&'static str> {
        match err {
            ConfigError::InvalidField { field, .. } => Some(field),
            _ => None,
        }
    }

    #[test]
    fn defaults_validate() {
        assert!(validate(&UploaderConfig::default()).is_ok());
    }

    #[test]
    fn zero_caps_and_timeouts_are_rejected() {
        let mut config = UploaderConfig {
            max_concurrent_uploads: 0,
            ..UploaderConfig::default()
        };
        assert_eq!(
            validate(&config).err().and_then(field_of),
            Some("max_concurrent_uploads")
        );

        config.max_concurrent_uploads = 1;
        config.timeout_secs = 0;
        assert_eq!(
            validate(&config).err().and_then(field_of),
            Some("timeout_secs")
        );
    }

    #[test]
    fn identical_context_identifiers_are_rejected() {
        let config = UploaderConfig {
            constrained_session_identifier: UploaderConfig::default().session_identifier,
            ..UploaderConfig::default()
        };
        assert_eq!(
            validate(&config).err().and_then(field_of),
            Some("constrained_session_identifier")
        );
    }

    #[test]
    fn step_and_format_are_range_checked() {
        let config = UploaderConfig {
            step_update: 101,
            ..UploaderConfig::default()
        };
        assert_eq!(validate(&config).err().and_then(field_of), Some("step_update"));

        let config = UploaderConfig {
            log_format: Some("xml".into()),
            ..UploaderConfig::default()
        };
        assert_eq!(validate(&config).err().and_then(field_of), Some("log_format"));
    }
}
