//! Configuration validation logic.

use crate::errors::ConfigError;
use crate::types::TermhostConfig;

/// Validate a TermhostConfig, returning an error if any values are invalid.
///
/// # Validation Rules
///
/// - `default_profile`, if set, must be `extension.id/profile` with both parts non-empty
/// - `layout_save_debounce_ms` and `buffer_persist_timeout_ms` must be non-zero
pub fn validate_config(config: &TermhostConfig) -> Result<(), ConfigError> {
    if let Some(ref raw) = config.terminal.default_profile
        && config.terminal.default_profile().is_none()
    {
        return Err(ConfigError::InvalidConfiguration {
            message: format!(
                "Invalid default_profile '{}'. Expected 'extension.id/profile'",
                raw
            ),
        });
    }

    if config.persistence.layout_save_debounce_ms == Some(0) {
        return Err(ConfigError::InvalidConfiguration {
            message: "persistence.layout_save_debounce_ms must be greater than 0".to_string(),
        });
    }

    if config.persistence.buffer_persist_timeout_ms == Some(0) {
        return Err(ConfigError::InvalidConfiguration {
            message: "persistence.buffer_persist_timeout_ms must be greater than 0".to_string(),
        });
    }

    Ok(())
}
