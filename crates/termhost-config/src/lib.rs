//! # termhost-config
//!
//! TOML configuration types, loading, and validation for termhost.
//!
//! Depends only on `termhost-paths`.

mod loading;
mod validation;

pub mod errors;
pub mod types;

pub use errors::ConfigError;
pub use loading::{load_config_file, load_hierarchy, load_hierarchy_from, merge_configs};
pub use types::{
    ConfirmOnExit, DefaultLocation, PersistenceSettings, ReviveProcess, SplitCwd,
    TerminalSettings, TermhostConfig,
};
pub use validation::validate_config;

impl TermhostConfig {
    /// Load configuration from the hierarchy of config files.
    ///
    /// See [`loading::load_hierarchy`] for details.
    pub fn load_hierarchy() -> Result<Self, ConfigError> {
        loading::load_hierarchy()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate_config(self)
    }

    /// Render as TOML, with unset fields omitted.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidConfiguration {
            message: e.to_string(),
        })
    }
}
