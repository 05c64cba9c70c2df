//! Configuration loading and merging logic.
//!
//! # Configuration Hierarchy
//!
//! Later sources override earlier ones:
//! 1. **Hardcoded defaults** - accessor fallbacks on each section
//! 2. **User config** - `~/.termhost/config.toml`
//! 3. **Project config** - `./.termhost/config.toml`

use std::fs;
use std::path::Path;

use termhost_paths::TermhostPaths;
use tracing::debug;

use crate::errors::ConfigError;
use crate::types::{PersistenceSettings, TerminalSettings, TermhostConfig};
use crate::validation::validate_config;

/// Load configuration from the user and current-directory project files.
///
/// # Errors
///
/// Returns an error if a file exists but cannot be parsed, or if validation
/// fails. Missing config files are not errors.
pub fn load_hierarchy() -> Result<TermhostConfig, ConfigError> {
    let project_root = std::env::current_dir()?;
    load_hierarchy_from(&project_root)
}

/// Like [`load_hierarchy`], with an explicit project root.
pub fn load_hierarchy_from(project_root: &Path) -> Result<TermhostConfig, ConfigError> {
    let mut config = TermhostConfig::default();

    let paths = TermhostPaths::resolve().map_err(|e| ConfigError::PathUnavailable {
        message: e.to_string(),
    })?;

    for path in [
        paths.user_config(),
        TermhostPaths::project_config(project_root),
    ] {
        match load_config_file(&path) {
            Ok(layer) => {
                debug!(event = "config.loading.layer_loaded", path = %path.display());
                config = merge_configs(config, layer);
            }
            Err(e) if e.is_file_not_found() => {}
            Err(e) => return Err(e),
        }
    }

    validate_config(&config)?;

    Ok(config)
}

/// Load a configuration file from the given path.
pub fn load_config_file(path: &Path) -> Result<TermhostConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| ConfigError::ConfigParseError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Merge two configurations, with override_config taking precedence.
///
/// Override values replace base values only if present.
pub fn merge_configs(base: TermhostConfig, override_config: TermhostConfig) -> TermhostConfig {
    TermhostConfig {
        terminal: TerminalSettings::merge(&base.terminal, &override_config.terminal),
        persistence: PersistenceSettings::merge(&base.persistence, &override_config.persistence),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfirmOnExit, DefaultLocation, ReviveProcess};
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = load_config_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.is_file_not_found());
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        write(&path, "invalid toml [[[");

        let err = load_config_file(&path).unwrap_err();
        assert!(!err.is_file_not_found());
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_hierarchy_project_overrides_user() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();

        write(
            &home.path().join(".termhost").join("config.toml"),
            r#"
[terminal]
default_location = "editor"
confirm_on_exit = "always"

[persistence]
revive_process = "never"
"#,
        );
        write(
            &TermhostPaths::project_config(project.path()),
            r#"
[terminal]
confirm_on_exit = "has_child_processes"
"#,
        );

        let config = temp_env::with_var("HOME", Some(home.path()), || {
            load_hierarchy_from(project.path()).unwrap()
        });

        assert_eq!(config.terminal.default_location(), DefaultLocation::Editor);
        assert_eq!(
            config.terminal.confirm_on_exit(),
            ConfirmOnExit::HasChildProcesses
        );
        assert_eq!(config.persistence.revive_process(), ReviveProcess::Never);
    }

    #[test]
    fn test_hierarchy_without_files_is_default() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();

        let config = temp_env::with_var("HOME", Some(home.path()), || {
            load_hierarchy_from(project.path()).unwrap()
        });

        assert_eq!(config, TermhostConfig::default());
    }

    #[test]
    fn test_hierarchy_rejects_invalid_merged_config() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        write(
            &TermhostPaths::project_config(project.path()),
            "[persistence]\nbuffer_persist_timeout_ms = 0\n",
        );

        let result = temp_env::with_var("HOME", Some(home.path()), || {
            load_hierarchy_from(project.path())
        });

        assert!(matches!(
            result,
            Err(ConfigError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_toml_parsing_edge_cases() {
        let empty: TermhostConfig = toml::from_str("").unwrap();
        assert_eq!(empty, TermhostConfig::default());

        let partial: TermhostConfig = toml::from_str("[persistence]\nenable_remote_persistence = false\n").unwrap();
        assert!(!partial.persistence.enable_remote_persistence());
        assert!(partial.persistence.enable_persistent_sessions());
    }
}
