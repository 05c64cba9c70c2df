//! Configuration types for termhost.
//!
//! Every field is optional so partial config files merge cleanly; accessors
//! supply the defaults.

use serde::{Deserialize, Serialize};

pub const DEFAULT_LAYOUT_SAVE_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_BUFFER_PERSIST_TIMEOUT_MS: u64 = 2000;

/// Where new terminals open when the caller does not say.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultLocation {
    #[default]
    Panel,
    Editor,
}

/// Working directory policy for split terminals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitCwd {
    /// The workspace folder (asks which one when there are several).
    WorkspaceRoot,
    /// The cwd the parent was launched with.
    Initial,
    /// The parent's current cwd.
    #[default]
    Inherited,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmOnExit {
    #[default]
    Never,
    Always,
    HasChildProcesses,
}

/// When backend processes are kept alive and revived across shutdowns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviveProcess {
    #[default]
    OnExit,
    OnExitAndWindowClose,
    Never,
}

/// `[terminal]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_location: Option<DefaultLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_cwd: Option<SplitCwd>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirm_on_exit: Option<ConfirmOnExit>,
    /// Contributed profile used for plain launches, as `extension.id/profile`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
}

impl TerminalSettings {
    pub fn default_location(&self) -> DefaultLocation {
        self.default_location.unwrap_or_default()
    }

    pub fn split_cwd(&self) -> SplitCwd {
        self.split_cwd.unwrap_or_default()
    }

    pub fn confirm_on_exit(&self) -> ConfirmOnExit {
        self.confirm_on_exit.unwrap_or_default()
    }

    /// The configured default profile split into `(extension_identifier, profile_id)`.
    ///
    /// Returns `None` when unset or malformed.
    pub fn default_profile(&self) -> Option<(&str, &str)> {
        let raw = self.default_profile.as_deref()?;
        let (extension, profile) = raw.split_once('/')?;
        if extension.is_empty() || profile.is_empty() {
            return None;
        }
        Some((extension, profile))
    }

    /// Merge two terminal sections. Override takes precedence for set fields.
    pub fn merge(base: &Self, override_config: &Self) -> Self {
        Self {
            default_location: override_config.default_location.or(base.default_location),
            split_cwd: override_config.split_cwd.or(base.split_cwd),
            confirm_on_exit: override_config.confirm_on_exit.or(base.confirm_on_exit),
            default_profile: override_config
                .default_profile
                .clone()
                .or(base.default_profile.clone()),
        }
    }
}

/// `[persistence]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_persistent_sessions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_remote_persistence: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revive_process: Option<ReviveProcess>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_save_debounce_ms: Option<u64>,
    /// Upper bound on the buffer-state save during shutdown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_persist_timeout_ms: Option<u64>,
}

impl PersistenceSettings {
    /// Defaults to `true`.
    pub fn enable_persistent_sessions(&self) -> bool {
        self.enable_persistent_sessions.unwrap_or(true)
    }

    /// Defaults to `true`.
    pub fn enable_remote_persistence(&self) -> bool {
        self.enable_remote_persistence.unwrap_or(true)
    }

    pub fn revive_process(&self) -> ReviveProcess {
        self.revive_process.unwrap_or_default()
    }

    pub fn layout_save_debounce_ms(&self) -> u64 {
        self.layout_save_debounce_ms
            .unwrap_or(DEFAULT_LAYOUT_SAVE_DEBOUNCE_MS)
    }

    pub fn buffer_persist_timeout_ms(&self) -> u64 {
        self.buffer_persist_timeout_ms
            .unwrap_or(DEFAULT_BUFFER_PERSIST_TIMEOUT_MS)
    }

    pub fn merge(base: &Self, override_config: &Self) -> Self {
        Self {
            enable_persistent_sessions: override_config
                .enable_persistent_sessions
                .or(base.enable_persistent_sessions),
            enable_remote_persistence: override_config
                .enable_remote_persistence
                .or(base.enable_remote_persistence),
            revive_process: override_config.revive_process.or(base.revive_process),
            layout_save_debounce_ms: override_config
                .layout_save_debounce_ms
                .or(base.layout_save_debounce_ms),
            buffer_persist_timeout_ms: override_config
                .buffer_persist_timeout_ms
                .or(base.buffer_persist_timeout_ms),
        }
    }
}

/// Top-level `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermhostConfig {
    pub terminal: TerminalSettings,
    pub persistence: PersistenceSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TermhostConfig::default();
        assert_eq!(config.terminal.default_location(), DefaultLocation::Panel);
        assert_eq!(config.terminal.split_cwd(), SplitCwd::Inherited);
        assert_eq!(config.terminal.confirm_on_exit(), ConfirmOnExit::Never);
        assert!(config.terminal.default_profile().is_none());
        assert!(config.persistence.enable_persistent_sessions());
        assert!(config.persistence.enable_remote_persistence());
        assert_eq!(config.persistence.revive_process(), ReviveProcess::OnExit);
        assert_eq!(config.persistence.layout_save_debounce_ms(), 500);
        assert_eq!(config.persistence.buffer_persist_timeout_ms(), 2000);
    }

    #[test]
    fn test_parse_full_config() {
        let config: TermhostConfig = toml::from_str(
            r#"
[terminal]
default_location = "editor"
split_cwd = "workspace_root"
confirm_on_exit = "has_child_processes"
default_profile = "acme.shells/fish"

[persistence]
enable_persistent_sessions = false
revive_process = "on_exit_and_window_close"
buffer_persist_timeout_ms = 750
"#,
        )
        .unwrap();

        assert_eq!(config.terminal.default_location(), DefaultLocation::Editor);
        assert_eq!(config.terminal.split_cwd(), SplitCwd::WorkspaceRoot);
        assert_eq!(
            config.terminal.confirm_on_exit(),
            ConfirmOnExit::HasChildProcesses
        );
        assert_eq!(
            config.terminal.default_profile(),
            Some(("acme.shells", "fish"))
        );
        assert!(!config.persistence.enable_persistent_sessions());
        assert!(config.persistence.enable_remote_persistence());
        assert_eq!(
            config.persistence.revive_process(),
            ReviveProcess::OnExitAndWindowClose
        );
        assert_eq!(config.persistence.buffer_persist_timeout_ms(), 750);
    }

    #[test]
    fn test_unknown_enum_value_is_parse_error() {
        let result: Result<TermhostConfig, _> = toml::from_str(
            r#"
[terminal]
default_location = "sidebar"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_default_profile_malformed_is_none() {
        for raw in ["noslash", "/profile", "ext/"] {
            let settings = TerminalSettings {
                default_profile: Some(raw.to_string()),
                ..Default::default()
            };
            assert!(settings.default_profile().is_none(), "{raw}");
        }
    }

    #[test]
    fn test_persistence_merge_override_wins() {
        let base = PersistenceSettings {
            enable_persistent_sessions: Some(true),
            layout_save_debounce_ms: Some(100),
            ..Default::default()
        };
        let over = PersistenceSettings {
            enable_persistent_sessions: Some(false),
            ..Default::default()
        };
        let merged = PersistenceSettings::merge(&base, &over);
        assert!(!merged.enable_persistent_sessions());
        assert_eq!(merged.layout_save_debounce_ms(), 100);
    }
}
