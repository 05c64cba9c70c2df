use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::layout::ProcessDetails;
use crate::types::{Cwd, ReconnectionProperties};

/// How the process behind a terminal comes into existence.
///
/// Attaching to a persisted process and spawning a fresh one are mutually
/// exclusive, so they are variants rather than flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessLaunch {
    /// Spawn a new process. `None` means the backend's default shell.
    Spawn {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        executable: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
    },
    /// Reattach to a process the backend kept alive.
    Attach(ProcessDetails),
    /// The embedder implements the process itself; no backend involved.
    Custom,
}

impl Default for ProcessLaunch {
    fn default() -> Self {
        ProcessLaunch::Spawn {
            executable: None,
            args: Vec::new(),
        }
    }
}

/// Launch descriptor for a terminal instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellLaunchConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub process: ProcessLaunch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<Cwd>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Keep the terminal out of both hosts until it is explicitly surfaced.
    #[serde(default)]
    pub hide_from_user: bool,
    /// Terminals owned by a feature (tasks, debug) that must never be stolen
    /// by another window.
    #[serde(default)]
    pub is_feature_terminal: bool,
    /// Never persisted or revived.
    #[serde(default)]
    pub is_transient: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnection_properties: Option<ReconnectionProperties>,
}

impl ShellLaunchConfig {
    /// Spawn `executable` with no arguments.
    pub fn spawn(executable: impl Into<String>) -> Self {
        Self {
            process: ProcessLaunch::Spawn {
                executable: Some(executable.into()),
                args: Vec::new(),
            },
            ..Self::default()
        }
    }

    /// A terminal whose process is implemented by the embedder.
    pub fn custom() -> Self {
        Self {
            process: ProcessLaunch::Custom,
            ..Self::default()
        }
    }

    /// Reattach to a persisted process, inheriting its presentation.
    pub fn attach(details: ProcessDetails) -> Self {
        Self {
            name: Some(details.title.clone()).filter(|t| !t.is_empty()),
            icon: details.icon.clone(),
            color: details.color.clone(),
            reconnection_properties: details.reconnection_properties.clone(),
            process: ProcessLaunch::Attach(details),
            ..Self::default()
        }
    }

    pub fn with_cwd(mut self, cwd: Cwd) -> Self {
        self.cwd = Some(cwd);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hide_from_user = true;
        self
    }

    pub fn is_custom_process(&self) -> bool {
        matches!(self.process, ProcessLaunch::Custom)
    }

    pub fn attach_target(&self) -> Option<&ProcessDetails> {
        match &self.process {
            ProcessLaunch::Attach(details) => Some(details),
            _ => None,
        }
    }
}
