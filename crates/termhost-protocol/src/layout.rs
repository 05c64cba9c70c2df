use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, PersistentProcessId, ProcessType, ReconnectionProperties};

/// Attachable process descriptor reported by a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDetails {
    pub id: PersistentProcessId,
    #[serde(default)]
    pub pid: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub workspace_id: String,
    #[serde(default)]
    pub workspace_name: String,
    /// The window that owned the process is gone but the process is alive.
    #[serde(default)]
    pub is_orphan: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub process_type: Option<ProcessType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub has_child_processes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_dimensions: Option<Dimensions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnection_properties: Option<ReconnectionProperties>,
}

/// One pane of a persisted tab.
///
/// `terminal` is `None` when the backend no longer has the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaneLayout {
    pub terminal: Option<ProcessDetails>,
    pub relative_size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabLayout {
    pub terminals: Vec<PaneLayout>,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_persistent_process_id: Option<PersistentProcessId>,
}

/// Persisted tab/split/size topology used to reattach after a restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSnapshot {
    pub tabs: Vec<TabLayout>,
}

impl LayoutSnapshot {
    pub fn is_empty(&self) -> bool {
        self.tabs.iter().all(|tab| tab.terminals.is_empty())
    }

    /// Number of panes that still have a live process.
    pub fn terminal_count(&self) -> usize {
        self.tabs
            .iter()
            .flat_map(|tab| tab.terminals.iter())
            .filter(|pane| pane.terminal.is_some())
            .count()
    }
}
