//! A single terminal session's state container.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use termhost_protocol::{
    Cwd, Dimensions, PersistentProcessId, ProcessDetails, ReplayEvent, ShellLaunchConfig,
};

use crate::event::Emitter;

/// Identifier of an instance within one window. Monotonic, never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct InstanceId(pub u32);

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which host presents the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalLocation {
    Panel,
    Editor,
}

impl TerminalLocation {
    pub fn other(self) -> Self {
        match self {
            TerminalLocation::Panel => TerminalLocation::Editor,
            TerminalLocation::Editor => TerminalLocation::Panel,
        }
    }
}

/// Shell features detected after the process starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    CommandDetection,
    PartialCommandDetection,
    CwdDetection,
    NaiveCwdDetection,
    BufferMarkDetection,
}

/// Why an instance was disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The process exited on its own.
    Process(Option<i32>),
    /// Closed by the user or an embedder call.
    User,
    Shutdown,
    /// Handed over to another window; the process lives on.
    Detached,
}

/// Selector for [`InstanceEvent`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceEventKind {
    TitleChanged,
    CwdChanged,
    DimensionsChanged,
    CapabilityAdded,
    ProcessReady,
    Replayed,
    Exited,
    Disposed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstanceEvent {
    TitleChanged {
        instance: InstanceId,
        title: String,
    },
    CwdChanged {
        instance: InstanceId,
        cwd: Cwd,
    },
    DimensionsChanged {
        instance: InstanceId,
        dimensions: Dimensions,
    },
    CapabilityAdded {
        instance: InstanceId,
        capability: Capability,
    },
    ProcessReady {
        instance: InstanceId,
        persistent_process_id: PersistentProcessId,
    },
    Replayed {
        instance: InstanceId,
    },
    Exited {
        instance: InstanceId,
        exit_code: Option<i32>,
    },
    Disposed {
        instance: InstanceId,
        reason: ExitReason,
    },
}

impl InstanceEvent {
    pub fn kind(&self) -> InstanceEventKind {
        match self {
            InstanceEvent::TitleChanged { .. } => InstanceEventKind::TitleChanged,
            InstanceEvent::CwdChanged { .. } => InstanceEventKind::CwdChanged,
            InstanceEvent::DimensionsChanged { .. } => InstanceEventKind::DimensionsChanged,
            InstanceEvent::CapabilityAdded { .. } => InstanceEventKind::CapabilityAdded,
            InstanceEvent::ProcessReady { .. } => InstanceEventKind::ProcessReady,
            InstanceEvent::Replayed { .. } => InstanceEventKind::Replayed,
            InstanceEvent::Exited { .. } => InstanceEventKind::Exited,
            InstanceEvent::Disposed { .. } => InstanceEventKind::Disposed,
        }
    }

    pub fn instance(&self) -> InstanceId {
        match self {
            InstanceEvent::TitleChanged { instance, .. }
            | InstanceEvent::CwdChanged { instance, .. }
            | InstanceEvent::DimensionsChanged { instance, .. }
            | InstanceEvent::CapabilityAdded { instance, .. }
            | InstanceEvent::ProcessReady { instance, .. }
            | InstanceEvent::Replayed { instance }
            | InstanceEvent::Exited { instance, .. }
            | InstanceEvent::Disposed { instance, .. } => *instance,
        }
    }
}

/// One terminal session.
///
/// Owned by value by exactly one host (or the service's background list).
/// Moving between hosts transfers the value.
#[derive(Debug)]
pub struct TerminalInstance {
    id: InstanceId,
    launch: ShellLaunchConfig,
    target: TerminalLocation,
    /// Authority of the backend that owns the process. `None` is local.
    backend_authority: Option<String>,
    process: Option<ProcessDetails>,
    capabilities: BTreeSet<Capability>,
    title: String,
    icon: Option<String>,
    initial_cwd: Option<Cwd>,
    cwd: Option<Cwd>,
    dimensions: Option<Dimensions>,
    has_child_processes: bool,
    replayed: bool,
    disposed: Option<ExitReason>,
    events: Emitter<InstanceEvent>,
}

impl TerminalInstance {
    pub fn new(id: InstanceId, launch: ShellLaunchConfig, target: TerminalLocation) -> Self {
        let title = launch.name.clone().unwrap_or_default();
        let icon = launch.icon.clone();
        let initial_cwd = launch.cwd.clone();
        Self {
            id,
            target,
            backend_authority: None,
            process: None,
            capabilities: BTreeSet::new(),
            title,
            icon,
            cwd: initial_cwd.clone(),
            initial_cwd,
            dimensions: None,
            has_child_processes: false,
            replayed: false,
            disposed: None,
            events: Emitter::new(),
            launch,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn launch(&self) -> &ShellLaunchConfig {
        &self.launch
    }

    pub fn target(&self) -> TerminalLocation {
        self.target
    }

    pub(crate) fn set_target(&mut self, target: TerminalLocation) {
        self.target = target;
    }

    pub fn backend_authority(&self) -> Option<&str> {
        self.backend_authority.as_deref()
    }

    pub(crate) fn set_backend_authority(&mut self, authority: Option<String>) {
        self.backend_authority = authority;
    }

    /// Present once the backend spawned or reattached the process.
    pub fn persistent_process_id(&self) -> Option<PersistentProcessId> {
        self.process.as_ref().map(|p| p.id)
    }

    pub fn process_details(&self) -> Option<&ProcessDetails> {
        self.process.as_ref()
    }

    pub fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn icon(&self) -> Option<&str> {
        self.icon.as_deref()
    }

    pub fn initial_cwd(&self) -> Option<&Cwd> {
        self.initial_cwd.as_ref()
    }

    pub(crate) fn set_initial_cwd(&mut self, cwd: Option<Cwd>) {
        if self.cwd.is_none() {
            self.cwd = cwd.clone();
        }
        self.initial_cwd = cwd;
    }

    pub fn cwd(&self) -> Option<&Cwd> {
        self.cwd.as_ref()
    }

    pub fn dimensions(&self) -> Option<Dimensions> {
        self.dimensions
    }

    pub fn has_child_processes(&self) -> bool {
        self.has_child_processes
    }

    pub fn is_replayed(&self) -> bool {
        self.replayed
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.is_some()
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.disposed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InstanceEvent> {
        self.events.subscribe()
    }

    /// Shared handle to this instance's event channel.
    pub(crate) fn emitter(&self) -> Emitter<InstanceEvent> {
        self.events.clone()
    }

    /// Whether the process should be kept alive and reattached after a restart.
    pub fn should_persist(&self) -> bool {
        self.persistent_process_id().is_some()
            && !self.launch.is_transient
            && !self.launch.is_custom_process()
            && (!self.launch.is_feature_terminal || self.launch.reconnection_properties.is_some())
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        let title = title.into();
        if title == self.title {
            return;
        }
        self.title = title.clone();
        self.events.emit(InstanceEvent::TitleChanged {
            instance: self.id,
            title,
        });
    }

    /// Adds a capability. Returns `false` if it was already present.
    pub fn add_capability(&mut self, capability: Capability) -> bool {
        if !self.capabilities.insert(capability) {
            return false;
        }
        debug!(
            event = "core.instance.capability_added",
            instance_id = %self.id,
            capability = ?capability
        );
        self.events.emit(InstanceEvent::CapabilityAdded {
            instance: self.id,
            capability,
        });
        true
    }

    /// Records the backend's process descriptor once spawned or reattached.
    pub fn set_process_ready(&mut self, details: ProcessDetails) {
        let id = details.id;
        if self.title.is_empty() && !details.title.is_empty() {
            self.title = details.title.clone();
        }
        self.has_child_processes = details.has_child_processes;
        if let Some(dimensions) = details.fixed_dimensions {
            self.dimensions = Some(dimensions);
        }
        self.process = Some(details);
        info!(
            event = "core.instance.process_ready",
            instance_id = %self.id,
            persistent_process_id = %id
        );
        self.events.emit(InstanceEvent::ProcessReady {
            instance: self.id,
            persistent_process_id: id,
        });
    }

    pub fn set_has_child_processes(&mut self, value: bool) {
        self.has_child_processes = value;
    }

    pub fn set_dimensions(&mut self, dimensions: Dimensions) {
        if self.dimensions == Some(dimensions) {
            return;
        }
        self.dimensions = Some(dimensions);
        self.events.emit(InstanceEvent::DimensionsChanged {
            instance: self.id,
            dimensions,
        });
    }

    pub fn set_cwd(&mut self, cwd: Cwd) {
        if self.cwd.as_ref() == Some(&cwd) {
            return;
        }
        self.cwd = Some(cwd.clone());
        self.events.emit(InstanceEvent::CwdChanged {
            instance: self.id,
            cwd,
        });
    }

    /// Applies buffered output from a reattached process.
    pub fn apply_replay(&mut self, replay: &ReplayEvent) {
        if let Some((cols, rows)) = replay.final_dimensions() {
            self.dimensions = Some(Dimensions::new(cols, rows));
        }
        self.replayed = true;
        debug!(
            event = "core.instance.replay_applied",
            instance_id = %self.id,
            chunks = replay.events.len(),
            bytes = replay.byte_len()
        );
        self.events.emit(InstanceEvent::Replayed { instance: self.id });
    }

    pub fn notify_exit(&self, exit_code: Option<i32>) {
        self.events.emit(InstanceEvent::Exited {
            instance: self.id,
            exit_code,
        });
    }

    /// Marks the instance disposed. Idempotent: only the first reason sticks.
    ///
    /// Returns `false` if it was already disposed.
    pub fn dispose(&mut self, reason: ExitReason) -> bool {
        if self.disposed.is_some() {
            return false;
        }
        self.disposed = Some(reason);
        info!(
            event = "core.instance.disposed",
            instance_id = %self.id,
            reason = ?reason
        );
        self.events.emit(InstanceEvent::Disposed {
            instance: self.id,
            reason,
        });
        true
    }

    /// Disposes the instance while leaving its process running in the backend.
    ///
    /// Returns the handle the backend should keep alive.
    pub fn detach_process_and_dispose(&mut self) -> Option<PersistentProcessId> {
        let handle = self.persistent_process_id();
        self.dispose(ExitReason::Detached);
        handle
    }

    /// Descriptor to persist in a layout snapshot, with live title and cwd.
    pub(crate) fn layout_details(&self) -> Option<ProcessDetails> {
        let mut details = self.process.clone()?;
        details.title = self.title.clone();
        if let Some(cwd) = &self.cwd {
            details.cwd = cwd.path_string();
        }
        details.has_child_processes = self.has_child_processes;
        Some(details)
    }
}
