//! # termhost-core
//!
//! Lifecycle orchestration for terminal sessions in an editor-style host.
//!
//! [`TerminalService`] owns every terminal instance of a window and routes
//! it to one of two hosts: the grouped panel host (tabs of split panes) or
//! the editor host. It reconnects to processes that outlived the previous
//! window, persists the group layout, and coordinates the two-phase
//! shutdown that decides whether processes survive.
//!
//! Processes themselves live behind the [`TerminalBackend`] trait.

pub mod backend;
pub mod connection;
pub mod errors;
pub mod event;
pub mod host;
pub mod instance;
pub mod layout;
pub mod logging;
pub mod multiplexer;
pub mod profiles;
pub mod service;
pub mod shutdown;

pub use backend::{BackendRegistry, SpawnRequest, TerminalBackend};
pub use connection::{ConnectionCoordinator, ConnectionState};
pub use errors::{BackendError, TerminalError};
pub use event::{Emitter, ServiceEvent};
pub use host::{EditorHost, GroupHost, GroupId, HostEvent, InstanceHost, Pane, TerminalGroup};
pub use instance::{
    Capability, ExitReason, InstanceEvent, InstanceEventKind, InstanceId, TerminalInstance,
    TerminalLocation,
};
pub use layout::{LayoutPersister, LayoutStore};
pub use logging::init_logging;
pub use multiplexer::{EventMultiplexer, Selector};
pub use profiles::{
    ContributedProfile, ContributedProfileOptions, ContributedProfileProvider, ProfileError,
    ProfileRegistry, ReadyGate,
};
pub use service::{
    CreateInstanceOptions, DropSide, EditableData, EditableSlot, HostEnvironment,
    InstanceLocation, LaunchRequest, StartupKind, TerminalService, WorkspaceFolderPicker,
};
pub use shutdown::{
    ExitChoice, ExitPrompt, ShutdownReason, ShutdownRequest, ShutdownVerdict,
    needs_exit_confirmation, should_revive_processes,
};
