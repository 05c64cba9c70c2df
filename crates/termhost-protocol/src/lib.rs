//! # termhost-protocol
//!
//! Serializable types exchanged with terminal process backends: the launch
//! descriptor, attachable process descriptors, persisted layout snapshots,
//! detach requests, replay payloads and performance marks.
//!
//! The layout format is camelCase JSON so snapshots written by one backend
//! version can be read back by another.

mod launch;
mod layout;
mod messages;
mod types;

pub use launch::{ProcessLaunch, ShellLaunchConfig};
pub use layout::{LayoutSnapshot, PaneLayout, ProcessDetails, TabLayout};
pub use messages::{DetachRequest, PerformanceMark, ReplayEntry, ReplayEvent};
pub use types::{
    Cwd, Dimensions, PersistentProcessId, ProcessType, ReconnectionProperties, ResourceUri,
};
