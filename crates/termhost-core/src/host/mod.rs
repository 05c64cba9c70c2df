//! Instance hosts: the grouped panel and the editor area.
//!
//! Both own their instances by value and report their active instance to a
//! shared [`ActiveInstanceTracker`], which resolves the single service-wide
//! active instance.

mod editor;
mod group;

pub use editor::EditorHost;
pub use group::{GroupHost, GroupId, Pane, TerminalGroup};

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, error};

use crate::event::{Emitter, ServiceEvent};
use crate::instance::{InstanceId, TerminalInstance, TerminalLocation};

#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    InstanceAdded(InstanceId),
    InstanceRemoved(InstanceId),
    InstanceFocused(InstanceId),
    ActiveInstanceChanged(Option<InstanceId>),
    InstancesChanged,
    ActiveGroupChanged(Option<GroupId>),
}

/// Uniform contract over the two hosts.
pub trait InstanceHost {
    fn location(&self) -> TerminalLocation;

    /// Instance ids in presentation order.
    fn instance_ids(&self) -> Vec<InstanceId>;

    fn get(&self, id: InstanceId) -> Option<&TerminalInstance>;

    fn get_mut(&mut self, id: InstanceId) -> Option<&mut TerminalInstance>;

    fn active_instance(&self) -> Option<InstanceId>;

    /// Returns `false` if the instance is not in this host.
    fn set_active_instance(&mut self, id: InstanceId) -> bool;

    /// Makes the instance active and emits `InstanceFocused`.
    fn focus(&mut self, id: InstanceId) -> bool;

    /// Removes the instance, transferring ownership to the caller.
    fn take_instance(&mut self, id: InstanceId) -> Option<TerminalInstance>;

    fn subscribe(&self) -> broadcast::Receiver<HostEvent>;

    fn contains(&self, id: InstanceId) -> bool {
        self.get(id).is_some()
    }

    fn len(&self) -> usize {
        self.instance_ids().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    panel: Option<InstanceId>,
    editor: Option<InstanceId>,
    active: Option<InstanceId>,
}

impl TrackerState {
    fn last_known(&self, location: TerminalLocation) -> Option<InstanceId> {
        match location {
            TerminalLocation::Panel => self.panel,
            TerminalLocation::Editor => self.editor,
        }
    }

    fn record(&mut self, location: TerminalLocation, active: Option<InstanceId>) {
        match location {
            TerminalLocation::Panel => self.panel = active,
            TerminalLocation::Editor => self.editor = active,
        }
    }
}

/// Service-wide active instance across both hosts.
///
/// Created by the service and cloned into each host. A host reports after it
/// has emitted its own `ActiveInstanceChanged`. When a host's active becomes
/// `None`, the service-wide active falls back to the other host's last-known
/// active instance.
#[derive(Debug, Clone)]
pub struct ActiveInstanceTracker {
    state: Arc<Mutex<TrackerState>>,
    events: Emitter<ServiceEvent>,
}

impl ActiveInstanceTracker {
    pub fn new(events: Emitter<ServiceEvent>) -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackerState::default())),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|e| {
            error!(event = "core.tracker.lock_poisoned");
            e.into_inner()
        })
    }

    pub fn active(&self) -> Option<InstanceId> {
        self.lock().active
    }

    pub fn last_known(&self, location: TerminalLocation) -> Option<InstanceId> {
        self.lock().last_known(location)
    }

    /// Record a host's new active instance and recompute the global one.
    pub fn report(&self, location: TerminalLocation, active: Option<InstanceId>) {
        let changed = {
            let mut state = self.lock();
            state.record(location, active);
            let resolved = active.or_else(|| state.last_known(location.other()));
            if resolved == state.active {
                None
            } else {
                state.active = resolved;
                Some(resolved)
            }
        };

        if let Some(resolved) = changed {
            debug!(
                event = "core.tracker.active_changed",
                host = ?location,
                active = ?resolved
            );
            self.events.emit(ServiceEvent::ActiveInstanceChanged(resolved));
        }
    }
}
