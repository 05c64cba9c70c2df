use tokio::sync::broadcast;
use tracing::debug;

use super::{ActiveInstanceTracker, HostEvent, InstanceHost};
use crate::event::Emitter;
use crate::instance::{InstanceId, TerminalInstance, TerminalLocation};

/// The editor-area host: a flat, ordered list of terminals.
#[derive(Debug)]
pub struct EditorHost {
    instances: Vec<TerminalInstance>,
    active: Option<InstanceId>,
    events: Emitter<HostEvent>,
    tracker: ActiveInstanceTracker,
}

impl EditorHost {
    pub fn new(tracker: ActiveInstanceTracker) -> Self {
        Self {
            instances: Vec::new(),
            active: None,
            events: Emitter::new(),
            tracker,
        }
    }

    fn position(&self, id: InstanceId) -> Option<usize> {
        self.instances.iter().position(|i| i.id() == id)
    }

    fn set_active(&mut self, active: Option<InstanceId>, force: bool) {
        let changed = self.active != active;
        self.active = active;
        if changed {
            self.events.emit(HostEvent::ActiveInstanceChanged(active));
        }
        if changed || force {
            self.tracker.report(TerminalLocation::Editor, active);
        }
    }

    /// Opens the instance in a new editor and makes it active.
    pub fn open(&mut self, instance: TerminalInstance) {
        let id = instance.id();
        self.instances.push(instance);
        debug!(event = "core.host.editor_opened", instance_id = %id);

        self.events.emit(HostEvent::InstanceAdded(id));
        self.events.emit(HostEvent::InstancesChanged);
        self.set_active(Some(id), true);
    }
}

impl InstanceHost for EditorHost {
    fn location(&self) -> TerminalLocation {
        TerminalLocation::Editor
    }

    fn instance_ids(&self) -> Vec<InstanceId> {
        self.instances.iter().map(|i| i.id()).collect()
    }

    fn get(&self, id: InstanceId) -> Option<&TerminalInstance> {
        self.instances.iter().find(|i| i.id() == id)
    }

    fn get_mut(&mut self, id: InstanceId) -> Option<&mut TerminalInstance> {
        self.instances.iter_mut().find(|i| i.id() == id)
    }

    fn active_instance(&self) -> Option<InstanceId> {
        self.active
    }

    fn set_active_instance(&mut self, id: InstanceId) -> bool {
        if self.position(id).is_none() {
            return false;
        }
        self.set_active(Some(id), true);
        true
    }

    fn focus(&mut self, id: InstanceId) -> bool {
        if !self.set_active_instance(id) {
            return false;
        }
        self.events.emit(HostEvent::InstanceFocused(id));
        true
    }

    fn take_instance(&mut self, id: InstanceId) -> Option<TerminalInstance> {
        let index = self.position(id)?;
        let instance = self.instances.remove(index);

        self.events.emit(HostEvent::InstanceRemoved(id));
        self.events.emit(HostEvent::InstancesChanged);
        if self.active == Some(id) {
            let next = if self.instances.is_empty() {
                None
            } else {
                Some(self.instances[index.saturating_sub(1)].id())
            };
            self.set_active(next, false);
        }
        Some(instance)
    }

    fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    fn len(&self) -> usize {
        self.instances.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termhost_protocol::ShellLaunchConfig;

    fn inst(id: u32) -> TerminalInstance {
        TerminalInstance::new(
            InstanceId(id),
            ShellLaunchConfig::default(),
            TerminalLocation::Editor,
        )
    }

    #[test]
    fn test_open_activates() {
        let mut host = EditorHost::new(ActiveInstanceTracker::new(Emitter::new()));
        host.open(inst(1));
        host.open(inst(2));
        assert_eq!(host.active_instance(), Some(InstanceId(2)));
        assert_eq!(host.instance_ids(), vec![InstanceId(1), InstanceId(2)]);
    }

    #[test]
    fn test_take_active_picks_neighbor() {
        let mut host = EditorHost::new(ActiveInstanceTracker::new(Emitter::new()));
        host.open(inst(1));
        host.open(inst(2));
        host.open(inst(3));
        host.set_active_instance(InstanceId(2));

        host.take_instance(InstanceId(2)).unwrap();
        assert_eq!(host.active_instance(), Some(InstanceId(1)));

        host.take_instance(InstanceId(1)).unwrap();
        assert_eq!(host.active_instance(), Some(InstanceId(3)));

        host.take_instance(InstanceId(3)).unwrap();
        assert_eq!(host.active_instance(), None);
        assert!(host.is_empty());
    }

    #[tokio::test]
    async fn test_focus_emits_focused() {
        let mut host = EditorHost::new(ActiveInstanceTracker::new(Emitter::new()));
        host.open(inst(1));
        let mut rx = host.subscribe();
        assert!(host.focus(InstanceId(1)));
        assert_eq!(rx.recv().await.unwrap(), HostEvent::InstanceFocused(InstanceId(1)));
        assert!(!host.focus(InstanceId(9)));
    }
}
