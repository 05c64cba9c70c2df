//! Moving instances between the grouped and editor hosts.

use tracing::{debug, info};

use crate::errors::TerminalError;
use crate::event::ServiceEvent;
use crate::host::InstanceHost;
use crate::instance::{InstanceId, TerminalLocation};

use super::TerminalService;

/// Where a dropped instance lands relative to the drop target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DropSide {
    Before,
    #[default]
    After,
}

impl TerminalService {
    /// Moves an instance into the editor host. No-op if it is already there.
    pub fn move_to_editor(&mut self, id: InstanceId) -> Result<(), TerminalError> {
        if self.editor_host.contains(id) {
            debug!(event = "core.service.move_skipped", instance_id = %id, target = "editor");
            return Ok(());
        }
        let mut instance = self
            .group_host
            .take_instance(id)
            .or_else(|| self.take_background(id))
            .ok_or(TerminalError::InstanceNotFound(id))?;

        instance.set_target(TerminalLocation::Editor);
        self.editor_host.open(instance);
        self.notify_moved(id, TerminalLocation::Editor);
        Ok(())
    }

    /// Moves an instance into the grouped host, next to `target` when given,
    /// otherwise into a new group.
    pub fn move_to_terminal_view(
        &mut self,
        id: InstanceId,
        target: Option<InstanceId>,
        side: DropSide,
    ) -> Result<(), TerminalError> {
        if self.group_host.contains(id) {
            debug!(event = "core.service.move_skipped", instance_id = %id, target = "panel");
            return Ok(());
        }
        let mut instance = self
            .editor_host
            .take_instance(id)
            .or_else(|| self.take_background(id))
            .ok_or(TerminalError::InstanceNotFound(id))?;
        instance.set_target(TerminalLocation::Panel);

        let placement = target.and_then(|target| {
            let group = self.group_host.group_of(target)?;
            let index = self.group_host.group(group)?.index_of(target)?;
            Some((group, index + usize::from(side == DropSide::After)))
        });
        match placement {
            Some((group, index)) => self.group_host.insert_into_group(group, index, instance),
            None => self.group_host.create_group(instance),
        };
        self.group_host.set_active_instance(id);

        self.notify_moved(id, TerminalLocation::Panel);
        Ok(())
    }

    /// Folds the given instances into one group. Returns false if they
    /// already share a group.
    pub fn join_instances(&mut self, ids: &[InstanceId]) -> bool {
        let joined = self.group_host.join(ids);
        if joined {
            self.events.emit(ServiceEvent::InstancesChanged);
            self.events.emit(ServiceEvent::ActiveGroupChanged);
            self.schedule_layout_save();
        }
        joined
    }

    fn notify_moved(&mut self, id: InstanceId, target: TerminalLocation) {
        info!(event = "core.service.instance_moved", instance_id = %id, target = ?target);
        self.group_host.notify_layout_changed();
        self.events.emit(ServiceEvent::InstanceMoved {
            instance: id,
            target,
        });
        self.events.emit(ServiceEvent::InstancesChanged);
        self.events.emit(ServiceEvent::ActiveGroupChanged);
        self.schedule_layout_save();
    }
}
