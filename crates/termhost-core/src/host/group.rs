use tokio::sync::broadcast;
use tracing::{debug, warn};

use termhost_protocol::{LayoutSnapshot, PaneLayout, TabLayout};

use super::{ActiveInstanceTracker, HostEvent, InstanceHost};
use crate::event::Emitter;
use crate::instance::{InstanceId, TerminalInstance, TerminalLocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u32);

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
pub struct Pane {
    instance: TerminalInstance,
    relative_size: f64,
}

impl Pane {
    pub fn instance(&self) -> &TerminalInstance {
        &self.instance
    }

    pub fn relative_size(&self) -> f64 {
        self.relative_size
    }
}

/// A tab: one or more split panes.
#[derive(Debug)]
pub struct TerminalGroup {
    id: GroupId,
    panes: Vec<Pane>,
    active: Option<InstanceId>,
}

impl TerminalGroup {
    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn panes(&self) -> &[Pane] {
        &self.panes
    }

    pub fn active_instance(&self) -> Option<InstanceId> {
        self.active
    }

    pub fn instance_ids(&self) -> Vec<InstanceId> {
        self.panes.iter().map(|p| p.instance.id()).collect()
    }

    pub fn relative_sizes(&self) -> Vec<f64> {
        self.panes.iter().map(|p| p.relative_size).collect()
    }

    pub fn len(&self) -> usize {
        self.panes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panes.is_empty()
    }

    pub fn index_of(&self, id: InstanceId) -> Option<usize> {
        self.panes.iter().position(|p| p.instance.id() == id)
    }

    fn rebalance(&mut self) {
        let size = 1.0 / self.panes.len() as f64;
        for pane in &mut self.panes {
            pane.relative_size = size;
        }
    }

    /// Rescale sizes to sum to 1 after a pane left.
    fn normalize(&mut self) {
        let total: f64 = self.panes.iter().map(|p| p.relative_size).sum();
        if total <= 0.0 {
            self.rebalance();
            return;
        }
        for pane in &mut self.panes {
            pane.relative_size /= total;
        }
    }
}

/// The grouped (panel) host: tabs of split panes.
#[derive(Debug)]
pub struct GroupHost {
    groups: Vec<TerminalGroup>,
    active_group: Option<GroupId>,
    next_group_id: u32,
    events: Emitter<HostEvent>,
    tracker: ActiveInstanceTracker,
}

impl GroupHost {
    pub fn new(tracker: ActiveInstanceTracker) -> Self {
        Self {
            groups: Vec::new(),
            active_group: None,
            next_group_id: 1,
            events: Emitter::new(),
            tracker,
        }
    }

    pub fn groups(&self) -> &[TerminalGroup] {
        &self.groups
    }

    pub fn group(&self, id: GroupId) -> Option<&TerminalGroup> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn group_of(&self, id: InstanceId) -> Option<GroupId> {
        self.locate(id).map(|(gi, _)| self.groups[gi].id)
    }

    pub fn active_group(&self) -> Option<GroupId> {
        self.active_group
    }

    fn group_index(&self, id: GroupId) -> Option<usize> {
        self.groups.iter().position(|g| g.id == id)
    }

    fn locate(&self, id: InstanceId) -> Option<(usize, usize)> {
        self.groups
            .iter()
            .enumerate()
            .find_map(|(gi, g)| g.index_of(id).map(|pi| (gi, pi)))
    }

    fn set_active_group_id(&mut self, id: Option<GroupId>) {
        if self.active_group != id {
            self.active_group = id;
            self.events.emit(HostEvent::ActiveGroupChanged(id));
        }
    }

    /// Emit and report the active instance if it moved. `force` reports even
    /// when unchanged, so the tracker can switch back from the other host.
    fn refresh_active(&self, previous: Option<InstanceId>, force: bool) {
        let current = self.active_instance();
        if current != previous {
            self.events.emit(HostEvent::ActiveInstanceChanged(current));
        }
        if current != previous || force {
            self.tracker.report(TerminalLocation::Panel, current);
        }
    }

    /// Puts the instance in a new tab at the end. The new tab becomes active
    /// only if there was none.
    pub fn create_group(&mut self, instance: TerminalInstance) -> GroupId {
        let previous = self.active_instance();
        let group_id = GroupId(self.next_group_id);
        self.next_group_id += 1;

        let id = instance.id();
        self.groups.push(TerminalGroup {
            id: group_id,
            panes: vec![Pane {
                instance,
                relative_size: 1.0,
            }],
            active: Some(id),
        });
        debug!(event = "core.host.group_created", group_id = %group_id, instance_id = %id);

        self.events.emit(HostEvent::InstanceAdded(id));
        self.events.emit(HostEvent::InstancesChanged);
        if self.active_group.is_none() {
            self.set_active_group_id(Some(group_id));
        }
        self.refresh_active(previous, false);
        group_id
    }

    /// Inserts at `index` within the group (clamped) and rebalances sizes
    /// equally. Falls back to a new group if `group` no longer exists.
    pub fn insert_into_group(
        &mut self,
        group: GroupId,
        index: usize,
        instance: TerminalInstance,
    ) -> GroupId {
        let Some(gi) = self.group_index(group) else {
            return self.create_group(instance);
        };
        let previous = self.active_instance();
        let id = instance.id();

        let target = &mut self.groups[gi];
        let index = index.min(target.panes.len());
        target.panes.insert(
            index,
            Pane {
                instance,
                relative_size: 0.0,
            },
        );
        target.rebalance();
        if target.active.is_none() {
            target.active = Some(id);
        }
        debug!(event = "core.host.pane_inserted", group_id = %group, instance_id = %id, index = index);

        self.events.emit(HostEvent::InstanceAdded(id));
        self.events.emit(HostEvent::InstancesChanged);
        self.refresh_active(previous, false);
        group
    }

    /// Splits `parent`, placing the instance right after it.
    pub fn split(&mut self, parent: InstanceId, instance: TerminalInstance) -> GroupId {
        match self.locate(parent) {
            Some((gi, pi)) => {
                let group = self.groups[gi].id;
                self.insert_into_group(group, pi + 1, instance)
            }
            None => self.create_group(instance),
        }
    }

    pub fn set_active_group(&mut self, group: GroupId) -> bool {
        if self.group_index(group).is_none() {
            return false;
        }
        let previous = self.active_instance();
        self.set_active_group_id(Some(group));
        self.refresh_active(previous, true);
        true
    }

    /// Sets a group's active pane without changing the active group.
    pub fn set_group_active_pane(&mut self, group: GroupId, id: InstanceId) -> bool {
        let Some(gi) = self.group_index(group) else {
            return false;
        };
        if self.groups[gi].index_of(id).is_none() {
            return false;
        }
        let previous = self.active_instance();
        self.groups[gi].active = Some(id);
        self.refresh_active(previous, false);
        true
    }

    /// Stores the given sizes verbatim. Length must match the pane count.
    pub fn resize_panes(&mut self, group: GroupId, sizes: &[f64]) -> bool {
        let Some(gi) = self.group_index(group) else {
            return false;
        };
        let target = &mut self.groups[gi];
        if target.panes.len() != sizes.len() {
            warn!(
                event = "core.host.resize_mismatch",
                group_id = %group,
                panes = target.panes.len(),
                sizes = sizes.len()
            );
            return false;
        }
        for (pane, size) in target.panes.iter_mut().zip(sizes) {
            pane.relative_size = *size;
        }
        true
    }

    /// Removes the pane at `(gi, pi)`, dropping the group if it empties.
    fn remove_pane(&mut self, gi: usize, pi: usize) -> Pane {
        let group = &mut self.groups[gi];
        let pane = group.panes.remove(pi);
        let removed_id = pane.instance.id();

        if group.panes.is_empty() {
            let removed = self.groups.remove(gi);
            if self.active_group == Some(removed.id) {
                let next = if self.groups.is_empty() {
                    None
                } else {
                    Some(self.groups[gi.saturating_sub(1).min(self.groups.len() - 1)].id)
                };
                self.set_active_group_id(next);
            }
        } else {
            group.normalize();
            if group.active == Some(removed_id) {
                let next = pi.saturating_sub(1).min(group.panes.len() - 1);
                group.active = Some(group.panes[next].instance.id());
            }
        }
        pane
    }

    /// Folds the given instances into the first one's group.
    ///
    /// Does nothing (and warns) if fewer than two groups are involved.
    pub fn join(&mut self, ids: &[InstanceId]) -> bool {
        let mut involved: Vec<GroupId> = Vec::new();
        for id in ids {
            if let Some(group) = self.group_of(*id)
                && !involved.contains(&group)
            {
                involved.push(group);
            }
        }
        if involved.len() < 2 {
            warn!(
                event = "core.host.join_skipped",
                instances = ids.len(),
                groups = involved.len()
            );
            return false;
        }

        let target = involved[0];
        let previous = self.active_instance();
        for id in ids {
            let Some((gi, pi)) = self.locate(*id) else {
                continue;
            };
            if self.groups[gi].id == target {
                continue;
            }
            let pane = self.remove_pane(gi, pi);
            if let Some(ti) = self.group_index(target) {
                self.groups[ti].panes.push(pane);
            }
        }
        if let Some(ti) = self.group_index(target) {
            self.groups[ti].rebalance();
        }
        self.active_group = Some(target);
        debug!(event = "core.host.groups_joined", group_id = %target, groups = involved.len());

        self.notify_layout_changed();
        self.refresh_active(previous, false);
        true
    }

    /// Fires `InstancesChanged` and `ActiveGroupChanged` unconditionally.
    pub fn notify_layout_changed(&self) {
        self.events.emit(HostEvent::InstancesChanged);
        self.events.emit(HostEvent::ActiveGroupChanged(self.active_group));
    }

    /// Tabs of persistable panes, in order. Tabs with none are omitted.
    pub fn layout_snapshot(&self) -> LayoutSnapshot {
        let tabs = self
            .groups
            .iter()
            .filter_map(|group| {
                let terminals: Vec<PaneLayout> = group
                    .panes
                    .iter()
                    .filter(|p| p.instance.should_persist())
                    .map(|p| PaneLayout {
                        terminal: p.instance.layout_details(),
                        relative_size: p.relative_size,
                    })
                    .collect();
                if terminals.is_empty() {
                    return None;
                }
                let active_persistent_process_id = group
                    .active
                    .and_then(|id| group.index_of(id))
                    .and_then(|pi| group.panes[pi].instance.persistent_process_id());
                Some(TabLayout {
                    terminals,
                    is_active: self.active_group == Some(group.id),
                    active_persistent_process_id,
                })
            })
            .collect();
        LayoutSnapshot { tabs }
    }
}

impl InstanceHost for GroupHost {
    fn location(&self) -> TerminalLocation {
        TerminalLocation::Panel
    }

    fn instance_ids(&self) -> Vec<InstanceId> {
        self.groups.iter().flat_map(|g| g.instance_ids()).collect()
    }

    fn get(&self, id: InstanceId) -> Option<&TerminalInstance> {
        self.locate(id)
            .map(|(gi, pi)| &self.groups[gi].panes[pi].instance)
    }

    fn get_mut(&mut self, id: InstanceId) -> Option<&mut TerminalInstance> {
        let (gi, pi) = self.locate(id)?;
        Some(&mut self.groups[gi].panes[pi].instance)
    }

    fn active_instance(&self) -> Option<InstanceId> {
        let group = self.active_group?;
        self.group(group)?.active
    }

    fn set_active_instance(&mut self, id: InstanceId) -> bool {
        let Some((gi, _)) = self.locate(id) else {
            return false;
        };
        let previous = self.active_instance();
        let group = self.groups[gi].id;
        self.groups[gi].active = Some(id);
        self.set_active_group_id(Some(group));
        self.refresh_active(previous, true);
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
        let (gi, pi) = self.locate(id)?;
        let previous = self.active_instance();
        let pane = self.remove_pane(gi, pi);

        self.events.emit(HostEvent::InstanceRemoved(id));
        self.events.emit(HostEvent::InstancesChanged);
        self.refresh_active(previous, false);
        Some(pane.instance)
    }

    fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    fn len(&self) -> usize {
        self.groups.iter().map(|g| g.len()).sum()
    }
}
