//! Startup reconnection to a backend and the cross-window detach handshake.
//!
//! Reconnection runs in two phases. Phase one attaches every eligible pane
//! of the stored layout: tabs concurrently, panes within a tab in order.
//! Phase two places the attached panes into groups one at a time so group
//! topology never depends on attach timing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use termhost_protocol::{
    DetachRequest, PerformanceMark, PersistentProcessId, ProcessDetails, ProcessType,
    ShellLaunchConfig, TabLayout,
};

use crate::backend::TerminalBackend;
use crate::errors::TerminalError;
use crate::event::ServiceEvent;
use crate::host::InstanceHost;
use crate::instance::{ExitReason, InstanceEvent, InstanceId, TerminalLocation};
use crate::layout::LayoutPersister;
use crate::service::{CreateInstanceOptions, InstanceLocation, StartupKind, TerminalService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
}

/// Connection state, reconnection ownership and startup timing.
#[derive(Debug)]
pub struct ConnectionCoordinator {
    state: watch::Sender<ConnectionState>,
    owners: HashMap<String, Vec<InstanceId>>,
    restored_groups: usize,
    marks: Vec<PerformanceMark>,
}

impl Default for ConnectionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionCoordinator {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            state,
            owners: HashMap::new(),
            restored_groups: 0,
            marks: Vec::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Moves to `Connected`. Returns false if already connected; the state
    /// never goes back.
    pub fn mark_connected(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Connected {
                false
            } else {
                *state = ConnectionState::Connected;
                true
            }
        })
    }

    pub fn record_owner(&mut self, owner: &str, instance: InstanceId) {
        let owned = self.owners.entry(owner.to_string()).or_default();
        if !owned.contains(&instance) {
            owned.push(instance);
        }
    }

    pub fn owned_by(&self, owner: &str) -> &[InstanceId] {
        self.owners.get(owner).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn ownership(&self) -> &HashMap<String, Vec<InstanceId>> {
        &self.owners
    }

    pub fn restored_group_count(&self) -> usize {
        self.restored_groups
    }

    pub fn mark(&mut self, name: &str) {
        let now = chrono::Utc::now().timestamp_millis() as f64;
        self.marks.push(PerformanceMark::new(name, now));
    }

    pub fn performance_marks(&self) -> &[PerformanceMark] {
        &self.marks
    }
}

struct AttachedPane {
    /// Details as stored in the layout, carrying presentation and ownership.
    stored: ProcessDetails,
    attached: ProcessDetails,
    relative_size: f64,
}

struct AttachedTab {
    panes: Vec<AttachedPane>,
    is_active: bool,
    active: Option<PersistentProcessId>,
    skipped: usize,
}

fn is_reconnectable(details: &ProcessDetails, is_reload: bool) -> bool {
    if !details.is_orphan {
        return false;
    }
    // Tasks are re-run by their owner unless the window only reloaded.
    is_reload || details.process_type != Some(ProcessType::Task)
}

async fn attach_tab(backend: Arc<dyn TerminalBackend>, tab: TabLayout, is_reload: bool) -> AttachedTab {
    let mut panes = Vec::with_capacity(tab.terminals.len());
    let mut skipped = 0;
    for pane in tab.terminals {
        let Some(stored) = pane.terminal else {
            skipped += 1;
            continue;
        };
        if !is_reconnectable(&stored, is_reload) {
            debug!(
                event = "core.connection.pane_skipped",
                persistent_process_id = %stored.id,
                is_orphan = stored.is_orphan
            );
            skipped += 1;
            continue;
        }
        match backend.attach_to_process(stored.id).await {
            Ok(attached) => panes.push(AttachedPane {
                stored,
                attached,
                relative_size: pane.relative_size,
            }),
            Err(e) => {
                warn!(
                    event = "core.connection.attach_failed",
                    persistent_process_id = %stored.id,
                    error = %e
                );
                skipped += 1;
            }
        }
    }
    AttachedTab {
        panes,
        is_active: tab.is_active,
        active: tab.active_persistent_process_id,
        skipped,
    }
}

fn normalized(sizes: &[f64]) -> Vec<f64> {
    let total: f64 = sizes.iter().sum();
    if total <= 0.0 {
        let equal = 1.0 / sizes.len() as f64;
        return vec![equal; sizes.len()];
    }
    sizes.iter().map(|s| s / total).collect()
}

impl TerminalService {
    /// Connects to the primary backend and restores the stored layout.
    ///
    /// Backend failures are logged and never surfaced; the service always
    /// ends up `Connected`. Returns the reconnected instances in layout order.
    /// Calling again once connected does nothing.
    pub async fn initialize(&mut self) -> Vec<InstanceId> {
        if self.connection.state() == ConnectionState::Connected {
            debug!(event = "core.connection.already_connected");
            return Vec::new();
        }

        let authority = self.env.remote_authority.clone();
        info!(
            event = "core.connection.initialize_started",
            remote_authority = authority.as_deref().unwrap_or("local"),
            workspace_id = %self.env.workspace_id
        );

        let Some(backend) = self.backends.get(authority.as_deref()) else {
            warn!(
                event = "core.connection.backend_unavailable",
                remote_authority = authority.as_deref().unwrap_or("local")
            );
            self.finish_connecting().await;
            return Vec::new();
        };
        self.primary_backend = Some(backend.clone());

        let persistence = self.persistence_enabled();
        let reconnected = if persistence {
            let ids = self.reconnect_from_layout(backend.clone()).await;
            self.replay_reconnected(backend.as_ref(), &ids).await;
            ids
        } else {
            if let Err(e) = backend.set_layout_info(&self.env.workspace_id, None).await {
                warn!(event = "core.connection.layout_clear_failed", error = %e);
            }
            Vec::new()
        };

        self.finish_connecting().await;

        if persistence {
            let debounce = Duration::from_millis(self.config.persistence.layout_save_debounce_ms());
            self.layout_persister = Some(LayoutPersister::spawn(
                backend,
                self.env.workspace_id.clone(),
                debounce,
            ));
            self.schedule_layout_save();
        }

        info!(
            event = "core.connection.initialize_completed",
            reconnected = reconnected.len(),
            groups = self.connection.restored_group_count()
        );
        reconnected
    }

    /// Persistence switch for the kind of window this is.
    pub(crate) fn persistence_enabled(&self) -> bool {
        let persistence = &self.config.persistence;
        match self.env.remote_authority {
            Some(_) => persistence.enable_remote_persistence(),
            None => persistence.enable_persistent_sessions(),
        }
    }

    async fn reconnect_from_layout(&mut self, backend: Arc<dyn TerminalBackend>) -> Vec<InstanceId> {
        self.connection.mark("code/terminal/willGetTerminalLayoutInfo");
        let layout = match backend.get_layout_info(&self.env.workspace_id).await {
            Ok(Some(layout)) => layout,
            Ok(None) => {
                debug!(event = "core.connection.no_stored_layout");
                return Vec::new();
            }
            Err(e) => {
                warn!(event = "core.connection.layout_fetch_failed", error = %e);
                return Vec::new();
            }
        };
        if let Err(e) = backend.reduce_connection_grace_time().await {
            warn!(event = "core.connection.grace_time_failed", error = %e);
        }
        self.connection.mark("code/terminal/didGetTerminalLayoutInfo");

        let is_reload = self.env.startup_kind == StartupKind::Reload;
        let tabs = join_all(
            layout
                .tabs
                .into_iter()
                .map(|tab| attach_tab(backend.clone(), tab, is_reload)),
        )
        .await;

        let authority = backend.remote_authority().map(str::to_string);
        let mut reconnected = Vec::new();
        for tab in tabs {
            reconnected.extend(self.restore_tab(authority.clone(), tab));
        }
        reconnected
    }

    fn restore_tab(&mut self, authority: Option<String>, tab: AttachedTab) -> Vec<InstanceId> {
        let mut group = None;
        let mut previous: Option<InstanceId> = None;
        let mut ids = Vec::with_capacity(tab.panes.len());
        let mut sizes = Vec::with_capacity(tab.panes.len());

        for pane in tab.panes {
            let mut instance =
                self.allocate_instance(ShellLaunchConfig::attach(pane.stored), TerminalLocation::Panel);
            instance.set_backend_authority(authority.clone());
            instance.set_process_ready(pane.attached);
            self.register_owner(&instance);

            let id = instance.id();
            group = Some(match previous {
                None => self.group_host.create_group(instance),
                Some(parent) => self.group_host.split(parent, instance),
            });
            previous = Some(id);
            ids.push(id);
            sizes.push(pane.relative_size);
            self.events.emit(ServiceEvent::InstanceCreated(id));
        }

        let Some(group) = group else {
            return ids;
        };
        self.connection.restored_groups += 1;

        let sizes = if tab.skipped > 0 { normalized(&sizes) } else { sizes };
        self.group_host.resize_panes(group, &sizes);

        let active = tab
            .active
            .and_then(|handle| {
                ids.iter()
                    .copied()
                    .find(|id| self.group_host.get(*id).and_then(|i| i.persistent_process_id()) == Some(handle))
            })
            .or_else(|| ids.first().copied());
        if let Some(active) = active {
            if tab.is_active {
                self.group_host.set_active_instance(active);
            } else {
                self.group_host.set_group_active_pane(group, active);
            }
        }

        debug!(
            event = "core.connection.tab_restored",
            group_id = %group,
            panes = ids.len(),
            skipped = tab.skipped
        );
        ids
    }

    async fn replay_reconnected(&mut self, backend: &dyn TerminalBackend, ids: &[InstanceId]) {
        let targets: Vec<(InstanceId, PersistentProcessId)> = ids
            .iter()
            .filter_map(|id| {
                let handle = self.instance(*id)?.persistent_process_id()?;
                Some((*id, handle))
            })
            .collect();

        let replays = join_all(targets.iter().map(|(_, handle)| backend.replay_process(*handle))).await;

        for ((id, handle), replay) in targets.into_iter().zip(replays) {
            match replay {
                Ok(replay) => {
                    if let Some(instance) = self.instance_mut(id) {
                        instance.apply_replay(&replay);
                    }
                }
                Err(e) => warn!(
                    event = "core.connection.replay_failed",
                    instance_id = %id,
                    persistent_process_id = %handle,
                    error = %e
                ),
            }
        }
    }

    async fn finish_connecting(&mut self) {
        let backends = self.backends.all();
        join_all(backends.iter().map(|b| b.when_ready())).await;
        let marks = join_all(backends.iter().map(|b| b.performance_marks())).await;
        self.connection.marks.extend(marks.into_iter().flatten());

        if self.connection.mark_connected() {
            self.events
                .emit(ServiceEvent::ConnectionStateChanged(ConnectionState::Connected));
        }
    }

    pub fn performance_marks(&self) -> &[PerformanceMark] {
        self.connection.performance_marks()
    }

    pub fn restored_group_count(&self) -> usize {
        self.connection.restored_group_count()
    }

    pub(crate) fn primary(&self) -> Option<Arc<dyn TerminalBackend>> {
        self.primary_backend
            .clone()
            .or_else(|| self.backends.get(self.env.remote_authority.as_deref()))
    }

    /// Answers another window asking for one of this window's instances.
    ///
    /// Honored only for an instance of this workspace with a live persistent
    /// process that is neither a feature terminal nor custom. The instance is
    /// detached and disposed, and its handle sent back. Returns whether the
    /// request was honored.
    pub async fn handle_detach_request(&mut self, request: DetachRequest) -> bool {
        let Some(backend) = self.primary() else {
            warn!(event = "core.connection.detach_no_backend", request_id = request.request_id);
            return false;
        };

        let id = InstanceId(request.instance_id);
        let eligible = request.workspace_id == self.env.workspace_id
            && self.instance(id).is_some_and(|i| {
                i.persistent_process_id().is_some()
                    && !i.launch().is_feature_terminal
                    && !i.launch().is_custom_process()
            });

        let handle = match eligible.then(|| self.take_instance(id)).flatten() {
            Some(mut instance) => {
                self.multiplexer.retire(
                    id,
                    &[InstanceEvent::Disposed {
                        instance: id,
                        reason: ExitReason::Detached,
                    }],
                );
                let handle = instance.detach_process_and_dispose();
                if let Some(handle) = handle
                    && let Some(owner) = self.backends.get(instance.backend_authority())
                    && let Err(e) = owner.detach_from_process(handle, true).await
                {
                    warn!(
                        event = "core.connection.detach_failed",
                        instance_id = %id,
                        error = %e
                    );
                }
                self.events.emit(ServiceEvent::InstanceDetached(id));
                self.schedule_layout_save();
                handle
            }
            None => {
                debug!(
                    event = "core.connection.detach_declined",
                    request_id = request.request_id,
                    instance_id = %id
                );
                None
            }
        };

        if let Err(e) = backend
            .accept_detach_instance_reply(request.request_id, handle)
            .await
        {
            warn!(
                event = "core.connection.detach_reply_failed",
                request_id = request.request_id,
                error = %e
            );
        }
        info!(
            event = "core.connection.detach_handled",
            request_id = request.request_id,
            honored = handle.is_some()
        );
        handle.is_some()
    }

    /// Pulls an instance over from another window of `workspace_id`.
    ///
    /// `Ok(None)` when the other window declined or could not be reached,
    /// or no backend serves this window.
    pub async fn attach_from_other_window(
        &mut self,
        workspace_id: &str,
        instance_id: u32,
        location: Option<InstanceLocation>,
    ) -> Result<Option<InstanceId>, TerminalError> {
        let Some(backend) = self.primary() else {
            if !self.has_process_support() {
                return Err(TerminalError::ProcessSupportNotRegistered);
            }
            warn!(
                event = "core.connection.attach_skipped",
                reason = "backend_unavailable",
                instance_id = instance_id
            );
            return Ok(None);
        };
        let details = match backend.request_detach_instance(workspace_id, instance_id).await {
            Ok(Some(details)) => details,
            Ok(None) => {
                info!(event = "core.connection.detach_refused", instance_id = instance_id);
                return Ok(None);
            }
            Err(e) => {
                warn!(event = "core.connection.detach_request_failed", error = %e);
                return Ok(None);
            }
        };

        let mut options = CreateInstanceOptions::shell(ShellLaunchConfig::attach(details));
        options.location = location;
        self.create_instance(options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_connected_is_monotonic() {
        let coordinator = ConnectionCoordinator::new();
        let mut rx = coordinator.subscribe();
        assert_eq!(coordinator.state(), ConnectionState::Connecting);
        assert!(coordinator.mark_connected());
        assert!(!coordinator.mark_connected());
        assert_eq!(*rx.borrow_and_update(), ConnectionState::Connected);
    }

    #[test]
    fn test_owner_map_deduplicates() {
        let mut coordinator = ConnectionCoordinator::new();
        coordinator.record_owner("tasks", InstanceId(1));
        coordinator.record_owner("tasks", InstanceId(1));
        coordinator.record_owner("tasks", InstanceId(2));
        assert_eq!(coordinator.owned_by("tasks"), &[InstanceId(1), InstanceId(2)]);
        assert!(coordinator.owned_by("debug").is_empty());
    }

    #[test]
    fn test_reconnectable_filter() {
        let orphan = ProcessDetails {
            is_orphan: true,
            ..ProcessDetails::default()
        };
        let task = ProcessDetails {
            process_type: Some(ProcessType::Task),
            ..orphan.clone()
        };
        assert!(is_reconnectable(&orphan, false));
        assert!(!is_reconnectable(&ProcessDetails::default(), true));
        assert!(!is_reconnectable(&task, false));
        assert!(is_reconnectable(&task, true));
    }

    #[test]
    fn test_normalized_sizes() {
        assert_eq!(normalized(&[0.25, 0.25]), vec![0.5, 0.5]);
        assert_eq!(normalized(&[0.0, 0.0]), vec![0.5, 0.5]);
    }

    #[test]
    fn test_marks_are_timestamped() {
        let mut coordinator = ConnectionCoordinator::new();
        coordinator.mark("code/terminal/willGetTerminalLayoutInfo");
        let marks = coordinator.performance_marks();
        assert_eq!(marks.len(), 1);
        assert!(marks[0].start_time > 0.0);
    }
}
