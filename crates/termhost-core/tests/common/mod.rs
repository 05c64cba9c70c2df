//! In-memory backend shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use termhost_config::TermhostConfig;
use termhost_core::{BackendError, HostEnvironment, SpawnRequest, TerminalBackend, TerminalService};
use termhost_protocol::{
    LayoutSnapshot, PaneLayout, PerformanceMark, PersistentProcessId, ProcessDetails, ReplayEntry,
    ReplayEvent, TabLayout,
};

#[derive(Debug, Default)]
pub struct FakeState {
    pub layout: Option<LayoutSnapshot>,
    pub layout_writes: Vec<Option<LayoutSnapshot>>,
    pub spawned: Vec<PersistentProcessId>,
    pub attached: Vec<PersistentProcessId>,
    pub replayed: Vec<PersistentProcessId>,
    pub detached: Vec<(PersistentProcessId, bool)>,
    pub shut_down: Vec<PersistentProcessId>,
    pub replies: Vec<(u64, Option<PersistentProcessId>)>,
    pub persist_calls: usize,
    pub grace_reduced: usize,
    pub fail_spawn: bool,
    /// Handles whose attach fails.
    pub missing: Vec<PersistentProcessId>,
    /// What another window hands over on a detach request.
    pub detach_offer: Option<ProcessDetails>,
    pub persist_delay: Option<Duration>,
    /// Delays applied to successive layout writes before they land.
    pub layout_write_delays: VecDeque<Duration>,
    next_id: u32,
}

pub struct FakeBackend {
    authority: Option<String>,
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn local() -> Arc<Self> {
        Arc::new(Self::with_authority(None))
    }

    pub fn remote(authority: &str) -> Arc<Self> {
        Arc::new(Self::with_authority(Some(authority.to_string())))
    }

    pub fn with_layout(layout: LayoutSnapshot) -> Arc<Self> {
        let backend = Self::with_authority(None);
        backend.state().layout = Some(layout);
        Arc::new(backend)
    }

    fn with_authority(authority: Option<String>) -> Self {
        Self {
            authority,
            state: Mutex::new(FakeState {
                next_id: 100,
                ..FakeState::default()
            }),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl TerminalBackend for FakeBackend {
    fn remote_authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    async fn when_ready(&self) {}

    async fn spawn_process(&self, request: SpawnRequest<'_>) -> Result<ProcessDetails, BackendError> {
        let mut state = self.state();
        if state.fail_spawn {
            return Err(BackendError::RequestFailed("spawn refused".into()));
        }
        state.next_id += 1;
        let id = PersistentProcessId(state.next_id);
        state.spawned.push(id);
        Ok(ProcessDetails {
            id,
            pid: 4000 + id.0,
            cwd: request.cwd.map(|c| c.path_string()).unwrap_or_default(),
            workspace_id: request.workspace_id.to_string(),
            reconnection_properties: request.launch.reconnection_properties.clone(),
            ..ProcessDetails::default()
        })
    }

    async fn attach_to_process(&self, id: PersistentProcessId) -> Result<ProcessDetails, BackendError> {
        let mut state = self.state();
        if state.missing.contains(&id) {
            return Err(BackendError::ProcessNotFound(id.0));
        }
        state.attached.push(id);
        Ok(ProcessDetails {
            id,
            pid: 4000 + id.0,
            ..ProcessDetails::default()
        })
    }

    async fn replay_process(&self, id: PersistentProcessId) -> Result<ReplayEvent, BackendError> {
        self.state().replayed.push(id);
        Ok(ReplayEvent {
            events: vec![ReplayEntry {
                cols: 120,
                rows: 30,
                data: "$ ".into(),
            }],
        })
    }

    async fn detach_from_process(
        &self,
        id: PersistentProcessId,
        force_persist: bool,
    ) -> Result<(), BackendError> {
        self.state().detached.push((id, force_persist));
        Ok(())
    }

    async fn shutdown_process(
        &self,
        id: PersistentProcessId,
        _immediate: bool,
    ) -> Result<(), BackendError> {
        self.state().shut_down.push(id);
        Ok(())
    }

    async fn get_layout_info(&self, _workspace_id: &str) -> Result<Option<LayoutSnapshot>, BackendError> {
        Ok(self.state().layout.clone())
    }

    async fn set_layout_info(
        &self,
        _workspace_id: &str,
        layout: Option<LayoutSnapshot>,
    ) -> Result<(), BackendError> {
        let delay = self.state().layout_write_delays.pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        state.layout = layout.clone();
        state.layout_writes.push(layout);
        Ok(())
    }

    async fn persist_terminal_state(&self) -> Result<(), BackendError> {
        let delay = {
            let mut state = self.state();
            state.persist_calls += 1;
            state.persist_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn request_detach_instance(
        &self,
        _workspace_id: &str,
        _instance_id: u32,
    ) -> Result<Option<ProcessDetails>, BackendError> {
        Ok(self.state().detach_offer.clone())
    }

    async fn accept_detach_instance_reply(
        &self,
        request_id: u64,
        handle: Option<PersistentProcessId>,
    ) -> Result<(), BackendError> {
        self.state().replies.push((request_id, handle));
        Ok(())
    }

    async fn reduce_connection_grace_time(&self) -> Result<(), BackendError> {
        self.state().grace_reduced += 1;
        Ok(())
    }

    async fn performance_marks(&self) -> Vec<PerformanceMark> {
        vec![PerformanceMark::new("fake/ready", 1.0)]
    }
}

pub fn env(workspace_id: &str) -> HostEnvironment {
    HostEnvironment {
        workspace_id: workspace_id.to_string(),
        ..HostEnvironment::default()
    }
}

/// A service with `backend` registered and the profiles gate open.
pub fn service_with(config: TermhostConfig, backend: Arc<FakeBackend>) -> TerminalService {
    let mut service = TerminalService::new(config, env("ws"));
    service.register_backend(backend);
    service.profiles_ready().open();
    service
}

pub fn orphan(id: u32) -> ProcessDetails {
    ProcessDetails {
        id: PersistentProcessId(id),
        is_orphan: true,
        ..ProcessDetails::default()
    }
}

pub fn pane(id: u32, relative_size: f64) -> PaneLayout {
    PaneLayout {
        terminal: Some(orphan(id)),
        relative_size,
    }
}

pub fn tab(terminals: Vec<PaneLayout>, is_active: bool, active: Option<u32>) -> TabLayout {
    TabLayout {
        terminals,
        is_active,
        active_persistent_process_id: active.map(PersistentProcessId),
    }
}
