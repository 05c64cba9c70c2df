//! The seam to the process host that spawns and keeps terminal processes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use termhost_protocol::{
    Cwd, Dimensions, LayoutSnapshot, PerformanceMark, PersistentProcessId,
    ProcessDetails, ReplayEvent, ShellLaunchConfig,
};

use crate::errors::BackendError;

/// Everything a backend needs to spawn a fresh process.
#[derive(Debug, Clone)]
pub struct SpawnRequest<'a> {
    pub launch: &'a ShellLaunchConfig,
    pub cwd: Option<&'a Cwd>,
    pub workspace_id: &'a str,
    pub dimensions: Option<Dimensions>,
}

/// A (possibly remote) process host.
///
/// Implementations own the actual PTYs. The service only talks to them
/// through this trait.
#[async_trait]
pub trait TerminalBackend: Send + Sync {
    /// `None` for the local backend.
    fn remote_authority(&self) -> Option<&str>;

    /// Resolves once the backend can serve requests.
    async fn when_ready(&self);

    async fn spawn_process(&self, request: SpawnRequest<'_>) -> Result<ProcessDetails, BackendError>;

    async fn attach_to_process(
        &self,
        id: PersistentProcessId,
    ) -> Result<ProcessDetails, BackendError>;

    /// Buffered output recorded while no window was attached.
    async fn replay_process(&self, id: PersistentProcessId) -> Result<ReplayEvent, BackendError>;

    /// Stop listening to the process without killing it.
    async fn detach_from_process(
        &self,
        id: PersistentProcessId,
        force_persist: bool,
    ) -> Result<(), BackendError>;

    async fn shutdown_process(
        &self,
        id: PersistentProcessId,
        immediate: bool,
    ) -> Result<(), BackendError>;

    async fn get_layout_info(
        &self,
        workspace_id: &str,
    ) -> Result<Option<LayoutSnapshot>, BackendError>;

    /// `None` clears the stored layout.
    async fn set_layout_info(
        &self,
        workspace_id: &str,
        layout: Option<LayoutSnapshot>,
    ) -> Result<(), BackendError>;

    /// Flush buffered terminal state so it survives a restart.
    async fn persist_terminal_state(&self) -> Result<(), BackendError>;

    /// Ask the window owning `instance_id` in `workspace_id` to hand it over.
    async fn request_detach_instance(
        &self,
        workspace_id: &str,
        instance_id: u32,
    ) -> Result<Option<ProcessDetails>, BackendError>;

    async fn accept_detach_instance_reply(
        &self,
        request_id: u64,
        handle: Option<PersistentProcessId>,
    ) -> Result<(), BackendError>;

    /// Orphaned processes are about to be reclaimed; shorten their grace period.
    async fn reduce_connection_grace_time(&self) -> Result<(), BackendError>;

    async fn performance_marks(&self) -> Vec<PerformanceMark>;
}

/// Registered backends, keyed by remote authority (`None` = local).
///
/// Registering any backend registers process support.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    backends: HashMap<Option<String>, Arc<dyn TerminalBackend>>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("authorities", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the backend previously registered for the same authority, if any.
    pub fn register(&mut self, backend: Arc<dyn TerminalBackend>) -> Option<Arc<dyn TerminalBackend>> {
        let authority = backend.remote_authority().map(str::to_string);
        info!(
            event = "core.backend.registered",
            authority = authority.as_deref().unwrap_or("local")
        );
        self.backends.insert(authority, backend)
    }

    pub fn has_process_support(&self) -> bool {
        !self.backends.is_empty()
    }

    pub fn get(&self, authority: Option<&str>) -> Option<Arc<dyn TerminalBackend>> {
        self.backends.get(&authority.map(str::to_string)).cloned()
    }

    pub fn local(&self) -> Option<Arc<dyn TerminalBackend>> {
        self.get(None)
    }

    pub fn all(&self) -> Vec<Arc<dyn TerminalBackend>> {
        self.backends.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub(Option<&'static str>);

    #[async_trait]
    impl TerminalBackend for Stub {
        fn remote_authority(&self) -> Option<&str> {
            self.0
        }
        async fn when_ready(&self) {}
        async fn spawn_process(
            &self,
            _request: SpawnRequest<'_>,
        ) -> Result<ProcessDetails, BackendError> {
            Err(BackendError::RequestFailed("stub".into()))
        }
        async fn attach_to_process(
            &self,
            id: PersistentProcessId,
        ) -> Result<ProcessDetails, BackendError> {
            Err(BackendError::ProcessNotFound(id.0))
        }
        async fn replay_process(
            &self,
            _id: PersistentProcessId,
        ) -> Result<ReplayEvent, BackendError> {
            Ok(ReplayEvent::default())
        }
        async fn detach_from_process(
            &self,
            _id: PersistentProcessId,
            _force_persist: bool,
        ) -> Result<(), BackendError> {
            Ok(())
        }
        async fn shutdown_process(
            &self,
            _id: PersistentProcessId,
            _immediate: bool,
        ) -> Result<(), BackendError> {
            Ok(())
        }
        async fn get_layout_info(
            &self,
            _workspace_id: &str,
        ) -> Result<Option<LayoutSnapshot>, BackendError> {
            Ok(None)
        }
        async fn set_layout_info(
            &self,
            _workspace_id: &str,
            _layout: Option<LayoutSnapshot>,
        ) -> Result<(), BackendError> {
            Ok(())
        }
        async fn persist_terminal_state(&self) -> Result<(), BackendError> {
            Ok(())
        }
        async fn request_detach_instance(
            &self,
            _workspace_id: &str,
            _instance_id: u32,
        ) -> Result<Option<ProcessDetails>, BackendError> {
            Ok(None)
        }
        async fn accept_detach_instance_reply(
            &self,
            _request_id: u64,
            _handle: Option<PersistentProcessId>,
        ) -> Result<(), BackendError> {
            Ok(())
        }
        async fn reduce_connection_grace_time(&self) -> Result<(), BackendError> {
            Ok(())
        }
        async fn performance_marks(&self) -> Vec<PerformanceMark> {
            Vec::new()
        }
    }

    #[test]
    fn test_registering_enables_process_support() {
        let mut registry = BackendRegistry::new();
        assert!(!registry.has_process_support());
        assert!(registry.register(Arc::new(Stub(None))).is_none());
        assert!(registry.has_process_support());
        assert!(registry.local().is_some());
    }

    #[test]
    fn test_lookup_by_authority() {
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(Stub(Some("ssh-remote+box"))));
        assert!(registry.get(Some("ssh-remote+box")).is_some());
        assert!(registry.get(Some("wsl+ubuntu")).is_none());
        assert!(registry.local().is_none());
        assert!(registry.register(Arc::new(Stub(Some("ssh-remote+box")))).is_some());
        assert_eq!(registry.len(), 1);
    }
}
