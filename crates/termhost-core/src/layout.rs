//! Layout snapshot persistence.
//!
//! [`LayoutStore`] keeps one snapshot per workspace on disk with atomic
//! writes. [`LayoutPersister`] debounces layout saves to a backend.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use termhost_paths::TermhostPaths;
use termhost_protocol::LayoutSnapshot;

use crate::backend::TerminalBackend;
use crate::errors::BackendError;

fn cleanup_temp_file(temp_file: &Path, original_error: &std::io::Error) {
    if let Err(cleanup_err) = fs::remove_file(temp_file) {
        warn!(
            event = "core.layout.temp_file_cleanup_failed",
            temp_file = %temp_file.display(),
            original_error = %original_error,
            cleanup_error = %cleanup_err
        );
    }
}

/// File-backed layout storage under `~/.termhost/layouts/`.
#[derive(Debug, Clone)]
pub struct LayoutStore {
    paths: TermhostPaths,
}

impl LayoutStore {
    pub fn new(paths: TermhostPaths) -> Self {
        Self { paths }
    }

    pub fn path(&self, workspace_id: &str) -> PathBuf {
        self.paths.layout_file(workspace_id)
    }

    /// `Ok(None)` when nothing was saved for the workspace.
    pub fn load(&self, workspace_id: &str) -> Result<Option<LayoutSnapshot>, BackendError> {
        let path = self.path(workspace_id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot = serde_json::from_str(&content)?;
        Ok(Some(snapshot))
    }

    /// Writes atomically (temp file then rename). `None` removes the file.
    pub fn save(
        &self,
        workspace_id: &str,
        layout: Option<&LayoutSnapshot>,
    ) -> Result<(), BackendError> {
        let path = self.path(workspace_id);
        let Some(layout) = layout else {
            return match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            };
        };

        fs::create_dir_all(self.paths.layouts_dir())?;
        let json = serde_json::to_string_pretty(layout)?;
        let temp_file = path.with_extension("json.tmp");

        if let Err(e) = fs::write(&temp_file, &json) {
            cleanup_temp_file(&temp_file, &e);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp_file, &path) {
            cleanup_temp_file(&temp_file, &e);
            return Err(e.into());
        }
        debug!(
            event = "core.layout.saved",
            workspace_id = workspace_id,
            tabs = layout.tabs.len()
        );
        Ok(())
    }

    /// Workspace ids with a saved layout, sorted.
    pub fn workspaces(&self) -> Result<Vec<String>, BackendError> {
        let entries = match fs::read_dir(self.paths.layouts_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Debounced writer of the current layout to a backend.
///
/// Every `schedule` replaces the pending snapshot and restarts the timer;
/// only the latest snapshot is written once the layout is quiet.
pub struct LayoutPersister {
    pending: watch::Sender<Option<LayoutSnapshot>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    backend: Arc<dyn TerminalBackend>,
    workspace_id: String,
}

impl std::fmt::Debug for LayoutPersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutPersister")
            .field("workspace_id", &self.workspace_id)
            .field("stopped", &self.cancel.is_cancelled())
            .finish()
    }
}

impl LayoutPersister {
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        backend: Arc<dyn TerminalBackend>,
        workspace_id: impl Into<String>,
        debounce: Duration,
    ) -> Self {
        let workspace_id = workspace_id.into();
        let (pending, rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_persister(
            rx,
            cancel.clone(),
            backend.clone(),
            workspace_id.clone(),
            debounce,
        ));
        info!(
            event = "core.layout.persister_started",
            workspace_id = %workspace_id,
            debounce_ms = debounce.as_millis() as u64
        );
        Self {
            pending,
            cancel,
            task: Some(task),
            backend,
            workspace_id,
        }
    }

    /// Queue a snapshot for a debounced write.
    pub fn schedule(&self, snapshot: LayoutSnapshot) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.pending.send_replace(Some(snapshot));
    }

    /// Write immediately, bypassing the debounce. `None` clears.
    pub async fn write_now(&self, snapshot: Option<LayoutSnapshot>) {
        write_layout(self.backend.as_ref(), &self.workspace_id, snapshot).await;
    }

    /// Stop the background task. Pending writes are dropped; a write already
    /// in flight is awaited, so nothing lands after the caller's next write.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        let Some(task) = self.task.take() else {
            return;
        };
        if let Err(e) = task.await
            && !e.is_cancelled()
        {
            warn!(
                event = "core.layout.persister_failed",
                workspace_id = %self.workspace_id,
                error = %e
            );
        }
        debug!(event = "core.layout.persister_stopped", workspace_id = %self.workspace_id);
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for LayoutPersister {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

async fn write_layout(backend: &dyn TerminalBackend, workspace_id: &str, snapshot: Option<LayoutSnapshot>) {
    let clearing = snapshot.is_none();
    match backend.set_layout_info(workspace_id, snapshot).await {
        Ok(()) => debug!(
            event = "core.layout.write_completed",
            workspace_id = workspace_id,
            cleared = clearing
        ),
        Err(e) => warn!(
            event = "core.layout.write_failed",
            workspace_id = workspace_id,
            error = %e
        ),
    }
}

async fn run_persister(
    mut rx: watch::Receiver<Option<LayoutSnapshot>>,
    cancel: CancellationToken,
    backend: Arc<dyn TerminalBackend>,
    workspace_id: String,
    debounce: Duration,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            changed = rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }

        // Restart the quiet period on every further change.
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(debounce) => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }

        let snapshot = rx.borrow_and_update().clone();
        if let Some(snapshot) = snapshot {
            write_layout(backend.as_ref(), &workspace_id, Some(snapshot)).await;
        }
    }
}
