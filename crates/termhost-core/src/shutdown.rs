//! Two-phase shutdown: a vetoable `before` phase that decides whether
//! processes survive, then a `will` phase that detaches or kills them and
//! writes the final layout.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use termhost_config::{ConfirmOnExit, PersistenceSettings, ReviveProcess};

use crate::event::ServiceEvent;
use crate::instance::{ExitReason, InstanceEvent};
use crate::service::TerminalService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// A window is closing.
    Close,
    Quit,
    Reload,
    /// The window is switching to another workspace.
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownRequest {
    pub reason: ShutdownReason,
    /// Open windows, including the one shutting down.
    pub window_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownVerdict {
    Proceed { revive_processes: bool },
    Veto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitChoice {
    Exit,
    DontExit,
    Dismissed,
}

/// Asks the user whether to close running terminals.
#[async_trait]
pub trait ExitPrompt: Send + Sync {
    async fn confirm_exit(&self, instance_count: usize) -> ExitChoice;
}

/// Shutdown flags. `is_shutting_down` only ever goes from false to true.
#[derive(Debug, Default)]
pub(crate) struct ShutdownState {
    is_shutting_down: bool,
    revive_processes: Option<bool>,
}

impl ShutdownState {
    pub(crate) fn is_shutting_down(&self) -> bool {
        self.is_shutting_down
    }

    /// Returns true on the first call only.
    fn mark(&mut self) -> bool {
        !std::mem::replace(&mut self.is_shutting_down, true)
    }
}

/// Whether processes should outlive this window.
pub fn should_revive_processes(
    settings: &PersistenceSettings,
    reason: ShutdownReason,
    window_count: usize,
    close_hides_window: bool,
) -> bool {
    if !settings.enable_persistent_sessions() {
        return false;
    }
    match settings.revive_process() {
        ReviveProcess::OnExit => match reason {
            ShutdownReason::Close => window_count == 1 && !close_hides_window,
            ShutdownReason::Quit | ShutdownReason::Reload | ShutdownReason::Load => true,
        },
        ReviveProcess::OnExitAndWindowClose => reason != ShutdownReason::Reload,
        ReviveProcess::Never => false,
    }
}

pub fn needs_exit_confirmation(
    policy: ConfirmOnExit,
    foreground_instances: usize,
    with_child_processes: usize,
) -> bool {
    match policy {
        ConfirmOnExit::Never => false,
        ConfirmOnExit::Always => foreground_instances > 0,
        ConfirmOnExit::HasChildProcesses => with_child_processes > 0,
    }
}

impl TerminalService {
    /// First shutdown phase. May be vetoed by the exit prompt.
    ///
    /// A veto leaves the service fully usable.
    pub async fn on_before_shutdown(&mut self, request: ShutdownRequest) -> ShutdownVerdict {
        info!(
            event = "core.shutdown.before_started",
            reason = ?request.reason,
            window_count = request.window_count,
            instances = self.instance_count()
        );

        if self.env.is_web || self.instance_count() == 0 {
            return self.proceed(false);
        }

        let revive = should_revive_processes(
            &self.config.persistence,
            request.reason,
            request.window_count,
            self.env.close_hides_window,
        );

        if revive {
            self.persist_buffer_state().await;
        } else {
            let foreground = self.foreground_instances();
            let with_children = foreground
                .iter()
                .filter(|id| self.instance(**id).is_some_and(|i| i.has_child_processes()))
                .count();
            let policy = self.config.terminal.confirm_on_exit();
            if needs_exit_confirmation(policy, foreground.len(), with_children)
                && let Some(prompt) = self.exit_prompt.clone()
            {
                let choice = prompt.confirm_exit(foreground.len()).await;
                debug!(event = "core.shutdown.exit_prompted", choice = ?choice);
                if choice == ExitChoice::DontExit {
                    info!(event = "core.shutdown.vetoed", instances = foreground.len());
                    return ShutdownVerdict::Veto;
                }
            }
        }

        self.proceed(revive)
    }

    fn proceed(&mut self, revive: bool) -> ShutdownVerdict {
        self.shutdown.revive_processes = Some(revive);
        if self.shutdown.mark() {
            info!(event = "core.shutdown.before_completed", revive_processes = revive);
        }
        ShutdownVerdict::Proceed {
            revive_processes: revive,
        }
    }

    async fn persist_buffer_state(&self) {
        let Some(backend) = self.primary() else {
            return;
        };
        let limit = Duration::from_millis(self.config.persistence.buffer_persist_timeout_ms());
        match tokio::time::timeout(limit, backend.persist_terminal_state()).await {
            Ok(Ok(())) => debug!(event = "core.shutdown.state_persisted"),
            Ok(Err(e)) => warn!(event = "core.shutdown.state_persist_failed", error = %e),
            Err(_) => warn!(
                event = "core.shutdown.state_persist_timeout",
                timeout_ms = limit.as_millis() as u64
            ),
        }
    }

    /// Second shutdown phase. Cannot be vetoed.
    ///
    /// Persistable instances are detached when processes survive this
    /// shutdown; everything else is disposed with its process killed. The
    /// layout is written when persisting and cleared otherwise.
    pub async fn on_will_shutdown(&mut self, reason: ShutdownReason) {
        self.shutdown.mark();
        let revive = match self.shutdown.revive_processes {
            Some(revive) => revive,
            None => should_revive_processes(
                &self.config.persistence,
                reason,
                1,
                self.env.close_hides_window,
            ),
        };
        let persist =
            !self.env.is_web && self.persistence_enabled() && (revive || reason == ShutdownReason::Reload);

        info!(
            event = "core.shutdown.will_started",
            reason = ?reason,
            persist = persist,
            instances = self.instance_count()
        );

        let snapshot = persist.then(|| self.layout_snapshot());
        if let Some(persister) = self.layout_persister.as_mut() {
            persister.stop().await;
        }

        let mut detached = 0;
        let mut disposed = 0;
        for id in self.instances() {
            let Some(mut instance) = self.take_instance(id) else {
                continue;
            };
            if persist && instance.should_persist() {
                self.multiplexer.retire(
                    id,
                    &[InstanceEvent::Disposed {
                        instance: id,
                        reason: ExitReason::Detached,
                    }],
                );
                let handle = instance.detach_process_and_dispose();
                if let Some(handle) = handle
                    && let Some(backend) = self.backends.get(instance.backend_authority())
                    && let Err(e) = backend.detach_from_process(handle, true).await
                {
                    warn!(
                        event = "core.shutdown.detach_failed",
                        instance_id = %id,
                        error = %e
                    );
                }
                self.events.emit(ServiceEvent::InstanceDetached(id));
                detached += 1;
            } else {
                self.finish_disposal(instance, ExitReason::Shutdown, true).await;
                disposed += 1;
            }
        }

        match &self.layout_persister {
            Some(persister) => persister.write_now(snapshot).await,
            None => {
                if let Some(backend) = self.primary()
                    && let Err(e) = backend.set_layout_info(&self.env.workspace_id, snapshot).await
                {
                    warn!(event = "core.shutdown.layout_write_failed", error = %e);
                }
            }
        }

        info!(
            event = "core.shutdown.will_completed",
            detached = detached,
            disposed = disposed
        );
    }
}
