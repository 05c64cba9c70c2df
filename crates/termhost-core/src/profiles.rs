//! Contributed terminal profiles and the profiles-ready gate.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{error, info};

use termhost_protocol::{Cwd, ShellLaunchConfig};

use crate::instance::TerminalLocation;

/// A profile resolved by an external provider rather than spawned generically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContributedProfile {
    pub extension_identifier: String,
    pub profile_id: String,
}

impl ContributedProfile {
    pub fn new(extension_identifier: impl Into<String>, profile_id: impl Into<String>) -> Self {
        Self {
            extension_identifier: extension_identifier.into(),
            profile_id: profile_id.into(),
        }
    }

    /// Activation event the owning extension listens for.
    pub fn activation_event(&self) -> String {
        format!("onTerminalProfile:{}", self.profile_id)
    }
}

/// What the provider is told about the terminal it is asked to create.
#[derive(Debug, Clone, PartialEq)]
pub struct ContributedProfileOptions {
    pub location: TerminalLocation,
    pub cwd: Option<Cwd>,
    pub icon: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("activation failed: {0}")]
    Activation(String),

    #[error("profile creation failed: {0}")]
    Creation(String),
}

#[async_trait]
pub trait ContributedProfileProvider: Send + Sync {
    async fn activate(&self, activation_event: &str) -> Result<(), ProfileError>;

    /// Returns the launch descriptor the provider wants registered.
    async fn create_contributed_terminal_profile(
        &self,
        options: &ContributedProfileOptions,
    ) -> Result<ShellLaunchConfig, ProfileError>;
}

type Providers = HashMap<ContributedProfile, Arc<dyn ContributedProfileProvider>>;

/// Providers keyed by `(extension_identifier, profile_id)`.
///
/// Clones share one table, so the profile collaborator can register
/// providers while a creation waits on the [`ReadyGate`].
#[derive(Default, Clone)]
pub struct ProfileRegistry {
    providers: Arc<RwLock<Providers>>,
}

impl std::fmt::Debug for ProfileRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileRegistry")
            .field("profiles", &self.read().keys().cloned().collect::<Vec<_>>())
            .finish()
    }
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Providers> {
        self.providers.read().unwrap_or_else(|e| {
            error!(event = "core.profiles.lock_poisoned");
            e.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Providers> {
        self.providers.write().unwrap_or_else(|e| {
            error!(event = "core.profiles.lock_poisoned");
            e.into_inner()
        })
    }

    pub fn register(&self, profile: ContributedProfile, provider: Arc<dyn ContributedProfileProvider>) {
        info!(
            event = "core.profiles.provider_registered",
            extension = %profile.extension_identifier,
            profile = %profile.profile_id
        );
        self.write().insert(profile, provider);
    }

    pub fn get(&self, profile: &ContributedProfile) -> Option<Arc<dyn ContributedProfileProvider>> {
        self.read().get(profile).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// One-shot gate opened once terminal profiles are resolved.
#[derive(Debug, Clone)]
pub struct ReadyGate {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadyGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Open the gate. Idempotent.
    pub fn open(&self) {
        self.tx.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        });
    }

    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns once open.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

impl Default for ReadyGate {
    fn default() -> Self {
        Self::new()
    }
}
