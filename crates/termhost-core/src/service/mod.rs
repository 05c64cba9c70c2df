//! The session router: creates instances, picks their host, and tracks the
//! single active instance across both hosts.

mod routing;

pub use routing::DropSide;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use termhost_config::{DefaultLocation, SplitCwd, TermhostConfig};
use termhost_protocol::{
    Cwd, Dimensions, LayoutSnapshot, ProcessLaunch, ResourceUri, ShellLaunchConfig,
};

use crate::backend::{BackendRegistry, SpawnRequest, TerminalBackend};
use crate::connection::{ConnectionCoordinator, ConnectionState};
use crate::errors::{BackendError, TerminalError};
use crate::event::{Emitter, ServiceEvent};
use crate::host::{ActiveInstanceTracker, EditorHost, GroupHost, GroupId, InstanceHost};
use crate::instance::{
    Capability, ExitReason, InstanceEvent, InstanceEventKind, InstanceId, TerminalInstance,
    TerminalLocation,
};
use crate::layout::LayoutPersister;
use crate::multiplexer::EventMultiplexer;
use crate::profiles::{
    ContributedProfile, ContributedProfileOptions, ContributedProfileProvider, ProfileRegistry,
    ReadyGate,
};
use crate::shutdown::{ExitPrompt, ShutdownState};

/// How the window was started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartupKind {
    #[default]
    Fresh,
    /// The window reloaded in place.
    Reload,
}

/// Facts about the embedding window, injected at construction.
#[derive(Debug, Clone, Default)]
pub struct HostEnvironment {
    /// Authority of the remote the window is connected to, if any.
    pub remote_authority: Option<String>,
    /// Process revival is impossible in web-hosted runs.
    pub is_web: bool,
    pub workspace_id: String,
    pub workspace_folders: Vec<PathBuf>,
    /// Closing the last window hides the app instead of quitting it.
    pub close_hides_window: bool,
    pub startup_kind: StartupKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LaunchRequest {
    Shell(ShellLaunchConfig),
    /// Delegated to the provider registered for the profile.
    Contributed(ContributedProfile),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceLocation {
    Panel,
    Editor,
    /// Next to `parent`, in the parent's host.
    Split { parent: InstanceId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateInstanceOptions {
    pub launch: LaunchRequest,
    /// `None` uses `terminal.default_location`.
    pub location: Option<InstanceLocation>,
    /// In a remote window, spawn on the local machine instead.
    pub use_local_backend: bool,
}

impl CreateInstanceOptions {
    pub fn shell(launch: ShellLaunchConfig) -> Self {
        Self {
            launch: LaunchRequest::Shell(launch),
            location: None,
            use_local_backend: false,
        }
    }

    pub fn contributed(profile: ContributedProfile) -> Self {
        Self {
            launch: LaunchRequest::Contributed(profile),
            location: None,
            use_local_backend: false,
        }
    }

    pub fn at(mut self, location: InstanceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn local_backend(mut self) -> Self {
        self.use_local_backend = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditableData {
    pub initial_value: String,
}

/// The one instance currently being renamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditableSlot {
    pub instance: InstanceId,
    pub data: EditableData,
}

/// Chooses a workspace folder when a split starts in the workspace root.
#[async_trait]
pub trait WorkspaceFolderPicker: Send + Sync {
    /// `None` means the user cancelled.
    async fn pick(&self, folders: &[PathBuf]) -> Option<PathBuf>;
}

/// Owns every terminal instance of one window.
///
/// All operations take `&mut self`; the service is driven from a single
/// task and never runs two operations at once.
pub struct TerminalService {
    pub(crate) config: TermhostConfig,
    pub(crate) env: HostEnvironment,
    pub(crate) backends: BackendRegistry,
    pub(crate) primary_backend: Option<Arc<dyn TerminalBackend>>,
    profiles: ProfileRegistry,
    profiles_ready: ReadyGate,
    pub(crate) group_host: GroupHost,
    pub(crate) editor_host: EditorHost,
    background: Vec<TerminalInstance>,
    tracker: ActiveInstanceTracker,
    pub(crate) multiplexer: EventMultiplexer,
    pub(crate) connection: ConnectionCoordinator,
    pub(crate) events: Emitter<ServiceEvent>,
    next_instance_id: u32,
    editable: Option<EditableSlot>,
    folder_picker: Option<Arc<dyn WorkspaceFolderPicker>>,
    pub(crate) exit_prompt: Option<Arc<dyn ExitPrompt>>,
    pub(crate) layout_persister: Option<LayoutPersister>,
    pub(crate) shutdown: ShutdownState,
}

impl std::fmt::Debug for TerminalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalService")
            .field("workspace_id", &self.env.workspace_id)
            .field("connection", &self.connection.state())
            .field("instances", &self.instances())
            .field("active", &self.active_instance())
            .field("is_shutting_down", &self.shutdown.is_shutting_down())
            .finish()
    }
}

impl TerminalService {
    pub fn new(config: TermhostConfig, env: HostEnvironment) -> Self {
        let events = Emitter::new();
        let tracker = ActiveInstanceTracker::new(events.clone());
        Self {
            config,
            env,
            backends: BackendRegistry::new(),
            primary_backend: None,
            profiles: ProfileRegistry::new(),
            profiles_ready: ReadyGate::new(),
            group_host: GroupHost::new(tracker.clone()),
            editor_host: EditorHost::new(tracker.clone()),
            background: Vec::new(),
            tracker,
            multiplexer: EventMultiplexer::new(),
            connection: ConnectionCoordinator::new(),
            events,
            next_instance_id: 1,
            editable: None,
            folder_picker: None,
            exit_prompt: None,
            layout_persister: None,
            shutdown: ShutdownState::default(),
        }
    }

    pub fn with_folder_picker(mut self, picker: Arc<dyn WorkspaceFolderPicker>) -> Self {
        self.folder_picker = Some(picker);
        self
    }

    pub fn with_exit_prompt(mut self, prompt: Arc<dyn ExitPrompt>) -> Self {
        self.exit_prompt = Some(prompt);
        self
    }

    pub fn config(&self) -> &TermhostConfig {
        &self.config
    }

    pub fn environment(&self) -> &HostEnvironment {
        &self.env
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }

    /// Registering a backend registers process support.
    pub fn register_backend(&mut self, backend: Arc<dyn TerminalBackend>) {
        self.backends.register(backend);
        self.events.emit(ServiceEvent::ProcessSupportRegistered);
    }

    pub fn has_process_support(&self) -> bool {
        self.backends.has_process_support()
    }

    pub fn register_profile_provider(
        &self,
        profile: ContributedProfile,
        provider: Arc<dyn ContributedProfileProvider>,
    ) {
        self.profiles.register(profile, provider);
    }

    /// Shared handle for the profile collaborator, which registers providers
    /// and then opens [`Self::profiles_ready`].
    pub fn profile_registry(&self) -> ProfileRegistry {
        self.profiles.clone()
    }

    /// Gate the profile collaborator opens once profiles are resolved.
    pub fn profiles_ready(&self) -> ReadyGate {
        self.profiles_ready.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_shutting_down()
    }

    pub fn group_host(&self) -> &GroupHost {
        &self.group_host
    }

    pub fn editor_host(&self) -> &EditorHost {
        &self.editor_host
    }

    // --- Instance lookup ---

    pub fn instance(&self, id: InstanceId) -> Option<&TerminalInstance> {
        self.group_host
            .get(id)
            .or_else(|| self.editor_host.get(id))
            .or_else(|| self.background.iter().find(|i| i.id() == id))
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> Option<&mut TerminalInstance> {
        if self.group_host.contains(id) {
            return self.group_host.get_mut(id);
        }
        if self.editor_host.contains(id) {
            return self.editor_host.get_mut(id);
        }
        self.background.iter_mut().find(|i| i.id() == id)
    }

    /// Instances visible in either host.
    pub fn foreground_instances(&self) -> Vec<InstanceId> {
        let mut ids = self.group_host.instance_ids();
        ids.extend(self.editor_host.instance_ids());
        ids
    }

    pub fn background_instances(&self) -> Vec<InstanceId> {
        self.background.iter().map(|i| i.id()).collect()
    }

    /// Every tracked instance, foreground first.
    pub fn instances(&self) -> Vec<InstanceId> {
        let mut ids = self.foreground_instances();
        ids.extend(self.background_instances());
        ids
    }

    pub fn instance_count(&self) -> usize {
        self.group_host.len() + self.editor_host.len() + self.background.len()
    }

    /// Removes an instance from wherever it lives.
    pub(crate) fn take_instance(&mut self, id: InstanceId) -> Option<TerminalInstance> {
        if let Some(instance) = self.group_host.take_instance(id) {
            return Some(instance);
        }
        if let Some(instance) = self.editor_host.take_instance(id) {
            return Some(instance);
        }
        self.take_background(id)
    }

    pub(crate) fn take_background(&mut self, id: InstanceId) -> Option<TerminalInstance> {
        let index = self.background.iter().position(|i| i.id() == id)?;
        Some(self.background.remove(index))
    }

    // --- Active instance ---

    /// Service-wide active instance, with cross-host fallback.
    pub fn active_instance(&self) -> Option<InstanceId> {
        self.tracker.active()
    }

    pub fn set_active_instance(&mut self, id: InstanceId) -> Result<(), TerminalError> {
        let found = self.group_host.set_active_instance(id) || self.editor_host.set_active_instance(id);
        if !found {
            return Err(TerminalError::InstanceNotFound(id));
        }
        self.schedule_layout_save();
        Ok(())
    }

    pub fn focus_instance(&mut self, id: InstanceId) -> Result<(), TerminalError> {
        let found = self.group_host.focus(id) || self.editor_host.focus(id);
        if !found {
            return Err(TerminalError::InstanceNotFound(id));
        }
        self.schedule_layout_save();
        Ok(())
    }

    // --- Editable slot ---

    pub fn editable(&self) -> Option<&EditableSlot> {
        self.editable.as_ref()
    }

    /// Puts `instance` into rename mode, replacing any other. `None` takes
    /// `instance` out of rename mode; the slot is left alone if another
    /// instance holds it.
    pub fn set_editable(
        &mut self,
        instance: InstanceId,
        data: Option<EditableData>,
    ) -> Result<(), TerminalError> {
        if self.instance(instance).is_none() {
            return Err(TerminalError::InstanceNotFound(instance));
        }
        match data {
            Some(data) => self.editable = Some(EditableSlot { instance, data }),
            None if self.is_editable(instance) => self.editable = None,
            None => return Ok(()),
        }
        let current = self.editable.as_ref().map(|s| s.instance);
        self.events.emit(ServiceEvent::EditableChanged(current));
        Ok(())
    }

    pub fn is_editable(&self, instance: InstanceId) -> bool {
        self.editable
            .as_ref()
            .is_some_and(|slot| slot.instance == instance)
    }

    // --- Instance state changes that affect the layout ---

    pub fn set_instance_dimensions(
        &mut self,
        id: InstanceId,
        dimensions: Dimensions,
    ) -> Result<(), TerminalError> {
        let instance = self
            .instance_mut(id)
            .ok_or(TerminalError::InstanceNotFound(id))?;
        instance.set_dimensions(dimensions);
        self.schedule_layout_save();
        Ok(())
    }

    pub fn resize_panes(&mut self, group: GroupId, sizes: &[f64]) -> bool {
        let resized = self.group_host.resize_panes(group, sizes);
        if resized {
            self.schedule_layout_save();
        }
        resized
    }

    pub fn add_capability(
        &mut self,
        id: InstanceId,
        capability: Capability,
    ) -> Result<bool, TerminalError> {
        let instance = self
            .instance_mut(id)
            .ok_or(TerminalError::InstanceNotFound(id))?;
        Ok(instance.add_capability(capability))
    }

    // --- Aggregate streams ---

    pub fn on_any_instance(&mut self, kind: InstanceEventKind) -> broadcast::Receiver<InstanceEvent> {
        self.multiplexer.on_any_instance(kind)
    }

    pub fn on_instance_capability(
        &mut self,
        capability: Capability,
    ) -> broadcast::Receiver<InstanceEvent> {
        self.multiplexer.on_instance_capability(capability)
    }

    pub fn multiplexer(&self) -> &EventMultiplexer {
        &self.multiplexer
    }

    // --- Reconnection ownership ---

    /// Instances (re)created with `owner`'s reconnection properties.
    pub fn reconnected_instances(&self, owner: &str) -> Vec<InstanceId> {
        self.connection.owned_by(owner).to_vec()
    }

    pub fn ownership(&self) -> &HashMap<String, Vec<InstanceId>> {
        self.connection.ownership()
    }

    // --- Layout ---

    pub fn layout_snapshot(&self) -> LayoutSnapshot {
        self.group_host.layout_snapshot()
    }

    pub(crate) fn schedule_layout_save(&self) {
        if let Some(persister) = &self.layout_persister {
            persister.schedule(self.layout_snapshot());
        }
    }

    // --- Creation ---

    /// Creates an instance and places it in its host.
    ///
    /// Returns `Ok(None)` when no backend serves the window's authority;
    /// nothing is allocated then.
    ///
    /// # Errors
    ///
    /// - `ShuttingDown` once a shutdown has proceeded
    /// - `ProcessSupportNotRegistered` for a backend-spawned process before
    ///   any backend is registered; nothing is allocated
    /// - `Backend` when spawning or attaching fails; the instance is discarded
    pub async fn create_instance(
        &mut self,
        options: CreateInstanceOptions,
    ) -> Result<Option<InstanceId>, TerminalError> {
        if self.shutdown.is_shutting_down() {
            warn!(event = "core.service.create_refused", reason = "shutting_down");
            return Err(TerminalError::ShuttingDown);
        }

        let CreateInstanceOptions {
            launch,
            location,
            use_local_backend,
        } = options;
        let location = location.unwrap_or(match self.config.terminal.default_location() {
            DefaultLocation::Panel => InstanceLocation::Panel,
            DefaultLocation::Editor => InstanceLocation::Editor,
        });
        let target = self.resolve_target(location)?;

        info!(
            event = "core.service.create_started",
            target = ?target,
            use_local_backend = use_local_backend
        );

        let needs_profiles = match &launch {
            LaunchRequest::Shell(config) => {
                if config.is_custom_process() {
                    false
                } else {
                    self.ensure_process_support()?;
                    true
                }
            }
            LaunchRequest::Contributed(_) => true,
        };

        let local_in_remote = use_local_backend && self.env.remote_authority.is_some();
        if needs_profiles
            && !local_in_remote
            && self.connection.state() == ConnectionState::Connecting
        {
            debug!(event = "core.service.waiting_for_profiles");
            let gate = self.profiles_ready.clone();
            gate.wait().await;
        }

        let launch = match launch {
            LaunchRequest::Contributed(profile) => {
                self.resolve_contributed_profile(&profile, target, None)
                    .await?
            }
            LaunchRequest::Shell(config) => match self.contributed_default_profile(&config) {
                Some(profile) => {
                    self.resolve_contributed_profile(&profile, target, Some(&config))
                        .await?
                }
                None => config,
            },
        };

        let backend = if launch.is_custom_process() {
            None
        } else {
            self.ensure_process_support()?;
            let Some(backend) = self.select_backend(use_local_backend) else {
                warn!(
                    event = "core.service.create_skipped",
                    reason = "backend_unavailable",
                    remote_authority = self.env.remote_authority.as_deref().unwrap_or_default()
                );
                return Ok(None);
            };
            Some(backend)
        };

        let mut instance = self.allocate_instance(launch, target);
        let id = instance.id();
        if let Some(backend) = backend
            && let Err(e) = self.start_process(backend.as_ref(), &mut instance).await
        {
            self.multiplexer.untrack(id);
            error!(
                event = "core.service.create_failed",
                instance_id = %id,
                error = %e,
                error_code = e.error_code()
            );
            return Err(e.into());
        }

        self.register_owner(&instance);
        self.place_instance(instance, location);
        self.events.emit(ServiceEvent::InstanceCreated(id));
        self.schedule_layout_save();

        info!(
            event = "core.service.create_completed",
            instance_id = %id,
            target = ?target
        );
        Ok(Some(id))
    }

    fn ensure_process_support(&self) -> Result<(), TerminalError> {
        if self.backends.has_process_support() {
            return Ok(());
        }
        error!(
            event = "core.service.create_failed",
            error_code = "process_support_not_registered"
        );
        Err(TerminalError::ProcessSupportNotRegistered)
    }

    fn resolve_target(&self, location: InstanceLocation) -> Result<TerminalLocation, TerminalError> {
        match location {
            InstanceLocation::Panel => Ok(TerminalLocation::Panel),
            InstanceLocation::Editor => Ok(TerminalLocation::Editor),
            InstanceLocation::Split { parent } => self
                .instance(parent)
                .map(|p| p.target())
                .ok_or(TerminalError::InstanceNotFound(parent)),
        }
    }

    /// The configured default profile, when it applies to `launch`.
    fn contributed_default_profile(&self, launch: &ShellLaunchConfig) -> Option<ContributedProfile> {
        if launch.is_custom_process() {
            return None;
        }
        if !matches!(launch.process, ProcessLaunch::Spawn { executable: None, .. }) {
            return None;
        }
        let (extension, profile_id) = self.config.terminal.default_profile()?;
        let profile = ContributedProfile::new(extension, profile_id);
        if self.profiles.get(&profile).is_none() {
            debug!(
                event = "core.service.default_profile_unregistered",
                extension = extension,
                profile = profile_id
            );
            return None;
        }
        Some(profile)
    }

    async fn resolve_contributed_profile(
        &self,
        profile: &ContributedProfile,
        target: TerminalLocation,
        base: Option<&ShellLaunchConfig>,
    ) -> Result<ShellLaunchConfig, TerminalError> {
        let provider =
            self.profiles
                .get(profile)
                .ok_or_else(|| TerminalError::ProfileProviderNotFound {
                    extension_identifier: profile.extension_identifier.clone(),
                    profile_id: profile.profile_id.clone(),
                })?;
        let failed = |e: crate::profiles::ProfileError| TerminalError::ContributedProfileFailed {
            extension_identifier: profile.extension_identifier.clone(),
            profile_id: profile.profile_id.clone(),
            message: e.to_string(),
        };

        provider
            .activate(&profile.activation_event())
            .await
            .map_err(failed)?;

        let options = ContributedProfileOptions {
            location: target,
            cwd: base.and_then(|b| b.cwd.clone()),
            icon: base.and_then(|b| b.icon.clone()),
            color: base.and_then(|b| b.color.clone()),
        };
        let launch = provider
            .create_contributed_terminal_profile(&options)
            .await
            .map_err(failed)?;

        info!(
            event = "core.service.contributed_profile_resolved",
            extension = %profile.extension_identifier,
            profile = %profile.profile_id
        );
        Ok(launch)
    }

    /// The backend a new process goes to. `None` when no backend serves the
    /// window's authority.
    fn select_backend(&self, use_local_backend: bool) -> Option<Arc<dyn TerminalBackend>> {
        let authority = self.env.remote_authority.as_deref();
        if use_local_backend && authority.is_some() {
            if let Some(local) = self.backends.local() {
                return Some(local);
            }
            warn!(
                event = "core.service.local_backend_missing",
                remote_authority = authority.unwrap_or_default()
            );
        }
        self.backends.get(authority)
    }

    /// Allocates an id and starts multiplexing the instance's events.
    pub(crate) fn allocate_instance(
        &mut self,
        launch: ShellLaunchConfig,
        target: TerminalLocation,
    ) -> TerminalInstance {
        let id = InstanceId(self.next_instance_id);
        self.next_instance_id += 1;

        let mut instance = TerminalInstance::new(id, launch, target);
        if instance.initial_cwd().is_none()
            && let Some(folder) = self.env.workspace_folders.first()
        {
            instance.set_initial_cwd(Some(Cwd::Path(folder.clone())));
        }
        self.multiplexer.track(&instance);
        instance
    }

    async fn start_process(
        &self,
        backend: &dyn TerminalBackend,
        instance: &mut TerminalInstance,
    ) -> Result<(), BackendError> {
        let details = match instance.launch().attach_target() {
            Some(target) => backend.attach_to_process(target.id).await?,
            None => {
                backend
                    .spawn_process(SpawnRequest {
                        launch: instance.launch(),
                        cwd: instance.initial_cwd(),
                        workspace_id: &self.env.workspace_id,
                        dimensions: instance.dimensions(),
                    })
                    .await?
            }
        };
        instance.set_backend_authority(backend.remote_authority().map(str::to_string));
        instance.set_process_ready(details);
        Ok(())
    }

    pub(crate) fn register_owner(&mut self, instance: &TerminalInstance) {
        if let Some(props) = &instance.launch().reconnection_properties {
            self.connection.record_owner(&props.owner_id, instance.id());
        }
    }

    fn place_instance(&mut self, instance: TerminalInstance, location: InstanceLocation) {
        let id = instance.id();
        if instance.launch().hide_from_user {
            debug!(event = "core.service.instance_backgrounded", instance_id = %id);
            self.background.push(instance);
            return;
        }
        match location {
            InstanceLocation::Panel => {
                self.group_host.create_group(instance);
                self.group_host.set_active_instance(id);
            }
            InstanceLocation::Editor => self.editor_host.open(instance),
            InstanceLocation::Split { parent } => {
                if self.editor_host.contains(parent) {
                    self.editor_host.open(instance);
                } else {
                    self.group_host.split(parent, instance);
                    self.group_host.set_active_instance(id);
                }
            }
        }
    }

    /// Splits `parent` (default: the active instance).
    ///
    /// Returns `Ok(None)` when the workspace-folder picker was cancelled or
    /// no backend serves the window.
    pub async fn split_instance(
        &mut self,
        parent: Option<InstanceId>,
        launch: ShellLaunchConfig,
    ) -> Result<Option<InstanceId>, TerminalError> {
        let parent_id = parent
            .or_else(|| self.active_instance())
            .ok_or(TerminalError::NoActiveInstance)?;
        let parent = self
            .instance(parent_id)
            .ok_or(TerminalError::InstanceNotFound(parent_id))?;
        let parent_launch_cwd = parent.launch().cwd.clone();
        let parent_initial = parent.initial_cwd().cloned();
        let parent_current = parent.cwd().cloned();

        let mut launch = launch;
        if launch.cwd.is_none() {
            launch.cwd = match self.config.terminal.split_cwd() {
                SplitCwd::WorkspaceRoot => match self.pick_workspace_folder().await {
                    FolderChoice::Picked(folder) => Some(Cwd::Path(folder)),
                    FolderChoice::NoFolders => None,
                    FolderChoice::Cancelled => {
                        info!(event = "core.service.split_cancelled", parent = %parent_id);
                        return Ok(None);
                    }
                },
                SplitCwd::Initial => parent_initial,
                SplitCwd::Inherited => parent_current.or(parent_initial),
            };
        }

        if let Some(Cwd::Resource(parent_uri)) = &parent_launch_cwd
            && let Some(Cwd::Path(path)) = &launch.cwd
        {
            let rewritten = ResourceUri::new(
                parent_uri.scheme.clone(),
                parent_uri.authority.clone(),
                path.to_string_lossy(),
            );
            debug!(event = "core.service.split_cwd_rewritten", cwd = %rewritten);
            launch.cwd = Some(Cwd::Resource(rewritten));
        }

        let options = CreateInstanceOptions::shell(launch).at(InstanceLocation::Split { parent: parent_id });
        self.create_instance(options).await
    }

    async fn pick_workspace_folder(&self) -> FolderChoice {
        let folders = &self.env.workspace_folders;
        match folders.len() {
            0 => FolderChoice::NoFolders,
            1 => FolderChoice::Picked(folders[0].clone()),
            _ => match &self.folder_picker {
                Some(picker) => match picker.pick(folders).await {
                    Some(folder) => FolderChoice::Picked(folder),
                    None => FolderChoice::Cancelled,
                },
                None => FolderChoice::Picked(folders[0].clone()),
            },
        }
    }

    /// Moves a backgrounded instance into a new group. It becomes active if
    /// it is the only grouped instance.
    pub fn show_background_instance(&mut self, id: InstanceId) -> Result<(), TerminalError> {
        let instance = self
            .take_background(id)
            .ok_or(TerminalError::InstanceNotFound(id))?;
        self.group_host.create_group(instance);
        if self.group_host.len() == 1 {
            self.group_host.set_active_instance(id);
        }
        info!(event = "core.service.background_shown", instance_id = %id);
        self.events.emit(ServiceEvent::InstancesChanged);
        self.schedule_layout_save();
        Ok(())
    }

    // --- Disposal ---

    /// Closes the instance and kills its process.
    pub async fn dispose_instance(&mut self, id: InstanceId) -> Result<(), TerminalError> {
        let instance = self
            .take_instance(id)
            .ok_or(TerminalError::InstanceNotFound(id))?;
        self.finish_disposal(instance, ExitReason::User, true).await;
        Ok(())
    }

    /// The backend reported that the process exited.
    pub async fn handle_process_exit(
        &mut self,
        id: InstanceId,
        exit_code: Option<i32>,
    ) -> Result<(), TerminalError> {
        let instance = self
            .take_instance(id)
            .ok_or(TerminalError::InstanceNotFound(id))?;
        let reason = ExitReason::Process(exit_code);
        self.multiplexer.retire(
            id,
            &[
                InstanceEvent::Exited {
                    instance: id,
                    exit_code,
                },
                InstanceEvent::Disposed {
                    instance: id,
                    reason,
                },
            ],
        );
        instance.notify_exit(exit_code);
        self.finish_disposal(instance, reason, false).await;
        Ok(())
    }

    pub(crate) async fn finish_disposal(
        &mut self,
        mut instance: TerminalInstance,
        reason: ExitReason,
        kill_process: bool,
    ) {
        let id = instance.id();
        self.multiplexer
            .retire(id, &[InstanceEvent::Disposed { instance: id, reason }]);
        instance.dispose(reason);

        if kill_process
            && let Some(handle) = instance.persistent_process_id()
            && let Some(backend) = self.backends.get(instance.backend_authority())
            && let Err(e) = backend.shutdown_process(handle, true).await
        {
            warn!(
                event = "core.service.process_shutdown_failed",
                instance_id = %id,
                persistent_process_id = %handle,
                error = %e
            );
        }

        if self.is_editable(id) {
            self.editable = None;
            self.events.emit(ServiceEvent::EditableChanged(None));
        }
        self.events.emit(ServiceEvent::InstanceDisposed(id));
        self.schedule_layout_save();
    }
}

enum FolderChoice {
    Picked(PathBuf),
    NoFolders,
    Cancelled,
}
