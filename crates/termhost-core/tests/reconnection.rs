//! Startup reconnection against a stored layout.

mod common;

use std::time::Duration;

use common::{FakeBackend, orphan, pane, service_with, tab};
use termhost_config::{PersistenceSettings, TermhostConfig};
use termhost_core::{
    ConnectionState, CreateInstanceOptions, HostEnvironment, InstanceHost, ServiceEvent,
    StartupKind, TerminalService,
};
use termhost_protocol::{
    Dimensions, LayoutSnapshot, PaneLayout, PersistentProcessId, ProcessType, ShellLaunchConfig,
};

fn two_tab_layout() -> LayoutSnapshot {
    LayoutSnapshot {
        tabs: vec![
            tab(vec![pane(1, 0.5), pane(2, 0.5)], true, Some(2)),
            tab(vec![pane(3, 1.0)], false, Some(3)),
        ],
    }
}

fn handle_of(service: &TerminalService, id: termhost_core::InstanceId) -> Option<PersistentProcessId> {
    service.instance(id).and_then(|i| i.persistent_process_id())
}

#[tokio::test]
async fn test_two_tab_layout_restores_topology() {
    let backend = FakeBackend::with_layout(two_tab_layout());
    let mut service = service_with(TermhostConfig::default(), backend.clone());

    let reconnected = service.initialize().await;

    assert_eq!(reconnected.len(), 3);
    assert_eq!(service.instance_count(), 3);

    let groups = service.group_host().groups();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].relative_sizes(), vec![0.5, 0.5]);
    assert_eq!(groups[1].relative_sizes(), vec![1.0]);
    assert_eq!(service.group_host().active_group(), Some(groups[0].id()));

    let active = service.active_instance().unwrap();
    assert_eq!(handle_of(&service, active), Some(PersistentProcessId(2)));
    assert_eq!(
        groups[1]
            .active_instance()
            .and_then(|id| handle_of(&service, id)),
        Some(PersistentProcessId(3))
    );

    let state = backend.state();
    assert_eq!(
        state.attached,
        vec![PersistentProcessId(1), PersistentProcessId(2), PersistentProcessId(3)]
    );
    assert_eq!(state.grace_reduced, 1);
    assert_eq!(state.replayed.len(), 3);
}

#[tokio::test]
async fn test_reconnection_is_deterministic() {
    let topology = |service: &TerminalService| {
        service
            .group_host()
            .groups()
            .iter()
            .map(|g| {
                let handles: Vec<_> = g
                    .instance_ids()
                    .into_iter()
                    .map(|id| handle_of(service, id))
                    .collect();
                (handles, g.relative_sizes())
            })
            .collect::<Vec<_>>()
    };

    let mut first = service_with(TermhostConfig::default(), FakeBackend::with_layout(two_tab_layout()));
    first.initialize().await;
    let mut second = service_with(TermhostConfig::default(), FakeBackend::with_layout(two_tab_layout()));
    second.initialize().await;

    assert_eq!(topology(&first), topology(&second));
}

#[tokio::test]
async fn test_initialize_twice_does_nothing() {
    let backend = FakeBackend::with_layout(two_tab_layout());
    let mut service = service_with(TermhostConfig::default(), backend.clone());

    assert_eq!(service.initialize().await.len(), 3);
    assert!(service.initialize().await.is_empty());
    assert_eq!(service.instance_count(), 3);
    assert_eq!(backend.state().attached.len(), 3);
}

#[tokio::test]
async fn test_connected_event_fires_once() {
    let mut service = service_with(TermhostConfig::default(), FakeBackend::local());
    let mut rx = service.subscribe();
    assert_eq!(service.connection_state(), ConnectionState::Connecting);

    service.initialize().await;
    service.initialize().await;

    assert_eq!(service.connection_state(), ConnectionState::Connected);
    let mut connected = 0;
    while let Ok(event) = rx.try_recv() {
        if event == ServiceEvent::ConnectionStateChanged(ConnectionState::Connected) {
            connected += 1;
        }
    }
    assert_eq!(connected, 1);
}

#[tokio::test]
async fn test_non_orphans_are_skipped_and_sizes_normalized() {
    let mut owned = pane(2, 0.25);
    if let Some(details) = owned.terminal.as_mut() {
        details.is_orphan = false;
    }
    let layout = LayoutSnapshot {
        tabs: vec![tab(
            vec![pane(1, 0.25), owned, pane(3, 0.5)],
            true,
            None,
        )],
    };
    let backend = FakeBackend::with_layout(layout);
    let mut service = service_with(TermhostConfig::default(), backend.clone());

    service.initialize().await;

    let groups = service.group_host().groups();
    assert_eq!(groups.len(), 1);
    let sizes = groups[0].relative_sizes();
    assert!((sizes[0] - 1.0 / 3.0).abs() < 1e-9);
    assert!((sizes[1] - 2.0 / 3.0).abs() < 1e-9);
    assert!(!backend.state().attached.contains(&PersistentProcessId(2)));
}

#[tokio::test]
async fn test_missing_processes_and_empty_panes_are_skipped() {
    let layout = LayoutSnapshot {
        tabs: vec![
            tab(
                vec![
                    pane(1, 0.5),
                    PaneLayout {
                        terminal: None,
                        relative_size: 0.5,
                    },
                ],
                true,
                None,
            ),
            tab(vec![pane(9, 1.0)], false, None),
        ],
    };
    let backend = FakeBackend::with_layout(layout);
    backend.state().missing.push(PersistentProcessId(9));
    let mut service = service_with(TermhostConfig::default(), backend);

    let reconnected = service.initialize().await;

    assert_eq!(reconnected.len(), 1);
    assert_eq!(service.group_host().groups().len(), 1);
    assert_eq!(service.group_host().groups()[0].relative_sizes(), vec![1.0]);
    assert_eq!(service.restored_group_count(), 1);
}

#[tokio::test]
async fn test_tasks_reconnect_only_on_reload() {
    let task = PaneLayout {
        terminal: Some(termhost_protocol::ProcessDetails {
            process_type: Some(ProcessType::Task),
            ..orphan(7)
        }),
        relative_size: 1.0,
    };
    let layout = LayoutSnapshot {
        tabs: vec![tab(vec![task], true, None)],
    };

    let mut fresh = service_with(TermhostConfig::default(), FakeBackend::with_layout(layout.clone()));
    assert!(fresh.initialize().await.is_empty());

    let mut reloaded = TerminalService::new(
        TermhostConfig::default(),
        HostEnvironment {
            workspace_id: "ws".into(),
            startup_kind: StartupKind::Reload,
            ..HostEnvironment::default()
        },
    );
    reloaded.register_backend(FakeBackend::with_layout(layout));
    assert_eq!(reloaded.initialize().await.len(), 1);
}

#[tokio::test]
async fn test_reconnected_instances_are_replayed() {
    let mut service = service_with(TermhostConfig::default(), FakeBackend::with_layout(two_tab_layout()));
    let ids = service.initialize().await;

    for id in ids {
        let instance = service.instance(id).unwrap();
        assert!(instance.is_replayed());
        assert_eq!(instance.dimensions(), Some(Dimensions::new(120, 30)));
        assert!(instance.should_persist());
    }
}

#[tokio::test]
async fn test_disabled_persistence_clears_layout() {
    let config = TermhostConfig {
        persistence: PersistenceSettings {
            enable_persistent_sessions: Some(false),
            ..PersistenceSettings::default()
        },
        ..TermhostConfig::default()
    };
    let backend = FakeBackend::with_layout(two_tab_layout());
    let mut service = service_with(config, backend.clone());

    assert!(service.initialize().await.is_empty());
    assert_eq!(service.instance_count(), 0);
    let state = backend.state();
    assert!(state.attached.is_empty());
    assert_eq!(state.layout_writes, vec![None]);
}

#[tokio::test]
async fn test_remote_window_uses_remote_persistence_switch() {
    let config = TermhostConfig {
        persistence: PersistenceSettings {
            enable_remote_persistence: Some(false),
            ..PersistenceSettings::default()
        },
        ..TermhostConfig::default()
    };
    let backend = FakeBackend::remote("ssh-remote+box");
    backend.state().layout = Some(two_tab_layout());
    let mut service = TerminalService::new(
        config,
        HostEnvironment {
            remote_authority: Some("ssh-remote+box".into()),
            workspace_id: "ws".into(),
            ..HostEnvironment::default()
        },
    );
    service.register_backend(backend.clone());

    assert!(service.initialize().await.is_empty());
    assert!(backend.state().layout.is_none());
}

#[tokio::test]
async fn test_missing_backend_still_connects() {
    let mut service = TerminalService::new(TermhostConfig::default(), common::env("ws"));
    assert!(service.initialize().await.is_empty());
    assert_eq!(service.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_performance_marks_are_collected() {
    let mut service = service_with(TermhostConfig::default(), FakeBackend::with_layout(two_tab_layout()));
    service.initialize().await;

    let names: Vec<_> = service
        .performance_marks()
        .iter()
        .map(|m| m.name.as_str())
        .collect();
    assert!(names.contains(&"code/terminal/willGetTerminalLayoutInfo"));
    assert!(names.contains(&"code/terminal/didGetTerminalLayoutInfo"));
    assert!(names.contains(&"fake/ready"));
}

#[tokio::test]
async fn test_create_waits_for_profiles_while_connecting() {
    let mut service = TerminalService::new(TermhostConfig::default(), common::env("ws"));
    service.register_backend(FakeBackend::local());

    let blocked = tokio::time::timeout(
        Duration::from_millis(20),
        service.create_instance(CreateInstanceOptions::shell(ShellLaunchConfig::default())),
    )
    .await;
    assert!(blocked.is_err());
    assert_eq!(service.instance_count(), 0);

    // Custom processes never wait.
    service
        .create_instance(CreateInstanceOptions::shell(ShellLaunchConfig::custom()))
        .await
        .unwrap()
        .unwrap();

    service.profiles_ready().open();
    service
        .create_instance(CreateInstanceOptions::shell(ShellLaunchConfig::default()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(service.instance_count(), 2);
}

#[tokio::test]
async fn test_local_creation_in_remote_window_skips_profiles_wait() {
    let local = FakeBackend::local();
    let remote = FakeBackend::remote("ssh-remote+box");
    let mut service = TerminalService::new(
        TermhostConfig::default(),
        HostEnvironment {
            remote_authority: Some("ssh-remote+box".into()),
            workspace_id: "ws".into(),
            ..HostEnvironment::default()
        },
    );
    service.register_backend(local.clone());
    service.register_backend(remote.clone());
    assert!(!service.profiles_ready().is_open());

    let blocked = tokio::time::timeout(
        Duration::from_millis(20),
        service.create_instance(CreateInstanceOptions::shell(ShellLaunchConfig::default())),
    )
    .await;
    assert!(blocked.is_err());

    let id = tokio::time::timeout(
        Duration::from_millis(20),
        service.create_instance(
            CreateInstanceOptions::shell(ShellLaunchConfig::default()).local_backend(),
        ),
    )
    .await
    .expect("local creation must not wait for profiles")
    .unwrap()
    .unwrap();

    assert_eq!(service.connection_state(), ConnectionState::Connecting);
    assert_eq!(service.instance_count(), 1);
    assert!(service.instance(id).unwrap().backend_authority().is_none());
    assert_eq!(local.state().spawned.len(), 1);
    assert!(remote.state().spawned.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_layout_saves_are_debounced() {
    let backend = FakeBackend::local();
    let mut service = service_with(TermhostConfig::default(), backend.clone());
    service.initialize().await;

    let mut ids = Vec::new();
    for _ in 0..3 {
        let id = service
            .create_instance(CreateInstanceOptions::shell(ShellLaunchConfig::default()))
            .await
            .unwrap()
            .unwrap();
        ids.push(id);
    }

    tokio::time::sleep(Duration::from_millis(600)).await;
    {
        let state = backend.state();
        assert_eq!(state.layout_writes.len(), 1);
        let written = state.layout_writes[0].as_ref().unwrap();
        assert_eq!(written.tabs.len(), 3);
    }

    // Each change restarts the quiet period.
    service
        .set_instance_dimensions(ids[0], Dimensions::new(100, 40))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    service
        .set_instance_dimensions(ids[1], Dimensions::new(100, 40))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(backend.state().layout_writes.len(), 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(backend.state().layout_writes.len(), 2);
    assert!(service.group_host().get(ids[2]).is_some());
}
