use clap::ArgMatches;
use serde::Serialize;
use tracing::{error, info};

use termhost_core::LayoutStore;
use termhost_protocol::{LayoutSnapshot, TabLayout};

use super::helpers::layout_store;

#[derive(Serialize)]
struct StoredLayout {
    workspace: String,
    tabs: usize,
    terminals: usize,
}

pub(crate) fn handle_layout_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let store = layout_store()?;
    match matches.subcommand() {
        Some(("list", sub)) => handle_list(&store, sub.get_flag("json")),
        Some(("show", sub)) => {
            let workspace = required_workspace(sub)?;
            handle_show(&store, workspace, sub.get_flag("json"))
        }
        Some(("clear", sub)) => handle_clear(&store, required_workspace(sub)?),
        _ => unreachable!("subcommand_required is set on layout"),
    }
}

fn required_workspace(matches: &ArgMatches) -> Result<&str, Box<dyn std::error::Error>> {
    matches
        .get_one::<String>("workspace")
        .map(String::as_str)
        .ok_or_else(|| "Workspace argument is required".into())
}

fn handle_list(store: &LayoutStore, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    info!(event = "cli.layout.list_started", json_output = json_output);

    let workspaces = store.workspaces().inspect_err(|e| {
        eprintln!("❌ Failed to list layouts: {}", e);
        error!(event = "cli.layout.list_failed", error = %e);
    })?;

    let mut stored = Vec::with_capacity(workspaces.len());
    for workspace in workspaces {
        match store.load(&workspace) {
            Ok(Some(layout)) => stored.push(StoredLayout {
                tabs: layout.tabs.len(),
                terminals: layout.terminal_count(),
                workspace,
            }),
            Ok(None) => {}
            Err(e) => {
                eprintln!("Warning: Skipping unreadable layout '{}': {}", workspace, e);
                error!(event = "cli.layout.load_failed", workspace = %workspace, error = %e);
            }
        }
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&stored)?);
    } else if stored.is_empty() {
        println!("No stored layouts.");
    } else {
        println!("{:<32} {:>5} {:>10}", "WORKSPACE", "TABS", "TERMINALS");
        for layout in &stored {
            println!(
                "{:<32} {:>5} {:>10}",
                layout.workspace, layout.tabs, layout.terminals
            );
        }
    }

    info!(event = "cli.layout.list_completed", count = stored.len());
    Ok(())
}

fn handle_show(
    store: &LayoutStore,
    workspace: &str,
    json_output: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(event = "cli.layout.show_started", workspace = workspace);

    let layout = match store.load(workspace) {
        Ok(Some(layout)) => layout,
        Ok(None) => {
            eprintln!("❌ No stored layout for workspace '{}'", workspace);
            error!(event = "cli.layout.show_failed", workspace = workspace, error = "not_found");
            return Err(format!("no stored layout for '{}'", workspace).into());
        }
        Err(e) => {
            eprintln!("❌ Failed to read layout for '{}': {}", workspace, e);
            error!(event = "cli.layout.show_failed", workspace = workspace, error = %e);
            return Err(e.into());
        }
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&layout)?);
    } else {
        print!("{}", render_layout(workspace, &layout));
    }

    info!(event = "cli.layout.show_completed", workspace = workspace, tabs = layout.tabs.len());
    Ok(())
}

fn handle_clear(store: &LayoutStore, workspace: &str) -> Result<(), Box<dyn std::error::Error>> {
    info!(event = "cli.layout.clear_started", workspace = workspace);

    match store.save(workspace, None) {
        Ok(()) => {
            println!("✅ Cleared stored layout for '{}'", workspace);
            info!(event = "cli.layout.clear_completed", workspace = workspace);
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Failed to clear layout for '{}': {}", workspace, e);
            error!(event = "cli.layout.clear_failed", workspace = workspace, error = %e);
            Err(e.into())
        }
    }
}

fn render_tab(index: usize, tab: &TabLayout, out: &mut String) {
    let marker = if tab.is_active { " (active)" } else { "" };
    out.push_str(&format!("Tab {}{}\n", index + 1, marker));
    for pane in &tab.terminals {
        let size = format!("{:>5.1}%", pane.relative_size * 100.0);
        let Some(terminal) = &pane.terminal else {
            out.push_str(&format!("    {}  <process gone>\n", size));
            continue;
        };
        let active = if tab.active_persistent_process_id == Some(terminal.id) {
            '*'
        } else {
            ' '
        };
        let title = if terminal.title.is_empty() {
            "-"
        } else {
            terminal.title.as_str()
        };
        out.push_str(&format!(
            "  {} {}  #{:<6} {:<20} {}\n",
            active, size, terminal.id, title, terminal.cwd
        ));
    }
}

fn render_layout(workspace: &str, layout: &LayoutSnapshot) -> String {
    let mut out = format!(
        "Layout for '{}': {} tab(s), {} terminal(s)\n",
        workspace,
        layout.tabs.len(),
        layout.terminal_count()
    );
    for (index, tab) in layout.tabs.iter().enumerate() {
        render_tab(index, tab, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use termhost_protocol::{PaneLayout, PersistentProcessId, ProcessDetails};

    #[test]
    fn test_render_layout_marks_active_pane() {
        let layout = LayoutSnapshot {
            tabs: vec![TabLayout {
                terminals: vec![
                    PaneLayout {
                        terminal: Some(ProcessDetails {
                            id: PersistentProcessId(4),
                            title: "zsh".into(),
                            cwd: "/repo".into(),
                            ..ProcessDetails::default()
                        }),
                        relative_size: 0.5,
                    },
                    PaneLayout {
                        terminal: None,
                        relative_size: 0.5,
                    },
                ],
                is_active: true,
                active_persistent_process_id: Some(PersistentProcessId(4)),
            }],
        };

        let rendered = render_layout("ws", &layout);
        assert!(rendered.starts_with("Layout for 'ws': 1 tab(s), 1 terminal(s)"));
        assert!(rendered.contains("Tab 1 (active)"));
        assert!(rendered.contains("*  50.0%  #4"));
        assert!(rendered.contains("<process gone>"));
    }
}
