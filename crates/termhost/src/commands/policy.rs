use clap::ArgMatches;
use tracing::info;

use termhost_config::ConfirmOnExit;
use termhost_core::{ShutdownReason, should_revive_processes};

use super::helpers::load_config_with_warning;

fn parse_reason(value: &str) -> Option<ShutdownReason> {
    match value {
        "close" => Some(ShutdownReason::Close),
        "quit" => Some(ShutdownReason::Quit),
        "reload" => Some(ShutdownReason::Reload),
        "load" => Some(ShutdownReason::Load),
        _ => None,
    }
}

fn describe_confirmation(policy: ConfirmOnExit) -> &'static str {
    match policy {
        ConfirmOnExit::Never => "never",
        ConfirmOnExit::Always => "whenever terminals are open",
        ConfirmOnExit::HasChildProcesses => "when a terminal has child processes",
    }
}

pub(crate) fn handle_policy_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let reason = matches
        .get_one::<String>("reason")
        .and_then(|r| parse_reason(r))
        .ok_or("Unknown shutdown reason")?;
    let windows = matches.get_one::<usize>("windows").copied().unwrap_or(1);
    let close_hides_window = matches.get_flag("close-hides-window");

    let config = load_config_with_warning();
    let revive = should_revive_processes(&config.persistence, reason, windows, close_hides_window);

    println!(
        "Processes survive: {}",
        if revive { "yes" } else { "no" }
    );
    println!(
        "Confirm on exit:   {}",
        if revive {
            "skipped (processes survive)"
        } else {
            describe_confirmation(config.terminal.confirm_on_exit())
        }
    );

    info!(
        event = "cli.policy.evaluated",
        reason = ?reason,
        windows = windows,
        revive_processes = revive
    );
    Ok(())
}
