use clap::ArgMatches;
use tracing::{error, info};

use termhost_config::TermhostConfig;

use super::helpers::load_config_with_warning;

pub(crate) fn handle_config_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    match matches.subcommand() {
        Some(("show", _)) => handle_show(),
        Some(("validate", _)) => handle_validate(),
        _ => unreachable!("subcommand_required is set on config"),
    }
}

fn handle_show() -> Result<(), Box<dyn std::error::Error>> {
    info!(event = "cli.config.show_started");
    let config = load_config_with_warning();
    let rendered = config.to_toml().inspect_err(|e| {
        eprintln!("❌ Failed to render config: {}", e);
        error!(event = "cli.config.show_failed", error = %e);
    })?;
    if rendered.trim().is_empty() {
        println!("# all settings at their defaults");
    } else {
        print!("{}", rendered);
    }
    info!(event = "cli.config.show_completed");
    Ok(())
}

fn handle_validate() -> Result<(), Box<dyn std::error::Error>> {
    info!(event = "cli.config.validate_started");
    match TermhostConfig::load_hierarchy() {
        Ok(_) => {
            println!("✅ Configuration is valid");
            info!(event = "cli.config.validate_completed");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Invalid configuration: {}", e);
            error!(event = "cli.config.validate_failed", error = %e);
            Err(e.into())
        }
    }
}
