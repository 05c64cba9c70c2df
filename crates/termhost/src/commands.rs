use clap::ArgMatches;
use tracing::info;

mod config;
mod helpers;
mod layout;
mod policy;

pub fn run_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    info!(event = "cli.app_started", version = env!("CARGO_PKG_VERSION"));

    match matches.subcommand() {
        Some(("layout", sub_matches)) => layout::handle_layout_command(sub_matches),
        Some(("config", sub_matches)) => config::handle_config_command(sub_matches),
        Some(("policy", sub_matches)) => policy::handle_policy_command(sub_matches),
        _ => unreachable!("subcommand_required is set on the root command"),
    }
}
