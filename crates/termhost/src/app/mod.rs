mod config;
mod global;
mod layout;
mod policy;


use clap::Command;

pub fn build_cli() -> Command {
    global::root_command()
        .subcommand(layout::layout_command())
        .subcommand(config::config_command())
        .subcommand(policy::policy_command())
}
