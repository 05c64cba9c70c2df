use clap::Command;

pub fn config_command() -> Command {
    Command::new("config")
        .about("Inspect the merged termhost configuration")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(Command::new("show").about("Print the merged configuration as TOML"))
        .subcommand(
            Command::new("validate")
                .about("Validate ~/.termhost/config.toml and ./.termhost/config.toml"),
        )
}
