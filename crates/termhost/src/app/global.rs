use clap::{Arg, ArgAction, Command};

pub fn root_command() -> Command {
    Command::new("termhost")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inspect terminal session layouts and persistence settings")
        .long_about("termhost keeps terminal sessions alive across window reloads and restarts. This CLI inspects the layouts it stored for each workspace and the configuration that decides whether processes are revived.")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
}
