use clap::{Arg, ArgAction, Command};

pub fn policy_command() -> Command {
    Command::new("policy")
        .about("Show whether terminal processes would survive a shutdown")
        .arg(
            Arg::new("reason")
                .long("reason")
                .help("Why the window is shutting down")
                .value_parser(["close", "quit", "reload", "load"])
                .default_value("quit"),
        )
        .arg(
            Arg::new("windows")
                .long("windows")
                .help("Number of open windows, including the closing one")
                .value_parser(clap::value_parser!(usize))
                .default_value("1"),
        )
        .arg(
            Arg::new("close-hides-window")
                .long("close-hides-window")
                .help("Closing the last window hides the app instead of quitting")
                .action(ArgAction::SetTrue),
        )
}
