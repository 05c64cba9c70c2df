use clap::{Arg, ArgAction, Command};

fn workspace_arg() -> Arg {
    Arg::new("workspace")
        .help("Workspace id the layout was stored for")
        .required(true)
        .index(1)
}

fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .help("Output in JSON format")
        .action(ArgAction::SetTrue)
}

pub fn layout_command() -> Command {
    Command::new("layout")
        .about("Inspect stored terminal layouts")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("list")
                .about("List workspaces with a stored layout")
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("show")
                .about("Show the tabs and panes of a stored layout")
                .arg(workspace_arg())
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("clear")
                .about("Remove a stored layout so nothing is reattached")
                .arg(workspace_arg()),
        )
}
