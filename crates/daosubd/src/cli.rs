use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(about = "Community subscription payment coordinator", author = env!("CARGO_PKG_AUTHORS"), version = env!("CARGO_PKG_VERSION"))]
pub struct CLIArgs {
    #[arg(
        short,
        long,
        help = "Use the <directory> as the location of the database and log files",
        required = false
    )]
    pub work_dir: Option<PathBuf>,
    #[arg(
        short,
        long,
        help = "Use the <file name> as the location of the config file",
        required = false
    )]
    pub config: Option<PathBuf>,
    #[arg(
        long,
        help = "Install the tracing subscriber",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub enable_logging: bool,
}
