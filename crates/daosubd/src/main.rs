//! DAOSUBD
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use anyhow::Result;
use clap::Parser;
use daosubd::cli::CLIArgs;
use daosubd::{get_work_directory, load_settings, run_daosubd, setup_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CLIArgs::parse();
    let work_dir = get_work_directory(&args)?;
    let settings = load_settings(&work_dir, args.config.clone())?;

    let _log_guard = if args.enable_logging {
        setup_tracing(&work_dir, &settings.logging)?
    } else {
        None
    };

    tracing::debug!("Work dir: {}", work_dir.display());

    run_daosubd(&work_dir, &settings).await
}
