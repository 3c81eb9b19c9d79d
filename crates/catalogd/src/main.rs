mod args;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use crate::args::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    logutil::configure_global_logger(
        cli.log_level,
        logutil::LogFormat::from_json_flag(cli.log_json),
        std::io::stderr,
    );

    info!(version = env!("CARGO_PKG_VERSION"), "starting...");

    cli.command.run(cli.store)
}
