//! basm: mirrors the latest BOSH stemcell into an Azure Compute Gallery.
//!
//! # Usage
//!
//! ```text
//! basm run [--json]
//! basm schedule [--daily-at HH:MM] [--skip-startup-run]
//! basm resolve [--json]
//! ```
//!
//! Every option can also be supplied through a `BASM_*` environment
//! variable; see `basm <command> --help`.

mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{resolve::ResolveArgs, run::RunArgs, schedule::ScheduleArgs};
use logging::LogFormat;

#[derive(Parser, Debug)]
#[command(
    name = "basm",
    version,
    about = "Mirror the latest BOSH stemcell into an Azure Compute Gallery",
    long_about = None,
)]
struct Cli {
    /// Log line format on stderr: `text` or `json`.
    #[arg(long, global = true, env = "BASM_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mirror the latest stemcell once and exit.
    Run(RunArgs),

    /// Mirror at startup and then once a day.
    Schedule(ScheduleArgs),

    /// Print the stemcell the feed currently offers.
    Resolve(ResolveArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format);
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Schedule(args) => args.run(),
        Commands::Resolve(args) => args.run(),
    }
}
