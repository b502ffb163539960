use std::error::Error;

use clap::{Parser, Subcommand};
use commands::{
    list::{self, ListArgs},
    run::{self, RunArgs},
    status, CampaignArgs,
};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "sweep", about = "Resumable simulation parameter sweeps")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report how many runs of the campaign are still missing.
    Status(CampaignArgs),
    /// Execute every missing run with the external simulator.
    Run(RunArgs),
    /// Print the parameter combinations in enumeration order.
    List(ListArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Command::Status(args) => status::run(&args),
        Command::Run(args) => run::run(&args),
        Command::List(args) => list::run(&args),
    }
}

/// Logs go to stderr so stdout stays machine readable. `RUST_LOG` overrides
/// the default `info` level.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
