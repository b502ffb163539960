use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use sweep_campaign::serde::to_pretty_json_string;
use sweep_campaign::{CancelToken, RunOptions};
use sweep_cli::{resolve_program, BuildProfile, CommandRunner};
use tracing::{info, warn};

use super::{progress_line, CampaignArgs};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub campaign: CampaignArgs,
    /// Maximum simultaneous simulations (0 uses every core).
    #[arg(long, env = "SWEEP_NUM_THREADS", default_value_t = 0)]
    pub threads: usize,
    /// Simulator executable; takes precedence over --sim-root/--script.
    #[arg(long, env = "SWEEP_PROGRAM")]
    pub program: Option<PathBuf>,
    /// Root of the simulator source tree.
    #[arg(long, env = "SWEEP_SIM_ROOT")]
    pub sim_root: Option<PathBuf>,
    /// Program name under `<sim-root>/build/<profile>/`.
    #[arg(long, env = "SWEEP_SCRIPT")]
    pub script: Option<String>,
    /// Build flavour selecting the program directory.
    #[arg(long, env = "SWEEP_BUILD_PROFILE", value_enum, default_value_t = BuildProfile::Optimized)]
    pub profile: BuildProfile,
    /// Per-run wall clock limit in seconds.
    #[arg(long)]
    pub timeout: Option<f64>,
}

/// Executes every missing run of the campaign and prints the summary.
///
/// Failed runs are reported in the summary, not through the exit status.
pub fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let program = resolve_program(
        args.program.as_deref(),
        args.sim_root.as_deref(),
        args.script.as_deref(),
        args.profile,
    )?;
    let (manager, campaign) = args.campaign.open()?;

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("interrupt received; finishing without dispatching new runs");
        handler_token.cancel();
    })?;

    let mut runner = CommandRunner::new(program, campaign.data_dir(), cancel.clone());
    if let Some(seconds) = args.timeout {
        runner = runner.with_timeout(Duration::try_from_secs_f64(seconds)?);
    }

    let (to_run, total) = manager.missing_count(&campaign)?;
    println!("{}", progress_line(to_run, total));

    let opts = RunOptions {
        concurrency: args.threads,
        cancel,
    };
    let summary = manager.run_missing(&campaign, &runner, &opts)?;
    info!(
        campaign = campaign.name(),
        completed = summary.completed,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "campaign pass finished"
    );
    println!("{}", to_pretty_json_string(&summary)?);
    Ok(())
}
