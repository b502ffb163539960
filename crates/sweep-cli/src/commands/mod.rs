pub mod list;
pub mod run;
pub mod status;

use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use sweep_campaign::{load_config, Campaign, CampaignConfig, CampaignManager};

/// Options locating a campaign: its YAML description and results root.
#[derive(Args, Debug, Clone)]
pub struct CampaignArgs {
    /// Campaign YAML describing the parameter sweep.
    #[arg(long, env = "SWEEP_CONFIG")]
    pub config: PathBuf,
    /// Campaign name, overriding the `name` field of the config.
    #[arg(long, env = "SWEEP_EXPERIMENT")]
    pub experiment: Option<String>,
    /// Directory holding one subdirectory per campaign.
    #[arg(long, env = "SWEEP_RESULTS_DIR", default_value = "results")]
    pub results_dir: PathBuf,
}

impl CampaignArgs {
    /// Loads the config, applying the experiment name override.
    pub fn load(&self) -> Result<CampaignConfig, Box<dyn Error>> {
        let mut config = load_config(&self.config)?;
        if let Some(name) = &self.experiment {
            config.name = name.clone();
        }
        Ok(config)
    }

    /// Opens (or creates) the campaign described by the config.
    pub fn open(&self) -> Result<(CampaignManager, Campaign), Box<dyn Error>> {
        let config = self.load()?;
        let manager = CampaignManager::new(&self.results_dir);
        let campaign = manager.open_from_config(&config)?;
        Ok((manager, campaign))
    }
}

/// Progress line shared by `status` and `run`.
pub(crate) fn progress_line(to_run: usize, total: usize) -> String {
    format!("Running simulations {to_run} of {total} to be run")
}
