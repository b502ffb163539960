use std::error::Error;

use sweep_campaign::serde::to_pretty_json_string;

use super::{progress_line, CampaignArgs};

pub fn run(args: &CampaignArgs) -> Result<(), Box<dyn Error>> {
    let (manager, campaign) = args.open()?;
    let status = manager.status(&campaign)?;
    println!("{}", progress_line(status.to_run, status.total));
    println!("{}", to_pretty_json_string(&status)?);
    Ok(())
}
