use std::error::Error;

use clap::Args;

use super::CampaignArgs;

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub campaign: CampaignArgs,
    /// Also print the fingerprint of each combination.
    #[arg(long)]
    pub fingerprints: bool,
}

/// Prints every combination of the configured space in enumeration order.
pub fn run(args: &ListArgs) -> Result<(), Box<dyn Error>> {
    let config = args.campaign.load()?;
    let space = config.space()?;
    for (idx, combination) in space.iter().enumerate() {
        if args.fingerprints {
            println!("{idx}\t{}\t{combination}", combination.fingerprint()?);
        } else {
            println!("{idx}\t{combination}");
        }
    }
    Ok(())
}
