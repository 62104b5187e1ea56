use structopt::StructOpt;

use crate::config::Config;
use crate::error::Result;

#[derive(Debug, StructOpt)]
pub struct Args {
    #[structopt(help = "Signal to send; currently only HALT")]
    signal: String,
}

pub async fn main(config: &Config, args: Args) -> Result<()> {
    let bike = super::build_bike(config, None).await?;
    bike.control(&args.signal).await
}
