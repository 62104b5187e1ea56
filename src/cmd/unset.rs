use structopt::StructOpt;

use crate::config::Config;
use crate::error::Result;

#[derive(Debug, StructOpt)]
pub struct Args {
    #[structopt(help = "The job's id")]
    jobid: String,
}

pub async fn main(config: &Config, args: Args) -> Result<()> {
    let bike = super::build_bike(config, None).await?;
    bike.unset(&args.jobid).await
}
