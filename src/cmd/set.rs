use chrono::{TimeZone, Utc};
use structopt::StructOpt;

use crate::config::Config;
use crate::error::Result;

#[derive(Debug, StructOpt)]
pub struct Args {
    #[structopt(help = "The job's id")]
    jobid: String,
    #[structopt(help = "STOP, CONTINUE, NOW, AT:<ts>, or an RRULE block")]
    schedule: String,
    #[structopt(long, help = "Unix timestamp to anchor RRULE evaluation after")]
    after: Option<i64>,
}

pub async fn main(config: &Config, args: Args) -> Result<()> {
    let bike = super::build_bike(config, None).await?;
    let after = args.after.map(|ts| Utc.timestamp(ts, 0));
    bike.set(&args.jobid, &args.schedule, after).await
}
