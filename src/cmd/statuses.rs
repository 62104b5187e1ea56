use chrono::{TimeZone, Utc};
use structopt::StructOpt;

use crate::config::Config;
use crate::error::Result;

#[derive(Debug, StructOpt)]
pub struct Args {
    #[structopt(long, help = "Only statuses at or before this unix timestamp")]
    before: Option<i64>,
}

pub async fn main(config: &Config, args: Args) -> Result<()> {
    let bike = super::build_bike(config, None).await?;
    let before = args.before.map(|ts| Utc.timestamp(ts, 0)).unwrap_or_else(Utc::now);

    let mut writer = csv::Writer::from_writer(std::io::stdout());
    for entry in bike.get_statuses(before).await? {
        writer.write_record(&[entry.jobid, entry.event, entry.timestamp.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}
