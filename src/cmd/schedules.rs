use structopt::StructOpt;

use crate::config::Config;
use crate::error::Result;

#[derive(Debug, StructOpt)]
pub struct Args {}

pub async fn main(config: &Config, _args: Args) -> Result<()> {
    let bike = super::build_bike(config, None).await?;

    let mut writer = csv::Writer::from_writer(std::io::stdout());
    for (jobid, schedule) in bike.get_schedules().await? {
        writer.write_record(&[jobid, schedule])?;
    }
    writer.flush()?;
    Ok(())
}
