use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use redbike_graceful_shutdown::GracefulShutdown;
use structopt::StructOpt;

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::Result;

#[derive(Debug, StructOpt)]
pub struct Args {
    #[structopt(help = "Worker spec override, e.g. roundrobin:A:B:C")]
    worker: Option<String>,
    #[structopt(long, help = "CSV of jobid,schedule rows to bulk-load before dispatching")]
    schedules: Option<PathBuf>,
    #[structopt(long, help = "Unix timestamp to resume dispatch from")]
    after: Option<i64>,
}

pub async fn main(config: &Config, args: Args) -> Result<()> {
    let bike = super::build_bike(config, args.worker.as_deref()).await?;
    bike.clear_control().await?;

    let shutdown = GracefulShutdown::new();
    let dispatcher = Dispatcher::new(bike, config.redbike.timefile.clone());
    let after = args.after.map(|ts| Utc.timestamp(ts, 0));

    dispatcher
        .run(after, args.schedules.as_deref(), shutdown.consumer())
        .await
}
