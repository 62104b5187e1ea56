use redbike_graceful_shutdown::GracefulShutdown;
use structopt::StructOpt;

use crate::config::Config;
use crate::error::Result;
use crate::worker::Worker;

#[derive(Debug, StructOpt)]
pub struct Args {
    #[structopt(help = "Worker spec override, e.g. roundrobin:A:B:C")]
    worker: Option<String>,
}

pub async fn main(config: &Config, args: Args) -> Result<()> {
    let bike = super::build_bike(config, args.worker.as_deref()).await?;
    bike.clear_control().await?;

    let shutdown = GracefulShutdown::new();
    let mut worker = Worker::new(bike);
    worker.run(shutdown.consumer()).await
}
