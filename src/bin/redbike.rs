use std::path::PathBuf;

use structopt::StructOpt;

use redbike::cmd;
use redbike::config::Config;
use redbike::error::Error;

/// A persistent, recurring-job scheduler backed by Redis. Subcommands
/// mirror `redbike/cli.py`'s docopt usage string one for one.
#[derive(Debug, StructOpt)]
#[structopt(name = "redbike")]
struct Args {
    #[structopt(
        short,
        long,
        env = "REDBIKE_CONFIG",
        default_value = ".redbike.conf",
        help = "Config file with [redbike] and [redbike-redis] sections"
    )]
    config: PathBuf,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    #[structopt(about = "Record or replace a job's schedule")]
    Set(cmd::set::Args),
    #[structopt(about = "Remove all state for a job")]
    Unset(cmd::unset::Args),
    #[structopt(about = "Run the dispatcher loop")]
    Dispatch(cmd::dispatch::Args),
    #[structopt(about = "Run a worker loop")]
    Work(cmd::work::Args),
    #[structopt(about = "Print jobid,event,ts rows as CSV")]
    Statuses(cmd::statuses::Args),
    #[structopt(about = "Print jobid,schedule rows as CSV")]
    Schedules(cmd::schedules::Args),
    #[structopt(about = "Print a job's status as JSON")]
    Tell(cmd::tell::Args),
    #[structopt(about = "Signal a running dispatcher/worker")]
    Control(cmd::control::Args),
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenv::dotenv().ok();
    redbike::tracing_config::configure("redbike");

    let args = Args::from_args();
    let config = Config::from_file(&args.config)?;

    match args.cmd {
        Command::Set(a) => cmd::set::main(&config, a).await,
        Command::Unset(a) => cmd::unset::main(&config, a).await,
        Command::Dispatch(a) => cmd::dispatch::main(&config, a).await,
        Command::Work(a) => cmd::work::main(&config, a).await,
        Command::Statuses(a) => cmd::statuses::main(&config, a).await,
        Command::Schedules(a) => cmd::schedules::main(&config, a).await,
        Command::Tell(a) => cmd::tell::main(&config, a).await,
        Command::Control(a) => cmd::control::main(&config, a).await,
    }
}
