pub mod control;
pub mod dispatch;
pub mod schedules;
pub mod set;
pub mod statuses;
pub mod tell;
pub mod unset;
pub mod work;

use std::sync::Arc;

use redbike_store::{RedisPool, Store};

use crate::bike::Bike;
use crate::config::Config;
use crate::error::Result;
use crate::strategy;

/// Shared by every subcommand: open the store connection, resolve the
/// worker strategy (a CLI `<WORKER>` override wins over the config file's
/// `worker` key), and wrap both in a [`Bike`].
pub async fn build_bike(config: &Config, worker_override: Option<&str>) -> Result<Arc<Bike<Store>>> {
    let pool = RedisPool::new(config.redis_url()?)?;
    let store = Store::new(pool, config.redbike.prefix.clone());

    let worker_spec = worker_override.unwrap_or(&config.redbike.worker);
    let strategy = strategy::resolve(worker_spec, config.default_timeout())?;

    Ok(Arc::new(Bike::new(store, Arc::from(strategy))))
}
