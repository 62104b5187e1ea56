use std::ops::Deref;
use std::sync::Arc;

use crate::error::Result;

/// A cloneable handle to a `deadpool-redis` connection pool.
///
/// Grounded on `src/database/redis.rs`'s `RedisPool`: the store never talks
/// to `redis::Client` directly so that every call site goes through the same
/// pooled, reconnecting connection source.
#[derive(Clone)]
pub struct RedisPool(Arc<deadpool_redis::Pool>);

impl Deref for RedisPool {
    type Target = deadpool_redis::Pool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl RedisPool {
    pub fn new(url: impl Into<String>) -> Result<RedisPool> {
        let pool = deadpool_redis::Config {
            url: Some(url.into()),
            connection: None,
            pool: None,
        }
        .create_pool()?;

        Ok(RedisPool(Arc::new(pool)))
    }

    pub async fn get(&self) -> Result<deadpool_redis::Connection> {
        Ok(self.0.get().await?)
    }
}
