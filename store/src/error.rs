use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Redis error {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis connection error {0}")]
    RedisPool(#[from] deadpool::managed::PoolError<redis::RedisError>),

    #[error("Redis pool creation error {0}")]
    RedisPoolCreation(#[from] deadpool_redis::CreatePoolError),

    #[error("invalid integer in store value: {0}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("malformed status value {0:?}")]
    MalformedStatus(String),
}

pub type Result<T> = std::result::Result<T, Error>;
