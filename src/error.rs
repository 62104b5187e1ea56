use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] redbike_store::Error),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("environment variable error: {0}")]
    EnvOption(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown worker strategy {0:?}")]
    UnknownStrategy(String),

    #[error("unknown control signal {0:?}")]
    UnknownSignal(String),
}

impl<T: std::error::Error> From<envoption::EnvOptionError<T>> for Error {
    fn from(e: envoption::EnvOptionError<T>) -> Self {
        Error::EnvOption(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
