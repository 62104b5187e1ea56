//! Config-file reading: a `[redbike]` section (worker spec, prefix,
//! timefile, default timeout) and a `[redbike-redis]` section (store
//! connection parameters). Kept thin - a struct plus a loader - since
//! reading the file itself is someone else's concern; only the shape the
//! rest of the crate needs lives here.

use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub redbike: RedbikeSection,
    #[serde(rename = "redbike-redis", default)]
    pub redis: RedisSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedbikeSection {
    /// `<name>:<rest>` worker strategy spec, e.g. `roundrobin:A:B:C`. May be
    /// overridden per-invocation by the CLI's `<WORKER>` argument.
    pub worker: String,

    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default = "default_timefile")]
    pub timefile: String,

    #[serde(rename = "default-timeout", default = "default_timeout_secs")]
    pub default_timeout: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedisSection {
    #[serde(default)]
    pub url: Option<String>,
}

fn default_prefix() -> String {
    "redbike".to_string()
}

fn default_timefile() -> String {
    ".redbike.timefile".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Reads `path` if present (missing config files are not an error -
    /// every value has an env-var or built-in fallback), then layers
    /// `REDBIKE_*` environment variables on top.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut settings = config::Config::default();
        settings.merge(
            config::File::from(path)
                .format(config::FileFormat::Toml)
                .required(false),
        )?;
        settings.merge(config::Environment::with_prefix("REDBIKE").separator("__"))?;
        Ok(settings.try_into()?)
    }

    /// `REDBIKE_REDIS_URL`, if set, overrides the config file's
    /// `[redbike-redis] url`.
    pub fn redis_url(&self) -> Result<String> {
        if let Some(url) = envoption::optional::<String>("REDBIKE_REDIS_URL")? {
            return Ok(url);
        }
        Ok(self
            .redis
            .url
            .clone()
            .unwrap_or_else(|| "redis://127.0.0.1".to_string()))
    }

    pub fn default_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.redbike.default_timeout)
    }
}
