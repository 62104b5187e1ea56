pub mod bike;
pub mod cmd;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod schedule;
pub mod strategy;
pub mod tracing_config;
pub mod worker;

pub use bike::Bike;
pub use error::{Error, Result};
