//! The pluggable worker strategy interface: the mapping from jobid to
//! queue name, the declared queue list, per-queue timeouts, and the user
//! work callback itself.
//!
//! The `Strategy`/`JobRunner` split mirrors a `Clone + Sync + Send`
//! callback object a dequeue loop invokes per job, with strategies
//! resolved through a static registry rather than a dotted-path class
//! resolver; see [`resolve`].

use std::time::Duration;

use async_trait::async_trait;
use fxhash::FxHashMap;
use tracing::{event, Level};

use crate::error::Error;

#[derive(Debug, thiserror::Error)]
pub enum WorkError {
    /// User work asked for the job's schedule to become `STOP`.
    #[error("job requested STOP")]
    StopWork,
    /// User work asked for the job to be fully `unset`.
    #[error("job requested unset")]
    UnsetJob,
    /// Any other error raised by user work; recorded as `DIE` and not
    /// rescheduled.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait Strategy: Send + Sync {
    /// Ordered, stable-per-process list of bare queue names this worker
    /// declares.
    fn queue_names(&self) -> &[String];

    /// The bare queue name a given jobid is routed to.
    fn queue_for(&self, jobid: &str) -> String;

    /// Working-marker TTL for a given queue.
    fn timeout(&self, queue_name: &str) -> Duration;

    /// Run the user's work for `jobid`. `Ok(Some(d))` requests a CONTINUE
    /// backoff of `d`; `Ok(None)` reschedules with no backoff.
    async fn work(&self, jobid: &str) -> std::result::Result<Option<Duration>, WorkError>;
}

/// The piece of a [`Strategy`] application code actually supplies: just the
/// work callback. [`RoundRobin`] handles the queue bookkeeping around it.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn work(&self, jobid: &str) -> std::result::Result<Option<Duration>, WorkError>;
}

/// Reference strategy. `initstring` is a colon-separated list of codes;
/// each maps to queue `"work-<code>"`. `queue_for` takes the jobid's last
/// colon-delimited segment and maps it the same way, so jobid
/// `"foo:bar:A"` targets `"work-A"`.
pub struct RoundRobin<R> {
    queue_names: Vec<String>,
    default_timeout: Duration,
    per_queue_timeout: FxHashMap<String, Duration>,
    runner: R,
}

impl<R: JobRunner> RoundRobin<R> {
    pub fn new(initstring: &str, default_timeout: Duration, runner: R) -> Self {
        let queue_names = initstring
            .split(':')
            .map(|code| Self::name_queue(code))
            .collect();
        RoundRobin {
            queue_names,
            default_timeout,
            per_queue_timeout: FxHashMap::default(),
            runner,
        }
    }

    pub fn with_timeout(mut self, queue_name: impl Into<String>, timeout: Duration) -> Self {
        self.per_queue_timeout.insert(queue_name.into(), timeout);
        self
    }

    fn name_queue(code: &str) -> String {
        format!("work-{}", code)
    }
}

#[async_trait]
impl<R: JobRunner> Strategy for RoundRobin<R> {
    fn queue_names(&self) -> &[String] {
        &self.queue_names
    }

    fn queue_for(&self, jobid: &str) -> String {
        let code = jobid.rsplit(':').next().unwrap_or(jobid);
        Self::name_queue(code)
    }

    fn timeout(&self, queue_name: &str) -> Duration {
        self.per_queue_timeout
            .get(queue_name)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    async fn work(&self, jobid: &str) -> std::result::Result<Option<Duration>, WorkError> {
        self.runner.work(jobid).await
    }
}

/// The built-in demo runner: logs the jobid and asks for no backoff. Stands
/// in for application-specific work code the way a fresh `cargo new`
/// scaffold stands in for a real handler - useful for smoke-testing a
/// `dispatch`/`work` pair end to end before wiring in real job logic.
pub struct LoggingRunner;

#[async_trait]
impl JobRunner for LoggingRunner {
    async fn work(&self, jobid: &str) -> std::result::Result<Option<Duration>, WorkError> {
        event!(Level::INFO, jobid, "ran job");
        Ok(None)
    }
}

/// Resolve a `<name>:<rest>` worker spec into a boxed [`Strategy`],
/// rejecting unknown names at startup rather than resolving a dotted
/// import path at runtime.
///
/// Only `roundrobin:<colon-separated-codes>` is registered today, backed
/// by [`LoggingRunner`]; applications embedding this crate register their
/// own names by extending this match.
pub fn resolve(spec: &str, default_timeout: Duration) -> crate::error::Result<Box<dyn Strategy>> {
    let mut parts = spec.splitn(2, ':');
    let name = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("");

    match name {
        "roundrobin" => Ok(Box::new(RoundRobin::new(rest, default_timeout, LoggingRunner))),
        other => Err(Error::UnknownStrategy(other.to_string())),
    }
}
