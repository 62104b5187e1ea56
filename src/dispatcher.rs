//! The dispatcher loop. Promotes due Timeline entries into their jobs'
//! queues and persists a "safe replay point" time-file so a restart
//! knows how far dispatch already got.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use redbike_graceful_shutdown::GracefulShutdownConsumer;
use redbike_store::Backend;
use tracing::{event, Level};

use crate::bike::Bike;
use crate::error::Result;

pub struct Dispatcher<B> {
    bike: Arc<Bike<B>>,
    timefile: PathBuf,
}

impl<B: Backend> Dispatcher<B> {
    pub fn new(bike: Arc<Bike<B>>, timefile: impl Into<PathBuf>) -> Self {
        Dispatcher {
            bike,
            timefile: timefile.into(),
        }
    }

    /// Missing time-file falls back to `now()`. Present but unparseable is
    /// treated the same way rather than erroring the whole loop out over a
    /// scratch file.
    pub fn read_point_in_time(&self) -> DateTime<Utc> {
        std::fs::read_to_string(&self.timefile)
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .map(|ts| Utc.timestamp(ts, 0))
            .unwrap_or_else(Utc::now)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.timefile.as_os_str().to_os_string();
        name.push(".0");
        PathBuf::from(name)
    }

    /// Write `<f>.0` then rename over `<f>`, so readers never observe a
    /// truncated file.
    fn write_point_in_time(&self, at: DateTime<Utc>) -> Result<()> {
        let tmp = self.tmp_path();
        std::fs::write(&tmp, at.timestamp().to_string())?;
        std::fs::rename(&tmp, &self.timefile)?;
        Ok(())
    }

    /// One dispatch tick: promote every Timeline entry due at or before
    /// `point_in_time` into its queue. Each promotion is a `zrem` +
    /// `enqueue`, individually atomic but not atomic as a pair with each
    /// other - fine, since a job can only be on the Timeline once
    /// (invariant 1) and `enqueue` is itself dedup-safe.
    pub async fn tick(&self, point_in_time: DateTime<Utc>) -> Result<usize> {
        let due = self.bike.store().timeline_due(point_in_time).await?;
        let now = Utc::now();
        let mut promoted = 0;

        for jobid in due {
            self.bike.store().timeline_remove(&jobid).await?;
            let queue = self.bike.strategy().queue_for(&jobid);
            if self.bike.store().enqueue(&queue, &jobid, now).await? {
                promoted += 1;
            }
        }

        Ok(promoted)
    }

    /// Optionally bulk-load a schedules CSV, then run the promotion loop
    /// until halted.
    pub async fn run(
        &self,
        after: Option<DateTime<Utc>>,
        schedules_csv: Option<&Path>,
        mut shutdown: GracefulShutdownConsumer,
    ) -> Result<()> {
        if let Some(path) = schedules_csv {
            let loaded = self.bike.load_csv(path).await?;
            event!(Level::INFO, loaded, path = %path.display(), "bulk-loaded schedules");
        }

        let mut point_in_time = after.unwrap_or_else(|| self.read_point_in_time());

        loop {
            let promoted = self.tick(point_in_time).await?;
            if promoted > 0 {
                event!(Level::DEBUG, promoted, %point_in_time, "dispatch tick");
            }

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(10)) => {},
                _ = shutdown.wait_for_shutdown() => {},
            }

            // The watermark advances every tick regardless of whether
            // anything was due - a future `AT:` timestamp landing between
            // ticks can race past it. Recovery is
            // `--after=<pre-crash timestamp>`.
            point_in_time = Utc::now();
            self.write_point_in_time(point_in_time)?;

            if shutdown.shutting_down() || self.bike.is_halted().await? {
                event!(Level::INFO, "dispatcher stopping on command");
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redbike_store::MemoryStore;
    use std::sync::Arc;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp(secs, 0)
    }

    async fn bike() -> Arc<Bike<MemoryStore>> {
        let strategy = crate::strategy::resolve("roundrobin:A", Duration::from_secs(10)).unwrap();
        Arc::new(Bike::new(MemoryStore::new(), Arc::from(strategy)))
    }

    #[tokio::test]
    async fn tick_promotes_due_jobs_only() {
        let bike = bike().await;
        bike.store().timeline_add("job:A", ts(100)).await.unwrap();
        bike.store().timeline_add("job:B", ts(200)).await.unwrap();

        let dispatcher = Dispatcher::new(bike.clone(), "/tmp/does-not-matter");
        let promoted = dispatcher.tick(ts(150)).await.unwrap();
        assert_eq!(promoted, 1);

        assert!(bike.store().timeline_score("job:A").await.unwrap().is_none());
        assert!(bike.store().timeline_score("job:B").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn tick_is_dedup_safe_against_already_queued_job() {
        let bike = bike().await;
        bike.store()
            .enqueue("work-A", "job:A", ts(0))
            .await
            .unwrap();
        bike.store().timeline_add("job:A", ts(100)).await.unwrap();

        let dispatcher = Dispatcher::new(bike.clone(), "/tmp/does-not-matter");
        let promoted = dispatcher.tick(ts(150)).await.unwrap();
        // Already queued, so the enqueue script no-ops; not double counted.
        assert_eq!(promoted, 0);
    }

    #[tokio::test]
    async fn missing_timefile_falls_back_to_now() {
        let bike = bike().await;
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::new(bike, dir.path().join("nonexistent.timefile"));

        let before = Utc::now().timestamp();
        let point = dispatcher.read_point_in_time();
        assert!(point.timestamp() >= before);
    }

    #[tokio::test]
    async fn write_then_read_point_in_time_round_trips() {
        let bike = bike().await;
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::new(bike, dir.path().join("redbike.timefile"));

        dispatcher.write_point_in_time(ts(12345)).unwrap();
        assert_eq!(dispatcher.read_point_in_time(), ts(12345));

        // The `.0` scratch file is renamed away, not left behind.
        assert!(!dispatcher.tmp_path().exists());
    }
}
