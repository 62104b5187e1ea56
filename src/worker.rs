//! The worker loop. Round-robins across a strategy's declared queues,
//! claims one job per non-empty attempt, runs user work, and
//! re-schedules the result.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::RngCore;
use redbike_graceful_shutdown::GracefulShutdownConsumer;
use redbike_store::Backend;
use tracing::{event, Level};

use crate::bike::Bike;
use crate::error::Result;
use crate::strategy::WorkError;

/// How long to idle before re-attempting consume when every queue came up
/// empty in a round; short enough to stay responsive to HALT.
const IDLE_SLEEP: Duration = Duration::from_millis(50);

pub struct Worker<B> {
    bike: Arc<Bike<B>>,
    /// Single stateful round-robin cursor: must not reset across a
    /// halt/resume within the same process.
    cursor: usize,
}

impl<B: Backend> Worker<B> {
    pub fn new(bike: Arc<Bike<B>>) -> Self {
        Worker { bike, cursor: 0 }
    }

    fn next_queue(&mut self) -> String {
        let names = self.bike.strategy().queue_names();
        let name = names[self.cursor % names.len()].clone();
        self.cursor = (self.cursor + 1) % names.len();
        name
    }

    /// One round-robin attempt: consume from the next queue, and if a job
    /// was claimed, run it through to completion. Returns `true` if a job
    /// was claimed.
    pub async fn claim_once(&mut self) -> Result<bool> {
        let queue = self.next_queue();
        let timeout = self.bike.strategy().timeout(&queue);
        let jobtag = fresh_jobtag();
        let now = Utc::now();

        let jobid = match self.bike.store().consume(&queue, timeout, now, &jobtag).await? {
            Some(j) => j,
            None => return Ok(false),
        };

        match self.bike.strategy().work(&jobid).await {
            Ok(backoff) => {
                if self.bike.store().recycle(&queue, &jobid, &jobtag).await? {
                    self.bike.reschedule(&jobid, backoff).await?;
                }
                // If the marker had already expired (TTL race), skip
                // silently rather than double-schedule.
            }
            Err(WorkError::StopWork) => {
                self.bike.store().set_schedule(&jobid, "STOP").await?;
                if self.bike.store().recycle(&queue, &jobid, &jobtag).await? {
                    self.bike.reschedule(&jobid, None).await?;
                }
            }
            Err(WorkError::UnsetJob) => {
                self.bike.unset(&jobid).await?;
                self.bike.store().force_recycle(&queue, &jobid).await?;
            }
            Err(WorkError::Other(e)) => {
                event!(Level::ERROR, jobid = %jobid, error = %e, "job raised unexpected error");
                self.bike.store().set_status(&jobid, "DIE", Utc::now()).await?;
                self.bike.store().force_recycle(&queue, &jobid).await?;
            }
        }

        Ok(true)
    }

    pub async fn run(&mut self, mut shutdown: GracefulShutdownConsumer) -> Result<()> {
        loop {
            let claimed = self.claim_once().await?;

            if !claimed {
                tokio::select! {
                    _ = tokio::time::sleep(IDLE_SLEEP) => {},
                    _ = shutdown.wait_for_shutdown() => {},
                }
            }

            if shutdown.shutting_down() || self.bike.is_halted().await? {
                event!(Level::INFO, "worker stopping on command");
                break;
            }
        }

        Ok(())
    }
}

/// Random 120-bit hex jobtag - the Working marker's value, proving which
/// worker attempt currently owns a job.
fn fresh_jobtag() -> String {
    let mut bytes = [0u8; 15];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{JobRunner, RoundRobin};
    use async_trait::async_trait;
    use redbike_store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRunner {
        calls: Arc<AtomicUsize>,
        backoff: Option<Duration>,
    }

    #[async_trait]
    impl JobRunner for CountingRunner {
        async fn work(&self, _jobid: &str) -> std::result::Result<Option<Duration>, WorkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.backoff)
        }
    }

    struct StopRunner;

    #[async_trait]
    impl JobRunner for StopRunner {
        async fn work(&self, _jobid: &str) -> std::result::Result<Option<Duration>, WorkError> {
            Err(WorkError::StopWork)
        }
    }

    struct UnsetRunner;

    #[async_trait]
    impl JobRunner for UnsetRunner {
        async fn work(&self, _jobid: &str) -> std::result::Result<Option<Duration>, WorkError> {
            Err(WorkError::UnsetJob)
        }
    }

    struct DyingRunner;

    #[async_trait]
    impl JobRunner for DyingRunner {
        async fn work(&self, _jobid: &str) -> std::result::Result<Option<Duration>, WorkError> {
            Err(WorkError::Other(anyhow::anyhow!("boom")))
        }
    }

    struct SleepyRunner(Duration);

    #[async_trait]
    impl JobRunner for SleepyRunner {
        async fn work(&self, _jobid: &str) -> std::result::Result<Option<Duration>, WorkError> {
            tokio::time::sleep(self.0).await;
            Ok(None)
        }
    }

    fn bike_with<R: JobRunner + 'static>(runner: R, timeout: Duration) -> Arc<Bike<MemoryStore>> {
        let strategy = RoundRobin::new("A", timeout, runner);
        Arc::new(Bike::new(MemoryStore::new(), Arc::new(strategy)))
    }

    #[tokio::test]
    async fn continue_loop_requeues_after_work() {
        let calls = Arc::new(AtomicUsize::new(0));
        let bike = bike_with(
            CountingRunner {
                calls: calls.clone(),
                backoff: None,
            },
            Duration::from_secs(10),
        );
        bike.set("job:A", "CONTINUE", None).await.unwrap();

        let mut worker = Worker::new(bike.clone());
        assert!(worker.claim_once().await.unwrap());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(bike
            .store()
            .get_status("job:A")
            .await
            .unwrap()
            .unwrap()
            .starts_with("ENQ:"));
        assert!(!bike.store().is_working("work-A", "job:A").await.unwrap());
    }

    #[tokio::test]
    async fn stop_schedule_ends_requeue() {
        let calls = Arc::new(AtomicUsize::new(0));
        let bike = bike_with(
            CountingRunner {
                calls: calls.clone(),
                backoff: None,
            },
            Duration::from_secs(10),
        );
        bike.set("job:A", "CONTINUE", None).await.unwrap();
        let mut worker = Worker::new(bike.clone());
        worker.claim_once().await.unwrap();

        bike.set("job:A", "STOP", None).await.unwrap();
        worker.claim_once().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let status = bike.store().get_status("job:A").await.unwrap().unwrap();
        assert!(status.starts_with("STP:"));
    }

    #[tokio::test]
    async fn continue_with_backoff_timelines_the_job() {
        let bike = bike_with(
            CountingRunner {
                calls: Arc::new(AtomicUsize::new(0)),
                backoff: Some(Duration::from_secs(2)),
            },
            Duration::from_secs(10),
        );
        bike.set("backoff:2:A", "CONTINUE", None).await.unwrap();
        let mut worker = Worker::new(bike.clone());
        worker.claim_once().await.unwrap();

        assert!(bike
            .store()
            .timeline_score("backoff:2:A")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn unset_job_clears_all_state() {
        let bike = bike_with(UnsetRunner, Duration::from_secs(10));
        bike.set("unset:A", "CONTINUE", None).await.unwrap();
        let mut worker = Worker::new(bike.clone());
        worker.claim_once().await.unwrap();

        let tell = bike.tell("unset:A").await.unwrap();
        assert_eq!(tell.status, None);
        assert_eq!(tell.schedule, None);
        assert_eq!(tell.next_run, None);
        assert!(!tell.working);
    }

    #[tokio::test]
    async fn stop_work_signal_sets_stop_schedule() {
        let bike = bike_with(StopRunner, Duration::from_secs(10));
        bike.set("job:A", "CONTINUE", None).await.unwrap();
        let mut worker = Worker::new(bike.clone());
        worker.claim_once().await.unwrap();

        assert_eq!(bike.store().get_schedule("job:A").await.unwrap().unwrap(), "STOP");
        let status = bike.store().get_status("job:A").await.unwrap().unwrap();
        assert!(status.starts_with("STP:"));
    }

    #[tokio::test]
    async fn unexpected_error_marks_die_and_skips_reschedule() {
        let bike = bike_with(DyingRunner, Duration::from_secs(10));
        bike.set("job:A", "CONTINUE", None).await.unwrap();
        let mut worker = Worker::new(bike.clone());
        worker.claim_once().await.unwrap();

        let status = bike.store().get_status("job:A").await.unwrap().unwrap();
        assert!(status.starts_with("DIE:"));
        assert!(!bike.store().is_working("work-A", "job:A").await.unwrap());
        // Not requeued: reschedule was skipped.
        assert!(bike
            .store()
            .get_schedule("job:A")
            .await
            .unwrap()
            .map(|s| s == "CONTINUE")
            .unwrap_or(false));
    }

    #[tokio::test]
    async fn expired_working_marker_skips_reschedule() {
        let bike = bike_with(
            SleepyRunner(Duration::from_millis(40)),
            Duration::from_millis(10),
        );
        bike.set("job:Z", "CONTINUE", None).await.unwrap();
        let mut worker = Worker::new(bike.clone());
        worker.claim_once().await.unwrap();

        assert!(!bike.store().is_working("work-A", "job:Z").await.unwrap());
        // The job schedule is unchanged and nothing pushed it back onto a
        // queue: reschedule was skipped because recycle failed.
        assert_eq!(
            bike.store().get_schedule("job:Z").await.unwrap().as_deref(),
            Some("CONTINUE")
        );
        let status = bike.store().get_status("job:Z").await.unwrap().unwrap();
        assert!(status.starts_with("WRK:"));
    }

    #[tokio::test]
    async fn round_robin_cursor_advances_across_queues() {
        let strategy = RoundRobin::new(
            "A:B",
            Duration::from_secs(10),
            CountingRunner {
                calls: Arc::new(AtomicUsize::new(0)),
                backoff: None,
            },
        );
        let bike = Arc::new(Bike::new(MemoryStore::new(), Arc::new(strategy)));
        let mut worker = Worker::new(bike.clone());
        assert!(!worker.claim_once().await.unwrap()); // queue A empty
        assert!(!worker.claim_once().await.unwrap()); // queue B empty
        assert_eq!(worker.cursor, 0);
    }
}
