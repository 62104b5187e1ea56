//! The job state machine. `Bike` ties a [`Backend`] store to a
//! [`Strategy`] and exposes its transitions: `set`, `unset`, `reschedule`,
//! the control plane, and the read-only queries (`tell`, `get_statuses`,
//! `get_schedules`).
//!
//! Named `Bike` since it's the thing every CLI subcommand and both loops
//! hold one of.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use redbike_store::{Backend, StatusEntry};
use serde::Serialize;
use tracing::{event, Level};

use crate::error::Result;
use crate::schedule::{self, Classification};
use crate::strategy::Strategy;

/// Point-in-time snapshot returned by `tell`. Not atomic: each field is
/// read with its own store round-trip.
#[derive(Debug, Clone, Serialize)]
pub struct Tell {
    pub status: Option<String>,
    pub schedule: Option<String>,
    pub next_run: Option<i64>,
    pub working: bool,
}

pub struct Bike<B> {
    store: B,
    strategy: Arc<dyn Strategy>,
}

impl<B: Backend> Bike<B> {
    pub fn new(store: B, strategy: Arc<dyn Strategy>) -> Self {
        Bike { store, strategy }
    }

    pub fn store(&self) -> &B {
        &self.store
    }

    pub fn strategy(&self) -> &Arc<dyn Strategy> {
        &self.strategy
    }

    /// Writes `Schedules[jobid]` then applies the parser's classification
    /// of it.
    pub async fn set(
        &self,
        jobid: &str,
        schedule: &str,
        after: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.store.set_schedule(jobid, schedule).await?;
        self.apply_schedule(jobid, schedule, after, None).await
    }

    /// `unset(jobid)` - delete all state for a job. Never touches a live
    /// Working marker (invariant 4: only its holder may clear it).
    pub async fn unset(&self, jobid: &str) -> Result<()> {
        let queue = self.strategy.queue_for(jobid);
        self.store.delete_status(jobid).await?;
        self.store.delete_schedule(jobid).await?;
        self.store.timeline_remove(jobid).await?;
        self.store.remove_from_queue(&queue, jobid).await?;
        Ok(())
    }

    /// Re-classifies whatever schedule is *currently* stored for `jobid`:
    /// a concurrent `set` during the job's run wins over the value
    /// captured at claim time. A no-op if the job was unset concurrently.
    pub async fn reschedule(&self, jobid: &str, backoff: Option<Duration>) -> Result<()> {
        match self.store.get_schedule(jobid).await? {
            Some(current) => self.apply_schedule(jobid, &current, None, backoff).await,
            None => Ok(()),
        }
    }

    async fn apply_schedule(
        &self,
        jobid: &str,
        schedule: &str,
        after: Option<DateTime<Utc>>,
        backoff: Option<Duration>,
    ) -> Result<()> {
        let now = Utc::now();
        match schedule::classify(schedule, now, after, backoff) {
            Classification::Stop => self.stop(jobid, now).await,
            Classification::Bad => {
                event!(Level::WARN, jobid, schedule, "unparseable RRULE, marking BAD");
                self.store.set_status(jobid, "BAD", now).await?;
                Ok(())
            }
            Classification::Enqueue { normalize_to_stop } => {
                if normalize_to_stop {
                    self.store.set_schedule(jobid, "STOP").await?;
                }
                let queue = self.strategy.queue_for(jobid);
                self.store.enqueue(&queue, jobid, now).await?;
                Ok(())
            }
            Classification::Timeline {
                at,
                normalize_to_stop,
            } => {
                if normalize_to_stop {
                    self.store.set_schedule(jobid, "STOP").await?;
                }
                self.store.set_status(jobid, "TML", now).await?;
                self.store.timeline_add(jobid, at).await?;
                Ok(())
            }
        }
    }

    /// Shared by the explicit `STOP` schedule, an exhausted RRULE, and
    /// (by having callers overwrite the schedule to `STOP` first) `NOW`'s
    /// and `AT:`'s post-normalization path - one status write instead of
    /// three.
    async fn stop(&self, jobid: &str, now: DateTime<Utc>) -> Result<()> {
        self.store.set_status(jobid, "STP", now).await?;
        Ok(())
    }

    // -- control plane --------------------------------------------------

    pub async fn control(&self, signal: &str) -> Result<()> {
        if signal.eq_ignore_ascii_case("halt") {
            self.store.set_control("HALT").await?;
            Ok(())
        } else {
            Err(crate::error::Error::UnknownSignal(signal.to_string()))
        }
    }

    pub async fn clear_control(&self) -> Result<()> {
        Ok(self.store.clear_control().await?)
    }

    pub async fn is_halted(&self) -> Result<bool> {
        Ok(self.store.get_control().await?.as_deref() == Some("HALT"))
    }

    pub async fn flush(&self) -> Result<()> {
        Ok(self.store.flush().await?)
    }

    pub async fn tell(&self, jobid: &str) -> Result<Tell> {
        let status = self.store.get_status(jobid).await?;
        let schedule = self.store.get_schedule(jobid).await?;
        let next_run = self
            .store
            .timeline_score(jobid)
            .await?
            .map(|at| at.timestamp());
        let queue = self.strategy.queue_for(jobid);
        let working = self.store.is_working(&queue, jobid).await?;
        Ok(Tell {
            status,
            schedule,
            next_run,
            working,
        })
    }

    pub async fn get_statuses(&self, before: DateTime<Utc>) -> Result<Vec<StatusEntry>> {
        Ok(self.store.get_statuses(before).await?)
    }

    pub async fn get_schedules(&self) -> Result<Vec<(String, String)>> {
        Ok(self.store.get_schedules().await?)
    }

    /// Bulk-load `jobid,schedule` rows from a CSV with no header, one
    /// `set` per row, batched in groups rather than one row at a time.
    pub async fn load_csv(&self, path: &Path) -> Result<usize> {
        const BATCH: usize = 50;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)?;

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let jobid = record.get(0).unwrap_or_default().to_string();
            let sched = record.get(1).unwrap_or_default().to_string();
            rows.push((jobid, sched));
        }

        let mut loaded = 0;
        for chunk in rows.chunks(BATCH) {
            let futures = chunk
                .iter()
                .map(|(jobid, sched)| self.set(jobid, sched, None));
            let results = futures::future::join_all(futures).await;
            for r in results {
                r?;
                loaded += 1;
            }
        }

        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::RoundRobin;
    use async_trait::async_trait;
    use redbike_store::MemoryStore;
    use std::io::Write;

    fn bike() -> Bike<MemoryStore> {
        struct Unused;
        #[async_trait]
        impl crate::strategy::JobRunner for Unused {
            async fn work(
                &self,
                _jobid: &str,
            ) -> std::result::Result<Option<Duration>, crate::strategy::WorkError> {
                unreachable!("not exercised by these tests")
            }
        }
        let strategy = RoundRobin::new("A", Duration::from_secs(10), Unused);
        Bike::new(MemoryStore::new(), Arc::new(strategy))
    }

    // set(j,s); unset(j) should leave no trace of j anywhere.
    #[tokio::test]
    async fn set_then_unset_leaves_no_state() {
        let bike = bike();
        bike.set("job:A", "CONTINUE", None).await.unwrap();
        bike.unset("job:A").await.unwrap();

        let tell = bike.tell("job:A").await.unwrap();
        assert_eq!(tell.status, None);
        assert_eq!(tell.schedule, None);
        assert_eq!(tell.next_run, None);
        assert!(!tell.working);
        assert!(bike.store().get_schedules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unset_also_clears_a_queued_job() {
        let bike = bike();
        bike.set("job:A", "CONTINUE", None).await.unwrap();
        bike.unset("job:A").await.unwrap();

        // queue_for("job:A") == "work-A"
        assert!(!bike.store().is_working("work-A", "job:A").await.unwrap());
        let claimed = bike
            .store()
            .consume("work-A", Duration::from_secs(10), Utc::now(), "tag")
            .await
            .unwrap();
        assert_eq!(claimed, None);
    }

    #[tokio::test]
    async fn malformed_rrule_marks_bad_without_touching_queue_or_timeline() {
        let bike = bike();
        bike.set("job:A", "not a valid schedule", None).await.unwrap();

        let tell = bike.tell("job:A").await.unwrap();
        assert!(tell.status.unwrap().starts_with("BAD:"));
        assert_eq!(tell.next_run, None);
        assert!(!tell.working);
        // The schedule string itself is preserved as stored, unlike STOP/NOW/AT.
        assert_eq!(
            bike.store().get_schedule("job:A").await.unwrap().as_deref(),
            Some("not a valid schedule")
        );
    }

    #[tokio::test]
    async fn load_csv_sets_every_row() {
        let bike = bike();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedules.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "job1:A,CONTINUE").unwrap();
        writeln!(file, "job2:A,STOP").unwrap();
        drop(file);

        let loaded = bike.load_csv(&path).await.unwrap();
        assert_eq!(loaded, 2);

        let schedules: std::collections::HashMap<_, _> =
            bike.get_schedules().await.unwrap().into_iter().collect();
        assert_eq!(schedules.get("job1:A").map(String::as_str), Some("CONTINUE"));
        assert_eq!(schedules.get("job2:A").map(String::as_str), Some("STOP"));
    }

    #[tokio::test]
    async fn control_plane_halt_and_clear() {
        let bike = bike();
        assert!(!bike.is_halted().await.unwrap());

        bike.control("halt").await.unwrap();
        assert!(bike.is_halted().await.unwrap());

        bike.clear_control().await.unwrap();
        assert!(!bike.is_halted().await.unwrap());

        assert!(bike.control("nonsense").await.is_err());
    }

    #[tokio::test]
    async fn flush_clears_everything() {
        let bike = bike();
        bike.set("job:A", "CONTINUE", None).await.unwrap();
        bike.flush().await.unwrap();

        assert!(bike.get_schedules().await.unwrap().is_empty());
        assert_eq!(bike.tell("job:A").await.unwrap().status, None);
    }
}
