use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::StatusEntry;

/// The store operations the job state machine needs, abstracted so it can
/// be exercised against an in-memory fake (see
/// [`crate::memory::MemoryStore`]) without a live Redis.
///
/// [`crate::Store`] is the production implementation; every method here
/// mirrors one of its inherent methods one-for-one.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn get_schedule(&self, jobid: &str) -> Result<Option<String>>;
    async fn set_schedule(&self, jobid: &str, schedule: &str) -> Result<()>;
    async fn delete_schedule(&self, jobid: &str) -> Result<()>;
    async fn get_schedules(&self) -> Result<Vec<(String, String)>>;

    async fn set_status(&self, jobid: &str, event: &str, at: DateTime<Utc>) -> Result<()>;
    async fn get_status(&self, jobid: &str) -> Result<Option<String>>;
    async fn delete_status(&self, jobid: &str) -> Result<()>;
    async fn get_statuses(&self, before: DateTime<Utc>) -> Result<Vec<StatusEntry>>;

    async fn timeline_add(&self, jobid: &str, at: DateTime<Utc>) -> Result<()>;
    async fn timeline_remove(&self, jobid: &str) -> Result<()>;
    async fn timeline_score(&self, jobid: &str) -> Result<Option<DateTime<Utc>>>;
    async fn timeline_due(&self, point_in_time: DateTime<Utc>) -> Result<Vec<String>>;

    async fn enqueue(&self, queue: &str, jobid: &str, now: DateTime<Utc>) -> Result<bool>;
    async fn consume(
        &self,
        queue: &str,
        timeout: Duration,
        now: DateTime<Utc>,
        jobtag: &str,
    ) -> Result<Option<String>>;
    async fn remove_from_queue(&self, queue: &str, jobid: &str) -> Result<()>;
    async fn recycle(&self, queue: &str, jobid: &str, jobtag: &str) -> Result<bool>;
    async fn force_recycle(&self, queue: &str, jobid: &str) -> Result<()>;
    async fn is_working(&self, queue: &str, jobid: &str) -> Result<bool>;

    async fn set_control(&self, value: &str) -> Result<()>;
    async fn get_control(&self) -> Result<Option<String>>;
    async fn clear_control(&self) -> Result<()>;
    async fn flush(&self) -> Result<()>;
}

#[async_trait]
impl Backend for crate::Store {
    async fn get_schedule(&self, jobid: &str) -> Result<Option<String>> {
        crate::Store::get_schedule(self, jobid).await
    }

    async fn set_schedule(&self, jobid: &str, schedule: &str) -> Result<()> {
        crate::Store::set_schedule(self, jobid, schedule).await
    }

    async fn delete_schedule(&self, jobid: &str) -> Result<()> {
        crate::Store::delete_schedule(self, jobid).await
    }

    async fn get_schedules(&self) -> Result<Vec<(String, String)>> {
        crate::Store::get_schedules(self).await
    }

    async fn set_status(&self, jobid: &str, event: &str, at: DateTime<Utc>) -> Result<()> {
        crate::Store::set_status(self, jobid, event, at).await
    }

    async fn get_status(&self, jobid: &str) -> Result<Option<String>> {
        crate::Store::get_status(self, jobid).await
    }

    async fn delete_status(&self, jobid: &str) -> Result<()> {
        crate::Store::delete_status(self, jobid).await
    }

    async fn get_statuses(&self, before: DateTime<Utc>) -> Result<Vec<StatusEntry>> {
        crate::Store::get_statuses(self, before).await
    }

    async fn timeline_add(&self, jobid: &str, at: DateTime<Utc>) -> Result<()> {
        crate::Store::timeline_add(self, jobid, at).await
    }

    async fn timeline_remove(&self, jobid: &str) -> Result<()> {
        crate::Store::timeline_remove(self, jobid).await
    }

    async fn timeline_score(&self, jobid: &str) -> Result<Option<DateTime<Utc>>> {
        crate::Store::timeline_score(self, jobid).await
    }

    async fn timeline_due(&self, point_in_time: DateTime<Utc>) -> Result<Vec<String>> {
        crate::Store::timeline_due(self, point_in_time).await
    }

    async fn enqueue(&self, queue: &str, jobid: &str, now: DateTime<Utc>) -> Result<bool> {
        crate::Store::enqueue(self, queue, jobid, now).await
    }

    async fn consume(
        &self,
        queue: &str,
        timeout: Duration,
        now: DateTime<Utc>,
        jobtag: &str,
    ) -> Result<Option<String>> {
        crate::Store::consume(self, queue, timeout, now, jobtag).await
    }

    async fn remove_from_queue(&self, queue: &str, jobid: &str) -> Result<()> {
        crate::Store::remove_from_queue(self, queue, jobid).await
    }

    async fn recycle(&self, queue: &str, jobid: &str, jobtag: &str) -> Result<bool> {
        crate::Store::recycle(self, queue, jobid, jobtag).await
    }

    async fn force_recycle(&self, queue: &str, jobid: &str) -> Result<()> {
        crate::Store::force_recycle(self, queue, jobid).await
    }

    async fn is_working(&self, queue: &str, jobid: &str) -> Result<bool> {
        crate::Store::is_working(self, queue, jobid).await
    }

    async fn set_control(&self, value: &str) -> Result<()> {
        crate::Store::set_control(self, value).await
    }

    async fn get_control(&self) -> Result<Option<String>> {
        crate::Store::get_control(self).await
    }

    async fn clear_control(&self) -> Result<()> {
        crate::Store::clear_control(self).await
    }

    async fn flush(&self) -> Result<()> {
        crate::Store::flush(self).await
    }
}
