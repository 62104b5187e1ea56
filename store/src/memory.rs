//! An in-process fake of [`Backend`], standing in for a live Redis the way
//! `wiremock` stands in for a live HTTP server. Exercises the exact
//! dedup/TTL/recycle semantics the Lua scripts provide, just without a
//! network round-trip, so the job state machine and its dispatcher/worker
//! loops can be unit tested without `--features test-redis`.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fxhash::{FxHashMap, FxHashSet};

use crate::backend::Backend;
use crate::error::Result;
use crate::StatusEntry;

#[derive(Default)]
struct Inner {
    schedules: FxHashMap<String, String>,
    statuses: FxHashMap<String, String>,
    timeline: FxHashMap<String, i64>,
    queues: FxHashMap<String, VecDeque<String>>,
    members: FxHashMap<String, FxHashSet<String>>,
    working: FxHashMap<(String, String), (String, Instant)>,
    control: Option<String>,
}

/// An in-memory stand-in for [`crate::Store`]. One instance models one
/// `<prefix>`; there is no actual key namespacing since nothing else shares
/// the process.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: std::sync::Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn working_is_live(inner: &Inner, queue: &str, jobid: &str) -> bool {
        match inner.working.get(&(queue.to_string(), jobid.to_string())) {
            Some((_, expires)) => Instant::now() < *expires,
            None => false,
        }
    }
}

#[async_trait]
impl Backend for MemoryStore {
    async fn get_schedule(&self, jobid: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().unwrap().schedules.get(jobid).cloned())
    }

    async fn set_schedule(&self, jobid: &str, schedule: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .schedules
            .insert(jobid.to_string(), schedule.to_string());
        Ok(())
    }

    async fn delete_schedule(&self, jobid: &str) -> Result<()> {
        self.inner.lock().unwrap().schedules.remove(jobid);
        Ok(())
    }

    async fn get_schedules(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .schedules
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn set_status(&self, jobid: &str, event: &str, at: DateTime<Utc>) -> Result<()> {
        let value = format!("{}:{}", event, at.timestamp());
        self.inner
            .lock()
            .unwrap()
            .statuses
            .insert(jobid.to_string(), value);
        Ok(())
    }

    async fn get_status(&self, jobid: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().unwrap().statuses.get(jobid).cloned())
    }

    async fn delete_status(&self, jobid: &str) -> Result<()> {
        self.inner.lock().unwrap().statuses.remove(jobid);
        Ok(())
    }

    async fn get_statuses(&self, before: DateTime<Utc>) -> Result<Vec<StatusEntry>> {
        let inner = self.inner.lock().unwrap();
        let mut out = Vec::new();
        for (jobid, value) in inner.statuses.iter() {
            let (event, ts) = crate::parse_status_value(value)?;
            if ts <= before.timestamp() {
                out.push(StatusEntry {
                    jobid: jobid.clone(),
                    event,
                    timestamp: ts,
                });
            }
        }
        Ok(out)
    }

    async fn timeline_add(&self, jobid: &str, at: DateTime<Utc>) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .timeline
            .insert(jobid.to_string(), at.timestamp());
        Ok(())
    }

    async fn timeline_remove(&self, jobid: &str) -> Result<()> {
        self.inner.lock().unwrap().timeline.remove(jobid);
        Ok(())
    }

    async fn timeline_score(&self, jobid: &str) -> Result<Option<DateTime<Utc>>> {
        use chrono::TimeZone;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .timeline
            .get(jobid)
            .map(|ts| Utc.timestamp(*ts, 0)))
    }

    async fn timeline_due(&self, point_in_time: DateTime<Utc>) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let mut due: Vec<(String, i64)> = inner
            .timeline
            .iter()
            .filter(|(_, ts)| **ts <= point_in_time.timestamp())
            .map(|(j, ts)| (j.clone(), *ts))
            .collect();
        due.sort_by_key(|(_, ts)| *ts);
        Ok(due.into_iter().map(|(j, _)| j).collect())
    }

    async fn enqueue(&self, queue: &str, jobid: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .members
            .get(queue)
            .map(|m| m.contains(jobid))
            .unwrap_or(false)
        {
            return Ok(false);
        }
        if MemoryStore::working_is_live(&inner, queue, jobid) {
            return Ok(false);
        }

        inner
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_front(jobid.to_string());
        inner
            .members
            .entry(queue.to_string())
            .or_default()
            .insert(jobid.to_string());
        let value = format!("ENQ:{}", now.timestamp());
        inner.statuses.insert(jobid.to_string(), value);
        Ok(true)
    }

    async fn consume(
        &self,
        queue: &str,
        timeout: Duration,
        now: DateTime<Utc>,
        jobtag: &str,
    ) -> Result<Option<String>> {
        let mut inner = self.inner.lock().unwrap();
        let jobid = match inner.queues.get_mut(queue).and_then(|q| q.pop_back()) {
            Some(j) => j,
            None => return Ok(None),
        };

        if let Some(members) = inner.members.get_mut(queue) {
            members.remove(&jobid);
        }

        let expires = Instant::now() + timeout;
        inner
            .working
            .insert((queue.to_string(), jobid.clone()), (jobtag.to_string(), expires));
        let value = format!("WRK:{}", now.timestamp());
        inner.statuses.insert(jobid.clone(), value);

        Ok(Some(jobid))
    }

    async fn remove_from_queue(&self, queue: &str, jobid: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(q) = inner.queues.get_mut(queue) {
            if let Some(pos) = q.iter().position(|j| j == jobid) {
                q.remove(pos);
            }
        }
        if let Some(members) = inner.members.get_mut(queue) {
            members.remove(jobid);
        }
        Ok(())
    }

    async fn recycle(&self, queue: &str, jobid: &str, jobtag: &str) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let key = (queue.to_string(), jobid.to_string());
        let live = MemoryStore::working_is_live(&inner, queue, jobid);
        match inner.working.get(&key) {
            Some((tag, _)) if live && tag == jobtag => {
                inner.working.remove(&key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn force_recycle(&self, queue: &str, jobid: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .working
            .remove(&(queue.to_string(), jobid.to_string()));
        Ok(())
    }

    async fn is_working(&self, queue: &str, jobid: &str) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(MemoryStore::working_is_live(&inner, queue, jobid))
    }

    async fn set_control(&self, value: &str) -> Result<()> {
        self.inner.lock().unwrap().control = Some(value.to_string());
        Ok(())
    }

    async fn get_control(&self) -> Result<Option<String>> {
        Ok(self.inner.lock().unwrap().control.clone())
    }

    async fn clear_control(&self) -> Result<()> {
        self.inner.lock().unwrap().control = None;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        *inner = Inner::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn ts(secs: i64) -> DateTime<Utc> {
        use chrono::TimeZone;
        Utc.timestamp(secs, 0)
    }

    #[tokio::test]
    async fn dedups_enqueue_while_queued() {
        let store = MemoryStore::new();
        assert!(store.enqueue("work-A", "job:1", ts(0)).await.unwrap());
        assert!(!store.enqueue("work-A", "job:1", ts(1)).await.unwrap());
    }

    #[tokio::test]
    async fn consume_claims_and_marks_working() {
        let store = MemoryStore::new();
        store.enqueue("work-A", "job:1", ts(0)).await.unwrap();
        let claimed = store
            .consume("work-A", StdDuration::from_secs(10), ts(1), "tag-1")
            .await
            .unwrap();
        assert_eq!(claimed.as_deref(), Some("job:1"));
        assert!(store.is_working("work-A", "job:1").await.unwrap());
        // Cannot be enqueued again while working.
        assert!(!store.enqueue("work-A", "job:1", ts(2)).await.unwrap());
    }

    #[tokio::test]
    async fn recycle_requires_matching_tag() {
        let store = MemoryStore::new();
        store.enqueue("work-A", "job:1", ts(0)).await.unwrap();
        store
            .consume("work-A", StdDuration::from_secs(10), ts(1), "tag-1")
            .await
            .unwrap();

        assert!(!store.recycle("work-A", "job:1", "wrong-tag").await.unwrap());
        assert!(store.recycle("work-A", "job:1", "tag-1").await.unwrap());
        assert!(!store.is_working("work-A", "job:1").await.unwrap());
    }

    #[tokio::test]
    async fn working_marker_expires() {
        let store = MemoryStore::new();
        store.enqueue("work-A", "job:1", ts(0)).await.unwrap();
        store
            .consume("work-A", StdDuration::from_millis(10), ts(1), "tag-1")
            .await
            .unwrap();
        tokio::time::sleep(StdDuration::from_millis(30)).await;
        assert!(!store.is_working("work-A", "job:1").await.unwrap());
        assert!(!store.recycle("work-A", "job:1", "tag-1").await.unwrap());
    }
}
