pub mod backend;
pub mod consume;
pub mod enqueue;
pub mod error;
pub mod memory;
pub mod pool;
pub mod recycle;

pub use backend::Backend;
pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use pool::RedisPool;

use chrono::{DateTime, TimeZone, Utc};
use redis::AsyncCommands;
use tracing::{event, Level};

/// Typed wrapper over the store's key/value + sorted-set operations.
///
/// Everything that touches more than one key under `<prefix>` and must stay
/// atomic goes through `enqueue`, `consume`, or `recycle`, each backed by a
/// server-side Lua script (see `enqueue.rs`/`consume.rs`/`recycle.rs`).
/// Single-key reads and writes (schedules, statuses, the control key, the
/// timeline) are plain commands - the caller tolerates brief interleavings
/// there.
#[derive(Clone)]
pub struct Store {
    pool: RedisPool,
    prefix: String,
    enqueue_script: std::sync::Arc<enqueue::EnqueueScript>,
    consume_script: std::sync::Arc<consume::ConsumeScript>,
    recycle_script: std::sync::Arc<recycle::RecycleScript>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub jobid: String,
    pub event: String,
    pub timestamp: i64,
}

impl Store {
    pub fn new(pool: RedisPool, prefix: impl Into<String>) -> Self {
        Store {
            pool,
            prefix: prefix.into(),
            enqueue_script: std::sync::Arc::new(enqueue::EnqueueScript::new()),
            consume_script: std::sync::Arc::new(consume::ConsumeScript::new()),
            recycle_script: std::sync::Arc::new(recycle::RecycleScript::new()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    // -- key helpers -----------------------------------------------------

    fn schedules_key(&self) -> String {
        format!("{}-schedules", self.prefix)
    }

    fn statuses_key(&self) -> String {
        format!("{}-statuses", self.prefix)
    }

    fn timeline_key(&self) -> String {
        format!("{}-timeline", self.prefix)
    }

    fn control_key(&self) -> String {
        format!("{}-control", self.prefix)
    }

    pub fn queue_list_key(&self, queue: &str) -> String {
        format!("{}-{}", self.prefix, queue)
    }

    pub fn queue_members_key(&self, queue: &str) -> String {
        format!("{}-{}-members", self.prefix, queue)
    }

    pub fn working_key(&self, queue: &str, jobid: &str) -> String {
        format!("{}-{}-{}", self.prefix, queue, jobid)
    }

    fn working_key_prefix(&self, queue: &str) -> String {
        format!("{}-{}-", self.prefix, queue)
    }

    // -- Schedules ---------------------------------------------------------

    pub async fn get_schedule(&self, jobid: &str) -> Result<Option<String>> {
        let mut conn = self.pool.get().await?;
        Ok(conn.hget(self.schedules_key(), jobid).await?)
    }

    pub async fn set_schedule(&self, jobid: &str, schedule: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        conn.hset(self.schedules_key(), jobid, schedule).await?;
        Ok(())
    }

    pub async fn delete_schedule(&self, jobid: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        conn.hdel(self.schedules_key(), jobid).await?;
        Ok(())
    }

    pub async fn get_schedules(&self) -> Result<Vec<(String, String)>> {
        let mut conn = self.pool.get().await?;
        let map: std::collections::HashMap<String, String> =
            conn.hgetall(self.schedules_key()).await?;
        Ok(map.into_iter().collect())
    }

    // -- Statuses ------------------------------------------------------------

    pub async fn set_status(&self, jobid: &str, event: &str, at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let value = format!("{}:{}", event, at.timestamp());
        conn.hset(self.statuses_key(), jobid, value).await?;
        Ok(())
    }

    pub async fn get_status(&self, jobid: &str) -> Result<Option<String>> {
        let mut conn = self.pool.get().await?;
        Ok(conn.hget(self.statuses_key(), jobid).await?)
    }

    pub async fn delete_status(&self, jobid: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        conn.hdel(self.statuses_key(), jobid).await?;
        Ok(())
    }

    pub async fn get_statuses(&self, before: DateTime<Utc>) -> Result<Vec<StatusEntry>> {
        let mut conn = self.pool.get().await?;
        let map: std::collections::HashMap<String, String> =
            conn.hgetall(self.statuses_key()).await?;

        let mut out = Vec::new();
        for (jobid, value) in map {
            let (event, ts) = parse_status_value(&value)?;
            if ts <= before.timestamp() {
                out.push(StatusEntry {
                    jobid,
                    event,
                    timestamp: ts,
                });
            }
        }
        Ok(out)
    }

    // -- Timeline --------------------------------------------------------

    pub async fn timeline_add(&self, jobid: &str, at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.pool.get().await?;
        conn.zadd(self.timeline_key(), jobid, at.timestamp())
            .await?;
        Ok(())
    }

    pub async fn timeline_remove(&self, jobid: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        conn.zrem(self.timeline_key(), jobid).await?;
        Ok(())
    }

    pub async fn timeline_score(&self, jobid: &str) -> Result<Option<DateTime<Utc>>> {
        let mut conn = self.pool.get().await?;
        let score: Option<i64> = conn.zscore(self.timeline_key(), jobid).await?;
        Ok(score.map(|s| Utc.timestamp(s, 0)))
    }

    /// All jobs timelined at or before `point_in_time`, oldest first.
    pub async fn timeline_due(&self, point_in_time: DateTime<Utc>) -> Result<Vec<String>> {
        let mut conn = self.pool.get().await?;
        Ok(conn
            .zrangebyscore(self.timeline_key(), 0, point_in_time.timestamp())
            .await?)
    }

    // -- Queues ------------------------------------------------------------

    /// Atomic enqueue; returns `false` if the job was already queued or
    /// working (invariant 1/2).
    pub async fn enqueue(&self, queue: &str, jobid: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        self.enqueue_script
            .run(
                &mut conn,
                &self.queue_list_key(queue),
                &self.queue_members_key(queue),
                &self.statuses_key(),
                &self.working_key(queue, jobid),
                jobid,
                now.timestamp(),
            )
            .await
    }

    /// Atomic consume + claim; returns the claimed job id, if any.
    pub async fn consume(
        &self,
        queue: &str,
        timeout: std::time::Duration,
        now: DateTime<Utc>,
        jobtag: &str,
    ) -> Result<Option<String>> {
        let mut conn = self.pool.get().await?;
        self.consume_script
            .run(
                &mut conn,
                &self.queue_list_key(queue),
                &self.queue_members_key(queue),
                &self.statuses_key(),
                &self.working_key_prefix(queue),
                timeout.as_secs().max(1),
                now.timestamp(),
                jobtag,
            )
            .await
    }

    /// Remove a job from a queue's list and members set without claiming
    /// it. Used by `unset`. Does not touch a live Working marker (per
    /// invariant 4 - only the holder's jobtag may clear that).
    pub async fn remove_from_queue(&self, queue: &str, jobid: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        conn.lrem(self.queue_list_key(queue), 1, jobid).await?;
        conn.srem(self.queue_members_key(queue), jobid).await?;
        Ok(())
    }

    /// Atomically release a Working marker iff `jobtag` is the value
    /// currently held. Returns `true` if we were still the owner.
    pub async fn recycle(&self, queue: &str, jobid: &str, jobtag: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        self.recycle_script
            .run(&mut conn, &self.working_key(queue, jobid), jobtag)
            .await
    }

    /// Unconditionally delete a Working marker, regardless of its value.
    /// Used when `unset`/`UnsetJob` must win even if another worker somehow
    /// still holds the marker.
    pub async fn force_recycle(&self, queue: &str, jobid: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        conn.del(self.working_key(queue, jobid)).await?;
        Ok(())
    }

    pub async fn is_working(&self, queue: &str, jobid: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        Ok(conn.exists(self.working_key(queue, jobid)).await?)
    }

    // -- Control plane -----------------------------------------------------

    pub async fn set_control(&self, value: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        conn.set(self.control_key(), value).await?;
        Ok(())
    }

    pub async fn get_control(&self) -> Result<Option<String>> {
        let mut conn = self.pool.get().await?;
        Ok(conn.get(self.control_key()).await?)
    }

    pub async fn clear_control(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;
        conn.del(self.control_key()).await?;
        Ok(())
    }

    /// Delete every key under `<prefix>-*`. Uses `SCAN` rather than `KEYS`
    /// so it's safe to run against a live, populated store.
    pub async fn flush(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let pattern = format!("{}-*", self.prefix);

        let mut cursor: u64 = 0;
        let mut deleted = 0usize;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(500)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                deleted += keys.len();
                conn.del(keys).await?;
            }

            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }

        event!(Level::INFO, prefix = %self.prefix, deleted, "flushed prefix");
        Ok(())
    }
}

pub(crate) fn parse_status_value(value: &str) -> Result<(String, i64)> {
    let (event, ts) = value
        .split_once(':')
        .ok_or_else(|| Error::MalformedStatus(value.to_string()))?;
    let ts: i64 = ts.parse()?;
    Ok((event.to_string(), ts))
}
