use lazy_static::lazy_static;

use crate::error::Result;

// Atomically move a job onto a queue's pending list, enforcing invariant 1
// (a job is never simultaneously queued, timelined, and working) and
// invariant 2 (the list and its members set stay in lockstep).
//
// KEYS:
//  1. queue pending list
//  2. queue members set
//  3. statuses hash
//  4. working marker key for (queue, jobid)
// ARGV:
//  1. job id
//  2. current unix timestamp (seconds)
const ENQUEUE_SCRIPT: &str = r##"
    if redis.call("SISMEMBER", KEYS[2], ARGV[1]) == 1 then
        return 0
    end
    if redis.call("EXISTS", KEYS[4]) == 1 then
        return 0
    end

    redis.call("LPUSH", KEYS[1], ARGV[1])
    redis.call("SADD", KEYS[2], ARGV[1])
    redis.call("HSET", KEYS[3], ARGV[1], "ENQ:" .. ARGV[2])
    return ARGV[2]
"##;

lazy_static! {
    static ref SCRIPT: redis::Script = redis::Script::new(ENQUEUE_SCRIPT);
}

pub struct EnqueueScript(&'static redis::Script);

impl EnqueueScript {
    pub fn new() -> Self {
        EnqueueScript(&SCRIPT)
    }

    /// Returns `true` if the job was actually pushed, `false` if it was a
    /// dedup no-op (already queued or currently working).
    pub async fn run(
        &self,
        conn: &mut deadpool_redis::Connection,
        queue_list: &str,
        members_set: &str,
        statuses_hash: &str,
        working_key: &str,
        jobid: &str,
        now_ts: i64,
    ) -> Result<bool> {
        let result: i64 = self
            .0
            .key(queue_list)
            .key(members_set)
            .key(statuses_hash)
            .key(working_key)
            .arg(jobid)
            .arg(now_ts)
            .invoke_async(&mut **conn)
            .await?;

        Ok(result != 0)
    }
}

impl Default for EnqueueScript {
    fn default() -> Self {
        Self::new()
    }
}
