use lazy_static::lazy_static;

use crate::error::Result;

// Atomically pop a job off a queue's pending list and claim it with a
// working marker. Reads job state then stamps a new TTL'd marker, folding
// the pop in too since a job here has no separate "processing list" to
// move into - the Working marker key itself is the processing record.
//
// KEYS:
//  1. queue pending list
//  2. queue members set
//  3. statuses hash
// ARGV:
//  1. working marker timeout, seconds
//  2. current unix timestamp, seconds
//  3. jobtag (opaque claim token)
//  4. working marker key prefix ("<prefix>-<queue_name>-"); the jobid popped
//     in this script is appended to form the full key.
const CONSUME_SCRIPT: &str = r##"
    local jobid = redis.call("RPOP", KEYS[1])
    if not jobid then
        return false
    end

    redis.call("SREM", KEYS[2], jobid)

    local working_key = ARGV[4] .. jobid
    redis.call("SET", working_key, ARGV[3], "EX", ARGV[1])
    redis.call("HSET", KEYS[3], jobid, "WRK:" .. ARGV[2])

    return jobid
"##;

lazy_static! {
    static ref SCRIPT: redis::Script = redis::Script::new(CONSUME_SCRIPT);
}

pub struct ConsumeScript(&'static redis::Script);

impl ConsumeScript {
    pub fn new() -> Self {
        ConsumeScript(&SCRIPT)
    }

    /// Returns `Some(jobid)` if a job was claimed, `None` if the queue was
    /// empty.
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        conn: &mut deadpool_redis::Connection,
        queue_list: &str,
        members_set: &str,
        statuses_hash: &str,
        working_key_prefix: &str,
        timeout_s: u64,
        now_ts: i64,
        jobtag: &str,
    ) -> Result<Option<String>> {
        let result: Option<String> = self
            .0
            .key(queue_list)
            .key(members_set)
            .key(statuses_hash)
            .arg(timeout_s)
            .arg(now_ts)
            .arg(jobtag)
            .arg(working_key_prefix)
            .invoke_async(&mut **conn)
            .await?;

        Ok(result.filter(|s| !s.is_empty()))
    }
}

impl Default for ConsumeScript {
    fn default() -> Self {
        Self::new()
    }
}
