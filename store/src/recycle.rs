use lazy_static::lazy_static;

use crate::error::Result;

// Atomically clear a Working marker iff its value is still our jobtag.
// Mirrors `queues/job_done.rs`'s "check the expected value, then act" shape.
//
// KEYS:
//  1. working marker key
// ARGV:
//  1. jobtag we expect to hold
const RECYCLE_SCRIPT: &str = r##"
    local current = redis.call("GET", KEYS[1])
    if current == ARGV[1] then
        redis.call("DEL", KEYS[1])
        return 1
    end
    return 0
"##;

lazy_static! {
    static ref SCRIPT: redis::Script = redis::Script::new(RECYCLE_SCRIPT);
}

pub struct RecycleScript(&'static redis::Script);

impl RecycleScript {
    pub fn new() -> Self {
        RecycleScript(&SCRIPT)
    }

    /// Returns `true` iff the caller held the marker and it was cleared.
    pub async fn run(
        &self,
        conn: &mut deadpool_redis::Connection,
        working_key: &str,
        jobtag: &str,
    ) -> Result<bool> {
        let result: i64 = self
            .0
            .key(working_key)
            .arg(jobtag)
            .invoke_async(&mut **conn)
            .await?;

        Ok(result != 0)
    }
}

impl Default for RecycleScript {
    fn default() -> Self {
        Self::new()
    }
}
