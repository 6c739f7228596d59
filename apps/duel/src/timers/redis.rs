//! Redis timer registry: sorted set `game_timers` scored by `next_tick`,
//! hash `game_timers:index` holding the live member per `<session>:<timer>`.
//!
//! Every write that touches both structures runs as one Lua script.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::{debug, warn};

use super::{index_field, TimerEntry, TimerRegistry, TIMERS_INDEX_KEY, TIMERS_KEY};
use crate::clock::Clock;
use crate::error::AppError;

/// KEYS: zset, index. ARGV: field, member, score.
const SCHEDULE: &str = r#"
if redis.call('HSETNX', KEYS[2], ARGV[1], ARGV[2]) == 0 then
    return 0
end
redis.call('ZADD', KEYS[1], ARGV[3], ARGV[2])
return 1
"#;

/// KEYS: zset, index. ARGV: field, old member, new member, new score.
const RESCHEDULE: &str = r#"
redis.call('ZREM', KEYS[1], ARGV[2])
if redis.call('HGET', KEYS[2], ARGV[1]) ~= ARGV[2] then
    return 0
end
redis.call('ZADD', KEYS[1], ARGV[4], ARGV[3])
redis.call('HSET', KEYS[2], ARGV[1], ARGV[3])
return 1
"#;

/// KEYS: zset, index. ARGV: field, member.
const REMOVE: &str = r#"
redis.call('ZREM', KEYS[1], ARGV[2])
if redis.call('HGET', KEYS[2], ARGV[1]) == ARGV[2] then
    redis.call('HDEL', KEYS[2], ARGV[1])
    return 1
end
return 0
"#;

/// KEYS: zset, index. ARGV: field.
const CANCEL: &str = r#"
local current = redis.call('HGET', KEYS[2], ARGV[1])
if not current then
    return 0
end
redis.call('ZREM', KEYS[1], current)
redis.call('HDEL', KEYS[2], ARGV[1])
return 1
"#;

/// KEYS: zset, index. ARGV: field, member. Drops the pointer unless it is live.
const DROP_STALE: &str = r#"
if redis.call('HGET', KEYS[2], ARGV[1]) == ARGV[2] then
    return 0
end
redis.call('ZREM', KEYS[1], ARGV[2])
return 1
"#;

#[derive(Clone)]
pub struct RedisTimerRegistry {
    conn: ConnectionManager,
    clock: Arc<dyn Clock>,
    schedule: Script,
    reschedule: Script,
    remove: Script,
    cancel: Script,
    drop_stale: Script,
}

impl RedisTimerRegistry {
    pub fn new(conn: ConnectionManager, clock: Arc<dyn Clock>) -> Self {
        Self {
            conn,
            clock,
            schedule: Script::new(SCHEDULE),
            reschedule: Script::new(RESCHEDULE),
            remove: Script::new(REMOVE),
            cancel: Script::new(CANCEL),
            drop_stale: Script::new(DROP_STALE),
        }
    }
}

#[async_trait]
impl TimerRegistry for RedisTimerRegistry {
    async fn schedule(
        &self,
        session_id: &str,
        timer_name: &str,
        frequency: Duration,
        timeout: Duration,
    ) -> Result<bool, AppError> {
        let entry = TimerEntry::new(
            session_id,
            timer_name,
            frequency,
            timeout,
            self.clock.unix_now(),
        );
        let mut conn = self.conn.clone();
        let created: i64 = self
            .schedule
            .key(TIMERS_KEY)
            .key(TIMERS_INDEX_KEY)
            .arg(entry.index_field())
            .arg(entry.encode()?)
            .arg(entry.next_tick)
            .invoke_async(&mut conn)
            .await?;
        debug!(session_id, timer_name, created = created == 1, "Timer schedule");
        Ok(created == 1)
    }

    async fn due(&self, now: f64) -> Result<Vec<TimerEntry>, AppError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.zrangebyscore(TIMERS_KEY, "-inf", now).await?;

        let mut due = Vec::with_capacity(members.len());
        for member in members {
            match TimerEntry::decode(&member) {
                Ok(entry) => {
                    let dropped: i64 = self
                        .drop_stale
                        .key(TIMERS_KEY)
                        .key(TIMERS_INDEX_KEY)
                        .arg(entry.index_field())
                        .arg(&member)
                        .invoke_async(&mut conn)
                        .await?;
                    if dropped == 0 {
                        due.push(entry);
                    } else {
                        debug!(field = %entry.index_field(), "Dropped stale timer pointer");
                    }
                }
                Err(err) => {
                    warn!(member = %member, error = %err, "Purging malformed timer entry");
                    let _: i64 = conn.zrem(TIMERS_KEY, &member).await?;
                }
            }
        }
        Ok(due)
    }

    async fn reschedule(&self, entry: &TimerEntry, next_tick: f64) -> Result<bool, AppError> {
        let next = entry.with_next_tick(next_tick);
        let mut conn = self.conn.clone();
        let replaced: i64 = self
            .reschedule
            .key(TIMERS_KEY)
            .key(TIMERS_INDEX_KEY)
            .arg(entry.index_field())
            .arg(entry.encode()?)
            .arg(next.encode()?)
            .arg(next_tick)
            .invoke_async(&mut conn)
            .await?;
        Ok(replaced == 1)
    }

    async fn remove(&self, entry: &TimerEntry) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .remove
            .key(TIMERS_KEY)
            .key(TIMERS_INDEX_KEY)
            .arg(entry.index_field())
            .arg(entry.encode()?)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed == 1)
    }

    async fn lookup(
        &self,
        session_id: &str,
        timer_name: &str,
    ) -> Result<Option<TimerEntry>, AppError> {
        let mut conn = self.conn.clone();
        let member: Option<String> = conn
            .hget(TIMERS_INDEX_KEY, index_field(session_id, timer_name))
            .await?;
        member.map(|m| TimerEntry::decode(&m)).transpose()
    }

    async fn cancel(&self, session_id: &str, timer_name: &str) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let cancelled: i64 = self
            .cancel
            .key(TIMERS_KEY)
            .key(TIMERS_INDEX_KEY)
            .arg(index_field(session_id, timer_name))
            .invoke_async(&mut conn)
            .await?;
        Ok(cancelled == 1)
    }

    async fn repair(&self) -> Result<usize, AppError> {
        let mut conn = self.conn.clone();
        let index: Vec<(String, String)> = conn.hgetall(TIMERS_INDEX_KEY).await?;

        let mut restored = 0;
        for (field, member) in index {
            let score: Option<f64> = conn.zscore(TIMERS_KEY, &member).await?;
            if score.is_some() {
                continue;
            }
            match TimerEntry::decode(&member) {
                Ok(entry) => {
                    let _: i64 = conn.zadd(TIMERS_KEY, &member, entry.next_tick).await?;
                    restored += 1;
                }
                Err(err) => {
                    warn!(field = %field, error = %err, "Dropping malformed timer index entry");
                    let _: i64 = conn.hdel(TIMERS_INDEX_KEY, &field).await?;
                }
            }
        }
        if restored > 0 {
            warn!(restored, "Restored missing timer pointers");
        }
        Ok(restored)
    }
}
