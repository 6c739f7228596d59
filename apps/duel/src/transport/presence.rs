//! Online presence kept in a Redis sorted set shared by every coordinator,
//! scored by each user's last-seen unix time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use crate::clock::Clock;
use crate::domain::session::UserId;
use crate::error::AppError;
use crate::services::matchmaking::Matchmaker;

pub const ONLINE_USERS_KEY: &str = "online_users";

/// KEYS: presence zset. ARGV: cutoff. Prunes everyone last seen at or before
/// the cutoff, then samples two distinct survivors.
const PICK_ONLINE: &str = r#"
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
return redis.call('ZRANDMEMBER', KEYS[1], 2)
"#;

#[derive(Clone)]
pub struct RedisPresence {
    conn: ConnectionManager,
    clock: Arc<dyn Clock>,
    window: Duration,
    pick: Script,
}

impl RedisPresence {
    pub fn new(conn: ConnectionManager, clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            conn,
            clock,
            window,
            pick: Script::new(PICK_ONLINE),
        }
    }
}

#[async_trait]
impl Matchmaker for RedisPresence {
    async fn pick_random_online(&self, excluding: UserId) -> Result<Option<UserId>, AppError> {
        let cutoff = self.clock.unix_now() - self.window.as_secs_f64();
        let mut conn = self.conn.clone();
        // two distinct members always contain one that isn't `excluding`
        let sample: Vec<UserId> = self
            .pick
            .key(ONLINE_USERS_KEY)
            .arg(cutoff)
            .invoke_async(&mut conn)
            .await?;
        Ok(sample.into_iter().find(|id| *id != excluding))
    }

    async fn mark_online(&self, user_id: UserId) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .zadd(ONLINE_USERS_KEY, user_id, self.clock.unix_now())
            .await?;
        Ok(())
    }

    async fn mark_offline(&self, user_id: UserId) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.zrem(ONLINE_USERS_KEY, user_id).await?;
        Ok(())
    }
}
