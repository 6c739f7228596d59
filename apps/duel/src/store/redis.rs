use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::debug;

use super::{player_key, session_key, ttl_secs, CasOutcome, OpenOutcome, SessionStore};
use crate::domain::session::{SessionId, SessionState, UserId};
use crate::error::AppError;

/// Write only when the stored record still carries the expected version.
/// Returns -1 when the key is absent, 0 on a version mismatch, 1 on success.
const COMPARE_AND_SWAP: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    return -1
end
local decoded = cjson.decode(current)
if tonumber(decoded['version']) ~= tonumber(ARGV[1]) then
    return 0
end
redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
return 1
"#;

/// KEYS: session, first player pointer, second player pointer.
/// ARGV: session JSON, ttl, session id, session key prefix.
/// Returns -1/-2 when the first/second player is bound to a running session,
/// 0 when a running record already sits under KEYS[1], 1 once all three keys
/// are written.
const OPEN_SESSION: &str = r#"
local function running(key)
    local raw = redis.call('GET', key)
    if not raw then
        return false
    end
    return cjson.decode(raw)['status'] ~= 'finished'
end
for i = 2, 3 do
    local bound = redis.call('GET', KEYS[i])
    if bound and running(ARGV[4] .. bound) then
        return 1 - i
    end
end
if running(KEYS[1]) then
    return 0
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])
redis.call('SET', KEYS[2], ARGV[3], 'EX', ARGV[2])
redis.call('SET', KEYS[3], ARGV[3], 'EX', ARGV[2])
return 1
"#;

#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
    cas: Script,
    open: Script,
}

impl RedisSessionStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            cas: Script::new(COMPARE_AND_SWAP),
            open: Script::new(OPEN_SESSION),
        }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn put(&self, state: &SessionState, ttl: Duration) -> Result<(), AppError> {
        let encoded = serde_json::to_string(state)?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(session_key(&state.session_id), encoded, ttl_secs(ttl))
            .await?;
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, AppError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(session_key(session_id)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, session_id: &str) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(session_key(session_id)).await?;
        Ok(removed > 0)
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        state: &SessionState,
        ttl: Duration,
    ) -> Result<CasOutcome, AppError> {
        let encoded = serde_json::to_string(state)?;
        let mut conn = self.conn.clone();
        let result: i64 = self
            .cas
            .key(session_key(&state.session_id))
            .arg(expected_version)
            .arg(encoded)
            .arg(ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await?;
        let outcome = match result {
            1 => CasOutcome::Swapped,
            0 => CasOutcome::Conflict,
            _ => CasOutcome::Missing,
        };
        debug!(
            session_id = %state.session_id,
            expected_version,
            ?outcome,
            "Session compare-and-swap"
        );
        Ok(outcome)
    }

    async fn open_session(
        &self,
        state: &SessionState,
        ttl: Duration,
    ) -> Result<OpenOutcome, AppError> {
        let encoded = serde_json::to_string(state)?;
        let [first, second] = state.player_ids();
        let mut conn = self.conn.clone();
        let result: i64 = self
            .open
            .key(session_key(&state.session_id))
            .key(player_key(first))
            .key(player_key(second))
            .arg(encoded)
            .arg(ttl_secs(ttl))
            .arg(&state.session_id)
            .arg(session_key(""))
            .invoke_async(&mut conn)
            .await?;
        let outcome = match result {
            1 => OpenOutcome::Opened,
            -1 => OpenOutcome::Busy(first),
            -2 => OpenOutcome::Busy(second),
            _ => OpenOutcome::AlreadyOpen,
        };
        debug!(session_id = %state.session_id, ?outcome, "Session open");
        Ok(outcome)
    }

    async fn session_of(&self, user_id: UserId) -> Result<Option<SessionId>, AppError> {
        let mut conn = self.conn.clone();
        let session_id: Option<String> = conn.get(player_key(user_id)).await?;
        Ok(session_id)
    }

    async fn unbind_player(&self, user_id: UserId) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(player_key(user_id)).await?;
        Ok(())
    }
}
