//! In-process session store backed by `DashMap`, with clock-driven expiry.
//!
//! Values are kept as the same JSON the Redis backend stores so both
//! backends decode through one path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use time::OffsetDateTime;

use super::{player_key, session_key, CasOutcome, OpenOutcome, SessionStore};
use crate::clock::Clock;
use crate::domain::session::{SessionId, SessionState, UserId};
use crate::error::AppError;

#[derive(Debug, Clone)]
struct Stored {
    value: String,
    expires_at: OffsetDateTime,
}

pub struct MemorySessionStore {
    entries: DashMap<String, Stored>,
    /// Serializes `open_session`, the only multi-key write.
    opening: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl MemorySessionStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            opening: Mutex::new(()),
            clock,
        }
    }

    fn stored(&self, value: String, ttl: Duration) -> Stored {
        Stored {
            value,
            expires_at: self.clock.now() + ttl,
        }
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        {
            let entry = self.entries.get(key)?;
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, stored| stored.expires_at <= now);
        None
    }

    fn holds_running_session(&self, session_id: &str) -> Result<bool, AppError> {
        match self.live_value(&session_key(session_id)) {
            Some(raw) => {
                let state: SessionState = serde_json::from_str(&raw)?;
                Ok(!state.is_finished())
            }
            None => Ok(false),
        }
    }

    /// Overwrite a raw value, bypassing serialization. Lets tests plant
    /// records the way a foreign writer would.
    pub fn put_raw(&self, key: &str, value: &str, ttl: Duration) {
        let stored = self.stored(value.to_string(), ttl);
        self.entries.insert(key.to_string(), stored);
    }
}

fn stored_version(raw: &str) -> Result<u64, AppError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    value
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| AppError::corrupted("session record has no version", "missing version"))
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, state: &SessionState, ttl: Duration) -> Result<(), AppError> {
        let encoded = serde_json::to_string(state)?;
        let stored = self.stored(encoded, ttl);
        self.entries.insert(session_key(&state.session_id), stored);
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, AppError> {
        match self.live_value(&session_key(session_id)) {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, session_id: &str) -> Result<bool, AppError> {
        let now = self.clock.now();
        let removed = self.entries.remove(&session_key(session_id));
        Ok(matches!(removed, Some((_, stored)) if stored.expires_at > now))
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        state: &SessionState,
        ttl: Duration,
    ) -> Result<CasOutcome, AppError> {
        let encoded = serde_json::to_string(state)?;
        let now = self.clock.now();
        match self.entries.entry(session_key(&state.session_id)) {
            Entry::Vacant(_) => Ok(CasOutcome::Missing),
            Entry::Occupied(entry) if entry.get().expires_at <= now => {
                entry.remove();
                Ok(CasOutcome::Missing)
            }
            Entry::Occupied(mut entry) => {
                if stored_version(&entry.get().value)? != expected_version {
                    return Ok(CasOutcome::Conflict);
                }
                entry.insert(Stored {
                    value: encoded,
                    expires_at: now + ttl,
                });
                Ok(CasOutcome::Swapped)
            }
        }
    }

    async fn open_session(
        &self,
        state: &SessionState,
        ttl: Duration,
    ) -> Result<OpenOutcome, AppError> {
        let encoded = serde_json::to_string(state)?;
        let _opening = self.opening.lock();
        for user_id in state.player_ids() {
            if let Some(bound) = self.live_value(&player_key(user_id)) {
                if self.holds_running_session(&bound)? {
                    return Ok(OpenOutcome::Busy(user_id));
                }
            }
        }
        if self.holds_running_session(&state.session_id)? {
            return Ok(OpenOutcome::AlreadyOpen);
        }

        self.entries
            .insert(session_key(&state.session_id), self.stored(encoded, ttl));
        for user_id in state.player_ids() {
            let pointer = self.stored(state.session_id.clone(), ttl);
            self.entries.insert(player_key(user_id), pointer);
        }
        Ok(OpenOutcome::Opened)
    }

    async fn session_of(&self, user_id: UserId) -> Result<Option<SessionId>, AppError> {
        Ok(self.live_value(&player_key(user_id)))
    }

    async fn unbind_player(&self, user_id: UserId) -> Result<(), AppError> {
        self.entries.remove(&player_key(user_id));
        Ok(())
    }
}
