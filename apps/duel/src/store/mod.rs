//! Session store: authoritative per-session game state with expiry.
//!
//! Every operation is atomic for a single key; callers never need multi-key
//! transactions. Read-check-act writes go through [`SessionStore::compare_and_swap`]
//! keyed on [`SessionState::version`], which is also what makes session
//! termination exactly-once across workers.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::session::{SessionId, SessionState, UserId};
use crate::error::AppError;

pub mod memory;
pub mod redis;

pub use self::memory::MemorySessionStore;
pub use self::redis::RedisSessionStore;

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The stored version matched and the new state was written.
    Swapped,
    /// Someone else committed first.
    Conflict,
    /// Nothing stored under the key (deleted or expired).
    Missing,
}

/// Result of opening a fresh session for a pair of players.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Record written and both player pointers claimed.
    Opened,
    /// This player is bound to a session that is still running.
    Busy(UserId),
    /// A running record already sits under the session id.
    AlreadyOpen,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Unconditional write keyed by `state.session_id`.
    async fn put(&self, state: &SessionState, ttl: Duration) -> Result<(), AppError>;

    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, AppError>;

    /// Returns true only for the call that actually removed the record.
    async fn delete(&self, session_id: &str) -> Result<bool, AppError>;

    /// Write `state` only if the stored record still has `expected_version`.
    async fn compare_and_swap(
        &self,
        expected_version: u64,
        state: &SessionState,
        ttl: Duration,
    ) -> Result<CasOutcome, AppError>;

    /// Write a new session and point both players' `player:<id>` at it, all
    /// or nothing. Refused while either player, or the session id itself, is
    /// held by an unfinished session; finished leftovers are overwritten.
    async fn open_session(&self, state: &SessionState, ttl: Duration)
        -> Result<OpenOutcome, AppError>;

    async fn session_of(&self, user_id: UserId) -> Result<Option<SessionId>, AppError>;

    async fn unbind_player(&self, user_id: UserId) -> Result<(), AppError>;
}

pub fn session_key(session_id: &str) -> String {
    format!("session:{session_id}")
}

pub fn player_key(user_id: UserId) -> String {
    format!("player:{user_id}")
}

/// Redis `EX` takes whole seconds and rejects zero.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
