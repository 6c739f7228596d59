//! Timer registry: a schedule of pending timer entries shared by all workers.
//!
//! Two structures back it:
//! - an ordered set of encoded entries scored by `next_tick`, answering
//!   "everything due by T";
//! - an index keyed by `<session_id>:<timer_name>` holding the live entry,
//!   used for existence checks, lookup and cancel.
//!
//! The index is the source of truth. An ordered-set member whose index slot
//! holds a different value is a stale pointer and is dropped when seen; an
//! index slot without a pointer is regenerated by [`TimerRegistry::repair`].
//! `reschedule` and `remove` name the exact member they replace, so a second
//! worker acting on an entry that is already gone gets a harmless `false`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub mod memory;
pub mod redis;

pub use self::memory::MemoryTimerRegistry;
pub use self::redis::RedisTimerRegistry;

pub const TIMERS_KEY: &str = "game_timers";
pub const TIMERS_INDEX_KEY: &str = "game_timers:index";

/// One scheduled re-evaluation of a session's waiting condition.
/// Times are absolute unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerEntry {
    pub session_id: String,
    pub timer_name: String,
    /// Seconds between ticks.
    pub frequency: f64,
    pub expire_at: f64,
    pub next_tick: f64,
}

impl TimerEntry {
    pub fn new(
        session_id: &str,
        timer_name: &str,
        frequency: Duration,
        timeout: Duration,
        now: f64,
    ) -> Self {
        let frequency = frequency.as_secs_f64();
        Self {
            session_id: session_id.to_string(),
            timer_name: timer_name.to_string(),
            frequency,
            expire_at: now + timeout.as_secs_f64(),
            next_tick: now + frequency,
        }
    }

    pub fn index_field(&self) -> String {
        index_field(&self.session_id, &self.timer_name)
    }

    /// Reaching or passing `expire_at` turns a tick into a timeout.
    pub fn is_expired(&self, now: f64) -> bool {
        now >= self.expire_at
    }

    pub fn time_remaining(&self, now: f64) -> f64 {
        (self.expire_at - now).max(0.0)
    }

    pub fn with_next_tick(&self, next_tick: f64) -> Self {
        Self {
            next_tick,
            ..self.clone()
        }
    }

    /// Canonical member encoding; both structures store exactly this string.
    pub fn encode(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(raw)?)
    }
}

pub fn index_field(session_id: &str, timer_name: &str) -> String {
    format!("{session_id}:{timer_name}")
}

#[async_trait]
pub trait TimerRegistry: Send + Sync {
    /// Arm `(session_id, timer_name)`. Returns false, changing nothing, when
    /// that pair already has a live entry.
    async fn schedule(
        &self,
        session_id: &str,
        timer_name: &str,
        frequency: Duration,
        timeout: Duration,
    ) -> Result<bool, AppError>;

    /// Live entries with `next_tick <= now`, earliest first. Malformed
    /// members and stale pointers are purged along the way.
    async fn due(&self, now: f64) -> Result<Vec<TimerEntry>, AppError>;

    /// Atomically replace `entry` by a copy ticking next at `next_tick`.
    /// False when `entry` is no longer the live one.
    async fn reschedule(&self, entry: &TimerEntry, next_tick: f64) -> Result<bool, AppError>;

    /// Remove `entry`. Removing something already gone is not an error.
    async fn remove(&self, entry: &TimerEntry) -> Result<bool, AppError>;

    async fn lookup(&self, session_id: &str, timer_name: &str)
        -> Result<Option<TimerEntry>, AppError>;

    /// Remove whatever entry is live for the pair.
    async fn cancel(&self, session_id: &str, timer_name: &str) -> Result<bool, AppError>;

    /// Regenerate missing ordered-set pointers from the index. Returns the
    /// number of pointers restored.
    async fn repair(&self) -> Result<usize, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_deadlines() {
        let e = TimerEntry::new(
            "1:2",
            "hands_completion",
            Duration::from_secs(2),
            Duration::from_secs(10),
            100.0,
        );
        assert_eq!(e.next_tick, 102.0);
        assert_eq!(e.expire_at, 110.0);
        assert_eq!(e.index_field(), "1:2:hands_completion");
        assert!(!e.is_expired(109.9));
        assert!(e.is_expired(110.0));
        assert_eq!(e.time_remaining(104.0), 6.0);
    }

    #[test]
    fn encoding_is_stable() {
        let e = TimerEntry::new("1:2", "t", Duration::from_secs(1), Duration::from_secs(3), 5.5);
        let raw = e.encode().unwrap();
        assert_eq!(TimerEntry::decode(&raw).unwrap().encode().unwrap(), raw);
        assert!(raw.contains("\"next_tick\":6.5"));
    }
}
