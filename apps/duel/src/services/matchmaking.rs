//! Online-presence seam used to find an opponent.
//!
//! A user is online for a fixed window after their last inbound event.
//! Anyone not seen within the window is pruned before a pick, so matchmaking
//! never hands out users who have already left.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::seq::IteratorRandom;
use time::OffsetDateTime;

use crate::clock::Clock;
use crate::domain::session::UserId;
use crate::error::AppError;

#[async_trait]
pub trait Matchmaker: Send + Sync {
    /// A random online user other than `excluding`, if any.
    async fn pick_random_online(&self, excluding: UserId) -> Result<Option<UserId>, AppError>;

    /// Record activity: the user stays pickable for one more window.
    async fn mark_online(&self, user_id: UserId) -> Result<(), AppError>;

    async fn mark_offline(&self, user_id: UserId) -> Result<(), AppError>;
}

/// Presence held in process memory, keyed by last-seen time.
pub struct MemoryPresence {
    last_seen: Mutex<BTreeMap<UserId, OffsetDateTime>>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl MemoryPresence {
    pub fn new(clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            last_seen: Mutex::new(BTreeMap::new()),
            clock,
            window,
        }
    }

    /// Presence with `users` seen just now.
    pub fn with_users(
        clock: Arc<dyn Clock>,
        window: Duration,
        users: impl IntoIterator<Item = UserId>,
    ) -> Self {
        let presence = Self::new(clock, window);
        let now = presence.clock.now();
        presence
            .last_seen
            .lock()
            .extend(users.into_iter().map(|id| (id, now)));
        presence
    }

    pub fn online_count(&self) -> usize {
        self.last_seen.lock().len()
    }
}

#[async_trait]
impl Matchmaker for MemoryPresence {
    async fn pick_random_online(&self, excluding: UserId) -> Result<Option<UserId>, AppError> {
        let cutoff = self.clock.now() - self.window;
        let mut last_seen = self.last_seen.lock();
        last_seen.retain(|_, seen| *seen > cutoff);
        Ok(last_seen
            .keys()
            .copied()
            .filter(|id| *id != excluding)
            .choose(&mut rand::rng()))
    }

    async fn mark_online(&self, user_id: UserId) -> Result<(), AppError> {
        let now = self.clock.now();
        self.last_seen.lock().insert(user_id, now);
        Ok(())
    }

    async fn mark_offline(&self, user_id: UserId) -> Result<(), AppError> {
        self.last_seen.lock().remove(&user_id);
        Ok(())
    }
}
