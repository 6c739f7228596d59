use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::Client;

use crate::clock::{Clock, SystemClock};
use crate::config::GameSettings;
use crate::error::AppError;
use crate::errors::ErrorCode;
use crate::services::matchmaking::{Matchmaker, MemoryPresence};
use crate::services::notify::{LogNotifier, Notifier};
use crate::state::app_state::AppState;
use crate::store::{MemorySessionStore, RedisSessionStore, SessionStore};
use crate::timers::{MemoryTimerRegistry, RedisTimerRegistry, TimerRegistry};
use crate::transport::{RedisNotifier, RedisPresence};

/// Builder for creating AppState instances (used in both tests and main)
pub struct StateBuilder {
    settings: GameSettings,
    clock: Arc<dyn Clock>,
    redis_url: Option<String>,
    notifier: Option<Arc<dyn Notifier>>,
    matchmaker: Option<Arc<dyn Matchmaker>>,
}

impl StateBuilder {
    pub fn new() -> Self {
        Self {
            settings: GameSettings::default(),
            clock: Arc::new(SystemClock),
            redis_url: None,
            notifier: None,
            matchmaker: None,
        }
    }

    /// Back the store, registry, presence and notifications with Redis.
    pub fn with_redis(mut self, redis_url: impl Into<String>) -> Self {
        self.redis_url = Some(redis_url.into());
        self
    }

    pub fn with_settings(mut self, settings: GameSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_matchmaker(mut self, matchmaker: Arc<dyn Matchmaker>) -> Self {
        self.matchmaker = Some(matchmaker);
        self
    }

    pub async fn build(self) -> Result<AppState, AppError> {
        self.settings.validate()?;
        match self.redis_url.clone() {
            Some(url) => self.build_redis(&url).await,
            None => Ok(self.build_in_memory()),
        }
    }

    fn build_in_memory(self) -> AppState {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new(self.clock.clone()));
        let timers: Arc<dyn TimerRegistry> =
            Arc::new(MemoryTimerRegistry::new(self.clock.clone()));
        let notifier: Arc<dyn Notifier> = match self.notifier {
            Some(notifier) => notifier,
            None => Arc::new(LogNotifier),
        };
        let matchmaker: Arc<dyn Matchmaker> = match self.matchmaker {
            Some(matchmaker) => matchmaker,
            None => Arc::new(MemoryPresence::new(
                self.clock.clone(),
                self.settings.presence_window,
            )),
        };
        AppState::new(store, timers, notifier, matchmaker, self.clock, self.settings)
    }

    async fn build_redis(self, redis_url: &str) -> Result<AppState, AppError> {
        let client = Client::open(redis_url).map_err(|err| AppError::Config {
            detail: format!("Invalid REDIS_URL: {err}"),
            source: Box::new(err),
        })?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|err| AppError::Internal {
                code: ErrorCode::StoreUnavailable,
                detail: "Unable to initialize Redis connection manager".to_string(),
                source: Box::new(err),
            })?;

        let store: Arc<dyn SessionStore> = Arc::new(RedisSessionStore::new(conn.clone()));
        let timers: Arc<dyn TimerRegistry> =
            Arc::new(RedisTimerRegistry::new(conn.clone(), self.clock.clone()));
        let notifier: Arc<dyn Notifier> = match self.notifier {
            Some(notifier) => notifier,
            None => Arc::new(RedisNotifier::new(conn.clone())),
        };
        let matchmaker: Arc<dyn Matchmaker> = match self.matchmaker {
            Some(matchmaker) => matchmaker,
            None => Arc::new(RedisPresence::new(
                conn,
                self.clock.clone(),
                self.settings.presence_window,
            )),
        };
        Ok(AppState::new(
            store,
            timers,
            notifier,
            matchmaker,
            self.clock,
            self.settings,
        ))
    }
}

impl Default for StateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn build_state() -> StateBuilder {
    StateBuilder::new()
}
