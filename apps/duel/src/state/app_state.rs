use std::sync::Arc;

use crate::clock::Clock;
use crate::config::GameSettings;
use crate::services::matchmaking::Matchmaker;
use crate::services::notify::{Notifier, Outbox};
use crate::store::SessionStore;
use crate::timers::TimerRegistry;

/// Shared handles every worker and inbound handler clones.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub timers: Arc<dyn TimerRegistry>,
    pub notifier: Arc<dyn Notifier>,
    pub matchmaker: Arc<dyn Matchmaker>,
    pub clock: Arc<dyn Clock>,
    pub settings: GameSettings,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SessionStore>,
        timers: Arc<dyn TimerRegistry>,
        notifier: Arc<dyn Notifier>,
        matchmaker: Arc<dyn Matchmaker>,
        clock: Arc<dyn Clock>,
        settings: GameSettings,
    ) -> Self {
        Self {
            store,
            timers,
            notifier,
            matchmaker,
            clock,
            settings,
        }
    }

    pub fn outbox(&self) -> Outbox {
        Outbox::new(self.notifier.clone())
    }
}
