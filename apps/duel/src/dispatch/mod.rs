//! Tick dispatcher: routes due timer entries to the handler registered under
//! their timer name.
//!
//! A handler gets two entry points. `on_tick` runs while the deadline is
//! still ahead; `on_timeout` runs once it has passed and must be idempotent,
//! since a worker that dies before removing the entry leaves it for another
//! worker to run again.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::AppError;
use crate::services::game_flow::GameFlowService;

mod stage;

pub use self::stage::StageTimer;

/// What a tick asks the worker to do with its entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Keep waiting; reschedule at `now + frequency`.
    Continue,
    /// Nothing left to wait for; run the timeout path now.
    Settle,
}

#[async_trait]
pub trait TimerHandler: Send + Sync {
    async fn on_tick(&self, session_id: &str, time_remaining: f64)
        -> Result<TickOutcome, AppError>;

    /// Returns true when the entry can be removed.
    async fn on_timeout(&self, session_id: &str) -> Result<bool, AppError>;
}

#[derive(Default, Clone)]
pub struct Dispatcher {
    handlers: HashMap<String, Arc<dyn TimerHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `timer_name`, replacing any previous one.
    pub fn register(&mut self, timer_name: &str, handler: Arc<dyn TimerHandler>) -> &mut Self {
        self.handlers.insert(timer_name.to_string(), handler);
        self
    }

    /// Unknown names are a no-op that keeps the entry ticking.
    pub async fn dispatch_tick(
        &self,
        session_id: &str,
        timer_name: &str,
        time_remaining: f64,
    ) -> Result<TickOutcome, AppError> {
        match self.handlers.get(timer_name) {
            Some(handler) => handler.on_tick(session_id, time_remaining).await,
            None => {
                warn!(session_id, timer_name, "No tick handler registered");
                Ok(TickOutcome::Continue)
            }
        }
    }

    /// Unknown names report "not done" so the entry stays and is retried
    /// once a worker that knows the name picks it up.
    pub async fn dispatch_timeout(
        &self,
        session_id: &str,
        timer_name: &str,
    ) -> Result<bool, AppError> {
        match self.handlers.get(timer_name) {
            Some(handler) => handler.on_timeout(session_id).await,
            None => {
                warn!(session_id, timer_name, "No timeout handler registered");
                Ok(false)
            }
        }
    }
}

/// Dispatcher with one handler per game stage.
pub fn stage_dispatcher(flow: GameFlowService) -> Dispatcher {
    let mut dispatcher = Dispatcher::new();
    for stage in crate::domain::stage::Stage::ALL {
        dispatcher.register(
            stage.timer_name(),
            Arc::new(StageTimer::new(stage, flow.clone())),
        );
    }
    dispatcher
}
