#![deny(clippy::wildcard_imports)]
#![cfg_attr(test, allow(clippy::wildcard_imports))]

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod errors;
pub mod infra;
pub mod services;
pub mod state;
pub mod store;
pub mod timers;
pub mod transport;
pub mod worker;

#[cfg(test)]
pub mod test_bootstrap;

// Re-exports for public API
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, GameSettings};
pub use dispatch::{stage_dispatcher, Dispatcher, TickOutcome, TimerHandler};
pub use error::AppError;
pub use infra::state::build_state;
pub use services::game_flow::{BotRound, Ending, GameFlowService, MatchOutcome, MoveOutcome};
pub use state::app_state::AppState;
pub use worker::{Worker, WorkerPool};

// Auto-initialize logging for unit tests
#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    test_bootstrap::logging::init();
}
