//! Game flow orchestration service - bridges the pure session state machine
//! with the shared store, the timer registry and outward notifications.
//!
//! Every state change is a compare-and-swap on the session `version`, so any
//! number of workers and inbound handlers can drive the same session.

mod finish;
mod mutation;
mod pairing;
mod player_actions;
mod quick_game;
mod round_lifecycle;

use crate::services::notify::Outbox;
use crate::state::AppState;

pub use finish::Ending;
pub use pairing::MatchOutcome;
pub use player_actions::MoveOutcome;
pub use quick_game::BotRound;

/// Attempts at a read-modify-write before giving up with `COMMIT_CONFLICT`.
pub const MAX_COMMIT_ATTEMPTS: u32 = 5;

#[derive(Clone)]
pub struct GameFlowService {
    state: AppState,
    outbox: Outbox,
}

impl GameFlowService {
    pub fn new(state: AppState) -> Self {
        let outbox = state.outbox();
        Self { state, outbox }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}
