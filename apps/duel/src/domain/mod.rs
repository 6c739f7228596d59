//! Domain layer: pure game logic types and helpers.

pub mod actions;
pub mod moves;
pub mod session;
pub mod stage;

// Re-exports for ergonomics
pub use actions::Action;
pub use moves::{resolve, resolve_round, resolve_two_hands, HandSlot, Move, Outcome, RoundHands};
pub use session::{
    generate_session_id, Applied, MessageRef, Phase, PlayerState, SessionId, SessionState,
    SessionStatus, UserId,
};
pub use stage::{evaluate, Completion, ConsentView, Evaluation, Stage};
