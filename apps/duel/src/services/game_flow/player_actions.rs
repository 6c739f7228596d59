use tracing::{debug, info};

use super::finish::{opponent_of, Ending};
use super::mutation::Mutated;
use super::GameFlowService;
use crate::domain::actions::Action;
use crate::domain::session::{Applied, Phase, SessionState, UserId};
use crate::domain::stage::Stage;
use crate::error::AppError;
use crate::errors::ErrorCode;
use crate::services::notify::{MessageKey, Payload, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Accepted(Applied),
    /// The player's cancel ended the game.
    Cancelled,
}

impl GameFlowService {
    /// Apply one player action to the player's current session.
    ///
    /// Unknown actions and actions illegal in the current phase are rejected
    /// without touching the session, and the player is told so.
    pub async fn submit_move(
        &self,
        user_id: UserId,
        action_name: &str,
    ) -> Result<MoveOutcome, AppError> {
        let action: Action = match action_name.parse() {
            Ok(action) => action,
            Err(err) => {
                self.tell(user_id, MessageKey::InvalidMoveChoice).await;
                return Err(err.into());
            }
        };
        debug!(user_id, action = action.name(), "Move submitted");

        let Some(session_id) = self.state.store.session_of(user_id).await? else {
            return Err(self.no_active_game(user_id, ErrorCode::NoActiveGame).await);
        };
        if action == Action::Cancel {
            return self.cancel_game(user_id, &session_id).await;
        }

        let mutated = self
            .mutate(&session_id, |s| {
                if s.is_finished() {
                    return Ok(None);
                }
                Ok(Some(s.apply_action(user_id, action)?))
            })
            .await;

        match mutated {
            Ok(Mutated::Committed { state, value }) => {
                self.react_to_move(&state, user_id, value).await;
                Ok(MoveOutcome::Accepted(value))
            }
            Ok(Mutated::Unchanged(_)) => Err(self.game_already_finished(user_id).await),
            Ok(Mutated::Gone) => {
                Err(self.no_active_game(user_id, ErrorCode::SessionNotFound).await)
            }
            Err(err) => {
                if matches!(
                    err.code(),
                    ErrorCode::PhaseMismatch | ErrorCode::UnknownAction | ErrorCode::MissingHand
                ) {
                    self.tell(user_id, MessageKey::InvalidMoveChoice).await;
                }
                Err(err)
            }
        }
    }

    /// Explicit restart: leave any running game and drop the session pointer
    /// so the next matchmaking starts clean.
    pub async fn restart(&self, user_id: UserId) -> Result<(), AppError> {
        if let Some(session_id) = self.active_session(user_id).await? {
            self.finish_game(&session_id, Ending::Cancelled { by: user_id })
                .await?;
        }
        self.state.store.unbind_player(user_id).await?;
        info!(user_id, "Player restarted");
        Ok(())
    }

    async fn cancel_game(&self, user_id: UserId, session_id: &str) -> Result<MoveOutcome, AppError> {
        let Some(state) = self.load(session_id).await? else {
            return Err(self.no_active_game(user_id, ErrorCode::SessionNotFound).await);
        };
        if state.slot_of(user_id).is_none() {
            return Err(self.no_active_game(user_id, ErrorCode::PlayerNotFound).await);
        }
        if self
            .finish_game(session_id, Ending::Cancelled { by: user_id })
            .await?
        {
            Ok(MoveOutcome::Cancelled)
        } else {
            Err(self.game_already_finished(user_id).await)
        }
    }

    async fn react_to_move(&self, state: &SessionState, user_id: UserId, applied: Applied) {
        let opponent_id = opponent_of(state, user_id);
        let opponent_phase = state.player(opponent_id).map(|p| p.phase);
        let to_user = Target::User;
        let to_opponent = Target::Opponent;
        match applied {
            Applied::Consent { ready: true, both_accepted } => {
                if !both_accepted {
                    self.announce(user_id, opponent_id, to_user, MessageKey::WaitingOpponent)
                        .await;
                }
                self.announce(user_id, opponent_id, to_opponent, MessageKey::OpponentReadyToPlay)
                    .await;
            }
            Applied::Consent { ready: false, .. } => {
                self.announce(user_id, opponent_id, to_user, MessageKey::RefusedToPlay)
                    .await;
            }
            Applied::FirstHand(_) => {
                let payload =
                    Payload::new(MessageKey::ChooseActionForSecondHand).with_move_choices();
                self.outbox
                    .deliver(user_id, opponent_id, to_user, &payload)
                    .await;
                if opponent_phase == Some(Phase::ChoosingFirstHand) {
                    self.announce(user_id, opponent_id, to_opponent, MessageKey::OpponentMadeMove)
                        .await;
                }
            }
            Applied::SecondHand(_) => {
                if !opponent_phase.is_some_and(|p| Stage::Hands.is_done(p)) {
                    self.announce(user_id, opponent_id, to_user, MessageKey::WaitingOpponent)
                        .await;
                }
            }
            Applied::Kept(_) => {
                if !opponent_phase.is_some_and(|p| Stage::RemainingHand.is_done(p)) {
                    self.announce(user_id, opponent_id, to_user, MessageKey::WaitingOpponent)
                        .await;
                }
            }
        }
    }

    /// The player's pointer leads nowhere: tell them and clear it.
    async fn no_active_game(&self, user_id: UserId, code: ErrorCode) -> AppError {
        self.tell(user_id, MessageKey::OpponentNotFound).await;
        if let Err(err) = self.state.store.unbind_player(user_id).await {
            debug!(user_id, error = %err, "Failed to clear dangling session pointer");
        }
        let detail = match code {
            ErrorCode::SessionNotFound => format!("session of user {user_id} is gone"),
            ErrorCode::PlayerNotFound => format!("user {user_id} has no seat in the session"),
            _ => format!("user {user_id} has no active game"),
        };
        AppError::not_found(code, detail)
    }

    async fn game_already_finished(&self, user_id: UserId) -> AppError {
        self.tell(user_id, MessageKey::GameFinished).await;
        AppError::conflict(ErrorCode::GameFinished, "game already finished")
    }
}
