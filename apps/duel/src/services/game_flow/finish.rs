use tracing::{debug, info, warn};

use super::mutation::Mutated;
use super::round_lifecycle::shown_messages;
use super::GameFlowService;
use crate::domain::session::{MessageRef, SessionState, UserId};
use crate::domain::stage::Stage;
use crate::error::AppError;
use crate::services::notify::{MessageKey, Payload, Target};

/// Why a game ended. Decides the final phases and what each player is told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ending {
    /// Rounds decided the game.
    Winner(UserId),
    /// The other player missed a deadline the winner met.
    Forfeit { winner: UserId },
    /// Round limit reached without a winner.
    Draw,
    /// Neither player met the deadline.
    BothTimedOut,
    Refused { by: UserId },
    /// Consent deadline passed; `silent` never answered.
    ConsentTimeout { silent: Vec<UserId> },
    Cancelled { by: UserId },
}

impl Ending {
    pub fn winner(&self) -> Option<UserId> {
        match self {
            Ending::Winner(winner) | Ending::Forfeit { winner } => Some(*winner),
            _ => None,
        }
    }

    pub fn is_drawn(&self) -> bool {
        matches!(self, Ending::Draw | Ending::BothTimedOut)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Ending::Winner(_) => "winner",
            Ending::Forfeit { .. } => "forfeit",
            Ending::Draw => "draw",
            Ending::BothTimedOut => "both_timed_out",
            Ending::Refused { .. } => "refused",
            Ending::ConsentTimeout { .. } => "consent_timeout",
            Ending::Cancelled { .. } => "cancelled",
        }
    }

    /// Move `state` to finished with the phases this ending implies.
    pub(super) fn apply(&self, state: &mut SessionState) {
        state.conclude(self.winner(), self.is_drawn());
    }
}

pub(super) fn opponent_of(state: &SessionState, user_id: UserId) -> UserId {
    let [first, second] = state.player_ids();
    if first == user_id {
        second
    } else {
        first
    }
}

impl GameFlowService {
    /// Terminate a session exactly once.
    ///
    /// Returns true only for the caller whose compare-and-swap moved the
    /// session to finished; that caller alone cancels timers and tells the
    /// players. Everyone else sees a finished or absent session and returns
    /// false without side effects.
    pub async fn finish_game(&self, session_id: &str, ending: Ending) -> Result<bool, AppError> {
        let mutated = self
            .mutate(session_id, |s| {
                if s.is_finished() {
                    return Ok(None);
                }
                let shown = shown_messages(s);
                ending.apply(s);
                Ok(Some(shown))
            })
            .await?;

        match mutated {
            Mutated::Committed { state, value } => {
                self.after_finish(&state, &ending, &value).await;
                Ok(true)
            }
            Mutated::Unchanged(_) | Mutated::Gone => {
                debug!(session_id, ending = ending.name(), "Session already finished");
                Ok(false)
            }
        }
    }

    /// Terminal cleanup run by the single winner of the finishing write.
    pub(super) async fn after_finish(
        &self,
        state: &SessionState,
        ending: &Ending,
        shown: &[(UserId, MessageRef)],
    ) {
        let session_id = state.session_id.as_str();
        info!(
            session_id,
            ending = ending.name(),
            winner = ?ending.winner(),
            round = state.round,
            "Game finished"
        );

        for stage in Stage::ALL {
            if let Err(err) = self.state.timers.cancel(session_id, stage.timer_name()).await {
                warn!(
                    session_id,
                    timer_name = stage.timer_name(),
                    error = %err,
                    "Failed to cancel stage timer"
                );
            }
        }
        self.clear_countdowns(shown).await;
        self.announce_ending(state, ending).await;

        let terminated = self
            .mutate(session_id, |s| {
                if !s.is_finished() {
                    return Ok(None);
                }
                s.terminate();
                Ok(Some(()))
            })
            .await;
        if let Err(err) = terminated {
            warn!(
                session_id,
                error = %err,
                "Failed to store terminated session, leaving it to expire"
            );
        }
    }

    async fn announce_ending(&self, state: &SessionState, ending: &Ending) {
        let [first, second] = state.player_ids();
        match ending {
            Ending::Winner(winner) => {
                let loser = opponent_of(state, *winner);
                self.announce(*winner, loser, Target::User, MessageKey::YouWin).await;
                self.announce(*winner, loser, Target::Opponent, MessageKey::YouLose).await;
            }
            Ending::Forfeit { winner } => {
                let loser = opponent_of(state, *winner);
                self.announce(loser, *winner, Target::User, MessageKey::YouAreTooLong).await;
                self.announce(loser, *winner, Target::Opponent, MessageKey::OpponentIsTooLong)
                    .await;
                self.announce(*winner, loser, Target::User, MessageKey::YouWin).await;
                self.announce(*winner, loser, Target::Opponent, MessageKey::YouLose).await;
            }
            Ending::Draw => {
                self.announce(first, second, Target::Both, MessageKey::GameDrawn).await;
            }
            Ending::BothTimedOut => {
                self.announce(first, second, Target::Both, MessageKey::BothAreTooLong).await;
            }
            Ending::Refused { by } => {
                let other = opponent_of(state, *by);
                self.announce(*by, other, Target::Opponent, MessageKey::OpponentRefused).await;
            }
            Ending::ConsentTimeout { silent } => {
                if silent.len() > 1 {
                    self.announce(first, second, Target::Both, MessageKey::BothAreTooLong).await;
                } else if let Some(late) = silent.first() {
                    let waiting = opponent_of(state, *late);
                    self.announce(*late, waiting, Target::User, MessageKey::YouAreTooLong).await;
                    self.announce(
                        *late,
                        waiting,
                        Target::Opponent,
                        MessageKey::TooLongWaitingResponse,
                    )
                    .await;
                }
            }
            Ending::Cancelled { by } => {
                let other = opponent_of(state, *by);
                self.announce(*by, other, Target::Opponent, MessageKey::OpponentCancelledGame)
                    .await;
            }
        }

        self.announce(first, second, Target::Both, MessageKey::GameFinished).await;
    }

    /// Fan a bare message out to `target`, seen from `user`'s side.
    pub(super) async fn announce(
        &self,
        user: UserId,
        opponent: UserId,
        target: Target,
        key: MessageKey,
    ) {
        self.outbox
            .deliver(user, opponent, target, &Payload::new(key))
            .await;
    }

    /// Message for a player with no game to fan out over.
    pub(super) async fn tell(&self, user_id: UserId, key: MessageKey) {
        self.outbox.send(user_id, &Payload::new(key)).await;
    }
}
