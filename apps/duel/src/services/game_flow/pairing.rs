use tracing::{debug, info};

use super::GameFlowService;
use crate::domain::session::{SessionId, SessionState, UserId};
use crate::domain::stage::Stage;
use crate::error::AppError;
use crate::services::notify::{MessageKey, Payload, Target};
use crate::store::OpenOutcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Paired {
        session_id: SessionId,
        opponent_id: UserId,
    },
    /// Nobody else is online.
    NoOpponent,
    /// The picked opponent is in another game.
    OpponentBusy(UserId),
    /// The requester is already playing.
    AlreadyInGame(SessionId),
}

impl GameFlowService {
    /// Pair `user_id` with a random online opponent and open the consent stage.
    ///
    /// The opponent's availability is settled by the store's all-or-nothing
    /// `open_session`, so two requesters racing for the same opponent never
    /// both get a session.
    pub async fn start_matchmaking(&self, user_id: UserId) -> Result<MatchOutcome, AppError> {
        self.state.matchmaker.mark_online(user_id).await?;

        if let Some(session_id) = self.active_session(user_id).await? {
            return Ok(self.already_in_game(user_id, session_id).await);
        }

        let Some(opponent_id) = self.state.matchmaker.pick_random_online(user_id).await? else {
            self.tell(user_id, MessageKey::NoOnlineUsers).await;
            return Ok(MatchOutcome::NoOpponent);
        };

        let session = SessionState::new(user_id, opponent_id, self.state.clock.now());
        let session_id = session.session_id.clone();
        let ttl = self.state.settings.session_ttl;
        match self.state.store.open_session(&session, ttl).await? {
            OpenOutcome::Opened => {}
            OpenOutcome::Busy(busy) if busy == user_id => {
                if let Some(session_id) = self.active_session(user_id).await? {
                    return Ok(self.already_in_game(user_id, session_id).await);
                }
                return Ok(self.opponent_busy(user_id, opponent_id).await);
            }
            OpenOutcome::Busy(_) | OpenOutcome::AlreadyOpen => {
                return Ok(self.opponent_busy(user_id, opponent_id).await);
            }
        }
        self.arm_stage_timer(&session_id, Stage::Consent).await?;

        info!(session_id = %session_id, user_id, opponent_id, "Players paired");

        let to_user = Payload::new(MessageKey::YourOpponent)
            .param("opponent_id", opponent_id)
            .with_consent_choices();
        let to_opponent = Payload::new(MessageKey::YouAreChosen)
            .param("user_id", user_id)
            .with_consent_choices();
        self.outbox
            .deliver(user_id, opponent_id, Target::User, &to_user)
            .await;
        self.outbox
            .deliver(user_id, opponent_id, Target::Opponent, &to_opponent)
            .await;

        Ok(MatchOutcome::Paired {
            session_id,
            opponent_id,
        })
    }

    async fn already_in_game(&self, user_id: UserId, session_id: SessionId) -> MatchOutcome {
        debug!(user_id, session_id = %session_id, "Matchmaking requested mid-game");
        self.tell(user_id, MessageKey::AlreadyInGame).await;
        MatchOutcome::AlreadyInGame(session_id)
    }

    async fn opponent_busy(&self, user_id: UserId, opponent_id: UserId) -> MatchOutcome {
        debug!(user_id, opponent_id, "Picked opponent is in another game");
        self.tell(user_id, MessageKey::OpponentNotFound).await;
        MatchOutcome::OpponentBusy(opponent_id)
    }

    /// Session the user is currently playing in, ignoring finished ones.
    pub async fn active_session(&self, user_id: UserId) -> Result<Option<SessionId>, AppError> {
        let Some(session_id) = self.state.store.session_of(user_id).await? else {
            return Ok(None);
        };
        match self.load(&session_id).await? {
            Some(state) if !state.is_finished() => Ok(Some(session_id)),
            _ => Ok(None),
        }
    }
}
