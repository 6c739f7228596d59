use rand::Rng;
use tracing::debug;

use super::GameFlowService;
use crate::domain::moves::{resolve, Move, Outcome};
use crate::domain::session::UserId;
use crate::error::AppError;
use crate::services::notify::{MessageKey, Payload};

/// One throw against the house. Stateless: nothing is stored and no timer
/// is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotRound {
    pub user_move: Move,
    pub bot_move: Move,
    /// From the user's point of view.
    pub outcome: Outcome,
}

impl BotRound {
    pub fn play<R: Rng + ?Sized>(user_move: Move, rng: &mut R) -> Self {
        let bot_move = Move::ALL[rng.random_range(0..Move::ALL.len())];
        Self {
            user_move,
            bot_move,
            outcome: resolve(user_move, bot_move),
        }
    }

    fn result_key(&self) -> MessageKey {
        match self.outcome {
            Outcome::Win => MessageKey::UserWon,
            Outcome::Lose => MessageKey::BotWon,
            Outcome::Draw => MessageKey::NobodyWon,
        }
    }
}

impl GameFlowService {
    /// Quick game: throw `action_name` against a random bot throw and tell
    /// the user how it went. Works whether or not the user is in a duel.
    pub async fn play_bot(&self, user_id: UserId, action_name: &str) -> Result<BotRound, AppError> {
        let user_move: Move = match action_name.parse() {
            Ok(m) => m,
            Err(err) => {
                self.tell(user_id, MessageKey::InvalidMoveChoice).await;
                return Err(err.into());
            }
        };
        let round = BotRound::play(user_move, &mut rand::rng());
        debug!(user_id, ?round, "Quick game played");

        let payload = Payload::new(round.result_key())
            .param("your_hand", round.user_move)
            .param("bot_hand", round.bot_move)
            .with_move_choices();
        self.outbox.send(user_id, &payload).await;
        Ok(round)
    }
}
