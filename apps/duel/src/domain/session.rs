use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::actions::Action;
use crate::domain::moves::{HandSlot, Move, RoundHands};
use crate::errors::domain::DomainError;

pub type UserId = i64;
pub type SessionId = String;
/// Reference to a message previously shown to a player (edit/delete bookkeeping).
pub type MessageRef = Uuid;

/// Both participants derive the same id without coordinating: the two ids
/// sorted ascending, joined with `:`.
pub fn generate_session_id(user_id: UserId, opponent_id: UserId) -> SessionId {
    let (low, high) = if user_id <= opponent_id {
        (user_id, opponent_id)
    } else {
        (opponent_id, user_id)
    };
    format!("{low}:{high}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Paired, waiting for both consents.
    Pending,
    /// Both consented, first round not yet dealt.
    Accepted,
    InProgress,
    Finished,
}

/// Per-player position in the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AwaitingOpponentConsent,
    ChoosingFirstHand,
    ChoosingSecondHand,
    BothHandsSubmitted,
    ChoosingRemainingHand,
    RemainingHandSubmitted,
    Won,
    Lost,
    Draw,
    Terminated,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Won | Phase::Lost | Phase::Draw | Phase::Terminated)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub player_id: UserId,
    pub opponent_id: UserId,
    /// `None` until the player answers the challenge.
    pub ready_to_play: Option<bool>,
    pub first_hand: Option<Move>,
    pub second_hand: Option<Move>,
    pub remaining_hand: Option<HandSlot>,
    pub phase: Phase,
    pub rounds_won: u8,
    pub last_shown_message_id: Option<MessageRef>,
}

impl PlayerState {
    fn new(player_id: UserId, opponent_id: UserId) -> Self {
        Self {
            player_id,
            opponent_id,
            ready_to_play: None,
            first_hand: None,
            second_hand: None,
            remaining_hand: None,
            phase: Phase::AwaitingOpponentConsent,
            rounds_won: 0,
            last_shown_message_id: None,
        }
    }

    fn clear_hands(&mut self) {
        self.first_hand = None;
        self.second_hand = None;
        self.remaining_hand = None;
    }

    pub fn round_hands(&self) -> Result<RoundHands, DomainError> {
        Ok(RoundHands {
            first: self.first_hand.ok_or(DomainError::MissingHand("first_hand"))?,
            second: self
                .second_hand
                .ok_or(DomainError::MissingHand("second_hand"))?,
            kept: self
                .remaining_hand
                .ok_or(DomainError::MissingHand("remaining_hand"))?,
        })
    }
}

/// Authoritative state of one paired game, stored under `session:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: SessionId,
    pub status: SessionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Bumped on every committed write; compare-and-swap key.
    pub version: u64,
    pub round: u8,
    /// Slot 0 holds the lower player id.
    pub players: [PlayerState; 2],
    #[serde(default)]
    pub winner: Option<UserId>,
}

/// What a successfully applied action changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Consent { ready: bool, both_accepted: bool },
    FirstHand(Move),
    SecondHand(Move),
    Kept(HandSlot),
}

impl SessionState {
    pub fn new(user_id: UserId, opponent_id: UserId, created_at: OffsetDateTime) -> Self {
        let (low, high) = if user_id <= opponent_id {
            (user_id, opponent_id)
        } else {
            (opponent_id, user_id)
        };
        Self {
            session_id: generate_session_id(low, high),
            status: SessionStatus::Pending,
            created_at,
            version: 0,
            round: 0,
            players: [PlayerState::new(low, high), PlayerState::new(high, low)],
            winner: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == SessionStatus::Finished
    }

    pub fn slot_of(&self, user_id: UserId) -> Option<usize> {
        self.players.iter().position(|p| p.player_id == user_id)
    }

    pub fn player(&self, user_id: UserId) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.player_id == user_id)
    }

    pub fn player_mut(&mut self, user_id: UserId) -> Option<&mut PlayerState> {
        self.players.iter_mut().find(|p| p.player_id == user_id)
    }

    pub fn player_ids(&self) -> [UserId; 2] {
        [self.players[0].player_id, self.players[1].player_id]
    }

    /// Apply one player action to this state, leaving it untouched on error.
    ///
    /// `Cancel` is never applied here: it ends the game through the finishing
    /// write, so it is a phase mismatch for every phase.
    pub fn apply_action(&mut self, user_id: UserId, action: Action) -> Result<Applied, DomainError> {
        let slot = self
            .slot_of(user_id)
            .ok_or(DomainError::NotAParticipant(user_id))?;
        let phase = self.players[slot].phase;
        let mismatch = || DomainError::PhaseMismatch {
            phase,
            action: action.name().to_string(),
        };
        if self.is_finished() || phase.is_terminal() {
            return Err(mismatch());
        }

        let applied = match (phase, action) {
            (Phase::AwaitingOpponentConsent, Action::StartGame | Action::Refuse) => {
                let player = &mut self.players[slot];
                if player.ready_to_play.is_some() {
                    return Err(mismatch());
                }
                let ready = action == Action::StartGame;
                player.ready_to_play = Some(ready);
                let both_accepted = self.players.iter().all(|p| p.ready_to_play == Some(true));
                if both_accepted {
                    self.status = SessionStatus::Accepted;
                }
                Applied::Consent {
                    ready,
                    both_accepted,
                }
            }
            (Phase::ChoosingFirstHand, Action::Throw(m)) => {
                let player = &mut self.players[slot];
                player.first_hand = Some(m);
                player.phase = Phase::ChoosingSecondHand;
                Applied::FirstHand(m)
            }
            (Phase::ChoosingSecondHand, Action::Throw(m)) => {
                let player = &mut self.players[slot];
                player.second_hand = Some(m);
                player.phase = Phase::BothHandsSubmitted;
                Applied::SecondHand(m)
            }
            (Phase::ChoosingRemainingHand, Action::Keep(which)) => {
                let player = &mut self.players[slot];
                player.remaining_hand = Some(which);
                player.phase = Phase::RemainingHandSubmitted;
                Applied::Kept(which)
            }
            _ => return Err(mismatch()),
        };
        Ok(applied)
    }

    /// Deal a fresh round: hands cleared, both players choosing their first hand.
    pub fn begin_round(&mut self) {
        self.status = SessionStatus::InProgress;
        self.round = self.round.saturating_add(1);
        for player in &mut self.players {
            player.clear_hands();
            player.phase = Phase::ChoosingFirstHand;
            player.last_shown_message_id = None;
        }
    }

    /// Both hands revealed; players now pick which one to keep.
    pub fn open_remaining_hand_choice(&mut self) {
        for player in &mut self.players {
            player.remaining_hand = None;
            player.phase = Phase::ChoosingRemainingHand;
            player.last_shown_message_id = None;
        }
    }

    /// Mark the game finished. `winner` gets `Won`, the other `Lost`;
    /// without a winner both get `Draw` when `drawn`, else `Terminated`.
    pub fn conclude(&mut self, winner: Option<UserId>, drawn: bool) {
        self.status = SessionStatus::Finished;
        self.winner = winner;
        for player in &mut self.players {
            player.phase = match winner {
                Some(w) if w == player.player_id => Phase::Won,
                Some(_) => Phase::Lost,
                None if drawn => Phase::Draw,
                None => Phase::Terminated,
            };
        }
    }

    /// Final resting state once the outcome has been announced.
    pub fn terminate(&mut self) {
        self.status = SessionStatus::Finished;
        for player in &mut self.players {
            player.phase = Phase::Terminated;
            player.last_shown_message_id = None;
        }
    }
}
