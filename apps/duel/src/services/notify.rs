//! Outward notifications: message keys, payloads, the `Notifier` seam and
//! best-effort fan-out to a closed set of targets.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::moves::{HandSlot, Move};
use crate::domain::session::{MessageRef, UserId};
use crate::error::AppError;

/// Lookup key into the client's string table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKey {
    YourOpponent,
    YouAreChosen,
    WaitingOpponent,
    OpponentReadyToPlay,
    RefusedToPlay,
    OpponentRefused,
    TooLongWaitingResponse,
    YouAreTooLong,
    OpponentIsTooLong,
    BothAreTooLong,
    ChooseActionForFirstHand,
    ChooseActionForSecondHand,
    OpponentMadeMove,
    YourHands,
    OpponentHands,
    InvitationChooseRemainingHand,
    RoundWon,
    RoundLost,
    RoundDrawn,
    YouWin,
    YouLose,
    GameDrawn,
    GameFinished,
    OpponentCancelledGame,
    NoOnlineUsers,
    OpponentNotFound,
    AlreadyInGame,
    InvalidMoveChoice,
    SecondsLeft,
    GameWillCancel,
    UserWon,
    BotWon,
    NobodyWon,
}

impl MessageKey {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKey::YourOpponent => "your_opponent",
            MessageKey::YouAreChosen => "you_are_chosen",
            MessageKey::WaitingOpponent => "waiting_opponent",
            MessageKey::OpponentReadyToPlay => "opponent_ready_to_play",
            MessageKey::RefusedToPlay => "refused_to_play",
            MessageKey::OpponentRefused => "opponent_refused",
            MessageKey::TooLongWaitingResponse => "too_long_waiting_response",
            MessageKey::YouAreTooLong => "you_are_too_long",
            MessageKey::OpponentIsTooLong => "opponent_is_too_long",
            MessageKey::BothAreTooLong => "both_are_too_long",
            MessageKey::ChooseActionForFirstHand => "choose_action_for_first_hand",
            MessageKey::ChooseActionForSecondHand => "choose_action_for_second_hand",
            MessageKey::OpponentMadeMove => "opponent_made_move",
            MessageKey::YourHands => "your_hands",
            MessageKey::OpponentHands => "opponent_hands",
            MessageKey::InvitationChooseRemainingHand => "invitation_choose_remaining_hand",
            MessageKey::RoundWon => "round_won",
            MessageKey::RoundLost => "round_lost",
            MessageKey::RoundDrawn => "round_drawn",
            MessageKey::YouWin => "you_win",
            MessageKey::YouLose => "you_lose",
            MessageKey::GameDrawn => "game_drawn",
            MessageKey::GameFinished => "game_finished",
            MessageKey::OpponentCancelledGame => "opponent_cancelled_game",
            MessageKey::NoOnlineUsers => "no_online_users",
            MessageKey::OpponentNotFound => "opponent_not_found",
            MessageKey::AlreadyInGame => "already_in_game",
            MessageKey::InvalidMoveChoice => "invalid_move_choice",
            MessageKey::SecondsLeft => "seconds_left",
            MessageKey::GameWillCancel => "game_will_cancel",
            MessageKey::UserWon => "user_won",
            MessageKey::BotWon => "bot_won",
            MessageKey::NobodyWon => "nobody_won",
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message content: string-table key, template parameters and the action
/// names the client should offer as buttons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub key: MessageKey,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
}

impl Payload {
    pub fn new(key: MessageKey) -> Self {
        Self {
            key,
            params: BTreeMap::new(),
            actions: Vec::new(),
        }
    }

    pub fn param(mut self, name: &str, value: impl ToString) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    /// Rock/paper/scissors buttons.
    pub fn with_move_choices(self) -> Self {
        self.actions(Move::ALL.iter().map(|m| m.as_str()))
    }

    /// Keep-first/keep-second buttons.
    pub fn with_hand_choices(self) -> Self {
        self.actions([HandSlot::First.as_str(), HandSlot::Second.as_str()])
    }

    /// Accept/refuse buttons.
    pub fn with_consent_choices(self) -> Self {
        self.actions(["start_game", "refuse"])
    }
}

/// Who a message goes to, from the point of view of the acting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    User,
    Opponent,
    Both,
}

impl Target {
    pub fn recipients(self, user: UserId, opponent: UserId) -> Vec<UserId> {
        match self {
            Target::User => vec![user],
            Target::Opponent => vec![opponent],
            Target::Both => vec![user, opponent],
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: UserId, payload: &Payload) -> Result<MessageRef, AppError>;

    async fn edit(
        &self,
        recipient: UserId,
        message: MessageRef,
        payload: &Payload,
    ) -> Result<(), AppError>;

    async fn delete(&self, recipient: UserId, message: MessageRef) -> Result<(), AppError>;
}

/// Best-effort wrapper around a [`Notifier`]. Failures are logged and never
/// returned: a notification can't undo a committed state change.
#[derive(Clone)]
pub struct Outbox {
    notifier: Arc<dyn Notifier>,
}

impl Outbox {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Single recipient outside any pairing.
    pub async fn send(&self, recipient: UserId, payload: &Payload) -> Option<MessageRef> {
        match self.notifier.notify(recipient, payload).await {
            Ok(message) => Some(message),
            Err(err) => {
                warn!(recipient, key = %payload.key, error = %err, "Notification failed");
                None
            }
        }
    }

    /// Fan `payload` out to `target` as seen from `user`'s side of the pair.
    /// Returns the messages that were actually shown.
    pub async fn deliver(
        &self,
        user: UserId,
        opponent: UserId,
        target: Target,
        payload: &Payload,
    ) -> Vec<(UserId, MessageRef)> {
        let mut delivered = Vec::new();
        for recipient in target.recipients(user, opponent) {
            if let Some(message) = self.send(recipient, payload).await {
                delivered.push((recipient, message));
            }
        }
        delivered
    }

    pub async fn edit(&self, recipient: UserId, message: MessageRef, payload: &Payload) -> bool {
        match self.notifier.edit(recipient, message, payload).await {
            Ok(()) => true,
            Err(err) => {
                warn!(recipient, %message, error = %err, "Message edit failed");
                false
            }
        }
    }

    pub async fn delete(&self, recipient: UserId, message: MessageRef) {
        if let Err(err) = self.notifier.delete(recipient, message).await {
            warn!(recipient, %message, error = %err, "Message delete failed");
        }
    }
}

/// Notifier that only writes to the log. Used by single-process runs with no
/// client attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, recipient: UserId, payload: &Payload) -> Result<MessageRef, AppError> {
        let message = Uuid::new_v4();
        info!(recipient, %message, key = %payload.key, params = ?payload.params, "Notify");
        Ok(message)
    }

    async fn edit(
        &self,
        recipient: UserId,
        message: MessageRef,
        payload: &Payload,
    ) -> Result<(), AppError> {
        info!(recipient, %message, key = %payload.key, params = ?payload.params, "Edit message");
        Ok(())
    }

    async fn delete(&self, recipient: UserId, message: MessageRef) -> Result<(), AppError> {
        info!(recipient, %message, "Delete message");
        Ok(())
    }
}
