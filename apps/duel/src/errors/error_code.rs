//! Error codes for the duel coordination layer.
//!
//! This module defines all error codes used throughout the crate.
//! Add new codes here; never pass ad-hoc strings as error codes.
//!
//! All error codes are SCREAMING_SNAKE_CASE and map 1:1 to the strings
//! that appear in logs and outbound error envelopes.

use core::fmt;

/// Centralized error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Input validation
    /// Action name outside the closed set of game actions
    UnknownAction,
    /// Action is not legal in the player's current phase
    PhaseMismatch,
    /// Hand referenced before it was submitted
    MissingHand,

    // Resource not found
    /// Player pointer leads to a session record that is gone
    SessionNotFound,
    /// Player has no slot in the session
    PlayerNotFound,
    /// Player is not bound to any session
    NoActiveGame,

    // Conflicts
    /// Compare-and-swap lost too many times in a row
    CommitConflict,
    /// Session already finished
    GameFinished,

    // Infrastructure
    /// Store unreachable or returned an error
    StoreUnavailable,
    /// Stored value could not be decoded
    StoreCorrupted,
    /// Outbound or inbound transport failure
    TransportError,
    /// Configuration error
    ConfigError,
    /// Internal error
    InternalError,
}

impl ErrorCode {
    /// Returns the canonical SCREAMING_SNAKE_CASE string for this error code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownAction => "UNKNOWN_ACTION",
            Self::PhaseMismatch => "PHASE_MISMATCH",
            Self::MissingHand => "MISSING_HAND",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::PlayerNotFound => "PLAYER_NOT_FOUND",
            Self::NoActiveGame => "NO_ACTIVE_GAME",
            Self::CommitConflict => "COMMIT_CONFLICT",
            Self::GameFinished => "GAME_FINISHED",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::StoreCorrupted => "STORE_CORRUPTED",
            Self::TransportError => "TRANSPORT_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
