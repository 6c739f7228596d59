use std::str::FromStr;

use crate::domain::moves::{HandSlot, Move};
use crate::errors::domain::DomainError;

/// Closed set of labelled actions a player may submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Accept the challenge.
    StartGame,
    /// Decline the challenge.
    Refuse,
    /// Throw for the hand currently being chosen.
    Throw(Move),
    /// Keep one of the two revealed hands.
    Keep(HandSlot),
    /// Leave the game from any phase.
    Cancel,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::StartGame => "start_game",
            Action::Refuse => "refuse",
            Action::Throw(m) => m.as_str(),
            Action::Keep(slot) => slot.as_str(),
            Action::Cancel => "cancel",
        }
    }
}

impl FromStr for Action {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start_game" => Ok(Action::StartGame),
            "refuse" => Ok(Action::Refuse),
            "cancel" => Ok(Action::Cancel),
            "first_hand" => Ok(Action::Keep(HandSlot::First)),
            "second_hand" => Ok(Action::Keep(HandSlot::Second)),
            other => other.parse::<Move>().map(Action::Throw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_action_round_trips_through_its_name() {
        let all = [
            Action::StartGame,
            Action::Refuse,
            Action::Cancel,
            Action::Keep(HandSlot::First),
            Action::Keep(HandSlot::Second),
            Action::Throw(Move::Rock),
            Action::Throw(Move::Paper),
            Action::Throw(Move::Scissors),
        ];
        for action in all {
            assert_eq!(action.name().parse::<Action>(), Ok(action));
        }
    }

    #[test]
    fn unknown_names_are_rejected() {
        for name in ["", "Rock", "spock", "third_hand"] {
            assert_eq!(
                name.parse::<Action>(),
                Err(DomainError::UnknownAction(name.to_string()))
            );
        }
    }
}
