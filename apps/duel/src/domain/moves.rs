use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::domain::DomainError;

/// One of the three classic throws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Move {
    Rock,
    Paper,
    Scissors,
}

impl Move {
    pub const ALL: [Move; 3] = [Move::Rock, Move::Paper, Move::Scissors];

    /// Whether `self` defeats `other` under standard rules.
    pub fn beats(self, other: Move) -> bool {
        matches!(
            (self, other),
            (Move::Rock, Move::Scissors) | (Move::Scissors, Move::Paper) | (Move::Paper, Move::Rock)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Move::Rock => "rock",
            Move::Paper => "paper",
            Move::Scissors => "scissors",
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Move {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rock" => Ok(Move::Rock),
            "paper" => Ok(Move::Paper),
            "scissors" => Ok(Move::Scissors),
            other => Err(DomainError::UnknownAction(other.to_string())),
        }
    }
}

/// Which of the two revealed hands a player keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandSlot {
    First,
    Second,
}

impl HandSlot {
    pub fn as_str(self) -> &'static str {
        match self {
            HandSlot::First => "first_hand",
            HandSlot::Second => "second_hand",
        }
    }
}

/// Result from the point of view of the left-hand argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Lose,
    Draw,
}

impl Outcome {
    pub fn flip(self) -> Outcome {
        match self {
            Outcome::Win => Outcome::Lose,
            Outcome::Lose => Outcome::Win,
            Outcome::Draw => Outcome::Draw,
        }
    }
}

/// Single throw against single throw.
pub fn resolve(left: Move, right: Move) -> Outcome {
    if left.beats(right) {
        Outcome::Win
    } else if right.beats(left) {
        Outcome::Lose
    } else {
        Outcome::Draw
    }
}

/// Number of hands in `own` that no hand in `other` beats.
pub fn surviving_hands(own: [Move; 2], other: [Move; 2]) -> usize {
    own.iter()
        .filter(|hand| !other.iter().any(|threat| threat.beats(**hand)))
        .count()
}

/// Two revealed hands against two revealed hands: a side with at least one
/// surviving hand beats a side with none. Anything else is a draw.
pub fn resolve_two_hands(left: [Move; 2], right: [Move; 2]) -> Outcome {
    let left_alive = surviving_hands(left, right);
    let right_alive = surviving_hands(right, left);
    match (left_alive, right_alive) {
        (l, 0) if l > 0 => Outcome::Win,
        (0, r) if r > 0 => Outcome::Lose,
        _ => Outcome::Draw,
    }
}

/// A player's full round: both revealed hands and the one they kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundHands {
    pub first: Move,
    pub second: Move,
    pub kept: HandSlot,
}

impl RoundHands {
    pub fn kept_move(&self) -> Move {
        match self.kept {
            HandSlot::First => self.first,
            HandSlot::Second => self.second,
        }
    }

    pub fn both(&self) -> [Move; 2] {
        [self.first, self.second]
    }
}

/// Kept hand against kept hand; a tie falls back to the full reveal.
pub fn resolve_round(left: &RoundHands, right: &RoundHands) -> Outcome {
    match resolve(left.kept_move(), right.kept_move()) {
        Outcome::Draw => resolve_two_hands(left.both(), right.both()),
        decided => decided,
    }
}
