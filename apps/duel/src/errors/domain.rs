//! Domain-level error type for pure game rules.
//!
//! This error type is store- and transport-agnostic. Services return
//! `Result<T, crate::error::AppError>` and convert from `DomainError`
//! using the provided `From<DomainError> for AppError` implementation.

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::domain::session::Phase;

/// Central domain error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Action name outside the closed action set
    UnknownAction(String),
    /// Action not accepted in the current phase
    PhaseMismatch { phase: Phase, action: String },
    /// Player id has no slot in this session
    NotAParticipant(i64),
    /// A hand was referenced before being submitted
    MissingHand(&'static str),
}

impl Display for DomainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DomainError::UnknownAction(name) => write!(f, "unknown action: {name}"),
            DomainError::PhaseMismatch { phase, action } => {
                write!(f, "action {action} not allowed in phase {phase:?}")
            }
            DomainError::NotAParticipant(id) => write!(f, "player {id} is not in this session"),
            DomainError::MissingHand(which) => write!(f, "{which} has not been submitted"),
        }
    }
}

impl Error for DomainError {}
