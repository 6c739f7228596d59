use std::error::Error as StdError;

use thiserror::Error;

use crate::errors::{DomainError, ErrorCode};

type BoxedSource = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {detail}")]
    Validation { code: ErrorCode, detail: String },
    #[error("Not found: {detail}")]
    NotFound { code: ErrorCode, detail: String },
    #[error("Conflict: {detail}")]
    Conflict { code: ErrorCode, detail: String },
    #[error("Store error: {detail}")]
    Store {
        code: ErrorCode,
        detail: String,
        #[source]
        source: BoxedSource,
    },
    #[error("Configuration error: {detail}")]
    Config {
        detail: String,
        #[source]
        source: BoxedSource,
    },
    #[error("Internal error: {detail}")]
    Internal {
        code: ErrorCode,
        detail: String,
        #[source]
        source: BoxedSource,
    },
}

impl AppError {
    /// Error code carried by any variant
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { code, .. } => *code,
            AppError::NotFound { code, .. } => *code,
            AppError::Conflict { code, .. } => *code,
            AppError::Store { code, .. } => *code,
            AppError::Config { .. } => ErrorCode::ConfigError,
            AppError::Internal { code, .. } => *code,
        }
    }

    pub fn invalid(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::Validation {
            code,
            detail: detail.into(),
        }
    }

    pub fn not_found(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::NotFound {
            code,
            detail: detail.into(),
        }
    }

    pub fn conflict(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::Conflict {
            code,
            detail: detail.into(),
        }
    }

    pub fn store(detail: impl Into<String>, source: impl Into<BoxedSource>) -> Self {
        Self::Store {
            code: ErrorCode::StoreUnavailable,
            detail: detail.into(),
            source: source.into(),
        }
    }

    pub fn corrupted(detail: impl Into<String>, source: impl Into<BoxedSource>) -> Self {
        Self::Store {
            code: ErrorCode::StoreCorrupted,
            detail: detail.into(),
            source: source.into(),
        }
    }

    pub fn config(detail: impl Into<String>, source: impl Into<BoxedSource>) -> Self {
        Self::Config {
            detail: detail.into(),
            source: source.into(),
        }
    }

    pub fn internal(code: ErrorCode, detail: impl Into<String>, source: impl Into<BoxedSource>) -> Self {
        Self::Internal {
            code,
            detail: detail.into(),
            source: source.into(),
        }
    }

    /// Store and transport failures are worth retrying on the next poll;
    /// everything else is a definite answer.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Store { code, .. } => *code == ErrorCode::StoreUnavailable,
            AppError::Conflict { code, .. } => *code == ErrorCode::CommitConflict,
            AppError::Internal { code, .. } => *code == ErrorCode::TransportError,
            _ => false,
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        let code = match &err {
            DomainError::UnknownAction(_) => ErrorCode::UnknownAction,
            DomainError::PhaseMismatch { .. } => ErrorCode::PhaseMismatch,
            DomainError::NotAParticipant(_) => ErrorCode::PlayerNotFound,
            DomainError::MissingHand(_) => ErrorCode::MissingHand,
        };
        match err {
            DomainError::NotAParticipant(_) => AppError::not_found(code, err.to_string()),
            _ => AppError::invalid(code, err.to_string()),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::store(format!("redis error: {err}"), err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::corrupted(format!("json error: {err}"), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::Phase;

    #[test]
    fn domain_errors_map_to_codes() {
        let err: AppError = DomainError::UnknownAction("lizard".into()).into();
        assert_eq!(err.code(), ErrorCode::UnknownAction);
        assert!(matches!(err, AppError::Validation { .. }));

        let err: AppError = DomainError::PhaseMismatch {
            phase: Phase::ChoosingFirstHand,
            action: "first_hand".into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::PhaseMismatch);

        let err: AppError = DomainError::NotAParticipant(7).into();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[test]
    fn only_infra_failures_are_retryable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(AppError::store("down", io).is_retryable());

        let io = std::io::Error::other("bad json");
        assert!(!AppError::corrupted("garbage", io).is_retryable());
        assert!(!AppError::invalid(ErrorCode::UnknownAction, "x").is_retryable());
        assert!(AppError::conflict(ErrorCode::CommitConflict, "busy").is_retryable());
    }
}
