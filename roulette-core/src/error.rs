use crate::types::{ParticipantId, RoundId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RouletteError>;

#[derive(Error, Debug)]
pub enum RouletteError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid bet type: {0}")]
    InvalidBetType(String),

    #[error("Round {round} is {state}, cannot {operation}")]
    InvalidState {
        round: RoundId,
        state: String,
        operation: String,
    },

    #[error("Insolvent: obligation of {requested} units exceeds {available} available")]
    Insolvency { requested: u64, available: u64 },

    #[error("Insufficient funds: need {need}, have {available}")]
    InsufficientFunds { need: u64, available: u64 },

    #[error("Revealed seed does not match the commitment for round {0}")]
    CommitMismatch(RoundId),

    #[error("Reveal deadline expired for round {0}")]
    RevealTimeout(RoundId),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Round not found: {0}")]
    RoundNotFound(RoundId),

    #[error("Participant not found: {0}")]
    ParticipantNotFound(ParticipantId),

    #[error("Audit verification failed: {0}")]
    AuditMismatch(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error categories exposed to callers of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    State,
    Insolvency,
    InsufficientFunds,
    CommitMismatch,
    RevealTimeout,
    Config,
    NotFound,
    Audit,
    Internal,
}

impl RouletteError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_bet_type(msg: impl Into<String>) -> Self {
        Self::InvalidBetType(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn audit(msg: impl Into<String>) -> Self {
        Self::AuditMismatch(msg.into())
    }

    pub fn invalid_state(
        round: RoundId,
        state: impl std::fmt::Display,
        operation: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            round,
            state: state.to_string(),
            operation: operation.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InvalidBetType(_) => ErrorKind::Validation,
            Self::InvalidState { .. } => ErrorKind::State,
            Self::Insolvency { .. } => ErrorKind::Insolvency,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::CommitMismatch(_) => ErrorKind::CommitMismatch,
            Self::RevealTimeout(_) => ErrorKind::RevealTimeout,
            Self::Config(_) => ErrorKind::Config,
            Self::RoundNotFound(_) | Self::ParticipantNotFound(_) => ErrorKind::NotFound,
            Self::AuditMismatch(_) => ErrorKind::Audit,
            Self::Storage(_) | Self::Serialization(_) | Self::Io(_) | Self::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = RouletteError::invalid_state(RoundId(3), "Closed", "place bet");
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(err.to_string(), "Round 3 is Closed, cannot place bet");

        assert_eq!(
            RouletteError::invalid_bet_type("corner 36").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            RouletteError::Insolvency {
                requested: 10,
                available: 5
            }
            .kind(),
            ErrorKind::Insolvency
        );
    }
}
