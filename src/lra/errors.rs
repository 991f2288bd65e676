//! LRA error taxonomy
//!
//! Error codes:
//! - LRA_INVALID_STATE: operation illegal in the current status (not retried)
//! - LRA_NOT_FOUND: unknown LRA or participant
//! - LRA_PARTICIPANT_COMMUNICATION_FAILURE: network/timeout (transient)
//! - LRA_PARTICIPANT_REJECTED: definitive participant error (permanent)
//! - LRA_STORE_FAILURE: persistence failed; the operation did not happen

use thiserror::Error;

use crate::store::StoreError;

/// Result type for LRA operations
pub type LraResult<T> = Result<T, LraError>;

/// LRA errors
#[derive(Debug, Error)]
pub enum LraError {
    #[error("Invalid LRA state: {0}")]
    InvalidLraState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Participant communication failure: {0}")]
    ParticipantCommunicationFailure(String),

    #[error("Participant rejected request: {0}")]
    ParticipantRejected(String),

    #[error("Store failure: {0}")]
    StoreFailure(#[from] StoreError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Coordinator is shutting down")]
    ShuttingDown,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LraError {
    /// Operation not permitted in the LRA's current status
    pub fn invalid_state(
        lra_id: impl std::fmt::Display,
        status: impl std::fmt::Display,
        operation: &str,
    ) -> Self {
        LraError::InvalidLraState(format!(
            "cannot {} LRA {} in status {}",
            operation, lra_id, status
        ))
    }

    /// Unknown LRA
    pub fn lra_not_found(lra_id: impl std::fmt::Display) -> Self {
        LraError::NotFound(format!("LRA {}", lra_id))
    }

    /// Unknown participant of a known LRA
    pub fn participant_not_found(
        lra_id: impl std::fmt::Display,
        participant_id: impl std::fmt::Display,
    ) -> Self {
        LraError::NotFound(format!("participant {} of LRA {}", participant_id, lra_id))
    }

    /// Lock poisoned by a panicking thread
    pub fn poisoned() -> Self {
        LraError::Internal("Lock poisoned".into())
    }

    /// Stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            LraError::InvalidLraState(_) => "LRA_INVALID_STATE",
            LraError::NotFound(_) => "LRA_NOT_FOUND",
            LraError::ParticipantCommunicationFailure(_) => {
                "LRA_PARTICIPANT_COMMUNICATION_FAILURE"
            }
            LraError::ParticipantRejected(_) => "LRA_PARTICIPANT_REJECTED",
            LraError::StoreFailure(_) => "LRA_STORE_FAILURE",
            LraError::InvalidRequest(_) => "LRA_INVALID_REQUEST",
            LraError::ShuttingDown => "LRA_SHUTTING_DOWN",
            LraError::Internal(_) => "LRA_INTERNAL",
        }
    }

    /// HTTP status code a transport layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            LraError::InvalidLraState(_) => 412,
            LraError::NotFound(_) => 404,
            LraError::ParticipantCommunicationFailure(_) => 503,
            LraError::ParticipantRejected(_) => 409,
            LraError::StoreFailure(_) => 500,
            LraError::InvalidRequest(_) => 400,
            LraError::ShuttingDown => 503,
            LraError::Internal(_) => 500,
        }
    }

    /// Whether the caller may retry the whole operation later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LraError::ParticipantCommunicationFailure(_)
                | LraError::StoreFailure(_)
                | LraError::ShuttingDown
        )
    }
}
