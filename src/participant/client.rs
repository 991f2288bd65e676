//! Participant notification seam
//!
//! A `ParticipantClient` performs exactly one call against one participant
//! endpoint and classifies the answer. It never retries; retry policy lives
//! in the coordinator.

use std::fmt;

use async_trait::async_trait;

use crate::lra::{LraId, ParticipantId, Verb};

/// Kind of participant callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Complete the participant's work (on close)
    Complete,
    /// Compensate the participant's work (on cancel)
    Compensate,
    /// Poll an "accepted" participant for the outcome of a verb
    Status(Verb),
    /// Tell a failed participant it may discard its state
    Forget,
}

impl CallKind {
    /// Returns the call name
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Complete => "complete",
            CallKind::Compensate => "compensate",
            CallKind::Status(_) => "status",
            CallKind::Forget => "forget",
        }
    }

    /// Verb whose outcome the call reports; `None` for forget
    pub fn verb(&self) -> Option<Verb> {
        match self {
            CallKind::Complete => Some(Verb::Complete),
            CallKind::Compensate => Some(Verb::Compensate),
            CallKind::Status(verb) => Some(*verb),
            CallKind::Forget => None,
        }
    }
}

impl From<Verb> for CallKind {
    fn from(verb: Verb) -> Self {
        match verb {
            Verb::Complete => CallKind::Complete,
            Verb::Compensate => CallKind::Compensate,
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call to issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantCall {
    /// LRA the call is made on behalf of
    pub lra_id: LraId,
    /// Target participant
    pub participant_id: ParticipantId,
    /// Which callback
    pub kind: CallKind,
    /// Callback URL
    pub endpoint: String,
}

/// Classified result of one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// Definitive success
    Succeeded,
    /// Accepted, still working; poll later
    Pending,
    /// Definitive failure; never retried
    Rejected(String),
    /// Timeout or connection problem; retried
    Transient(String),
}

impl CallOutcome {
    /// Short name for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Succeeded => "succeeded",
            CallOutcome::Pending => "pending",
            CallOutcome::Rejected(_) => "rejected",
            CallOutcome::Transient(_) => "transient",
        }
    }
}

/// Issues participant callbacks
#[async_trait]
pub trait ParticipantClient: Send + Sync + fmt::Debug {
    /// Perform one call and classify the result
    async fn call(&self, call: &ParticipantCall) -> CallOutcome;
}
