//! LRA and participant status state machines
//!
//! LRA:
//! - Active → Closing → {Closed, FailedToClose}
//! - Active → Cancelling → {Cancelled, FailedToCancel}
//!
//! Participant:
//! - Active → Completing → {Completed, FailedToComplete}
//! - Active → Compensating → {Compensated, FailedToCompensate}
//!
//! Status only moves forward. Any other transition is rejected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status of an LRA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LraStatus {
    /// Accepting participants; initial state
    Active,
    /// Close requested, participants being completed
    Closing,
    /// Cancel requested, participants being compensated
    Cancelling,
    /// Every participant completed
    Closed,
    /// Every participant compensated
    Cancelled,
    /// At least one participant failed to complete
    FailedToClose,
    /// At least one participant failed to compensate
    FailedToCancel,
}

impl LraStatus {
    /// Returns the status name
    pub fn as_str(&self) -> &'static str {
        match self {
            LraStatus::Active => "Active",
            LraStatus::Closing => "Closing",
            LraStatus::Cancelling => "Cancelling",
            LraStatus::Closed => "Closed",
            LraStatus::Cancelled => "Cancelled",
            LraStatus::FailedToClose => "FailedToClose",
            LraStatus::FailedToCancel => "FailedToCancel",
        }
    }

    /// Terminal statuses never change again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LraStatus::Closed
                | LraStatus::Cancelled
                | LraStatus::FailedToClose
                | LraStatus::FailedToCancel
        )
    }

    /// Terminal failure statuses
    pub fn is_failed(&self) -> bool {
        matches!(self, LraStatus::FailedToClose | LraStatus::FailedToCancel)
    }

    /// Whether `next` is a legal successor of this status
    pub fn can_transition_to(&self, next: LraStatus) -> bool {
        matches!(
            (self, next),
            (LraStatus::Active, LraStatus::Closing)
                | (LraStatus::Active, LraStatus::Cancelling)
                | (LraStatus::Closing, LraStatus::Closed)
                | (LraStatus::Closing, LraStatus::FailedToClose)
                | (LraStatus::Cancelling, LraStatus::Cancelled)
                | (LraStatus::Cancelling, LraStatus::FailedToCancel)
        )
    }

    /// The verb being applied to participants, if the LRA is ending
    pub fn verb(&self) -> Option<Verb> {
        match self {
            LraStatus::Closing => Some(Verb::Complete),
            LraStatus::Cancelling => Some(Verb::Compensate),
            _ => None,
        }
    }
}

impl fmt::Display for LraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipantStatus {
    /// Enlisted, not yet notified
    Active,
    /// Complete notification in progress
    Completing,
    /// Completed successfully
    Completed,
    /// Could not complete
    FailedToComplete,
    /// Compensate notification in progress
    Compensating,
    /// Compensated successfully
    Compensated,
    /// Could not compensate
    FailedToCompensate,
}

impl ParticipantStatus {
    /// Returns the status name
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Active => "Active",
            ParticipantStatus::Completing => "Completing",
            ParticipantStatus::Completed => "Completed",
            ParticipantStatus::FailedToComplete => "FailedToComplete",
            ParticipantStatus::Compensating => "Compensating",
            ParticipantStatus::Compensated => "Compensated",
            ParticipantStatus::FailedToCompensate => "FailedToCompensate",
        }
    }

    /// Terminal statuses accept only `forget`
    pub fn is_terminal(&self) -> bool {
        self.is_success() || self.is_failed()
    }

    /// Completed or Compensated
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ParticipantStatus::Completed | ParticipantStatus::Compensated
        )
    }

    /// FailedToComplete or FailedToCompensate
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            ParticipantStatus::FailedToComplete | ParticipantStatus::FailedToCompensate
        )
    }

    /// Completing or Compensating
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            ParticipantStatus::Completing | ParticipantStatus::Compensating
        )
    }

    /// Whether `next` is a legal successor of this status
    pub fn can_transition_to(&self, next: ParticipantStatus) -> bool {
        use ParticipantStatus::*;
        matches!(
            (self, next),
            (Active, Completing)
                | (Active, Compensating)
                | (Completing, Completed)
                | (Completing, FailedToComplete)
                | (Compensating, Compensated)
                | (Compensating, FailedToCompensate)
        )
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Active" => Ok(ParticipantStatus::Active),
            "Completing" => Ok(ParticipantStatus::Completing),
            "Completed" => Ok(ParticipantStatus::Completed),
            "FailedToComplete" => Ok(ParticipantStatus::FailedToComplete),
            "Compensating" => Ok(ParticipantStatus::Compensating),
            "Compensated" => Ok(ParticipantStatus::Compensated),
            "FailedToCompensate" => Ok(ParticipantStatus::FailedToCompensate),
            other => Err(format!("unknown participant status '{}'", other)),
        }
    }
}

/// Notification verb applied to every participant when an LRA ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    /// Sent on close
    Complete,
    /// Sent on cancel
    Compensate,
}

impl Verb {
    /// Returns the verb name
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Complete => "complete",
            Verb::Compensate => "compensate",
        }
    }

    /// LRA status entered when this verb starts being applied
    pub fn ending_status(&self) -> LraStatus {
        match self {
            Verb::Complete => LraStatus::Closing,
            Verb::Compensate => LraStatus::Cancelling,
        }
    }

    /// LRA status when every participant succeeded
    pub fn lra_success(&self) -> LraStatus {
        match self {
            Verb::Complete => LraStatus::Closed,
            Verb::Compensate => LraStatus::Cancelled,
        }
    }

    /// LRA status when at least one participant failed
    pub fn lra_failure(&self) -> LraStatus {
        match self {
            Verb::Complete => LraStatus::FailedToClose,
            Verb::Compensate => LraStatus::FailedToCancel,
        }
    }

    /// Participant status while the notification is in progress
    pub fn participant_in_progress(&self) -> ParticipantStatus {
        match self {
            Verb::Complete => ParticipantStatus::Completing,
            Verb::Compensate => ParticipantStatus::Compensating,
        }
    }

    /// Participant status on success
    pub fn participant_success(&self) -> ParticipantStatus {
        match self {
            Verb::Complete => ParticipantStatus::Completed,
            Verb::Compensate => ParticipantStatus::Compensated,
        }
    }

    /// Participant status on failure
    pub fn participant_failure(&self) -> ParticipantStatus {
        match self {
            Verb::Complete => ParticipantStatus::FailedToComplete,
            Verb::Compensate => ParticipantStatus::FailedToCompensate,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
