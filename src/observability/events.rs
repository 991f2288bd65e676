//! Observable coordinator events
//!
//! Events are explicit and typed; each carries the severity it is logged at.

use std::fmt;

use super::logger::Severity;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Coordinator startup begins
    BootStart,
    /// Coordinator ready
    BootComplete,
    /// Shutdown initiated
    ShutdownStart,
    /// Shutdown complete
    ShutdownComplete,
    /// Configuration loaded
    ConfigLoaded,

    // LRA lifecycle
    /// LRA created
    LraStarted,
    /// Participant enlisted
    ParticipantJoined,
    /// Deadline extended
    LraRenewed,
    /// Close requested
    LraClosing,
    /// Cancel requested
    LraCancelling,
    /// Every participant completed
    LraClosed,
    /// Every participant compensated
    LraCancelled,
    /// Close ended with failed participants
    LraFailedToClose,
    /// Cancel ended with failed participants
    LraFailedToCancel,
    /// Active LRA passed its deadline
    LraExpired,
    /// Terminal LRA released
    LraForgotten,
    /// Terminal participant released
    ParticipantForgotten,

    // Notification
    /// Participant callback answered
    ParticipantNotified,
    /// Participant will be retried
    ParticipantRetryScheduled,
    /// Participant ended in a failed status
    ParticipantFailed,
    /// A notification task died before answering
    NotificationTaskFailed,
    /// A drive stopped on a store or internal error
    LraDriveFailed,

    // Recovery
    /// Recovery sweep begins
    RecoverySweepBegin,
    /// Recovery sweep complete
    RecoverySweepComplete,
    /// Recovery sweep could not process a record
    RecoverySweepFailed,
    /// Leftover active copy of a failed record removed
    StaleRecordRemoved,

    // Store
    /// A store write failed
    StoreWriteFailed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "COORDINATOR_STARTUP_BEGIN",
            Event::BootComplete => "COORDINATOR_STARTUP_COMPLETE",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::LraStarted => "LRA_STARTED",
            Event::ParticipantJoined => "PARTICIPANT_JOINED",
            Event::LraRenewed => "LRA_RENEWED",
            Event::LraClosing => "LRA_CLOSING",
            Event::LraCancelling => "LRA_CANCELLING",
            Event::LraClosed => "LRA_CLOSED",
            Event::LraCancelled => "LRA_CANCELLED",
            Event::LraFailedToClose => "LRA_FAILED_TO_CLOSE",
            Event::LraFailedToCancel => "LRA_FAILED_TO_CANCEL",
            Event::LraExpired => "LRA_EXPIRED",
            Event::LraForgotten => "LRA_FORGOTTEN",
            Event::ParticipantForgotten => "PARTICIPANT_FORGOTTEN",

            Event::ParticipantNotified => "PARTICIPANT_NOTIFIED",
            Event::ParticipantRetryScheduled => "PARTICIPANT_RETRY_SCHEDULED",
            Event::ParticipantFailed => "PARTICIPANT_FAILED",
            Event::NotificationTaskFailed => "NOTIFICATION_TASK_FAILED",
            Event::LraDriveFailed => "LRA_DRIVE_FAILED",

            Event::RecoverySweepBegin => "RECOVERY_SWEEP_BEGIN",
            Event::RecoverySweepComplete => "RECOVERY_SWEEP_COMPLETE",
            Event::RecoverySweepFailed => "RECOVERY_SWEEP_FAILED",
            Event::StaleRecordRemoved => "STALE_RECORD_REMOVED",

            Event::StoreWriteFailed => "STORE_WRITE_FAILED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::ParticipantNotified => Severity::Trace,
            Event::ParticipantRetryScheduled
            | Event::LraExpired
            | Event::StaleRecordRemoved => Severity::Warn,
            Event::LraFailedToClose
            | Event::LraFailedToCancel
            | Event::ParticipantFailed
            | Event::NotificationTaskFailed
            | Event::LraDriveFailed
            | Event::RecoverySweepFailed
            | Event::StoreWriteFailed => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
