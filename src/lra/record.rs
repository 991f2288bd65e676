//! Persisted LRA and participant records
//!
//! Records serialize as JSON. The store keys them by kind and id:
//! - `lra-active` while the LRA is Active, Closing or Cancelling
//! - `lra-failed` once it reached FailedToClose or FailedToCancel
//!
//! Closed and Cancelled records are released from the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{LraError, LraResult};
use super::id::{LraId, ParticipantId};
use super::status::{LraStatus, ParticipantStatus, Verb};
use crate::store::{Generation, RecordKind, StoreError, StoreResult};

/// Callback endpoints a participant registers on join
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantEndpoints {
    /// Called on close
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<String>,

    /// Called on cancel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensate: Option<String>,

    /// Polled after the participant answered "accepted"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Called when an operator releases a failed participant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forget: Option<String>,
}

impl ParticipantEndpoints {
    /// Endpoint set with only a complete callback
    pub fn complete(url: impl Into<String>) -> Self {
        Self {
            complete: Some(url.into()),
            ..Default::default()
        }
    }

    /// Endpoint set with only a compensate callback
    pub fn compensate(url: impl Into<String>) -> Self {
        Self {
            compensate: Some(url.into()),
            ..Default::default()
        }
    }

    /// Add a complete callback
    pub fn with_complete(mut self, url: impl Into<String>) -> Self {
        self.complete = Some(url.into());
        self
    }

    /// Add a compensate callback
    pub fn with_compensate(mut self, url: impl Into<String>) -> Self {
        self.compensate = Some(url.into());
        self
    }

    /// Add a status callback
    pub fn with_status(mut self, url: impl Into<String>) -> Self {
        self.status = Some(url.into());
        self
    }

    /// Add a forget callback
    pub fn with_forget(mut self, url: impl Into<String>) -> Self {
        self.forget = Some(url.into());
        self
    }

    /// Endpoint for the given verb
    pub fn for_verb(&self, verb: Verb) -> Option<&str> {
        match verb {
            Verb::Complete => self.complete.as_deref(),
            Verb::Compensate => self.compensate.as_deref(),
        }
    }
}

/// A participant enlisted in one LRA
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    /// Participant id
    pub id: ParticipantId,

    /// Registered callbacks
    pub endpoints: ParticipantEndpoints,

    /// Participant status
    pub status: ParticipantStatus,

    /// Notification attempts made so far
    #[serde(default)]
    pub attempts: u32,

    /// Time of the last notification attempt
    #[serde(default)]
    pub last_attempt: Option<DateTime<Utc>>,

    /// Participant answered "accepted, still working"; poll its status next
    #[serde(default)]
    pub awaiting_status: bool,

    /// Why the participant ended in a failed status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl ParticipantRecord {
    /// Create a freshly enlisted participant
    pub fn new(endpoints: ParticipantEndpoints) -> Self {
        Self {
            id: ParticipantId::generate(),
            endpoints,
            status: ParticipantStatus::Active,
            attempts: 0,
            last_attempt: None,
            awaiting_status: false,
            failure_reason: None,
        }
    }
}

/// Durable state of one LRA
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LraRecord {
    /// LRA id
    pub id: LraId,

    /// Current status
    pub status: LraStatus,

    /// Enclosing LRA, for nested LRAs
    #[serde(default)]
    pub parent: Option<LraId>,

    /// Nested LRAs started under this one, in start order
    #[serde(default)]
    pub children: Vec<LraId>,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// The LRA is cancelled once this passes while still Active
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,

    /// Time of the last participant fan-out
    #[serde(default)]
    pub last_attempt: Option<DateTime<Utc>>,

    /// Enlisted participants, in join order
    #[serde(default)]
    pub participants: Vec<ParticipantRecord>,

    /// Optimistic concurrency counter; incremented on every persist
    pub generation: Generation,
}

impl LraRecord {
    /// Create a new Active record (generation 0, not yet persisted)
    pub fn new(id: LraId, parent: Option<LraId>, deadline: Option<DateTime<Utc>>) -> Self {
        Self {
            id,
            status: LraStatus::Active,
            parent,
            children: Vec::new(),
            created_at: Utc::now(),
            deadline,
            last_attempt: None,
            participants: Vec::new(),
            generation: 0,
        }
    }

    /// Store kind this record belongs under, or `None` once released
    pub fn placement(&self) -> Option<RecordKind> {
        match self.status {
            LraStatus::Active | LraStatus::Closing | LraStatus::Cancelling => {
                Some(RecordKind::LraActive)
            }
            LraStatus::FailedToClose | LraStatus::FailedToCancel => Some(RecordKind::LraFailed),
            LraStatus::Closed | LraStatus::Cancelled => None,
        }
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    pub fn transition(&mut self, next: LraStatus, operation: &str) -> LraResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(LraError::invalid_state(&self.id, self.status, operation));
        }
        self.status = next;
        Ok(())
    }

    /// Whether the deadline passed while the LRA is still Active
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == LraStatus::Active && self.deadline.map(|d| d <= now).unwrap_or(false)
    }

    /// Look up a participant
    pub fn participant(&self, id: &ParticipantId) -> Option<&ParticipantRecord> {
        self.participants.iter().find(|p| &p.id == id)
    }

    /// Look up a participant mutably
    pub fn participant_mut(&mut self, id: &ParticipantId) -> Option<&mut ParticipantRecord> {
        self.participants.iter_mut().find(|p| &p.id == id)
    }

    /// Serialize for the store
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            StoreError::Serialization(format!("failed to encode LRA {}: {}", self.id, e))
        })
    }

    /// Deserialize a stored record
    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| StoreError::Serialization(format!("failed to decode LRA record: {}", e)))
    }
}
