//! Participant Enlistment Manager
//!
//! Owns the ordered participant list of an LRA and each participant's
//! status state machine:
//!
//! - Active → Completing → {Completed, FailedToComplete}
//! - Active → Compensating → {Compensated, FailedToCompensate}
//!
//! A terminal participant accepts one more operation, `forget`.

use chrono::{DateTime, Utc};

use super::client::{CallKind, CallOutcome, ParticipantCall};
use crate::coordinator::RetryPolicy;
use crate::lra::{
    LraError, LraRecord, LraResult, LraStatus, ParticipantEndpoints, ParticipantId,
    ParticipantRecord, ParticipantStatus, Verb,
};

/// Result of enlisting a participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enlistment {
    /// Participant id (existing one for a repeated join)
    pub participant_id: ParticipantId,
    /// Whether a new participant was added
    pub created: bool,
}

/// Add a participant to an Active LRA.
///
/// Joining twice with the same endpoint set returns the existing id.
pub fn enlist(record: &mut LraRecord, endpoints: ParticipantEndpoints) -> LraResult<Enlistment> {
    if record.status != LraStatus::Active {
        return Err(LraError::invalid_state(&record.id, record.status, "join"));
    }
    if endpoints.complete.is_none() && endpoints.compensate.is_none() {
        return Err(LraError::InvalidRequest(
            "participant must register a complete or compensate endpoint".into(),
        ));
    }

    if let Some(existing) = record.participants.iter().find(|p| p.endpoints == endpoints) {
        return Ok(Enlistment {
            participant_id: existing.id.clone(),
            created: false,
        });
    }

    let participant = ParticipantRecord::new(endpoints);
    let participant_id = participant.id.clone();
    record.participants.push(participant);

    Ok(Enlistment {
        participant_id,
        created: true,
    })
}

/// Remove a terminal participant from its LRA
pub fn release(record: &mut LraRecord, participant_id: &ParticipantId) -> LraResult<ParticipantRecord> {
    let position = record
        .participants
        .iter()
        .position(|p| &p.id == participant_id)
        .ok_or_else(|| LraError::participant_not_found(&record.id, participant_id))?;

    let status = record.participants[position].status;
    if !status.is_terminal() {
        return Err(LraError::InvalidLraState(format!(
            "cannot forget participant {} of LRA {} in status {}",
            participant_id, record.id, status
        )));
    }

    Ok(record.participants.remove(position))
}

impl ParticipantRecord {
    /// Whether the participant still needs to be driven
    pub fn is_retryable(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Whether the backoff since the last attempt has elapsed
    pub fn is_due(&self, policy: &RetryPolicy, now: DateTime<Utc>) -> bool {
        match self.last_attempt {
            None => true,
            Some(last) => policy.next_attempt_at(last, self.attempts) <= now,
        }
    }

    /// Start a notification attempt for `verb`.
    ///
    /// Moves an Active participant to the in-progress status and counts the
    /// attempt. Returns the call to issue, or `None` when the participant
    /// registered no endpoint for `verb`; it is then considered done.
    pub fn begin_attempt(
        &mut self,
        lra_id: &crate::lra::LraId,
        verb: Verb,
        now: DateTime<Utc>,
    ) -> Option<ParticipantCall> {
        if self.status.is_terminal() {
            return None;
        }
        if self.status == ParticipantStatus::Active {
            self.status = verb.participant_in_progress();
        }

        let target = match (self.awaiting_status, self.endpoints.status.as_deref()) {
            (true, Some(status_url)) => {
                Some((CallKind::Status(verb), status_url.to_string()))
            }
            _ => self
                .endpoints
                .for_verb(verb)
                .map(|url| (CallKind::from(verb), url.to_string())),
        };

        match target {
            Some((kind, endpoint)) => {
                self.attempts += 1;
                self.last_attempt = Some(now);
                Some(ParticipantCall {
                    lra_id: lra_id.clone(),
                    participant_id: self.id.clone(),
                    kind,
                    endpoint,
                })
            }
            None => {
                self.status = verb.participant_success();
                None
            }
        }
    }

    /// Record the outcome of an attempt; returns the resulting status
    pub fn apply_outcome(
        &mut self,
        verb: Verb,
        outcome: &CallOutcome,
        policy: &RetryPolicy,
    ) -> ParticipantStatus {
        if self.status.is_terminal() {
            return self.status;
        }

        match outcome {
            CallOutcome::Succeeded => {
                self.status = verb.participant_success();
                self.awaiting_status = false;
            }
            CallOutcome::Rejected(reason) => {
                self.status = verb.participant_failure();
                self.awaiting_status = false;
                self.failure_reason = Some(reason.clone());
            }
            CallOutcome::Pending => {
                self.awaiting_status = true;
                if policy.is_exhausted(self.attempts) {
                    self.fail_exhausted(verb, "participant still in progress");
                }
            }
            CallOutcome::Transient(reason) => {
                if policy.is_exhausted(self.attempts) {
                    self.fail_exhausted(verb, reason);
                }
            }
        }
        self.status
    }

    fn fail_exhausted(&mut self, verb: Verb, last_error: &str) {
        self.status = verb.participant_failure();
        self.failure_reason = Some(format!(
            "retries exhausted after {} attempts: {}",
            self.attempts, last_error
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lra::LraId;
    use std::time::Duration;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_secs(1), Duration::from_secs(30))
    }

    fn active_record() -> LraRecord {
        LraRecord::new(LraId::new_root(), None, None)
    }

    #[test]
    fn test_join_is_idempotent_for_same_endpoints() {
        let mut record = active_record();
        let endpoints = ParticipantEndpoints::compensate("http://p1/compensate");

        let first = enlist(&mut record, endpoints.clone()).unwrap();
        let second = enlist(&mut record, endpoints).unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.participant_id, second.participant_id);
        assert_eq!(record.participants.len(), 1);
    }

    #[test]
    fn test_join_keeps_order() {
        let mut record = active_record();
        let p1 = enlist(&mut record, ParticipantEndpoints::compensate("http://p1")).unwrap();
        let p2 = enlist(&mut record, ParticipantEndpoints::compensate("http://p2")).unwrap();

        assert_eq!(record.participants[0].id, p1.participant_id);
        assert_eq!(record.participants[1].id, p2.participant_id);
    }

    #[test]
    fn test_join_rejected_unless_active() {
        let mut record = active_record();
        record.transition(LraStatus::Closing, "close").unwrap();

        let err = enlist(&mut record, ParticipantEndpoints::complete("http://p1")).unwrap_err();
        assert!(matches!(err, LraError::InvalidLraState(_)));
    }

    #[test]
    fn test_join_requires_an_action_endpoint() {
        let mut record = active_record();
        let endpoints = ParticipantEndpoints::default().with_status("http://p1/status");

        let err = enlist(&mut record, endpoints).unwrap_err();
        assert!(matches!(err, LraError::InvalidRequest(_)));
    }

    #[test]
    fn test_begin_attempt_counts_and_targets_verb() {
        let lra_id = LraId::new_root();
        let mut participant = ParticipantRecord::new(
            ParticipantEndpoints::complete("http://p1/complete").with_compensate("http://p1/comp"),
        );

        let call = participant
            .begin_attempt(&lra_id, Verb::Compensate, Utc::now())
            .unwrap();
        assert_eq!(call.kind, CallKind::Compensate);
        assert_eq!(call.endpoint, "http://p1/comp");
        assert_eq!(participant.status, ParticipantStatus::Compensating);
        assert_eq!(participant.attempts, 1);
    }

    #[test]
    fn test_missing_endpoint_counts_as_done() {
        let lra_id = LraId::new_root();
        let mut participant =
            ParticipantRecord::new(ParticipantEndpoints::compensate("http://p1/comp"));

        assert!(participant
            .begin_attempt(&lra_id, Verb::Complete, Utc::now())
            .is_none());
        assert_eq!(participant.status, ParticipantStatus::Completed);
        assert_eq!(participant.attempts, 0);
    }

    #[test]
    fn test_pending_switches_to_status_polling() {
        let lra_id = LraId::new_root();
        let mut participant = ParticipantRecord::new(
            ParticipantEndpoints::complete("http://p1/complete").with_status("http://p1/status"),
        );
        let policy = policy(5);

        participant.begin_attempt(&lra_id, Verb::Complete, Utc::now());
        participant.apply_outcome(Verb::Complete, &CallOutcome::Pending, &policy);
        assert!(participant.awaiting_status);
        assert_eq!(participant.status, ParticipantStatus::Completing);

        let call = participant
            .begin_attempt(&lra_id, Verb::Complete, Utc::now())
            .unwrap();
        assert_eq!(call.kind, CallKind::Status(Verb::Complete));
        assert_eq!(call.endpoint, "http://p1/status");
    }

    #[test]
    fn test_rejection_is_immediately_terminal() {
        let lra_id = LraId::new_root();
        let mut participant =
            ParticipantRecord::new(ParticipantEndpoints::compensate("http://p1/comp"));
        let policy = policy(5);

        participant.begin_attempt(&lra_id, Verb::Compensate, Utc::now());
        let status = participant.apply_outcome(
            Verb::Compensate,
            &CallOutcome::Rejected("HTTP 400".into()),
            &policy,
        );

        assert_eq!(status, ParticipantStatus::FailedToCompensate);
        assert_eq!(participant.failure_reason.as_deref(), Some("HTTP 400"));
        assert!(!participant.is_retryable());
    }

    #[test]
    fn test_transient_until_exhausted() {
        let lra_id = LraId::new_root();
        let mut participant = ParticipantRecord::new(ParticipantEndpoints::complete("http://p1"));
        let policy = policy(2);
        let transient = CallOutcome::Transient("connection refused".into());

        participant.begin_attempt(&lra_id, Verb::Complete, Utc::now());
        assert_eq!(
            participant.apply_outcome(Verb::Complete, &transient, &policy),
            ParticipantStatus::Completing
        );

        participant.begin_attempt(&lra_id, Verb::Complete, Utc::now());
        assert_eq!(
            participant.apply_outcome(Verb::Complete, &transient, &policy),
            ParticipantStatus::FailedToComplete
        );
        assert!(participant
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("retries exhausted after 2 attempts"));
    }

    #[test]
    fn test_terminal_status_is_never_overwritten() {
        let mut participant = ParticipantRecord::new(ParticipantEndpoints::complete("http://p1"));
        participant.status = ParticipantStatus::Completed;

        let status = participant.apply_outcome(
            Verb::Complete,
            &CallOutcome::Rejected("late".into()),
            &policy(1),
        );
        assert_eq!(status, ParticipantStatus::Completed);
    }

    #[test]
    fn test_is_due_honours_backoff() {
        let mut participant = ParticipantRecord::new(ParticipantEndpoints::complete("http://p1"));
        let policy = policy(5);
        let now = Utc::now();
        assert!(participant.is_due(&policy, now));

        participant.attempts = 1;
        participant.last_attempt = Some(now);
        assert!(!participant.is_due(&policy, now));
        assert!(participant.is_due(&policy, now + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_release_requires_terminal() {
        let mut record = active_record();
        let joined = enlist(&mut record, ParticipantEndpoints::complete("http://p1")).unwrap();

        let err = release(&mut record, &joined.participant_id).unwrap_err();
        assert!(matches!(err, LraError::InvalidLraState(_)));

        record.participants[0].status = ParticipantStatus::FailedToComplete;
        let released = release(&mut record, &joined.participant_id).unwrap();
        assert_eq!(released.id, joined.participant_id);
        assert!(record.participants.is_empty());

        let err = release(&mut record, &joined.participant_id).unwrap_err();
        assert!(matches!(err, LraError::NotFound(_)));
    }
}
