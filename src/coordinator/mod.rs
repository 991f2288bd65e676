//! Compensation/Completion Coordinator
//!
//! Drives an LRA in Closing/Cancelling towards a terminal status:
//!
//! 1. Plan (persisted): every due, non-terminal participant is marked in
//!    progress, its attempt counted and its endpoint chosen
//! 2. Fan-out: the planned calls run in parallel, bounded and timed out
//! 3. Apply (persisted): outcomes are recorded and the LRA status aggregated
//!
//! Nested LRAs count towards their parent's outcome: the parent stays ending
//! while a nested LRA is not terminal, and fails if one of them failed.
//!
//! A drive never waits out a backoff window. Participants that must be
//! retried later stay in progress in the store and the recovery sweep drives
//! the LRA again. One drive per LRA runs at a time; a second one skips.

mod fanout;
mod retry;

pub use fanout::notify_all;
pub use retry::RetryPolicy;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::crash_point::{maybe_crash, points};
use crate::lra::{LraError, LraId, LraRecord, LraResult, LraStatus, Verb};
use crate::observability::{log_event_with_fields, Event};
use crate::participant::{CallOutcome, ParticipantCall, ParticipantClient};
use crate::registry::{operation_name, LraEntry, LraRegistry};

/// Coordinator tuning
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Retry policy for participant calls
    pub retry: RetryPolicy,
    /// Timeout for one participant call
    pub call_timeout: Duration,
    /// Parallel calls per LRA
    pub max_concurrent_notifications: usize,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(5),
            max_concurrent_notifications: 8,
        }
    }
}

/// Result of one drive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveReport {
    /// LRA driven
    pub lra_id: LraId,
    /// Status after the drive
    pub status: LraStatus,
    /// Participant calls issued
    pub calls: usize,
    /// Another drive was running; nothing was done
    pub skipped: bool,
}

impl DriveReport {
    /// Whether the LRA reached a terminal status
    pub fn is_resolved(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Combined state of an LRA's nested LRAs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestedOutcome {
    /// Every nested LRA succeeded or was released (also when there are none)
    Done,
    /// At least one nested LRA has not reached a terminal status
    Pending,
    /// None is pending and at least one failed
    Failed,
}

impl NestedOutcome {
    /// Combine nested LRA statuses; `None` stands for one that was forgotten
    pub fn of(statuses: impl IntoIterator<Item = Option<LraStatus>>) -> Self {
        let mut failed = false;
        for status in statuses.into_iter().flatten() {
            if !status.is_terminal() {
                return NestedOutcome::Pending;
            }
            failed |= status.is_failed();
        }
        if failed {
            NestedOutcome::Failed
        } else {
            NestedOutcome::Done
        }
    }
}

/// Drives ending LRAs through participant notification
#[derive(Debug)]
pub struct Coordinator {
    registry: Arc<LraRegistry>,
    client: Arc<dyn ParticipantClient>,
    settings: CoordinatorSettings,
}

impl Coordinator {
    /// Create a coordinator
    pub fn new(
        registry: Arc<LraRegistry>,
        client: Arc<dyn ParticipantClient>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            registry,
            client,
            settings,
        }
    }

    /// Retry policy in use
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.settings.retry
    }

    /// Participant client in use
    pub fn client(&self) -> &Arc<dyn ParticipantClient> {
        &self.client
    }

    /// Run one plan/fan-out/apply round for `entry`
    pub async fn drive(&self, entry: Arc<LraEntry>) -> LraResult<DriveReport> {
        let _driving = match entry.try_begin_drive() {
            Some(guard) => guard,
            None => {
                return Ok(DriveReport {
                    lra_id: entry.id().clone(),
                    status: entry.status()?,
                    calls: 0,
                    skipped: true,
                })
            }
        };

        let policy = self.settings.retry;
        let now = Utc::now();
        let nested = self.nested_outcome(&entry.snapshot()?.children)?;
        let (verb, calls, planned) = self.registry.update(&entry, |record| {
            let verb = match record.status.verb() {
                Some(verb) => verb,
                None => return Ok((None, Vec::new(), record.clone())),
            };

            let lra_id = record.id.clone();
            let mut calls = Vec::new();
            for participant in record.participants.iter_mut() {
                if !participant.is_retryable() || !participant.is_due(&policy, now) {
                    continue;
                }
                if let Some(call) = participant.begin_attempt(&lra_id, verb, now) {
                    calls.push(call);
                }
            }
            if !calls.is_empty() {
                record.last_attempt = Some(now);
            }
            aggregate(record, verb, nested)?;
            Ok((Some(verb), calls, record.clone()))
        })?;
        maybe_crash(points::FANOUT_AFTER_PLAN);

        let verb = match verb {
            Some(verb) if !calls.is_empty() => verb,
            _ => {
                log_resolution(&planned);
                return Ok(DriveReport {
                    lra_id: planned.id.clone(),
                    status: planned.status,
                    calls: 0,
                    skipped: false,
                });
            }
        };

        let call_count = calls.len();
        let outcomes = notify_all(
            Arc::clone(&self.client),
            calls,
            self.settings.call_timeout,
            self.settings.max_concurrent_notifications,
        )
        .await;
        maybe_crash(points::FANOUT_BEFORE_APPLY);

        let nested = self.nested_outcome(&planned.children)?;
        let applied = self.registry.update(&entry, |record| {
            if record.status.verb() != Some(verb) {
                return Ok(record.clone());
            }
            for (call, outcome) in &outcomes {
                if let Some(participant) = record.participant_mut(&call.participant_id) {
                    participant.apply_outcome(verb, outcome, &policy);
                }
            }
            aggregate(record, verb, nested)?;
            Ok(record.clone())
        })?;
        maybe_crash(points::FANOUT_AFTER_APPLY);

        log_outcomes(&applied, &outcomes);
        log_resolution(&applied);

        Ok(DriveReport {
            lra_id: applied.id.clone(),
            status: applied.status,
            calls: call_count,
            skipped: false,
        })
    }

    /// Current combined state of `children`
    pub fn nested_outcome(&self, children: &[LraId]) -> LraResult<NestedOutcome> {
        let mut statuses = Vec::with_capacity(children.len());
        for child in children {
            match self.registry.get(child) {
                Ok(entry) => statuses.push(Some(entry.status()?)),
                Err(LraError::NotFound(_)) => statuses.push(None),
                Err(e) => return Err(e),
            }
        }
        Ok(NestedOutcome::of(statuses))
    }
}

/// Settle the LRA status from its participants and nested LRAs.
///
/// Nothing changes while a nested LRA is pending. Success once every
/// participant and nested LRA succeeded (including when there are none);
/// failure once no participant is retryable and something failed.
pub fn aggregate(record: &mut LraRecord, verb: Verb, nested: NestedOutcome) -> LraResult<()> {
    if record.status != verb.ending_status() || nested == NestedOutcome::Pending {
        return Ok(());
    }

    let operation = operation_name(verb);
    let participants_succeeded = record.participants.iter().all(|p| p.status.is_success());
    if participants_succeeded && nested == NestedOutcome::Done {
        record.transition(verb.lra_success(), operation)?;
    } else if record.participants.iter().all(|p| !p.is_retryable()) {
        record.transition(verb.lra_failure(), operation)?;
    }
    Ok(())
}

fn log_outcomes(record: &LraRecord, outcomes: &[(ParticipantCall, CallOutcome)]) {
    for (call, outcome) in outcomes {
        let participant = match record.participant(&call.participant_id) {
            Some(participant) => participant,
            None => continue,
        };
        let attempts = participant.attempts.to_string();
        let fields = [
            ("lra_id", record.id.as_str()),
            ("participant_id", participant.id.as_str()),
            ("call", call.kind.as_str()),
            ("outcome", outcome.as_str()),
            ("status", participant.status.as_str()),
            ("attempts", attempts.as_str()),
        ];

        log_event_with_fields(Event::ParticipantNotified, &fields);
        if participant.status.is_failed() {
            let reason = participant.failure_reason.as_deref().unwrap_or("");
            log_event_with_fields(
                Event::ParticipantFailed,
                &[
                    ("lra_id", record.id.as_str()),
                    ("participant_id", participant.id.as_str()),
                    ("reason", reason),
                ],
            );
        } else if participant.is_retryable() {
            log_event_with_fields(Event::ParticipantRetryScheduled, &fields);
        }
    }
}

fn log_resolution(record: &LraRecord) {
    let event = match record.status {
        LraStatus::Closed => Event::LraClosed,
        LraStatus::Cancelled => Event::LraCancelled,
        LraStatus::FailedToClose => Event::LraFailedToClose,
        LraStatus::FailedToCancel => Event::LraFailedToCancel,
        _ => return,
    };
    let participants = record.participants.len().to_string();
    log_event_with_fields(
        event,
        &[("lra_id", record.id.as_str()), ("participants", participants.as_str())],
    );
}
