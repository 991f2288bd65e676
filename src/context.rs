//! Coordinator context
//!
//! `LraContext` owns the store handle, registry, coordinator, recovery sweep,
//! the set of in-flight fan-outs and the scheduled sweep. Every request
//! operation is a method on it; nothing is global.
//!
//! `close` and `cancel` persist the transition before returning and run the
//! participant fan-out in the background. `quiesce` waits for those
//! fan-outs; `shutdown` waits up to the configured grace period and aborts
//! the rest, leaving their last persisted state to the next sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinSet;

use crate::config::CoordinatorConfig;
use crate::coordinator::Coordinator;
use crate::inspect::StoreSnapshot;
use crate::lra::{
    LraError, LraId, LraRecord, LraResult, LraStatus, ParticipantEndpoints, ParticipantId,
    ParticipantRecord, ParticipantStatus, Verb,
};
use crate::observability::{log_event, log_event_with_fields, Event};
use crate::participant::{
    enlist, release, CallKind, CallOutcome, HttpParticipantClient, ParticipantCall,
    ParticipantClient,
};
use crate::recovery::{RecoverySweep, ScheduledSweep, SweepReport, SweepScheduler};
use crate::registry::{LraEntry, LraRegistry};
use crate::store::{FileStore, RecordKind, RecordStore};

/// Read-only view of an LRA
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LraStatusReport {
    pub lra_id: LraId,
    pub status: LraStatus,
    pub participants: Vec<ParticipantStatusReport>,
}

/// Read-only view of one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantStatusReport {
    pub participant_id: ParticipantId,
    pub status: ParticipantStatus,
}

/// What shutdown did with in-flight fan-outs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Fan-outs that finished within the grace period
    pub drained: usize,
    /// Fan-outs aborted at the end of the grace period
    pub aborted: usize,
}

/// The coordinator
#[derive(Debug)]
pub struct LraContext {
    config: CoordinatorConfig,
    registry: Arc<LraRegistry>,
    coordinator: Arc<Coordinator>,
    sweep: Arc<RecoverySweep>,
    in_flight: tokio::sync::Mutex<JoinSet<()>>,
    shutting_down: AtomicBool,
    scheduled: Mutex<Option<ScheduledSweep>>,
}

impl LraContext {
    /// Build a context over an explicit store and participant client
    pub fn new(
        config: CoordinatorConfig,
        store: Arc<dyn RecordStore>,
        client: Arc<dyn ParticipantClient>,
    ) -> Self {
        let registry = Arc::new(LraRegistry::with_settled_capacity(
            store,
            config.settled_cache_size,
        ));
        let coordinator = Arc::new(Coordinator::new(
            Arc::clone(&registry),
            client,
            config.coordinator_settings(),
        ));
        let sweep = Arc::new(RecoverySweep::new(
            Arc::clone(&registry),
            Arc::clone(&coordinator),
            config.retry_policy().initial_backoff(),
        ));

        Self {
            config,
            registry,
            coordinator,
            sweep,
            in_flight: tokio::sync::Mutex::new(JoinSet::new()),
            shutting_down: AtomicBool::new(false),
            scheduled: Mutex::new(None),
        }
    }

    /// Open the file store under `config.data_dir` and notify participants over HTTP
    pub fn open(config: CoordinatorConfig) -> LraResult<Self> {
        let store = FileStore::open(&config.data_dir)?;
        let client = HttpParticipantClient::new(config.call_timeout())?;
        Ok(Self::new(config, Arc::new(store), Arc::new(client)))
    }

    /// Configuration in use
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Backing store
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        self.registry.store()
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Start an LRA, nested under `parent` if given
    pub fn start(&self, parent: Option<&LraId>) -> LraResult<LraId> {
        self.start_with_timeout(parent, None)
    }

    /// Start an LRA that is cancelled if still Active after `timeout`.
    ///
    /// Without a timeout the configured default applies, if any.
    pub fn start_with_timeout(
        &self,
        parent: Option<&LraId>,
        timeout: Option<Duration>,
    ) -> LraResult<LraId> {
        let deadline = match timeout.or_else(|| self.config.default_lra_timeout()) {
            Some(timeout) => Some(deadline_after(timeout)?),
            None => None,
        };

        let entry = self.registry.create(parent, deadline)?;
        let parent_field = parent.map(|p| p.to_string()).unwrap_or_default();
        log_event_with_fields(
            Event::LraStarted,
            &[("lra_id", entry.id().as_str()), ("parent", parent_field.as_str())],
        );
        Ok(entry.id().clone())
    }

    /// Enlist a participant; joining again with the same endpoints returns the same id
    pub fn join(&self, lra_id: &LraId, endpoints: ParticipantEndpoints) -> LraResult<ParticipantId> {
        let entry = self.registry.get(lra_id)?;
        let enlistment = self
            .registry
            .update(&entry, |record| enlist(record, endpoints.clone()))?;

        if enlistment.created {
            log_event_with_fields(
                Event::ParticipantJoined,
                &[
                    ("lra_id", lra_id.as_str()),
                    ("participant_id", enlistment.participant_id.as_str()),
                ],
            );
        }
        Ok(enlistment.participant_id)
    }

    /// Close: complete every participant
    pub async fn close(&self, lra_id: &LraId) -> LraResult<()> {
        self.end(lra_id, Verb::Complete).await
    }

    /// Cancel: compensate every participant
    pub async fn cancel(&self, lra_id: &LraId) -> LraResult<()> {
        self.end(lra_id, Verb::Compensate).await
    }

    async fn end(&self, lra_id: &LraId, verb: Verb) -> LraResult<()> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(LraError::ShuttingDown);
        }

        let to_drive = self.registry.begin_end(lra_id, verb)?;
        let event = match verb {
            Verb::Complete => Event::LraClosing,
            Verb::Compensate => Event::LraCancelling,
        };
        for entry in &to_drive {
            log_event_with_fields(event, &[("lra_id", entry.id().as_str())]);
        }

        self.spawn_drives(to_drive).await;
        Ok(())
    }

    /// Drive `entries` in order on one background task; nested LRAs come
    /// before their parent so the parent sees their outcome
    async fn spawn_drives(&self, entries: Vec<Arc<LraEntry>>) {
        let mut in_flight = self.in_flight.lock().await;
        while in_flight.try_join_next().is_some() {}

        let coordinator = Arc::clone(&self.coordinator);
        in_flight.spawn(async move {
            for entry in entries {
                let lra_id = entry.id().clone();
                if let Err(e) = coordinator.drive(entry).await {
                    log_event_with_fields(
                        Event::LraDriveFailed,
                        &[("lra_id", lra_id.as_str()), ("error", e.to_string().as_str())],
                    );
                }
            }
        });
    }

    /// Move an Active LRA's deadline to `timeout` from now
    pub fn renew(&self, lra_id: &LraId, timeout: Duration) -> LraResult<()> {
        let deadline = deadline_after(timeout)?;
        let entry = self.registry.get(lra_id)?;
        self.registry.update(&entry, |record| {
            if record.status != LraStatus::Active {
                return Err(LraError::invalid_state(&record.id, record.status, "renew"));
            }
            record.deadline = Some(deadline);
            Ok(())
        })?;

        log_event_with_fields(
            Event::LraRenewed,
            &[
                ("lra_id", lra_id.as_str()),
                ("deadline", deadline.to_rfc3339().as_str()),
            ],
        );
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Status of an LRA and its participants
    pub fn status(&self, lra_id: &LraId) -> LraResult<LraStatusReport> {
        let record = self.record(lra_id)?;
        Ok(LraStatusReport {
            lra_id: record.id,
            status: record.status,
            participants: record
                .participants
                .into_iter()
                .map(|p| ParticipantStatusReport {
                    participant_id: p.id,
                    status: p.status,
                })
                .collect(),
        })
    }

    /// Full record of an LRA
    pub fn record(&self, lra_id: &LraId) -> LraResult<LraRecord> {
        self.registry.get(lra_id)?.snapshot()
    }

    /// Ids of LRAs that ended FailedToClose/FailedToCancel and are not forgotten
    pub fn failed_lras(&self) -> LraResult<Vec<LraId>> {
        self.store()
            .list_by_kind(RecordKind::LraFailed)?
            .iter()
            .map(|raw| raw.parse())
            .collect()
    }

    /// Read-only export of the records of one kind
    pub fn snapshot(&self, kind: RecordKind) -> LraResult<StoreSnapshot> {
        Ok(StoreSnapshot::take(self.store().as_ref(), kind)?)
    }

    // ---------------------------------------------------------------------
    // Forget
    // ---------------------------------------------------------------------

    /// Release a terminal LRA.
    ///
    /// Failed participants with a forget endpoint are told first. If one of
    /// them cannot be reached the LRA is kept and the call can be repeated.
    pub async fn forget(&self, lra_id: &LraId) -> LraResult<()> {
        let record = self.record(lra_id)?;
        if !record.status.is_terminal() {
            return Err(LraError::invalid_state(lra_id, record.status, "forget"));
        }

        for participant in &record.participants {
            self.notify_forget(lra_id, participant).await?;
        }

        self.registry.forget(lra_id)?;
        log_event_with_fields(Event::LraForgotten, &[("lra_id", lra_id.as_str())]);
        Ok(())
    }

    /// Release one terminal participant
    pub async fn forget_participant(
        &self,
        lra_id: &LraId,
        participant_id: &ParticipantId,
    ) -> LraResult<()> {
        let entry = self.registry.get(lra_id)?;
        let participant = entry
            .snapshot()?
            .participant(participant_id)
            .cloned()
            .ok_or_else(|| LraError::participant_not_found(lra_id, participant_id))?;
        if !participant.status.is_terminal() {
            return Err(LraError::InvalidLraState(format!(
                "cannot forget participant {} of LRA {} in status {}",
                participant_id, lra_id, participant.status
            )));
        }

        self.notify_forget(lra_id, &participant).await?;
        self.registry
            .update(&entry, |record| release(record, participant_id).map(|_| ()))?;

        log_event_with_fields(
            Event::ParticipantForgotten,
            &[
                ("lra_id", lra_id.as_str()),
                ("participant_id", participant_id.as_str()),
            ],
        );
        Ok(())
    }

    async fn notify_forget(&self, lra_id: &LraId, participant: &ParticipantRecord) -> LraResult<()> {
        let endpoint = match (&participant.endpoints.forget, participant.status.is_failed()) {
            (Some(endpoint), true) => endpoint.clone(),
            _ => return Ok(()),
        };
        let call = ParticipantCall {
            lra_id: lra_id.clone(),
            participant_id: participant.id.clone(),
            kind: CallKind::Forget,
            endpoint,
        };

        let outcome = tokio::time::timeout(
            self.config.call_timeout(),
            self.coordinator.client().call(&call),
        )
        .await
        .unwrap_or_else(|_| CallOutcome::Transient("forget call timed out".into()));

        match outcome {
            CallOutcome::Succeeded => Ok(()),
            // nothing more can be done for this participant
            CallOutcome::Rejected(reason) => {
                log_event_with_fields(
                    Event::ParticipantFailed,
                    &[
                        ("lra_id", lra_id.as_str()),
                        ("participant_id", participant.id.as_str()),
                        ("reason", reason.as_str()),
                    ],
                );
                Ok(())
            }
            CallOutcome::Pending => Err(LraError::ParticipantCommunicationFailure(format!(
                "participant {} has not finished forgetting LRA {}",
                participant.id, lra_id
            ))),
            CallOutcome::Transient(reason) => Err(LraError::ParticipantCommunicationFailure(
                format!("forget participant {}: {}", participant.id, reason),
            )),
        }
    }

    // ---------------------------------------------------------------------
    // Recovery and shutdown
    // ---------------------------------------------------------------------

    /// Run one recovery sweep now
    pub async fn run_recovery_sweep(&self) -> LraResult<SweepReport> {
        self.sweep.run().await
    }

    /// Hand the recovery sweep to `scheduler`; at most one schedule runs
    pub fn start_recovery(&self, scheduler: &dyn SweepScheduler) -> LraResult<()> {
        let mut scheduled = self.scheduled.lock().map_err(|_| LraError::poisoned())?;
        if scheduled.is_some() {
            return Err(LraError::InvalidRequest("recovery is already scheduled".into()));
        }
        *scheduled = Some(scheduler.schedule(Arc::clone(&self.sweep)));
        Ok(())
    }

    /// Wait for every in-flight fan-out to finish
    pub async fn quiesce(&self) {
        let mut in_flight = self.in_flight.lock().await;
        while in_flight.join_next().await.is_some() {}
    }

    /// Stop the sweep, reject new close/cancel, drain fan-outs within the grace period
    pub async fn shutdown(&self) -> ShutdownReport {
        self.shutting_down.store(true, Ordering::SeqCst);
        log_event(Event::ShutdownStart);

        let scheduled = self.scheduled.lock().ok().and_then(|mut s| s.take());
        if let Some(scheduled) = scheduled {
            scheduled.stop().await;
        }

        let mut in_flight = self.in_flight.lock().await;
        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace();
        let mut report = ShutdownReport::default();
        while let Ok(Some(_)) = tokio::time::timeout_at(deadline, in_flight.join_next()).await {
            report.drained += 1;
        }

        report.aborted = in_flight.len();
        in_flight.abort_all();
        while in_flight.join_next().await.is_some() {}

        let drained = report.drained.to_string();
        let aborted = report.aborted.to_string();
        log_event_with_fields(
            Event::ShutdownComplete,
            &[("drained", drained.as_str()), ("aborted", aborted.as_str())],
        );
        report
    }

    /// Whether shutdown has begun
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

fn deadline_after(timeout: Duration) -> LraResult<chrono::DateTime<Utc>> {
    chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|timeout| Utc::now().checked_add_signed(timeout))
        .ok_or_else(|| LraError::InvalidRequest(format!("timeout {:?} is out of range", timeout)))
}
