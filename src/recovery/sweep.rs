//! Recovery sweep
//!
//! # Sweep (per `lra-active` record)
//!
//! 1. An id also stored under `lra-failed` is a leftover of an interrupted
//!    kind move: remove the active copy
//! 2. Active past its deadline: cancel (with cascade) and drive
//! 3. Closing/Cancelling with no fan-out within `stale_after`: move any
//!    children still Active to the same verb, then drive
//!
//! Records are visited deepest nesting first so a parent is driven after
//! its nested LRAs in the same sweep.
//!
//! Errors on one record are counted and logged; the sweep moves on.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::coordinator::Coordinator;
use crate::lra::{LraId, LraRecord, LraResult, LraStatus, Verb};
use crate::observability::{log_event, log_event_with_fields, Event};
use crate::registry::{LraEntry, LraRegistry};
use crate::store::RecordKind;

/// Counters from one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// `lra-active` records examined
    pub scanned: usize,
    /// Drives performed
    pub driven: usize,
    /// Active LRAs cancelled for passing their deadline
    pub expired: usize,
    /// Drives that ended in a terminal status
    pub resolved: usize,
    /// Drives that left the LRA ending
    pub pending: usize,
    /// Records that could not be processed
    pub errors: usize,
}

/// Re-drives LRAs a crash or a retry left mid-flight
#[derive(Debug)]
pub struct RecoverySweep {
    registry: Arc<LraRegistry>,
    coordinator: Arc<Coordinator>,
    stale_after: Duration,
}

impl RecoverySweep {
    /// Create a sweep; ending LRAs are driven once idle for `stale_after`
    pub fn new(
        registry: Arc<LraRegistry>,
        coordinator: Arc<Coordinator>,
        stale_after: Duration,
    ) -> Self {
        Self {
            registry,
            coordinator,
            stale_after,
        }
    }

    /// Run one sweep over the store
    pub async fn run(&self) -> LraResult<SweepReport> {
        log_event(Event::RecoverySweepBegin);

        let store = self.registry.store();
        let mut active = store.list_by_kind(RecordKind::LraActive)?;
        active.sort_by_key(|raw| {
            let depth = raw.parse::<LraId>().map(|id| id.depth()).unwrap_or(0);
            Reverse(depth)
        });
        let failed: HashSet<String> = store
            .list_by_kind(RecordKind::LraFailed)?
            .into_iter()
            .collect();

        let mut report = SweepReport::default();
        let now = Utc::now();
        for raw_id in &active {
            report.scanned += 1;
            if let Err(e) = self.recover_one(raw_id, &failed, now, &mut report).await {
                report.errors += 1;
                log_event_with_fields(
                    Event::RecoverySweepFailed,
                    &[("lra_id", raw_id.as_str()), ("error", e.to_string().as_str())],
                );
            }
        }

        let counts = [
            report.scanned.to_string(),
            report.driven.to_string(),
            report.expired.to_string(),
            report.resolved.to_string(),
            report.pending.to_string(),
            report.errors.to_string(),
        ];
        log_event_with_fields(
            Event::RecoverySweepComplete,
            &[
                ("scanned", counts[0].as_str()),
                ("driven", counts[1].as_str()),
                ("expired", counts[2].as_str()),
                ("resolved", counts[3].as_str()),
                ("pending", counts[4].as_str()),
                ("errors", counts[5].as_str()),
            ],
        );
        Ok(report)
    }

    async fn recover_one(
        &self,
        raw_id: &str,
        failed: &HashSet<String>,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> LraResult<()> {
        if failed.contains(raw_id) {
            self.registry.store().remove(RecordKind::LraActive, raw_id)?;
            log_event_with_fields(Event::StaleRecordRemoved, &[("lra_id", raw_id)]);
            return Ok(());
        }

        let id: LraId = raw_id.parse()?;
        let entry = self.registry.get(&id)?;
        let record = entry.snapshot()?;

        match record.status {
            LraStatus::Active if record.is_expired(now) => {
                let to_drive = self.registry.begin_end(&id, Verb::Compensate)?;
                report.expired += 1;
                log_event_with_fields(Event::LraExpired, &[("lra_id", id.as_str())]);
                for entry in to_drive {
                    self.drive(entry, report).await?;
                }
            }
            LraStatus::Closing | LraStatus::Cancelling if self.is_stale(&record, now) => {
                if let Some(verb) = record.status.verb() {
                    for child in self.registry.resume_cascade(&record.children, verb)? {
                        self.drive(child, report).await?;
                    }
                }
                self.drive(entry, report).await?;
            }
            _ => {}
        }
        Ok(())
    }

    fn is_stale(&self, record: &LraRecord, now: DateTime<Utc>) -> bool {
        match record.last_attempt {
            None => true,
            Some(last) => (now - last)
                .to_std()
                .map(|idle| idle >= self.stale_after)
                .unwrap_or(false),
        }
    }

    async fn drive(&self, entry: Arc<LraEntry>, report: &mut SweepReport) -> LraResult<()> {
        let drive = self.coordinator.drive(entry).await?;
        if drive.skipped {
            return Ok(());
        }
        report.driven += 1;
        if drive.is_resolved() {
            report.resolved += 1;
        } else {
            report.pending += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{CoordinatorSettings, RetryPolicy};
    use crate::lra::ParticipantEndpoints;
    use crate::participant::{enlist, CallOutcome, ScriptedClient};
    use crate::store::{InMemoryStore, RecordStore, StoredRecord};

    fn sweep_over(
        store: Arc<InMemoryStore>,
        client: Arc<ScriptedClient>,
    ) -> (Arc<LraRegistry>, RecoverySweep) {
        let registry = Arc::new(LraRegistry::new(store));
        let settings = CoordinatorSettings {
            retry: RetryPolicy::new(5, Duration::ZERO, Duration::ZERO),
            call_timeout: Duration::from_secs(1),
            max_concurrent_notifications: 4,
        };
        let coordinator = Arc::new(Coordinator::new(registry.clone(), client, settings));
        let sweep = RecoverySweep::new(registry.clone(), coordinator, Duration::ZERO);
        (registry, sweep)
    }

    #[tokio::test]
    async fn test_sweep_drives_ending_lras() {
        let store = Arc::new(InMemoryStore::new());
        let client = Arc::new(ScriptedClient::new());
        client.script(
            "http://p1/complete",
            [CallOutcome::Transient("refused".into())],
        );
        let (registry, sweep) = sweep_over(store.clone(), client.clone());

        let entry = registry.create(None, None).unwrap();
        registry
            .update(&entry, |r| enlist(r, ParticipantEndpoints::complete("http://p1/complete")))
            .unwrap();
        registry.begin_end(entry.id(), Verb::Complete).unwrap();

        let first = sweep.run().await.unwrap();
        assert_eq!(first.scanned, 1);
        assert_eq!(first.pending, 1);

        let second = sweep.run().await.unwrap();
        assert_eq!(second.resolved, 1);
        assert_eq!(entry.status().unwrap(), LraStatus::Closed);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_cancels_expired() {
        let store = Arc::new(InMemoryStore::new());
        let client = Arc::new(ScriptedClient::new());
        let (registry, sweep) = sweep_over(store, client.clone());

        let past = Utc::now() - chrono::Duration::seconds(5);
        let entry = registry.create(None, Some(past)).unwrap();
        registry
            .update(&entry, |r| enlist(r, ParticipantEndpoints::compensate("http://p1/comp")))
            .unwrap();
        let fresh = registry.create(None, None).unwrap();

        let report = sweep.run().await.unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(entry.status().unwrap(), LraStatus::Cancelled);
        assert_eq!(fresh.status().unwrap(), LraStatus::Active);
        assert_eq!(client.calls_to("http://p1/comp"), 1);
    }

    #[tokio::test]
    async fn test_sweep_removes_stale_active_copy() {
        let store = Arc::new(InMemoryStore::new());
        let client = Arc::new(ScriptedClient::new());
        let (registry, sweep) = sweep_over(store.clone(), client);

        let entry = registry.create(None, None).unwrap();
        let id = entry.id().as_str().to_string();
        let mut record = entry.snapshot().unwrap();
        record.status = LraStatus::FailedToCancel;
        store
            .put(
                RecordKind::LraFailed,
                &id,
                StoredRecord {
                    generation: 2,
                    state: record.encode().unwrap(),
                },
                None,
            )
            .unwrap();

        let report = sweep.run().await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.driven, 0);
        assert!(store.list_by_kind(RecordKind::LraActive).unwrap().is_empty());
        assert_eq!(store.list_by_kind(RecordKind::LraFailed).unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_sweep_resolves_nested_before_parent() {
        let store = Arc::new(InMemoryStore::new());
        let client = Arc::new(ScriptedClient::new());
        client.script(
            "http://child/complete",
            [CallOutcome::Transient("refused".into())],
        );
        let (registry, sweep) = sweep_over(store.clone(), client.clone());

        let parent = registry.create(None, None).unwrap();
        let child = registry.create(Some(parent.id()), None).unwrap();
        registry
            .update(&child, |r| enlist(r, ParticipantEndpoints::complete("http://child/complete")))
            .unwrap();
        registry.begin_end(parent.id(), Verb::Complete).unwrap();

        let first = sweep.run().await.unwrap();
        assert_eq!(first.pending, 2);
        assert_eq!(parent.status().unwrap(), LraStatus::Closing);

        let second = sweep.run().await.unwrap();
        assert_eq!(second.resolved, 2);
        assert_eq!(child.status().unwrap(), LraStatus::Closed);
        assert_eq!(parent.status().unwrap(), LraStatus::Closed);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_resumes_interrupted_cascade() {
        let store = Arc::new(InMemoryStore::new());
        let client = Arc::new(ScriptedClient::new());
        let (registry, sweep) = sweep_over(store.clone(), client.clone());

        let parent = registry.create(None, None).unwrap();
        let child = registry.create(Some(parent.id()), None).unwrap();
        registry
            .update(&child, |r| enlist(r, ParticipantEndpoints::compensate("http://child/comp")))
            .unwrap();
        // the parent moved but its children were never cascaded
        registry
            .update(&parent, |r| r.transition(LraStatus::Cancelling, "cancel"))
            .unwrap();

        sweep.run().await.unwrap();
        assert_eq!(child.status().unwrap(), LraStatus::Cancelled);
        assert_eq!(parent.status().unwrap(), LraStatus::Cancelled);
        assert_eq!(client.calls_to("http://child/comp"), 1);
    }

    #[tokio::test]
    async fn test_sweep_counts_undecodable_records() {
        let store = Arc::new(InMemoryStore::new());
        let client = Arc::new(ScriptedClient::new());
        let (_registry, sweep) = sweep_over(store.clone(), client);

        store
            .put(
                RecordKind::LraActive,
                "garbage",
                StoredRecord {
                    generation: 1,
                    state: b"not json".to_vec(),
                },
                None,
            )
            .unwrap();

        let report = sweep.run().await.unwrap();
        assert_eq!(report.errors, 1);
    }
}
