//! Participant outcomes and how they settle the LRA

mod common;

use std::sync::Arc;
use std::time::Duration;

use lra_coordinator::participant::{CallKind, CallOutcome, ScriptedClient};
use lra_coordinator::store::RecordKind;
use lra_coordinator::lra::Verb;
use lra_coordinator::{LraStatus, ParticipantEndpoints, ParticipantStatus};
use tempfile::TempDir;

use common::{fast_config, memory_context};

#[tokio::test]
async fn test_partial_compensation_failure() {
    let temp_dir = TempDir::new().unwrap();
    let client = Arc::new(ScriptedClient::new());
    client.always(
        "http://p2/compensate",
        CallOutcome::Rejected("HTTP 409".into()),
    );
    let (ctx, _store) = memory_context(fast_config(temp_dir.path()), client.clone());

    let lra = ctx.start(None).unwrap();
    let p1 = ctx
        .join(&lra, ParticipantEndpoints::compensate("http://p1/compensate"))
        .unwrap();
    let p2 = ctx
        .join(&lra, ParticipantEndpoints::compensate("http://p2/compensate"))
        .unwrap();

    ctx.cancel(&lra).await.unwrap();
    ctx.quiesce().await;

    let record = ctx.record(&lra).unwrap();
    assert_eq!(record.status, LraStatus::FailedToCancel);
    assert_eq!(
        record.participant(&p1).unwrap().status,
        ParticipantStatus::Compensated
    );
    let failed = record.participant(&p2).unwrap();
    assert_eq!(failed.status, ParticipantStatus::FailedToCompensate);
    assert_eq!(failed.failure_reason.as_deref(), Some("HTTP 409"));

    let failed_kind = ctx.snapshot(RecordKind::LraFailed).unwrap();
    assert_eq!(failed_kind.len(), 1);
    assert_eq!(failed_kind.records[0].id, lra.to_string());
    assert!(ctx.snapshot(RecordKind::LraActive).unwrap().is_empty());
}

#[tokio::test]
async fn test_timeout_exhausts_single_attempt() {
    let temp_dir = TempDir::new().unwrap();
    let client = Arc::new(ScriptedClient::new());
    client.delay("http://slow/complete", Duration::from_secs(10));

    let mut config = fast_config(temp_dir.path());
    config.max_attempts = 1;
    config.call_timeout_ms = 50;
    let (ctx, _store) = memory_context(config, client.clone());

    let lra = ctx.start(None).unwrap();
    let slow = ctx
        .join(&lra, ParticipantEndpoints::complete("http://slow/complete"))
        .unwrap();
    ctx.join(&lra, ParticipantEndpoints::complete("http://fast/complete"))
        .unwrap();

    ctx.close(&lra).await.unwrap();
    ctx.quiesce().await;

    let record = ctx.record(&lra).unwrap();
    assert_eq!(record.status, LraStatus::FailedToClose);
    let participant = record.participant(&slow).unwrap();
    assert_eq!(participant.status, ParticipantStatus::FailedToComplete);
    assert!(participant
        .failure_reason
        .as_deref()
        .unwrap()
        .starts_with("retries exhausted after 1 attempts"));
}

#[tokio::test]
async fn test_transient_failure_retried_by_sweep() {
    let temp_dir = TempDir::new().unwrap();
    let client = Arc::new(ScriptedClient::new());
    client.script(
        "http://p1/complete",
        [
            CallOutcome::Transient("HTTP 503".into()),
            CallOutcome::Transient("HTTP 503".into()),
        ],
    );
    let (ctx, _store) = memory_context(fast_config(temp_dir.path()), client.clone());

    let lra = ctx.start(None).unwrap();
    ctx.join(&lra, ParticipantEndpoints::complete("http://p1/complete"))
        .unwrap();

    ctx.close(&lra).await.unwrap();
    ctx.quiesce().await;
    assert_eq!(ctx.status(&lra).unwrap().status, LraStatus::Closing);

    let first = ctx.run_recovery_sweep().await.unwrap();
    assert_eq!(first.driven, 1);
    assert_eq!(first.pending, 1);
    assert_eq!(ctx.status(&lra).unwrap().status, LraStatus::Closing);

    let second = ctx.run_recovery_sweep().await.unwrap();
    assert_eq!(second.resolved, 1);
    assert_eq!(ctx.status(&lra).unwrap().status, LraStatus::Closed);
    assert_eq!(client.calls_to("http://p1/complete"), 3);
}

#[tokio::test]
async fn test_accepted_participant_is_polled_for_status() {
    let temp_dir = TempDir::new().unwrap();
    let client = Arc::new(ScriptedClient::new());
    client.script("http://p1/compensate", [CallOutcome::Pending]);
    client.script("http://p1/status", [CallOutcome::Pending]);
    let (ctx, _store) = memory_context(fast_config(temp_dir.path()), client.clone());

    let lra = ctx.start(None).unwrap();
    let p1 = ctx
        .join(
            &lra,
            ParticipantEndpoints::compensate("http://p1/compensate").with_status("http://p1/status"),
        )
        .unwrap();

    ctx.cancel(&lra).await.unwrap();
    ctx.quiesce().await;
    let record = ctx.record(&lra).unwrap();
    assert_eq!(record.status, LraStatus::Cancelling);
    assert!(record.participant(&p1).unwrap().awaiting_status);

    ctx.run_recovery_sweep().await.unwrap();
    assert_eq!(ctx.status(&lra).unwrap().status, LraStatus::Cancelling);

    ctx.run_recovery_sweep().await.unwrap();
    assert_eq!(ctx.status(&lra).unwrap().status, LraStatus::Cancelled);

    // compensate is sent once; progress is polled afterwards
    assert_eq!(client.calls_to("http://p1/compensate"), 1);
    assert_eq!(client.calls_to("http://p1/status"), 2);
    assert!(client
        .calls()
        .iter()
        .skip(1)
        .all(|call| call.kind == CallKind::Status(Verb::Compensate)));
}

#[tokio::test]
async fn test_participant_without_verb_endpoint() {
    let temp_dir = TempDir::new().unwrap();
    let client = Arc::new(ScriptedClient::new());
    let (ctx, _store) = memory_context(fast_config(temp_dir.path()), client.clone());

    let lra = ctx.start(None).unwrap();
    let p1 = ctx
        .join(&lra, ParticipantEndpoints::compensate("http://p1/compensate"))
        .unwrap();

    ctx.close(&lra).await.unwrap();
    ctx.quiesce().await;

    let record = ctx.record(&lra).unwrap();
    assert_eq!(record.status, LraStatus::Closed);
    assert_eq!(
        record.participant(&p1).unwrap().status,
        ParticipantStatus::Completed
    );
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_store_failure_on_start_leaves_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let client = Arc::new(ScriptedClient::new());
    let (ctx, store) = memory_context(fast_config(temp_dir.path()), client);

    store.set_fail_writes(true);
    assert!(ctx.start(None).is_err());
    store.set_fail_writes(false);

    assert!(store.is_empty());
    assert!(ctx.snapshot(RecordKind::LraActive).unwrap().is_empty());
}

#[tokio::test]
async fn test_store_failure_on_close_keeps_lra_active() {
    let temp_dir = TempDir::new().unwrap();
    let client = Arc::new(ScriptedClient::new());
    let (ctx, store) = memory_context(fast_config(temp_dir.path()), client.clone());

    let lra = ctx.start(None).unwrap();
    ctx.join(&lra, ParticipantEndpoints::complete("http://p1/complete"))
        .unwrap();

    store.set_fail_writes(true);
    assert!(ctx.close(&lra).await.is_err());
    store.set_fail_writes(false);

    assert_eq!(ctx.status(&lra).unwrap().status, LraStatus::Active);
    assert!(client.calls().is_empty());

    ctx.close(&lra).await.unwrap();
    ctx.quiesce().await;
    assert_eq!(ctx.status(&lra).unwrap().status, LraStatus::Closed);
}
