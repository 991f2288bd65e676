//! Concurrent requests and shutdown with fan-outs in flight

mod common;

use std::sync::Arc;
use std::time::Duration;

use lra_coordinator::participant::ScriptedClient;
use lra_coordinator::{LraError, LraStatus, ParticipantEndpoints};
use tempfile::TempDir;

use common::{fast_config, file_context, memory_context};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_and_cancel_race_has_one_winner() {
    let temp_dir = TempDir::new().unwrap();
    let client = Arc::new(ScriptedClient::new());
    let (ctx, _store) = memory_context(fast_config(temp_dir.path()), client.clone());
    let ctx = Arc::new(ctx);

    for _ in 0..20 {
        let lra = ctx.start(None).unwrap();
        ctx.join(
            &lra,
            ParticipantEndpoints::complete("http://p1/complete")
                .with_compensate("http://p1/compensate"),
        )
        .unwrap();

        let closer = {
            let ctx = Arc::clone(&ctx);
            let lra = lra.clone();
            tokio::spawn(async move { ctx.close(&lra).await })
        };
        let canceller = {
            let ctx = Arc::clone(&ctx);
            let lra = lra.clone();
            tokio::spawn(async move { ctx.cancel(&lra).await })
        };
        let closed = closer.await.unwrap();
        let cancelled = canceller.await.unwrap();

        assert!(closed.is_ok() ^ cancelled.is_ok());
        let (expected, loser) = if closed.is_ok() {
            (LraStatus::Closed, cancelled)
        } else {
            (LraStatus::Cancelled, closed)
        };
        assert!(matches!(loser, Err(LraError::InvalidLraState(_))));

        ctx.quiesce().await;
        assert_eq!(ctx.status(&lra).unwrap().status, expected);
    }

    // one notification per LRA
    let calls = client.calls();
    assert_eq!(calls.len(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_lras_close_concurrently() {
    let temp_dir = TempDir::new().unwrap();
    let client = Arc::new(ScriptedClient::new());
    let ctx = Arc::new(file_context(fast_config(temp_dir.path()), client.clone()));

    let mut tasks = Vec::new();
    for i in 0..16 {
        let ctx = Arc::clone(&ctx);
        tasks.push(tokio::spawn(async move {
            let lra = ctx.start(None).unwrap();
            ctx.join(
                &lra,
                ParticipantEndpoints::complete(format!("http://a{}/complete", i)),
            )
            .unwrap();
            ctx.join(
                &lra,
                ParticipantEndpoints::complete(format!("http://b{}/complete", i)),
            )
            .unwrap();
            ctx.close(&lra).await.unwrap();
            lra
        }));
    }

    let mut lras = Vec::new();
    for task in tasks {
        lras.push(task.await.unwrap());
    }
    ctx.quiesce().await;

    for lra in &lras {
        assert_eq!(ctx.status(lra).unwrap().status, LraStatus::Closed);
    }
    assert_eq!(client.calls().len(), 32);
}

#[tokio::test]
async fn test_shutdown_aborts_slow_fanout_and_restart_finishes_it() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = fast_config(temp_dir.path());
    config.call_timeout_ms = 30_000;
    config.shutdown_grace_ms = 100;

    let slow_client = Arc::new(ScriptedClient::new());
    slow_client.delay("http://p1/complete", Duration::from_secs(10));
    let ctx = file_context(config.clone(), slow_client);

    let lra = ctx.start(None).unwrap();
    ctx.join(&lra, ParticipantEndpoints::complete("http://p1/complete"))
        .unwrap();
    ctx.close(&lra).await.unwrap();

    let report = ctx.shutdown().await;
    assert_eq!(report.drained, 0);
    assert_eq!(report.aborted, 1);
    assert!(ctx.is_shutting_down());

    let other = ctx.start(None).unwrap();
    assert!(matches!(
        ctx.close(&other).await.unwrap_err(),
        LraError::ShuttingDown
    ));
    drop(ctx);

    let client = Arc::new(ScriptedClient::new());
    let ctx = file_context(config, client.clone());
    assert_eq!(ctx.status(&lra).unwrap().status, LraStatus::Closing);

    let sweep = ctx.run_recovery_sweep().await.unwrap();
    assert_eq!(sweep.resolved, 1);
    assert_eq!(ctx.status(&lra).unwrap().status, LraStatus::Closed);
    assert_eq!(client.calls_to("http://p1/complete"), 1);
}
