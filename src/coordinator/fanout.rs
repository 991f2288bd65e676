//! Parallel participant notification
//!
//! Calls run on a `JoinSet`, at most `max_concurrent` at a time, each under
//! its own timeout. A timed-out call is transient for that participant only.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::observability::{log_event_with_fields, Event};
use crate::participant::{CallOutcome, ParticipantCall, ParticipantClient};

/// Issue every call and collect the outcomes in call order.
///
/// A call whose task dies is left out; its participant stays in progress.
pub async fn notify_all(
    client: Arc<dyn ParticipantClient>,
    calls: Vec<ParticipantCall>,
    call_timeout: Duration,
    max_concurrent: usize,
) -> Vec<(ParticipantCall, CallOutcome)> {
    let permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut tasks = JoinSet::new();

    for (index, call) in calls.into_iter().enumerate() {
        let client = Arc::clone(&client);
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let outcome = match permits.acquire_owned().await {
                Ok(_permit) => match tokio::time::timeout(call_timeout, client.call(&call)).await {
                    Ok(outcome) => outcome,
                    Err(_) => CallOutcome::Transient(format!(
                        "{} call timed out after {} ms",
                        call.kind,
                        call_timeout.as_millis()
                    )),
                },
                Err(_) => CallOutcome::Transient("notification limiter closed".into()),
            };
            (index, call, outcome)
        });
    }

    let mut results = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => log_event_with_fields(
                Event::NotificationTaskFailed,
                &[("error", e.to_string().as_str())],
            ),
        }
    }

    results.sort_by_key(|(index, _, _)| *index);
    results
        .into_iter()
        .map(|(_, call, outcome)| (call, outcome))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lra::{LraId, ParticipantId};
    use crate::participant::{CallKind, ScriptedClient};

    fn call(endpoint: &str) -> ParticipantCall {
        ParticipantCall {
            lra_id: LraId::new_root(),
            participant_id: ParticipantId::generate(),
            kind: CallKind::Compensate,
            endpoint: endpoint.into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_transient_for_that_call_only() {
        let client = Arc::new(ScriptedClient::new());
        client.delay("http://slow", Duration::from_secs(30));

        let results = notify_all(
            client.clone(),
            vec![call("http://fast"), call("http://slow")],
            Duration::from_secs(5),
            4,
        )
        .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.endpoint, "http://fast");
        assert_eq!(results[0].1, CallOutcome::Succeeded);
        assert!(matches!(results[1].1, CallOutcome::Transient(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let client = Arc::new(ScriptedClient::new());
        for endpoint in ["http://a", "http://b", "http://c", "http://d"] {
            client.delay(endpoint, Duration::from_secs(1));
        }

        let started = tokio::time::Instant::now();
        let results = notify_all(
            client.clone(),
            vec![call("http://a"), call("http://b"), call("http://c"), call("http://d")],
            Duration::from_secs(10),
            2,
        )
        .await;

        assert_eq!(results.len(), 4);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(client.calls().len(), 4);
    }
}
