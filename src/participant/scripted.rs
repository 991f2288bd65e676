//! Scripted participant client
//!
//! Answers calls from per-endpoint scripts instead of the network. Each
//! scripted outcome is consumed once; when a script runs out the endpoint's
//! fallback (default `Succeeded`) is returned. Every call is recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::client::{CallOutcome, ParticipantCall, ParticipantClient};

#[derive(Debug, Default)]
struct Script {
    queued: VecDeque<CallOutcome>,
    fallback: Option<CallOutcome>,
    delay: Option<Duration>,
}

/// In-process `ParticipantClient` for tests and dry runs
#[derive(Debug, Default)]
pub struct ScriptedClient {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<ParticipantCall>>,
}

impl ScriptedClient {
    /// Client answering `Succeeded` to everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for `endpoint`, consumed in order
    pub fn script(&self, endpoint: &str, outcomes: impl IntoIterator<Item = CallOutcome>) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts
                .entry(endpoint.to_string())
                .or_default()
                .queued
                .extend(outcomes);
        }
    }

    /// Answer `outcome` once `endpoint`'s queue is empty
    pub fn always(&self, endpoint: &str, outcome: CallOutcome) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.entry(endpoint.to_string()).or_default().fallback = Some(outcome);
        }
    }

    /// Delay every answer from `endpoint`
    pub fn delay(&self, endpoint: &str, delay: Duration) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.entry(endpoint.to_string()).or_default().delay = Some(delay);
        }
    }

    /// Every call received so far, in arrival order
    pub fn calls(&self) -> Vec<ParticipantCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of calls made to `endpoint`
    pub fn calls_to(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .map(|c| c.iter().filter(|call| call.endpoint == endpoint).count())
            .unwrap_or(0)
    }

    fn next_answer(&self, endpoint: &str) -> (CallOutcome, Option<Duration>) {
        let mut scripts = match self.scripts.lock() {
            Ok(scripts) => scripts,
            Err(_) => return (CallOutcome::Transient("script lock poisoned".into()), None),
        };
        match scripts.get_mut(endpoint) {
            Some(script) => {
                let outcome = script
                    .queued
                    .pop_front()
                    .or_else(|| script.fallback.clone())
                    .unwrap_or(CallOutcome::Succeeded);
                (outcome, script.delay)
            }
            None => (CallOutcome::Succeeded, None),
        }
    }
}

#[async_trait]
impl ParticipantClient for ScriptedClient {
    async fn call(&self, call: &ParticipantCall) -> CallOutcome {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call.clone());
        }

        let (outcome, delay) = self.next_answer(&call.endpoint);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}
