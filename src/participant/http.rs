//! HTTP participant client
//!
//! | Call       | Method |
//! |------------|--------|
//! | complete   | PUT    |
//! | compensate | PUT    |
//! | status     | GET    |
//! | forget     | DELETE |
//!
//! Every request carries the LRA id in the `Long-Running-Action` header.
//! The response is classified by `classify`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;

use super::client::{CallKind, CallOutcome, ParticipantCall, ParticipantClient};
use crate::lra::{LraError, LraResult, ParticipantStatus};

/// Header naming the LRA a callback belongs to
pub const LRA_HEADER: &str = "Long-Running-Action";

/// `ParticipantClient` speaking HTTP via reqwest
#[derive(Debug, Clone)]
pub struct HttpParticipantClient {
    http: reqwest::Client,
}

impl HttpParticipantClient {
    /// Create a client whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> LraResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LraError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    fn method(kind: CallKind) -> Method {
        match kind {
            CallKind::Complete | CallKind::Compensate => Method::PUT,
            CallKind::Status(_) => Method::GET,
            CallKind::Forget => Method::DELETE,
        }
    }
}

#[async_trait]
impl ParticipantClient for HttpParticipantClient {
    async fn call(&self, call: &ParticipantCall) -> CallOutcome {
        let response = self
            .http
            .request(Self::method(call.kind), &call.endpoint)
            .header(LRA_HEADER, call.lra_id.as_str())
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) if e.is_builder() => {
                return CallOutcome::Rejected(format!("invalid endpoint {}: {}", call.endpoint, e))
            }
            Err(e) => return CallOutcome::Transient(format!("{} {}: {}", call.kind, call.endpoint, e)),
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return CallOutcome::Transient(format!(
                    "{} {}: failed to read response: {}",
                    call.kind, call.endpoint, e
                ))
            }
        };

        classify(call.kind, status, &body)
    }
}

/// Classify a participant's HTTP answer.
///
/// - 200/204: the body may name a participant status; a failed status, or
///   the success status of the other verb, is a rejection and an
///   in-progress one is pending. A status poll must name a status.
/// - 202: accepted, still working
/// - 410: participant already finished and forgot the LRA
/// - 404 on forget: nothing left to forget
/// - 408, 429, 5xx: transient
/// - any other 4xx: rejected
pub fn classify(kind: CallKind, status: u16, body: &str) -> CallOutcome {
    match status {
        200 | 204 => classify_body(kind, body),
        202 => CallOutcome::Pending,
        410 => CallOutcome::Succeeded,
        404 if kind == CallKind::Forget => CallOutcome::Succeeded,
        408 | 429 => CallOutcome::Transient(format!("HTTP {}", status)),
        500..=599 => CallOutcome::Transient(format!("HTTP {}", status)),
        400..=499 => CallOutcome::Rejected(format!("HTTP {}", status)),
        _ => CallOutcome::Transient(format!("unexpected HTTP {}", status)),
    }
}

fn classify_body(kind: CallKind, body: &str) -> CallOutcome {
    let reported = body.trim().trim_matches('"').parse::<ParticipantStatus>();

    match reported {
        Ok(status) if status.is_failed() => {
            CallOutcome::Rejected(format!("participant reported {}", status))
        }
        Ok(status) if status.is_success() && !reports_success_of(kind, status) => {
            CallOutcome::Rejected(format!(
                "participant reported {} to a {} call",
                status,
                kind.verb().map(|v| v.participant_success().as_str()).unwrap_or("forget")
            ))
        }
        Ok(status) if status.is_in_progress() || status == ParticipantStatus::Active => {
            CallOutcome::Pending
        }
        Ok(_) => CallOutcome::Succeeded,
        Err(_) if matches!(kind, CallKind::Status(_)) => {
            CallOutcome::Transient(format!("unrecognised status body {:?}", body.trim()))
        }
        Err(_) => CallOutcome::Succeeded,
    }
}

fn reports_success_of(kind: CallKind, status: ParticipantStatus) -> bool {
    match kind.verb() {
        Some(verb) => status == verb.participant_success(),
        None => true,
    }
}
