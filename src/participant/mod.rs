//! Participants
//!
//! Enlistment and the per-participant state machine, plus the client seam
//! used to notify participants:
//! - `HttpParticipantClient` calls real participant endpoints
//! - `ScriptedClient` answers from in-process scripts

mod client;
mod enlistment;
mod http;
mod scripted;

pub use client::{CallKind, CallOutcome, ParticipantCall, ParticipantClient};
pub use enlistment::{enlist, release, Enlistment};
pub use http::{classify, HttpParticipantClient, LRA_HEADER};
pub use scripted::ScriptedClient;
