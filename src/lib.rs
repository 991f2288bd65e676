//! lra-coordinator - crash-safe coordinator for Long Running Actions
//!
//! A saga coordinator: participants enlist in an LRA and are told to
//! complete or compensate when it closes or cancels. Every transition is
//! persisted before it is acted on, and a recovery sweep drives whatever
//! a crash left unfinished.

pub mod cli;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod crash_point;
pub mod inspect;
pub mod lra;
pub mod observability;
pub mod participant;
pub mod recovery;
pub mod registry;
pub mod store;

pub use config::CoordinatorConfig;
pub use context::{LraContext, LraStatusReport, ShutdownReport};
pub use lra::{LraError, LraId, LraResult, LraStatus, ParticipantEndpoints, ParticipantStatus};
