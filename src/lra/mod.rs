//! LRA data model
//!
//! Ids, status state machines, persisted records and the error taxonomy
//! shared by every subsystem.

mod errors;
mod id;
mod record;
mod status;

pub use errors::{LraError, LraResult};
pub use id::{LraId, ParticipantId, MAX_LRA_ID_LEN, MAX_NESTING_DEPTH};
pub use record::{LraRecord, ParticipantEndpoints, ParticipantRecord};
pub use status::{LraStatus, ParticipantStatus, Verb};
