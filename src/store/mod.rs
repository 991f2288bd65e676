//! Record Store Adapter
//!
//! The coordinator treats the store as the single source of truth. Every
//! state transition is persisted before it is acknowledged to a caller.
//!
//! # Contract
//!
//! - `put(kind, id, record, expected)`: stores `record` only if the current
//!   generation of `(kind, id)` equals `expected` (`None` = must not exist);
//!   otherwise reports `Conflict` with the current generation
//! - `get(kind, id)`: the stored record, or `None`
//! - `remove(kind, id)`: idempotent delete
//! - `list_by_kind(kind)`: ids stored under `kind`, sorted

mod errors;
mod file;
mod memory;

pub use errors::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::InMemoryStore;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Optimistic concurrency counter
pub type Generation = u64;

/// Record kinds kept in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordKind {
    /// Non-terminal LRAs, consumed by the recovery sweep
    #[serde(rename = "lra-active")]
    LraActive,
    /// Terminal-failure LRAs, kept for operators until forgotten
    #[serde(rename = "lra-failed")]
    LraFailed,
}

impl RecordKind {
    /// Returns the kind name used as store key prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::LraActive => "lra-active",
            RecordKind::LraFailed => "lra-failed",
        }
    }

    /// Every kind, in enumeration order
    pub fn all() -> &'static [RecordKind] {
        &[RecordKind::LraActive, RecordKind::LraFailed]
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordKind::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("{} is not a valid record kind", s))
    }
}

/// A record as held by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// Generation of this version
    pub generation: Generation,
    /// Opaque serialized state
    pub state: Vec<u8>,
}

/// Result of a conditional put
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Record written
    Stored,
    /// Expected generation did not match; `current` is 0 if absent
    Conflict {
        /// Generation currently stored
        current: Generation,
    },
}

/// Durable storage keyed by record kind and id
pub trait RecordStore: Send + Sync + fmt::Debug {
    /// Conditionally store a record
    fn put(
        &self,
        kind: RecordKind,
        id: &str,
        record: StoredRecord,
        expected: Option<Generation>,
    ) -> StoreResult<PutOutcome>;

    /// Fetch a record
    fn get(&self, kind: RecordKind, id: &str) -> StoreResult<Option<StoredRecord>>;

    /// Delete a record; deleting a missing record is not an error
    fn remove(&self, kind: RecordKind, id: &str) -> StoreResult<()>;

    /// Ids stored under `kind`, sorted
    fn list_by_kind(&self, kind: RecordKind) -> StoreResult<Vec<String>>;
}
