//! Store errors

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::RecordKind;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors. Any of these is fatal to the operation in progress.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt record {kind}/{id}: {reason}")]
    Corrupt {
        kind: RecordKind,
        id: String,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Write rejected: {0}")]
    WriteRejected(String),

    #[error("Generation conflict on {kind}/{id} persisted after {attempts} attempts")]
    ConflictRetriesExhausted {
        kind: RecordKind,
        id: String,
        attempts: u32,
    },

    #[error("Store lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}
