//! Registry entry: one live LRA

use std::sync::{Arc, Mutex, MutexGuard};

use crate::lra::{LraError, LraId, LraRecord, LraResult, LraStatus};

/// A live LRA held by the registry.
///
/// `record` is the last persisted state and is never held across an await.
/// `driving` admits one coordinator drive at a time.
#[derive(Debug)]
pub struct LraEntry {
    id: LraId,
    record: Mutex<LraRecord>,
    driving: tokio::sync::Mutex<()>,
}

impl LraEntry {
    pub(crate) fn new(record: LraRecord) -> Arc<Self> {
        Arc::new(Self {
            id: record.id.clone(),
            record: Mutex::new(record),
            driving: tokio::sync::Mutex::new(()),
        })
    }

    /// LRA id
    pub fn id(&self) -> &LraId {
        &self.id
    }

    /// Copy of the current record
    pub fn snapshot(&self) -> LraResult<LraRecord> {
        Ok(self.lock()?.clone())
    }

    /// Current status
    pub fn status(&self) -> LraResult<LraStatus> {
        Ok(self.lock()?.status)
    }

    /// Claim the drive lock, or `None` if another drive is running
    pub fn try_begin_drive(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        self.driving.try_lock().ok()
    }

    pub(crate) fn lock(&self) -> LraResult<MutexGuard<'_, LraRecord>> {
        self.record.lock().map_err(|_| LraError::poisoned())
    }
}
