//! In-memory record store
//!
//! Non-durable; used by tests and embedded setups. Writes can be made to
//! fail on demand to exercise store-failure handling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use super::errors::{StoreError, StoreResult};
use super::{Generation, PutOutcome, RecordKind, RecordStore, StoredRecord};

/// Store backed by a `HashMap`
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<(RecordKind, String), StoredRecord>>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent put/remove fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored records across all kinds
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteRejected("store is failing writes".into()));
        }
        Ok(())
    }
}

impl RecordStore for InMemoryStore {
    fn put(
        &self,
        kind: RecordKind,
        id: &str,
        record: StoredRecord,
        expected: Option<Generation>,
    ) -> StoreResult<PutOutcome> {
        self.check_writable()?;

        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        let key = (kind, id.to_string());
        let current = records.get(&key).map(|r| r.generation);

        if current != expected {
            return Ok(PutOutcome::Conflict {
                current: current.unwrap_or(0),
            });
        }

        records.insert(key, record);
        Ok(PutOutcome::Stored)
    }

    fn get(&self, kind: RecordKind, id: &str) -> StoreResult<Option<StoredRecord>> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(&(kind, id.to_string())).cloned())
    }

    fn remove(&self, kind: RecordKind, id: &str) -> StoreResult<()> {
        self.check_writable()?;

        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        records.remove(&(kind, id.to_string()));
        Ok(())
    }

    fn list_by_kind(&self, kind: RecordKind) -> StoreResult<Vec<String>> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        let mut ids: Vec<String> = records
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(generation: Generation) -> StoredRecord {
        StoredRecord {
            generation,
            state: format!("state-{}", generation).into_bytes(),
        }
    }

    #[test]
    fn test_put_requires_matching_generation() {
        let store = InMemoryStore::new();

        assert_eq!(
            store.put(RecordKind::LraActive, "a", record(1), None).unwrap(),
            PutOutcome::Stored
        );
        assert_eq!(
            store.put(RecordKind::LraActive, "a", record(1), None).unwrap(),
            PutOutcome::Conflict { current: 1 }
        );
        assert_eq!(
            store.put(RecordKind::LraActive, "a", record(2), Some(1)).unwrap(),
            PutOutcome::Stored
        );
        assert_eq!(
            store.put(RecordKind::LraActive, "a", record(3), Some(1)).unwrap(),
            PutOutcome::Conflict { current: 2 }
        );
        assert_eq!(
            store.get(RecordKind::LraActive, "a").unwrap().unwrap().generation,
            2
        );
    }

    #[test]
    fn test_kinds_are_separate_namespaces() {
        let store = InMemoryStore::new();
        store.put(RecordKind::LraActive, "a", record(1), None).unwrap();
        store.put(RecordKind::LraFailed, "b", record(1), None).unwrap();

        assert_eq!(store.list_by_kind(RecordKind::LraActive).unwrap(), vec!["a"]);
        assert_eq!(store.list_by_kind(RecordKind::LraFailed).unwrap(), vec!["b"]);
        assert!(store.get(RecordKind::LraFailed, "a").unwrap().is_none());
    }

    #[test]
    fn test_failing_writes() {
        let store = InMemoryStore::new();
        store.set_fail_writes(true);

        assert!(store.put(RecordKind::LraActive, "a", record(1), None).is_err());
        assert!(store.is_empty());

        store.set_fail_writes(false);
        assert!(store.put(RecordKind::LraActive, "a", record(1), None).is_ok());
        store.remove(RecordKind::LraActive, "a").unwrap();
        store.remove(RecordKind::LraActive, "a").unwrap();
        assert!(store.is_empty());
    }
}
