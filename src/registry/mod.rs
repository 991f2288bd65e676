//! LRA Registry
//!
//! In-memory index of live LRAs backed by the record store; the single
//! authority for lookup-or-load.
//!
//! # Mutation
//!
//! `update` clones the entry's record, applies the mutation to the clone and
//! persists it with a compare-and-swap on the stored generation. On a
//! conflict the fresh record is reloaded and the mutation re-applied, so a
//! mutation that validates status always sees the winning write. The entry's
//! record only changes after a successful persist.
//!
//! # Placement moves
//!
//! When a mutation changes the record's placement:
//! - `lra-active` → `lra-failed`: write the failed copy, then remove the
//!   active one. A crash in between leaves both; the recovery sweep removes
//!   the stale active copy.
//! - `lra-active` → released (Closed/Cancelled): remove the active copy.
//!
//! # Settled entries
//!
//! An LRA that reaches a terminal status stays cached so `status` can still
//! answer, but only the most recent `settled_capacity` of them are kept.
//! Older ones are evicted: a failed LRA is reloaded from `lra-failed` on the
//! next lookup, a released one is gone and reports `NotFound`.

mod entry;

pub use entry::LraEntry;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};

use crate::crash_point::{maybe_crash, points};
use crate::lra::{LraError, LraId, LraRecord, LraResult, LraStatus, Verb};
use crate::observability::{log_event_with_fields, Event};
use crate::store::{PutOutcome, RecordKind, RecordStore, StoreError, StoredRecord};

/// Attempts at a conflicting compare-and-swap before giving up
const MAX_CONFLICT_RETRIES: u32 = 5;

/// Terminal LRAs kept cached by default
pub const DEFAULT_SETTLED_CAPACITY: usize = 1024;

/// Operation name used in state errors for a verb
pub fn operation_name(verb: Verb) -> &'static str {
    match verb {
        Verb::Complete => "close",
        Verb::Compensate => "cancel",
    }
}

/// Index of live LRAs
#[derive(Debug)]
pub struct LraRegistry {
    store: Arc<dyn RecordStore>,
    entries: RwLock<HashMap<LraId, Arc<LraEntry>>>,
    settled: Mutex<VecDeque<LraId>>,
    settled_capacity: usize,
}

impl LraRegistry {
    /// Create an empty registry over `store`
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_settled_capacity(store, DEFAULT_SETTLED_CAPACITY)
    }

    /// Create an empty registry keeping at most `settled_capacity` terminal LRAs cached
    pub fn with_settled_capacity(store: Arc<dyn RecordStore>, settled_capacity: usize) -> Self {
        Self {
            store,
            entries: RwLock::new(HashMap::new()),
            settled: Mutex::new(VecDeque::new()),
            settled_capacity,
        }
    }

    /// Backing store
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Create and persist a new Active LRA.
    ///
    /// With a parent, the parent must exist and be Active; its `children`
    /// list is updated after the child is persisted. If that update fails the
    /// child is removed again.
    pub fn create(
        &self,
        parent: Option<&LraId>,
        deadline: Option<DateTime<Utc>>,
    ) -> LraResult<Arc<LraEntry>> {
        let parent_entry = match parent {
            Some(parent_id) => {
                let entry = self.get(parent_id)?;
                let status = entry.status()?;
                if status != LraStatus::Active {
                    return Err(LraError::invalid_state(parent_id, status, "nest under"));
                }
                Some(entry)
            }
            None => None,
        };

        let id = match parent {
            Some(parent_id) => LraId::nested(parent_id)?,
            None => LraId::new_root(),
        };
        let mut record = LraRecord::new(id.clone(), parent.cloned(), deadline);
        record.generation = 1;

        let stored = StoredRecord {
            generation: record.generation,
            state: record.encode()?,
        };
        match self.store.put(RecordKind::LraActive, id.as_str(), stored, None)? {
            PutOutcome::Stored => {}
            PutOutcome::Conflict { .. } => {
                return Err(LraError::Internal(format!("LRA id {} already stored", id)))
            }
        }
        maybe_crash(points::START_AFTER_PERSIST);

        if let Some(parent_entry) = parent_entry {
            maybe_crash(points::START_BEFORE_PARENT_LINK);
            let child = id.clone();
            let linked = self.update(&parent_entry, |parent| {
                if parent.status != LraStatus::Active {
                    return Err(LraError::invalid_state(&parent.id, parent.status, "nest under"));
                }
                parent.children.push(child.clone());
                Ok(())
            });
            if let Err(e) = linked {
                if let Err(remove_err) = self.store.remove(RecordKind::LraActive, id.as_str()) {
                    log_event_with_fields(
                        Event::StoreWriteFailed,
                        &[("lra_id", id.as_str()), ("error", remove_err.to_string().as_str())],
                    );
                }
                return Err(e);
            }
        }

        let entry = LraEntry::new(record);
        self.entries
            .write()
            .map_err(|_| LraError::poisoned())?
            .insert(id, Arc::clone(&entry));
        Ok(entry)
    }

    /// Look up an LRA, loading it from the store if it is not cached
    pub fn get(&self, id: &LraId) -> LraResult<Arc<LraEntry>> {
        if let Some(entry) = self
            .entries
            .read()
            .map_err(|_| LraError::poisoned())?
            .get(id)
        {
            return Ok(Arc::clone(entry));
        }

        let record = self.load(id)?.ok_or_else(|| LraError::lra_not_found(id))?;
        let terminal = record.status.is_terminal();
        let (entry, inserted) = {
            let mut entries = self.entries.write().map_err(|_| LraError::poisoned())?;
            match entries.get(id) {
                Some(entry) => (Arc::clone(entry), false),
                None => {
                    let entry = LraEntry::new(record);
                    entries.insert(id.clone(), Arc::clone(&entry));
                    (entry, true)
                }
            }
        };

        if inserted && terminal {
            self.settle(id)?;
        }
        Ok(entry)
    }

    /// Read the authoritative stored copy of an LRA
    pub fn load(&self, id: &LraId) -> LraResult<Option<LraRecord>> {
        for kind in [RecordKind::LraFailed, RecordKind::LraActive] {
            if let Some(stored) = self.store.get(kind, id.as_str())? {
                let mut record = LraRecord::decode(&stored.state)?;
                record.generation = stored.generation;
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Ids of every cached LRA, sorted
    pub fn cached_ids(&self) -> LraResult<Vec<LraId>> {
        let entries = self.entries.read().map_err(|_| LraError::poisoned())?;
        let mut ids: Vec<LraId> = entries.keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }

    /// Drop an LRA from the cache (the store is untouched)
    pub fn evict(&self, id: &LraId) -> LraResult<()> {
        self.settled
            .lock()
            .map_err(|_| LraError::poisoned())?
            .retain(|settled| settled != id);
        self.entries
            .write()
            .map_err(|_| LraError::poisoned())?
            .remove(id);
        Ok(())
    }

    /// Record that `id` reached a terminal status; evict the oldest settled
    /// entries beyond capacity
    fn settle(&self, id: &LraId) -> LraResult<()> {
        let evicted: Vec<LraId> = {
            let mut settled = self.settled.lock().map_err(|_| LraError::poisoned())?;
            settled.push_back(id.clone());
            let excess = settled.len().saturating_sub(self.settled_capacity);
            settled.drain(..excess).collect()
        };
        if evicted.is_empty() {
            return Ok(());
        }

        let mut entries = self.entries.write().map_err(|_| LraError::poisoned())?;
        for id in &evicted {
            entries.remove(id);
        }
        Ok(())
    }

    /// Apply `mutate` to an LRA and persist the result.
    ///
    /// `mutate` may run more than once and must only touch the record it is
    /// given. Returns whatever the last (successful) run returned.
    pub fn update<T, F>(&self, entry: &LraEntry, mut mutate: F) -> LraResult<T>
    where
        F: FnMut(&mut LraRecord) -> LraResult<T>,
    {
        let mut current = entry.lock()?;

        for _ in 0..MAX_CONFLICT_RETRIES {
            let mut next = current.clone();
            let value = mutate(&mut next)?;
            if next == *current {
                return Ok(value);
            }
            next.generation = current.generation + 1;

            match self.persist(&current, &next)? {
                PutOutcome::Stored => {
                    let settled = !current.status.is_terminal() && next.status.is_terminal();
                    *current = next;
                    drop(current);
                    if settled {
                        self.settle(entry.id())?;
                    }
                    return Ok(value);
                }
                PutOutcome::Conflict { .. } => {
                    *current = self
                        .load(entry.id())?
                        .ok_or_else(|| LraError::lra_not_found(entry.id()))?;
                }
            }
        }

        Err(StoreError::ConflictRetriesExhausted {
            kind: current.placement().unwrap_or(RecordKind::LraActive),
            id: entry.id().to_string(),
            attempts: MAX_CONFLICT_RETRIES,
        }
        .into())
    }

    fn persist(&self, current: &LraRecord, next: &LraRecord) -> LraResult<PutOutcome> {
        let id = next.id.as_str();
        let from = match current.placement() {
            Some(kind) => kind,
            // released records only live in memory
            None => return Ok(PutOutcome::Stored),
        };

        match next.placement() {
            Some(to) if to == from => {
                let stored = StoredRecord {
                    generation: next.generation,
                    state: next.encode()?,
                };
                Ok(self.store.put(to, id, stored, Some(current.generation))?)
            }
            Some(to) => {
                if let Some(conflict) = self.check_generation(from, id, current.generation)? {
                    return Ok(conflict);
                }
                let stored = StoredRecord {
                    generation: next.generation,
                    state: next.encode()?,
                };
                if let PutOutcome::Conflict { current } = self.store.put(to, id, stored, None)? {
                    return Ok(PutOutcome::Conflict { current });
                }
                maybe_crash(points::MOVE_AFTER_FAILED_WRITE);
                self.store.remove(from, id)?;
                Ok(PutOutcome::Stored)
            }
            None => {
                if let Some(conflict) = self.check_generation(from, id, current.generation)? {
                    return Ok(conflict);
                }
                self.store.remove(from, id)?;
                Ok(PutOutcome::Stored)
            }
        }
    }

    fn check_generation(
        &self,
        kind: RecordKind,
        id: &str,
        expected: u64,
    ) -> LraResult<Option<PutOutcome>> {
        let stored = self.store.get(kind, id)?.map(|r| r.generation);
        if stored == Some(expected) {
            Ok(None)
        } else {
            Ok(Some(PutOutcome::Conflict {
                current: stored.unwrap_or(0),
            }))
        }
    }

    /// Move an Active LRA to Closing/Cancelling and cascade to its children.
    ///
    /// Children still Active are moved with the same verb, recursively;
    /// children already ending are left alone. Returns the entries to drive,
    /// children before their parent.
    pub fn begin_end(&self, id: &LraId, verb: Verb) -> LraResult<Vec<Arc<LraEntry>>> {
        let entry = self.get(id)?;
        let operation = operation_name(verb);

        let children = self.update(&entry, |record| {
            record.transition(verb.ending_status(), operation)?;
            Ok(record.children.clone())
        })?;
        maybe_crash(points::TRANSITION_AFTER_PERSIST);

        let mut to_drive = Vec::new();
        for child in &children {
            self.cascade(child, verb, &mut to_drive)?;
        }
        to_drive.push(entry);
        Ok(to_drive)
    }

    /// Cascade an ending LRA's verb to children a crash left Active.
    ///
    /// Returns the entries moved, children before their parent.
    pub fn resume_cascade(
        &self,
        children: &[LraId],
        verb: Verb,
    ) -> LraResult<Vec<Arc<LraEntry>>> {
        let mut to_drive = Vec::new();
        for child in children {
            self.cascade(child, verb, &mut to_drive)?;
        }
        Ok(to_drive)
    }

    fn cascade(&self, id: &LraId, verb: Verb, to_drive: &mut Vec<Arc<LraEntry>>) -> LraResult<()> {
        let entry = match self.get(id) {
            Ok(entry) => entry,
            // already finished and forgotten
            Err(LraError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        let children = self.update(&entry, |record| {
            if record.status != LraStatus::Active {
                return Ok(None);
            }
            record.transition(verb.ending_status(), operation_name(verb))?;
            Ok(Some(record.children.clone()))
        })?;

        if let Some(children) = children {
            for child in &children {
                self.cascade(child, verb, to_drive)?;
            }
            to_drive.push(entry);
        }
        Ok(())
    }

    /// Release a terminal LRA from the store and the cache
    pub fn forget(&self, id: &LraId) -> LraResult<LraRecord> {
        let entry = self.get(id)?;
        let record = entry.snapshot()?;
        if !record.status.is_terminal() {
            return Err(LraError::invalid_state(id, record.status, "forget"));
        }

        for kind in RecordKind::all() {
            self.store.remove(*kind, id.as_str())?;
        }
        self.evict(id)?;
        Ok(record)
    }
}
