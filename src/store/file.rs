//! File-backed record store
//!
//! One file per record at `<root>/<kind>/<id>.rec`:
//!
//! ```text
//! +------------------+
//! | Magic "LRA1"     | (4 bytes)
//! +------------------+
//! | Generation       | (u64 LE)
//! +------------------+
//! | State Length     | (u32 LE)
//! +------------------+
//! | State            | (bytes)
//! +------------------+
//! | Checksum         | (u32 LE)
//! +------------------+
//! ```
//!
//! Checksum covers all bytes except the checksum itself.
//!
//! A write goes to `<id>.tmp`, is fsynced, renamed over the record and the
//! kind directory is fsynced, so a crash leaves either the old or the new
//! version. Conditional puts are serialized by a store-wide write lock;
//! one process owns a store directory.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::errors::{StoreError, StoreResult};
use super::{Generation, PutOutcome, RecordKind, RecordStore, StoredRecord};

const MAGIC: &[u8; 4] = b"LRA1";
const RECORD_EXTENSION: &str = "rec";
const TEMP_EXTENSION: &str = "tmp";
const HEADER_LEN: usize = 4 + 8 + 4;
const CHECKSUM_LEN: usize = 4;

/// Store keeping each record in its own file
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        for kind in RecordKind::all() {
            let dir = root.join(kind.as_str());
            fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        }
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir(&self, kind: RecordKind) -> PathBuf {
        self.root.join(kind.as_str())
    }

    fn record_path(&self, kind: RecordKind, id: &str) -> PathBuf {
        self.kind_dir(kind)
            .join(format!("{}.{}", id, RECORD_EXTENSION))
    }

    fn read_record(&self, kind: RecordKind, id: &str) -> StoreResult<Option<StoredRecord>> {
        let path = self.record_path(kind, id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        decode_record(&bytes)
            .map(Some)
            .map_err(|reason| StoreError::Corrupt {
                kind,
                id: id.to_string(),
                reason,
            })
    }

    fn write_record(&self, kind: RecordKind, id: &str, record: &StoredRecord) -> StoreResult<()> {
        let dir = self.kind_dir(kind);
        let path = self.record_path(kind, id);
        let tmp = dir.join(format!("{}.{}", id, TEMP_EXTENSION));
        let bytes = encode_record(record)?;

        {
            let mut file = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
            file.write_all(&bytes).map_err(|e| StoreError::io(&tmp, e))?;
            // fsync is mandatory before the rename
            file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
        }

        fs::rename(&tmp, &path).map_err(|e| StoreError::io(&path, e))?;
        sync_dir(&dir)
    }
}

impl RecordStore for FileStore {
    fn put(
        &self,
        kind: RecordKind,
        id: &str,
        record: StoredRecord,
        expected: Option<Generation>,
    ) -> StoreResult<PutOutcome> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;

        let current = self.read_record(kind, id)?.map(|r| r.generation);
        if current != expected {
            return Ok(PutOutcome::Conflict {
                current: current.unwrap_or(0),
            });
        }

        self.write_record(kind, id, &record)?;
        Ok(PutOutcome::Stored)
    }

    fn get(&self, kind: RecordKind, id: &str) -> StoreResult<Option<StoredRecord>> {
        self.read_record(kind, id)
    }

    fn remove(&self, kind: RecordKind, id: &str) -> StoreResult<()> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;

        let path = self.record_path(kind, id);
        match fs::remove_file(&path) {
            Ok(()) => sync_dir(&self.kind_dir(kind)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    fn list_by_kind(&self, kind: RecordKind) -> StoreResult<Vec<String>> {
        let dir = self.kind_dir(kind);
        let entries = fs::read_dir(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn sync_dir(dir: &Path) -> StoreResult<()> {
    let handle = OpenOptions::new()
        .read(true)
        .open(dir)
        .map_err(|e| StoreError::io(dir, e))?;
    handle.sync_all().map_err(|e| StoreError::io(dir, e))
}

fn encode_record(record: &StoredRecord) -> StoreResult<Vec<u8>> {
    let state_len = u32::try_from(record.state.len()).map_err(|_| {
        StoreError::Serialization(format!(
            "record state of {} bytes exceeds the format limit",
            record.state.len()
        ))
    })?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + record.state.len() + CHECKSUM_LEN);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&record.generation.to_le_bytes());
    bytes.extend_from_slice(&state_len.to_le_bytes());
    bytes.extend_from_slice(&record.state);

    let checksum = crc32fast::hash(&bytes);
    bytes.extend_from_slice(&checksum.to_le_bytes());
    Ok(bytes)
}

fn decode_record(bytes: &[u8]) -> Result<StoredRecord, String> {
    if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(format!("truncated record ({} bytes)", bytes.len()));
    }
    if &bytes[0..4] != MAGIC {
        return Err("bad magic".to_string());
    }

    let (body, checksum_bytes) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let stored_checksum = u32::from_le_bytes(
        checksum_bytes
            .try_into()
            .map_err(|_| "bad checksum field".to_string())?,
    );
    let computed = crc32fast::hash(body);
    if stored_checksum != computed {
        return Err(format!(
            "checksum mismatch (stored {:08x}, computed {:08x})",
            stored_checksum, computed
        ));
    }

    let generation = u64::from_le_bytes(
        body[4..12]
            .try_into()
            .map_err(|_| "bad generation field".to_string())?,
    );
    let state_len = u32::from_le_bytes(
        body[12..16]
            .try_into()
            .map_err(|_| "bad length field".to_string())?,
    ) as usize;
    if body.len() - HEADER_LEN != state_len {
        return Err(format!(
            "length mismatch (header {}, actual {})",
            state_len,
            body.len() - HEADER_LEN
        ));
    }

    Ok(StoredRecord {
        generation,
        state: body[HEADER_LEN..].to_vec(),
    })
}
