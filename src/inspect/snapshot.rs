//! Versioned store snapshot
//!
//! Built by decoding store records; nothing is mutated. Records that fail
//! to decode are listed separately rather than failing the snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lra::{LraRecord, ParticipantEndpoints, ParticipantRecord};
use crate::store::{Generation, RecordKind, RecordStore, StoreResult};

/// Current snapshot format version
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// All records of one kind at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Kind the records were read from
    pub kind: RecordKind,
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
    /// Decoded records, sorted by id
    pub records: Vec<LraSnapshot>,
    /// Records that could not be read
    #[serde(default)]
    pub unreadable: Vec<UnreadableRecord>,
}

/// One LRA as seen in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LraSnapshot {
    pub id: String,
    pub status: String,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub generation: Generation,
    pub participants: Vec<ParticipantSnapshot>,
}

/// One participant as seen in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSnapshot {
    pub id: String,
    pub status: String,
    pub attempts: u32,
    pub last_attempt: Option<DateTime<Utc>>,
    pub awaiting_status: bool,
    pub failure_reason: Option<String>,
    pub endpoints: ParticipantEndpoints,
}

/// A stored record that failed to read or decode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadableRecord {
    pub id: String,
    pub reason: String,
}

impl From<&ParticipantRecord> for ParticipantSnapshot {
    fn from(p: &ParticipantRecord) -> Self {
        Self {
            id: p.id.to_string(),
            status: p.status.as_str().to_string(),
            attempts: p.attempts,
            last_attempt: p.last_attempt,
            awaiting_status: p.awaiting_status,
            failure_reason: p.failure_reason.clone(),
            endpoints: p.endpoints.clone(),
        }
    }
}

impl From<&LraRecord> for LraSnapshot {
    fn from(r: &LraRecord) -> Self {
        Self {
            id: r.id.to_string(),
            status: r.status.as_str().to_string(),
            parent: r.parent.as_ref().map(|p| p.to_string()),
            children: r.children.iter().map(|c| c.to_string()).collect(),
            created_at: r.created_at,
            deadline: r.deadline,
            last_attempt: r.last_attempt,
            generation: r.generation,
            participants: r.participants.iter().map(ParticipantSnapshot::from).collect(),
        }
    }
}

impl StoreSnapshot {
    /// Read every record of `kind` from `store`
    pub fn take(store: &dyn RecordStore, kind: RecordKind) -> StoreResult<Self> {
        let mut records = Vec::new();
        let mut unreadable = Vec::new();

        for id in store.list_by_kind(kind)? {
            let decoded = store.get(kind, &id).and_then(|stored| match stored {
                Some(stored) => LraRecord::decode(&stored.state).map(|mut record| {
                    record.generation = stored.generation;
                    Some(record)
                }),
                // removed since listing
                None => Ok(None),
            });
            match decoded {
                Ok(Some(record)) => records.push(LraSnapshot::from(&record)),
                Ok(None) => {}
                Err(e) => unreadable.push(UnreadableRecord {
                    id,
                    reason: e.to_string(),
                }),
            }
        }

        Ok(Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            kind,
            taken_at: Utc::now(),
            records,
            unreadable,
        })
    }

    /// Number of records, readable or not
    pub fn len(&self) -> usize {
        self.records.len() + self.unreadable.len()
    }

    /// Check if the kind held no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Render a snapshot as a transaction/participant listing
pub fn render_text(snapshot: &StoreSnapshot) -> String {
    let mut out = format!("Transactions of type {}\n", snapshot.kind);

    for lra in &snapshot.records {
        out.push_str(&format!("Transaction: {}\n", lra.id));
        push_attr(&mut out, "\t", "status", &lra.status);
        if let Some(parent) = &lra.parent {
            push_attr(&mut out, "\t", "parent", parent);
        }
        if !lra.children.is_empty() {
            push_attr(&mut out, "\t", "children", &lra.children.join(","));
        }
        push_attr(&mut out, "\t", "generation", &lra.generation.to_string());
        push_attr(&mut out, "\t", "created_at", &lra.created_at.to_rfc3339());
        if let Some(deadline) = lra.deadline {
            push_attr(&mut out, "\t", "deadline", &deadline.to_rfc3339());
        }
        if let Some(last) = lra.last_attempt {
            push_attr(&mut out, "\t", "last_attempt", &last.to_rfc3339());
        }

        out.push_str("\tParticipants:\n");
        for p in &lra.participants {
            out.push_str(&format!("\t\tParticipant: {}\n", p.id));
            push_attr(&mut out, "\t\t\t", "status", &p.status);
            push_attr(&mut out, "\t\t\t", "attempts", &p.attempts.to_string());
            if p.awaiting_status {
                push_attr(&mut out, "\t\t\t", "awaiting_status", "true");
            }
            if let Some(reason) = &p.failure_reason {
                push_attr(&mut out, "\t\t\t", "failure_reason", reason);
            }
            let endpoints = [
                ("complete", &p.endpoints.complete),
                ("compensate", &p.endpoints.compensate),
                ("status_url", &p.endpoints.status),
                ("forget", &p.endpoints.forget),
            ];
            for (name, url) in endpoints {
                if let Some(url) = url {
                    push_attr(&mut out, "\t\t\t", name, url);
                }
            }
        }
    }

    for bad in &snapshot.unreadable {
        out.push_str(&format!("Unreadable: {} ({})\n", bad.id, bad.reason));
    }
    out
}

fn push_attr(out: &mut String, prefix: &str, name: &str, value: &str) {
    out.push_str(&format!("{}{}={}\n", prefix, name, value));
}
