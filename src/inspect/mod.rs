//! Read-only inspection of persisted LRA records

mod snapshot;

pub use snapshot::{
    render_text, LraSnapshot, ParticipantSnapshot, StoreSnapshot, UnreadableRecord,
    SNAPSHOT_FORMAT_VERSION,
};

use crate::store::RecordKind;

/// Record kinds that can be inspected
pub fn record_kinds() -> &'static [RecordKind] {
    RecordKind::all()
}
