//! Snapshot and entry fixtures.

use rewind_core::{ObjectIdentity, Snapshot, StateBuffer};
use rewind_playback::{EntryPayload, ReplayEvent};

/// A snapshot at `timestamp` holding one entry (identity 1) whose bytes
/// are the timestamp itself.
pub fn snapshot_at(timestamp: f32) -> Snapshot {
    let mut snapshot = Snapshot::new(timestamp);
    snapshot.record_state(
        ObjectIdentity(1),
        StateBuffer::from_bytes(timestamp.to_le_bytes().to_vec()),
    );
    snapshot
}

/// A snapshot at `timestamp` holding the given raw entries.
pub fn snapshot_with(timestamp: f32, entries: &[(i16, StateBuffer)]) -> Snapshot {
    let mut snapshot = Snapshot::new(timestamp);
    for (id, state) in entries {
        snapshot.record_state(ObjectIdentity(*id), state.clone());
    }
    snapshot
}

/// An encoded object entry. Pass `""` for static objects.
pub fn entry(prefab: &str, state: &[u8]) -> StateBuffer {
    entry_with_events(prefab, state, Vec::new())
}

/// An encoded object entry carrying `events`.
pub fn entry_with_events(prefab: &str, state: &[u8], events: Vec<ReplayEvent>) -> StateBuffer {
    let payload = EntryPayload {
        prefab_name: prefab.to_owned(),
        state: StateBuffer::from_bytes(state.to_vec()),
        events,
    };
    match payload.encode() {
        Ok(buf) => buf,
        Err(e) => panic!("fixture entry does not encode: {e}"),
    }
}
