//! Time-stamped captures of every observed object's state.
//!
//! # Wire format
//!
//! ```text
//! timestamp   f32
//! entry_count i32
//! entry_count × { identity i16, payload_size i16, payload [u8; payload_size] }
//! ```
//!
//! The same framing is used for in-memory exports and for the snapshots
//! stored inside replay file chunks.

use std::io::{Read, Write};

use indexmap::IndexMap;

use crate::buffer::StateBuffer;
use crate::codec::{
    len_to_i32, read_f32_le, read_i16_le, read_len, write_f32_le, write_i16_le, write_i32_le,
};
use crate::error::CodecError;
use crate::id::ObjectIdentity;

/// Largest entry payload the `i16` size field can describe.
pub const MAX_ENTRY_PAYLOAD: usize = i16::MAX as usize;

/// Fixed bytes per snapshot before any entry: timestamp + entry count.
const SNAPSHOT_HEADER_BYTES: usize = 8;
/// Fixed bytes per entry before its payload: identity + payload size.
const ENTRY_HEADER_BYTES: usize = 4;

/// The whole observed world at one instant.
///
/// Entries keep insertion order so encoding is deterministic. An entry
/// is never stored with an empty payload: absence means "nothing to
/// report this frame", and consumers leave such objects unchanged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    timestamp: f32,
    entries: IndexMap<ObjectIdentity, StateBuffer>,
}

impl Snapshot {
    /// Create an empty snapshot at `timestamp` seconds.
    pub fn new(timestamp: f32) -> Self {
        Self {
            timestamp,
            entries: IndexMap::new(),
        }
    }

    /// Capture time in seconds.
    pub fn timestamp(&self) -> f32 {
        self.timestamp
    }

    /// Store `state` for `identity`, replacing any earlier entry.
    ///
    /// Returns `false` and stores nothing when `state` is empty.
    pub fn record_state(&mut self, identity: ObjectIdentity, state: StateBuffer) -> bool {
        if state.is_empty() {
            return false;
        }
        self.entries.insert(identity, state);
        true
    }

    /// The stored state of `identity`, if any.
    pub fn state(&self, identity: ObjectIdentity) -> Option<&StateBuffer> {
        self.entries.get(&identity)
    }

    /// A fresh reader over the stored state of `identity`.
    ///
    /// Snapshots are shared immutably, so consumers read a copy with its
    /// own cursor.
    pub fn restore_state(&self, identity: ObjectIdentity) -> Option<StateBuffer> {
        self.entries.get(&identity).map(|s| {
            let mut copy = s.clone();
            copy.rewind();
            copy
        })
    }

    /// Whether an entry exists for `identity`.
    pub fn contains(&self, identity: ObjectIdentity) -> bool {
        self.entries.contains_key(&identity)
    }

    /// Drop the entry of `identity`, returning it.
    pub fn remove(&mut self, identity: ObjectIdentity) -> Option<StateBuffer> {
        self.entries.shift_remove(&identity)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identities with an entry, in insertion order.
    pub fn identities(&self) -> impl Iterator<Item = ObjectIdentity> + '_ {
        self.entries.keys().copied()
    }

    /// `(identity, state)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectIdentity, &StateBuffer)> {
        self.entries.iter().map(|(id, s)| (*id, s))
    }

    /// Shift the timestamp by `delta` seconds.
    ///
    /// Applied once per snapshot at commit to rebase a recording so that
    /// its first frame sits at time zero.
    pub fn correct_timestamp(&mut self, delta: f32) {
        self.timestamp += delta;
    }

    /// Size of the encoded form in bytes.
    pub fn encoded_len(&self) -> usize {
        SNAPSHOT_HEADER_BYTES
            + self
                .entries
                .values()
                .map(|s| ENTRY_HEADER_BYTES + s.len())
                .sum::<usize>()
    }

    /// Encode in the snapshot wire format.
    ///
    /// # Errors
    ///
    /// [`CodecError::PayloadTooLarge`] if an entry exceeds
    /// [`MAX_ENTRY_PAYLOAD`] bytes. Nothing useful is left in `w` then.
    pub fn encode(&self, w: &mut dyn Write) -> Result<(), CodecError> {
        write_f32_le(w, self.timestamp)?;
        write_i32_le(w, len_to_i32(self.entries.len())?)?;
        for (identity, state) in &self.entries {
            let size = i16::try_from(state.len()).map_err(|_| CodecError::PayloadTooLarge {
                len: state.len(),
                max: MAX_ENTRY_PAYLOAD,
            })?;
            identity.encode(w)?;
            write_i16_le(w, size)?;
            w.write_all(state.as_bytes())?;
        }
        Ok(())
    }

    /// Decode a snapshot written by [`encode`](Self::encode).
    ///
    /// Zero-length entries are dropped rather than stored.
    pub fn decode(r: &mut dyn Read) -> Result<Self, CodecError> {
        let timestamp = read_f32_le(r)?;
        let count = read_len(r, "snapshot entry count")?;
        let mut snapshot = Snapshot::new(timestamp);
        for _ in 0..count {
            let identity = ObjectIdentity::decode(r)?;
            let size = read_i16_le(r)?;
            let size = usize::try_from(size).map_err(|_| CodecError::Malformed {
                detail: format!("negative payload size {size} for identity {identity}"),
            })?;
            let mut payload = vec![0u8; size];
            r.read_exact(&mut payload)?;
            snapshot.record_state(identity, StateBuffer::from_bytes(payload));
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn state(bytes: &[u8]) -> StateBuffer {
        StateBuffer::from_bytes(bytes.to_vec())
    }

    #[test]
    fn empty_payload_is_not_stored() {
        let mut snap = Snapshot::new(0.0);
        assert!(!snap.record_state(ObjectIdentity(1), StateBuffer::new()));
        assert!(snap.record_state(ObjectIdentity(2), state(&[1])));
        assert!(!snap.contains(ObjectIdentity(1)));
        assert_eq!(snap.len(), 1);
    }

    #[test]
    fn correct_timestamp_is_additive() {
        let mut snap = Snapshot::new(3.5);
        snap.correct_timestamp(-3.5);
        assert_eq!(snap.timestamp(), 0.0);
    }

    #[test]
    fn encoded_len_matches_encoding() {
        let mut snap = Snapshot::new(1.0);
        snap.record_state(ObjectIdentity(4), state(&[1, 2, 3]));
        snap.record_state(ObjectIdentity(-9), state(&[9]));
        let mut buf = Vec::new();
        snap.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), snap.encoded_len());
    }

    #[test]
    fn oversized_payload_rejected() {
        let mut snap = Snapshot::new(0.0);
        let big = StateBuffer::from_bytes(vec![0; MAX_ENTRY_PAYLOAD + 1]);
        snap.record_state(ObjectIdentity(1), big);
        let err = snap.encode(&mut Vec::<u8>::new()).unwrap_err();
        assert!(matches!(err, CodecError::PayloadTooLarge { .. }));
    }

    #[test]
    fn negative_payload_size_is_malformed() {
        let mut buf = Vec::new();
        write_f32_le(&mut buf, 0.0).unwrap();
        write_i32_le(&mut buf, 1).unwrap();
        write_i16_le(&mut buf, 7).unwrap();
        write_i16_le(&mut buf, -1).unwrap();
        let err = Snapshot::decode(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, CodecError::Malformed { .. }));
    }

    #[test]
    fn restore_state_reads_from_start() {
        let mut snap = Snapshot::new(0.0);
        snap.record_state(ObjectIdentity(1), state(&[5, 6]));
        let mut a = snap.restore_state(ObjectIdentity(1)).unwrap();
        assert_eq!(a.read_u8().unwrap(), 5);
        let mut b = snap.restore_state(ObjectIdentity(1)).unwrap();
        assert_eq!(b.read_u8().unwrap(), 5);
    }

    fn arb_snapshot() -> impl Strategy<Value = Snapshot> {
        (
            -1000.0f32..1000.0,
            prop::collection::vec(
                (any::<i16>(), prop::collection::vec(any::<u8>(), 1..64)),
                0..16,
            ),
        )
            .prop_map(|(ts, entries)| {
                let mut snap = Snapshot::new(ts);
                for (id, bytes) in entries {
                    snap.record_state(ObjectIdentity(id), StateBuffer::from_bytes(bytes));
                }
                snap
            })
    }

    proptest! {
        #[test]
        fn roundtrip_preserves_timestamp_and_entries(snap in arb_snapshot()) {
            let mut buf = Vec::new();
            snap.encode(&mut buf).unwrap();
            let back = Snapshot::decode(&mut buf.as_slice()).unwrap();
            prop_assert_eq!(back.timestamp().to_bits(), snap.timestamp().to_bits());
            prop_assert_eq!(back.len(), snap.len());
            for (id, s) in snap.iter() {
                prop_assert_eq!(back.state(id).map(|b| b.as_bytes()), Some(s.as_bytes()));
            }
        }
    }
}
