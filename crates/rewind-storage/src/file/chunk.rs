//! Chunks: bounded runs of snapshots persisted as one unit.
//!
//! ```text
//! id     i32
//! start  f32
//! end    f32
//! count  i32
//! count × Snapshot
//! ```
//!
//! Every field before the snapshots is fixed width, so a chunk can be
//! rewritten in place with corrected timestamps.

use std::io::{Read, Write};
use std::sync::Arc;

use rewind_core::codec::{len_to_i32, read_f32_le, read_len, write_f32_le, write_i32_le};
use rewind_core::{CodecError, Snapshot};

use super::format::write_offset;

/// Snapshots sorted ascending by timestamp, with an id assigned in
/// creation order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Chunk {
    id: u32,
    snapshots: Vec<Arc<Snapshot>>,
}

impl Chunk {
    /// Create an empty chunk.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            snapshots: Vec::new(),
        }
    }

    /// Chunk id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Number of snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether the chunk is empty.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Snapshots in timestamp order.
    pub fn snapshots(&self) -> &[Arc<Snapshot>] {
        &self.snapshots
    }

    /// Timestamp of the first snapshot, or `0.0` when empty.
    pub fn start(&self) -> f32 {
        self.snapshots.first().map_or(0.0, |s| s.timestamp())
    }

    /// Timestamp of the last snapshot, or `0.0` when empty.
    pub fn end(&self) -> f32 {
        self.snapshots.last().map_or(0.0, |s| s.timestamp())
    }

    /// Append a snapshot, keeping timestamp order.
    pub fn push(&mut self, snapshot: Arc<Snapshot>) {
        let ts = snapshot.timestamp();
        if self.snapshots.last().is_some_and(|s| ts < s.timestamp()) {
            let at = self.snapshots.partition_point(|s| s.timestamp() <= ts);
            self.snapshots.insert(at, snapshot);
        } else {
            self.snapshots.push(snapshot);
        }
    }

    /// The first snapshot at or after `t`, if the chunk has one.
    pub fn restore(&self, t: f32) -> Option<Arc<Snapshot>> {
        let at = self.snapshots.partition_point(|s| s.timestamp() < t);
        self.snapshots.get(at).cloned()
    }

    /// The last snapshot.
    pub fn last(&self) -> Option<Arc<Snapshot>> {
        self.snapshots.last().cloned()
    }

    /// Shift every snapshot by `delta` seconds.
    pub fn rebase(&mut self, delta: f32) {
        for s in &mut self.snapshots {
            Arc::make_mut(s).correct_timestamp(delta);
        }
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        16 + self
            .snapshots
            .iter()
            .map(|s| s.encoded_len())
            .sum::<usize>()
    }

    /// Encode the chunk.
    pub fn encode(&self, w: &mut dyn Write) -> Result<(), CodecError> {
        write_offset(w, u64::from(self.id))?;
        write_f32_le(w, self.start())?;
        write_f32_le(w, self.end())?;
        write_i32_le(w, len_to_i32(self.snapshots.len())?)?;
        for s in &self.snapshots {
            s.encode(w)?;
        }
        Ok(())
    }

    /// Decode a chunk, returning it with the start and end times stored
    /// in its own header (which a caller may check against the table).
    pub fn decode(r: &mut dyn Read) -> Result<(Self, f32, f32), CodecError> {
        let id = read_len(r, "chunk id")?;
        let id = u32::try_from(id).map_err(|_| CodecError::Malformed {
            detail: format!("chunk id {id} out of range"),
        })?;
        let start = read_f32_le(r)?;
        let end = read_f32_le(r)?;
        let count = read_len(r, "chunk snapshot count")?;
        let mut chunk = Chunk::new(id);
        for _ in 0..count {
            chunk.push(Arc::new(Snapshot::decode(r)?));
        }
        Ok((chunk, start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_core::{ObjectIdentity, StateBuffer};

    fn chunk_of(id: u32, timestamps: &[f32]) -> Chunk {
        let mut chunk = Chunk::new(id);
        for &ts in timestamps {
            let mut s = Snapshot::new(ts);
            s.record_state(ObjectIdentity(1), StateBuffer::from_bytes(vec![7, 7]));
            chunk.push(Arc::new(s));
        }
        chunk
    }

    #[test]
    fn roundtrip_with_header_times() {
        let chunk = chunk_of(3, &[1.0, 1.5, 2.0]);
        let mut buf = Vec::new();
        chunk.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), chunk.encoded_len());
        let (back, start, end) = Chunk::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(back, chunk);
        assert_eq!((start, end), (1.0, 2.0));
    }

    #[test]
    fn restore_rounds_up_within_chunk() {
        let chunk = chunk_of(0, &[0.0, 1.0, 2.0]);
        assert_eq!(chunk.restore(0.5).unwrap().timestamp(), 1.0);
        assert_eq!(chunk.restore(2.0).unwrap().timestamp(), 2.0);
        assert!(chunk.restore(2.5).is_none());
    }

    #[test]
    fn rebase_keeps_encoded_size() {
        let mut chunk = chunk_of(0, &[3.0, 4.0]);
        let before = chunk.encoded_len();
        chunk.rebase(-3.0);
        assert_eq!(chunk.start(), 0.0);
        assert_eq!(chunk.end(), 1.0);
        assert_eq!(chunk.encoded_len(), before);
    }
}
