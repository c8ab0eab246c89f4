//! Single in-memory recording with optional rolling window.
//!
//! A memory recording can also be exported as one blob (optionally
//! gzip-compressed) and imported later:
//!
//! ```text
//! magic           i32 = 0x2D4D
//! scene_name      string
//! snapshot_count  i32
//! snapshots       snapshot_count × Snapshot
//! initial_state   InitialDataBuffer
//! ```

use std::sync::Arc;

use rewind_core::codec::{len_to_i32, read_i32_le, read_len, read_str, write_i32_le, write_str};
use rewind_core::compress::decompress_if_needed;
use rewind_core::{CodecError, Compression, InitialDataBuffer, Snapshot};
use tracing::debug;

use crate::config::MemoryTargetConfig;
use crate::error::StorageError;
use crate::target::{StorageTarget, TargetTask};
use crate::track::SnapshotTrack;

/// Magic number of an exported memory recording.
pub const EXPORT_MAGIC: i32 = 0x2D4D;

/// Keeps one recording in memory.
///
/// Restores need no `PrepareRead`: the recording is always resident, so
/// it can be read while recording, after `Commit`, or right after
/// [`import`](Self::import).
#[derive(Debug)]
pub struct MemoryTarget {
    track: SnapshotTrack,
    recording: bool,
}

impl MemoryTarget {
    /// Create an empty target.
    pub fn new(config: MemoryTargetConfig) -> Result<Self, StorageError> {
        config.validate()?;
        Ok(Self {
            track: SnapshotTrack::new(config.record_window),
            recording: false,
        })
    }

    /// The underlying track.
    pub fn track(&self) -> &SnapshotTrack {
        &self.track
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.track.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.track.is_empty()
    }

    /// Serialize the recording as one blob.
    pub fn export(&self, compression: Compression) -> Result<Vec<u8>, StorageError> {
        let mut out = Vec::with_capacity(self.track.memory_size() + 64);
        write_i32_le(&mut out, EXPORT_MAGIC)?;
        write_str(&mut out, self.track.scene_name())?;
        write_i32_le(&mut out, len_to_i32(self.track.len())?)?;
        for snapshot in self.track.snapshots() {
            snapshot.encode(&mut out)?;
        }
        self.track.initial_state().encode(&mut out)?;
        let raw_len = out.len();
        let out = compression.apply(out)?;
        debug!(
            snapshots = self.track.len(),
            raw_len,
            exported_len = out.len(),
            ?compression,
            "exported memory recording"
        );
        Ok(out)
    }

    /// Rebuild a target from [`export`](Self::export) output. Gzip is
    /// detected automatically.
    pub fn import(bytes: &[u8], config: MemoryTargetConfig) -> Result<Self, StorageError> {
        let mut target = Self::new(config)?;
        let raw = decompress_if_needed(bytes)?;
        let mut r: &[u8] = &raw;

        let magic = read_i32_le(&mut r)?;
        if magic != EXPORT_MAGIC {
            return Err(CodecError::InvalidMagic { found: magic }.into());
        }
        target.track.set_scene_name(read_str(&mut r)?);
        let count = read_len(&mut r, "snapshot count")?;
        for _ in 0..count {
            target.track.push(Arc::new(Snapshot::decode(&mut r)?));
        }
        *target.track.initial_state_mut() = InitialDataBuffer::decode(&mut r)?;
        Ok(target)
    }
}

impl Default for MemoryTarget {
    fn default() -> Self {
        Self {
            track: SnapshotTrack::new(0.0),
            recording: false,
        }
    }
}

impl StorageTarget for MemoryTarget {
    fn prepare_target(&mut self, task: TargetTask) -> Result<(), StorageError> {
        debug!(task = task.name(), "memory target transition");
        match task {
            TargetTask::PrepareWrite { scene_name } => {
                self.track.clear();
                self.track.set_scene_name(scene_name);
                self.recording = true;
            }
            TargetTask::PrepareRead => self.recording = false,
            TargetTask::Commit => {
                self.track.rebase();
                self.recording = false;
            }
            TargetTask::Discard => self.track.clear(),
        }
        Ok(())
    }

    fn record_snapshot(&mut self, snapshot: Snapshot) -> Result<(), StorageError> {
        if !self.recording {
            return Err(StorageError::NotPrepared {
                operation: "record_snapshot",
            });
        }
        self.track.push(Arc::new(snapshot));
        Ok(())
    }

    fn restore_snapshot(&mut self, offset: f32) -> Result<Option<Arc<Snapshot>>, StorageError> {
        Ok(self.track.restore(offset))
    }

    fn duration(&self) -> f32 {
        self.track.duration()
    }

    fn memory_size(&self) -> usize {
        self.track.memory_size()
    }

    fn initial_state_buffer(&self) -> &InitialDataBuffer {
        self.track.initial_state()
    }

    fn initial_state_buffer_mut(&mut self) -> &mut InitialDataBuffer {
        self.track.initial_state_mut()
    }

    fn target_scene_name(&self) -> &str {
        self.track.scene_name()
    }

    fn is_recording(&self) -> bool {
        self.recording
    }
}
