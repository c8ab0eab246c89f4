//! The storage target contract shared by every backend.

use std::sync::Arc;

use rewind_core::{InitialDataBuffer, Snapshot};

use crate::error::StorageError;

/// Lifecycle transitions signalled through
/// [`StorageTarget::prepare_target`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetTask {
    /// Become ready to accept [`StorageTarget::record_snapshot`] calls.
    /// Any earlier recording is dropped.
    PrepareWrite {
        /// Scene identifier captured with the recording.
        scene_name: String,
    },
    /// Become ready to serve [`StorageTarget::restore_snapshot`] calls.
    PrepareRead,
    /// Flush buffered data to its durable form and rebase every stored
    /// timestamp so the earliest snapshot reads as time zero.
    Commit,
    /// Drop all recorded data. Safe at any time: a recording in progress
    /// continues against an empty buffer and playback finds nothing to
    /// show.
    Discard,
}

impl TargetTask {
    /// Short name for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PrepareWrite { .. } => "prepare_write",
            Self::PrepareRead => "prepare_read",
            Self::Commit => "commit",
            Self::Discard => "discard",
        }
    }
}

/// Somewhere snapshots are appended while recording and fetched back
/// during playback.
///
/// Implementations are driven from the simulation thread only. A target
/// may do I/O on its own threads, but every method here is called with
/// exclusive access.
pub trait StorageTarget: Send {
    /// Run a lifecycle transition.
    fn prepare_target(&mut self, task: TargetTask) -> Result<(), StorageError>;

    /// Append a snapshot. Timestamps must not decrease within a
    /// recording.
    fn record_snapshot(&mut self, snapshot: Snapshot) -> Result<(), StorageError>;

    /// The first snapshot at or after `offset` seconds from the start of
    /// the recording.
    ///
    /// Always rounds up to the next recorded frame. Returns `None` when
    /// the target is empty or `offset` is past [`duration`](Self::duration).
    ///
    /// Whether `PrepareRead` must come first depends on the backend.
    /// Memory targets hold their snapshots resident and serve restores in
    /// any state, including straight after `Commit` or `import`. A
    /// `FileTarget` has nothing to read until `PrepareWrite` or
    /// `PrepareRead` and fails with [`StorageError::NotPrepared`].
    fn restore_snapshot(&mut self, offset: f32) -> Result<Option<Arc<Snapshot>>, StorageError>;

    /// Seconds between the first and last stored snapshot.
    fn duration(&self) -> f32;

    /// Approximate bytes held by the recording.
    fn memory_size(&self) -> usize;

    /// Spawn facts of the recording.
    fn initial_state_buffer(&self) -> &InitialDataBuffer;

    /// Mutable access for appending spawn facts while recording.
    fn initial_state_buffer_mut(&mut self) -> &mut InitialDataBuffer;

    /// Scene identifier captured by the last `PrepareWrite`, or read from
    /// the stored recording.
    fn target_scene_name(&self) -> &str;

    /// Whether the target is between `PrepareWrite` and `Commit`.
    fn is_recording(&self) -> bool;
}

impl<T: StorageTarget + ?Sized> StorageTarget for Box<T> {
    fn prepare_target(&mut self, task: TargetTask) -> Result<(), StorageError> {
        (**self).prepare_target(task)
    }

    fn record_snapshot(&mut self, snapshot: Snapshot) -> Result<(), StorageError> {
        (**self).record_snapshot(snapshot)
    }

    fn restore_snapshot(&mut self, offset: f32) -> Result<Option<Arc<Snapshot>>, StorageError> {
        (**self).restore_snapshot(offset)
    }

    fn duration(&self) -> f32 {
        (**self).duration()
    }

    fn memory_size(&self) -> usize {
        (**self).memory_size()
    }

    fn initial_state_buffer(&self) -> &InitialDataBuffer {
        (**self).initial_state_buffer()
    }

    fn initial_state_buffer_mut(&mut self) -> &mut InitialDataBuffer {
        (**self).initial_state_buffer_mut()
    }

    fn target_scene_name(&self) -> &str {
        (**self).target_scene_name()
    }

    fn is_recording(&self) -> bool {
        (**self).is_recording()
    }
}
