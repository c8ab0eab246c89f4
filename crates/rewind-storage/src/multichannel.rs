//! Several independent memory recordings with one active at a time.

use std::sync::Arc;

use rewind_core::{InitialDataBuffer, Snapshot};
use tracing::debug;

use crate::config::MultichannelConfig;
use crate::error::StorageError;
use crate::target::{StorageTarget, TargetTask};
use crate::track::SnapshotTrack;

/// An indexed set of memory channels.
///
/// Every [`StorageTarget`] call goes to the active channel. Channel
/// layout cannot change while a recording is in progress, and there is
/// always at least one channel.
#[derive(Debug)]
pub struct MultichannelMemoryTarget {
    channels: Vec<SnapshotTrack>,
    active: usize,
    record_window: f32,
    recording: bool,
}

impl MultichannelMemoryTarget {
    /// Create a target with `config.channels` empty channels.
    pub fn new(config: MultichannelConfig) -> Result<Self, StorageError> {
        config.validate()?;
        Ok(Self {
            channels: vec![SnapshotTrack::new(config.record_window); config.channels],
            active: 0,
            record_window: config.record_window,
            recording: false,
        })
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Index of the channel receiving calls.
    pub fn active_channel(&self) -> usize {
        self.active
    }

    /// Read-only view of one channel.
    pub fn channel(&self, index: usize) -> Option<&SnapshotTrack> {
        self.channels.get(index)
    }

    fn ensure_idle(&self, what: &str) -> Result<(), StorageError> {
        if self.recording {
            return Err(StorageError::InvalidOperation {
                reason: format!("cannot {what} while recording"),
            });
        }
        Ok(())
    }

    /// Route subsequent calls to channel `index`.
    pub fn set_active_channel(&mut self, index: usize) -> Result<(), StorageError> {
        self.ensure_idle("switch channels")?;
        if index >= self.channels.len() {
            return Err(StorageError::InvalidOperation {
                reason: format!(
                    "channel {index} out of range (have {})",
                    self.channels.len()
                ),
            });
        }
        self.active = index;
        debug!(channel = index, "active channel changed");
        Ok(())
    }

    /// Append an empty channel and return its index.
    pub fn add_channel(&mut self) -> Result<usize, StorageError> {
        self.ensure_idle("add a channel")?;
        self.channels.push(SnapshotTrack::new(self.record_window));
        Ok(self.channels.len() - 1)
    }

    /// Remove channel `index` and everything recorded in it.
    ///
    /// Removing the active channel makes channel 0 active. Removing a
    /// channel before the active one keeps the same channel active.
    pub fn remove_channel(&mut self, index: usize) -> Result<(), StorageError> {
        self.ensure_idle("remove a channel")?;
        if self.channels.len() <= 1 {
            return Err(StorageError::InvalidOperation {
                reason: "cannot remove the last channel".into(),
            });
        }
        if index >= self.channels.len() {
            return Err(StorageError::InvalidOperation {
                reason: format!(
                    "channel {index} out of range (have {})",
                    self.channels.len()
                ),
            });
        }
        self.channels.remove(index);
        if index == self.active {
            self.active = 0;
        } else if index < self.active {
            self.active -= 1;
        }
        Ok(())
    }

    /// Grow or shrink to exactly `count` channels.
    ///
    /// Shrinking drops the highest channels. If the active channel is
    /// dropped, channel 0 becomes active.
    pub fn set_number_of_channels(&mut self, count: usize) -> Result<(), StorageError> {
        self.ensure_idle("resize channels")?;
        if count == 0 {
            return Err(StorageError::InvalidOperation {
                reason: "at least one channel is required".into(),
            });
        }
        let window = self.record_window;
        self.channels.resize_with(count, || SnapshotTrack::new(window));
        if self.active >= count {
            self.active = 0;
        }
        Ok(())
    }

    fn track(&self) -> &SnapshotTrack {
        &self.channels[self.active]
    }

    fn track_mut(&mut self) -> &mut SnapshotTrack {
        &mut self.channels[self.active]
    }
}

impl StorageTarget for MultichannelMemoryTarget {
    fn prepare_target(&mut self, task: TargetTask) -> Result<(), StorageError> {
        debug!(
            task = task.name(),
            channel = self.active,
            "multichannel target transition"
        );
        match task {
            TargetTask::PrepareWrite { scene_name } => {
                let track = self.track_mut();
                track.clear();
                track.set_scene_name(scene_name);
                self.recording = true;
            }
            TargetTask::PrepareRead => self.recording = false,
            TargetTask::Commit => {
                self.track_mut().rebase();
                self.recording = false;
            }
            TargetTask::Discard => self.track_mut().clear(),
        }
        Ok(())
    }

    fn record_snapshot(&mut self, snapshot: Snapshot) -> Result<(), StorageError> {
        if !self.recording {
            return Err(StorageError::NotPrepared {
                operation: "record_snapshot",
            });
        }
        self.track_mut().push(Arc::new(snapshot));
        Ok(())
    }

    fn restore_snapshot(&mut self, offset: f32) -> Result<Option<Arc<Snapshot>>, StorageError> {
        Ok(self.track().restore(offset))
    }

    fn duration(&self) -> f32 {
        self.track().duration()
    }

    fn memory_size(&self) -> usize {
        self.track().memory_size()
    }

    fn initial_state_buffer(&self) -> &InitialDataBuffer {
        self.track().initial_state()
    }

    fn initial_state_buffer_mut(&mut self) -> &mut InitialDataBuffer {
        self.track_mut().initial_state_mut()
    }

    fn target_scene_name(&self) -> &str {
        self.track().scene_name()
    }

    fn is_recording(&self) -> bool {
        self.recording
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(channels: usize) -> MultichannelMemoryTarget {
        MultichannelMemoryTarget::new(MultichannelConfig {
            channels,
            record_window: 0.0,
        })
        .unwrap()
    }

    fn begin(t: &mut MultichannelMemoryTarget) {
        t.prepare_target(TargetTask::PrepareWrite {
            scene_name: "s".into(),
        })
        .unwrap();
    }

    #[test]
    fn mutations_forbidden_while_recording() {
        let mut t = target(2);
        begin(&mut t);
        for result in [
            t.set_active_channel(1),
            t.add_channel().map(|_| ()),
            t.remove_channel(1),
            t.set_number_of_channels(3),
        ] {
            assert!(matches!(result, Err(StorageError::InvalidOperation { .. })));
        }
        t.prepare_target(TargetTask::Commit).unwrap();
        t.set_active_channel(1).unwrap();
    }

    #[test]
    fn cannot_remove_last_channel() {
        let mut t = target(1);
        assert!(matches!(
            t.remove_channel(0),
            Err(StorageError::InvalidOperation { .. })
        ));
        assert!(t.set_number_of_channels(0).is_err());
        assert_eq!(t.channel_count(), 1);
    }

    #[test]
    fn removing_active_resets_to_zero() {
        let mut t = target(3);
        t.set_active_channel(2).unwrap();
        t.remove_channel(2).unwrap();
        assert_eq!(t.active_channel(), 0);
    }

    #[test]
    fn removing_earlier_channel_keeps_active_track() {
        let mut t = target(3);
        t.set_active_channel(2).unwrap();
        begin(&mut t);
        t.record_snapshot({
            let mut s = Snapshot::new(0.0);
            s.record_state(
                rewind_core::ObjectIdentity(1),
                rewind_core::StateBuffer::from_bytes(vec![1]),
            );
            s
        })
        .unwrap();
        t.prepare_target(TargetTask::Commit).unwrap();
        t.remove_channel(0).unwrap();
        assert_eq!(t.active_channel(), 1);
        assert_eq!(t.channel(1).unwrap().len(), 1);
    }

    #[test]
    fn shrinking_past_active_resets() {
        let mut t = target(4);
        t.set_active_channel(3).unwrap();
        t.set_number_of_channels(2).unwrap();
        assert_eq!(t.channel_count(), 2);
        assert_eq!(t.active_channel(), 0);
    }

    #[test]
    fn out_of_range_channel_rejected() {
        let mut t = target(2);
        assert!(t.set_active_channel(5).is_err());
        assert_eq!(t.add_channel().unwrap(), 2);
    }
}
