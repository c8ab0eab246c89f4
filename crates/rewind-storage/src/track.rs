//! In-memory snapshot list with rolling-window retention.
//!
//! [`SnapshotTrack`] is the storage of one memory recording: the
//! [`MemoryTarget`](crate::memory::MemoryTarget) owns one, and every
//! channel of a
//! [`MultichannelMemoryTarget`](crate::multichannel::MultichannelMemoryTarget)
//! owns its own.

use std::sync::Arc;

use rewind_core::{InitialDataBuffer, Snapshot};
use tracing::trace;

use crate::config::ROLLING_WINDOW_MARGIN;

/// Ordered snapshots plus the spawn facts and scene of one recording.
#[derive(Clone, Debug, Default)]
pub struct SnapshotTrack {
    snapshots: Vec<Arc<Snapshot>>,
    initial_state: InitialDataBuffer,
    scene_name: String,
    record_window: f32,
}

impl SnapshotTrack {
    /// Create an empty track. `record_window` of `0.0` keeps everything.
    pub fn new(record_window: f32) -> Self {
        Self {
            record_window,
            ..Self::default()
        }
    }

    /// Retention window in seconds.
    pub fn record_window(&self) -> f32 {
        self.record_window
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Stored snapshots in timestamp order.
    pub fn snapshots(&self) -> &[Arc<Snapshot>] {
        &self.snapshots
    }

    /// Timestamp of the earliest stored snapshot.
    pub fn first_timestamp(&self) -> Option<f32> {
        self.snapshots.first().map(|s| s.timestamp())
    }

    /// Timestamp of the latest stored snapshot.
    pub fn last_timestamp(&self) -> Option<f32> {
        self.snapshots.last().map(|s| s.timestamp())
    }

    /// Seconds between the first and last snapshot.
    pub fn duration(&self) -> f32 {
        match (self.first_timestamp(), self.last_timestamp()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    /// Spawn facts.
    pub fn initial_state(&self) -> &InitialDataBuffer {
        &self.initial_state
    }

    /// Mutable spawn facts.
    pub fn initial_state_mut(&mut self) -> &mut InitialDataBuffer {
        &mut self.initial_state
    }

    /// Scene identifier.
    pub fn scene_name(&self) -> &str {
        &self.scene_name
    }

    pub(crate) fn set_scene_name(&mut self, scene_name: String) {
        self.scene_name = scene_name;
    }

    /// Append a snapshot, then evict everything that has fallen out of
    /// the rolling window.
    ///
    /// A snapshot older than the newest one is inserted in order rather
    /// than appended.
    pub fn push(&mut self, snapshot: Arc<Snapshot>) {
        let ts = snapshot.timestamp();
        match self.last_timestamp() {
            Some(last) if ts < last => {
                let at = self.snapshots.partition_point(|s| s.timestamp() <= ts);
                self.snapshots.insert(at, snapshot);
            }
            _ => self.snapshots.push(snapshot),
        }
        self.evict();
    }

    fn evict(&mut self) {
        if self.record_window <= 0.0 {
            return;
        }
        let Some(last) = self.last_timestamp() else {
            return;
        };
        let cutoff = last - (self.record_window + ROLLING_WINDOW_MARGIN);
        let expired = self.snapshots.partition_point(|s| s.timestamp() <= cutoff);
        if expired > 0 {
            self.snapshots.drain(..expired);
            trace!(expired, cutoff, "rolling window evicted snapshots");
        }
    }

    /// The first snapshot at or after `offset` seconds from the start.
    pub fn restore(&self, offset: f32) -> Option<Arc<Snapshot>> {
        let first = self.first_timestamp()?;
        if offset.is_nan() || offset > self.duration() {
            return None;
        }
        let target = first + offset;
        let at = self.snapshots.partition_point(|s| s.timestamp() < target);
        // `first + offset` can land a hair past the last timestamp even
        // though `offset <= duration`.
        self.snapshots
            .get(at)
            .or_else(|| self.snapshots.last())
            .cloned()
    }

    /// Rebase so the first snapshot sits at time zero. Spawn facts are
    /// shifted by the same amount.
    pub fn rebase(&mut self) {
        let Some(first) = self.first_timestamp() else {
            return;
        };
        if first == 0.0 {
            return;
        }
        for snapshot in &mut self.snapshots {
            Arc::make_mut(snapshot).correct_timestamp(-first);
        }
        self.initial_state.correct_timestamps(-first);
    }

    /// Drop snapshots and spawn facts. The scene name is kept.
    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.initial_state.clear();
    }

    /// Encoded size of the stored snapshots and spawn facts.
    pub fn memory_size(&self) -> usize {
        self.snapshots
            .iter()
            .map(|s| s.encoded_len())
            .sum::<usize>()
            + self.initial_state.encoded_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rewind_core::{InitialData, ObjectIdentity, StateBuffer};

    fn snap(ts: f32) -> Arc<Snapshot> {
        let mut s = Snapshot::new(ts);
        s.record_state(ObjectIdentity(1), StateBuffer::from_bytes(vec![1]));
        Arc::new(s)
    }

    fn track_of(timestamps: &[f32]) -> SnapshotTrack {
        let mut track = SnapshotTrack::new(0.0);
        for &ts in timestamps {
            track.push(snap(ts));
        }
        track
    }

    #[test]
    fn restore_rounds_up() {
        let track = track_of(&[0.0, 0.1, 0.2]);
        assert_eq!(track.restore(0.05).unwrap().timestamp(), 0.1);
        assert_eq!(track.restore(0.1).unwrap().timestamp(), 0.1);
        assert_eq!(track.restore(0.0).unwrap().timestamp(), 0.0);
    }

    #[test]
    fn restore_past_duration_is_none() {
        let track = track_of(&[0.0, 1.0]);
        assert!(track.restore(1.5).is_none());
        assert!(SnapshotTrack::new(0.0).restore(0.0).is_none());
    }

    #[test]
    fn restore_offset_is_relative_to_first() {
        let track = track_of(&[10.0, 11.0, 12.0]);
        assert_eq!(track.restore(0.5).unwrap().timestamp(), 11.0);
        assert_eq!(track.restore(2.0).unwrap().timestamp(), 12.0);
    }

    #[test]
    fn rebase_moves_first_to_zero() {
        let mut track = track_of(&[5.0, 5.5, 7.0]);
        track
            .initial_state_mut()
            .record(InitialData::new(ObjectIdentity(3), 5.5));
        track.rebase();
        let ts: Vec<f32> = track.snapshots().iter().map(|s| s.timestamp()).collect();
        assert_eq!(ts, vec![0.0, 0.5, 2.0]);
        assert_eq!(
            track.initial_state().records(ObjectIdentity(3))[0].timestamp,
            0.5
        );
    }

    #[test]
    fn window_evicts_old_snapshots() {
        let mut track = SnapshotTrack::new(1.0);
        for i in 0..30 {
            track.push(snap(i as f32 * 0.1));
        }
        // cutoff = 2.9 - 1.2 = 1.7
        assert!(track.first_timestamp().unwrap() > 1.69);
        assert!(track.duration() <= 1.2 + 1e-4);
    }

    #[test]
    fn out_of_order_push_keeps_sorted() {
        let track = track_of(&[0.0, 2.0, 1.0]);
        let ts: Vec<f32> = track.snapshots().iter().map(|s| s.timestamp()).collect();
        assert_eq!(ts, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn clear_keeps_scene() {
        let mut track = track_of(&[0.0]);
        track.set_scene_name("arena".into());
        track.clear();
        assert!(track.is_empty());
        assert_eq!(track.scene_name(), "arena");
    }

    proptest! {
        #[test]
        fn window_bound_holds(
            window in 0.1f32..5.0,
            steps in prop::collection::vec(0.01f32..0.5, 1..200),
        ) {
            let mut track = SnapshotTrack::new(window);
            let mut t = 0.0f32;
            let mut max_step = 0.0f32;
            for step in steps {
                t += step;
                max_step = max_step.max(step);
                track.push(snap(t));
                prop_assert!(track.duration() <= window + ROLLING_WINDOW_MARGIN + max_step);
            }
        }

        #[test]
        fn restore_is_smallest_at_or_after(
            steps in prop::collection::vec(0.01f32..1.0, 1..64),
            probe in 0.0f32..1.0,
        ) {
            let mut track = SnapshotTrack::new(0.0);
            let mut t = 0.0f32;
            for step in steps {
                track.push(snap(t));
                t += step;
            }
            let offset = probe * track.duration();
            let got = track.restore(offset).unwrap().timestamp();
            prop_assert!(got >= offset || got == track.last_timestamp().unwrap());
            for s in track.snapshots() {
                if s.timestamp() >= offset {
                    prop_assert!(got <= s.timestamp());
                }
            }
        }
    }
}
