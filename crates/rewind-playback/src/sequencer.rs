//! Playback clock and frame sequencing.
//!
//! [`PlaybackSequencer`] turns frame deltas into a walk over a storage
//! target. It holds the two most recent frames (`last` and `current`)
//! and the interpolation fraction between them. It never touches live
//! objects; the session does that with the frames it hands back.

use std::sync::Arc;

use rewind_core::Snapshot;
use rewind_storage::{StorageError, StorageTarget};
use tracing::trace;

/// Reference point for [`PlaybackSequencer::seek_playback`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekOrigin {
    /// `offset` seconds after the start.
    Start,
    /// `offset` seconds after the current playhead (negative seeks back).
    Current,
    /// `offset` seconds before the end.
    End,
}

/// What happens when the playhead leaves `[0, duration]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndBehaviour {
    /// Report [`SequenceResult::End`]; the caller stops playback.
    EndPlayback,
    /// Wrap to the opposite end and keep going.
    LoopPlayback,
    /// Clamp and hold the boundary frame.
    StopPlayback,
}

/// Outcome of one [`PlaybackSequencer::update_playback`] step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceResult {
    /// A new frame became current.
    Advance,
    /// Still between the same two frames; only the fraction moved.
    Idle,
    /// Playback ran off the end (or the target has nothing to show).
    End,
}

/// Playback clock plus the two most recent frames.
#[derive(Clone, Debug)]
pub struct PlaybackSequencer {
    clock: f32,
    time_scale: f32,
    current: Option<Arc<Snapshot>>,
    last: Option<Arc<Snapshot>>,
    fraction: f32,
}

impl Default for PlaybackSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackSequencer {
    /// A sequencer at time zero playing forwards at normal speed.
    pub fn new() -> Self {
        Self {
            clock: 0.0,
            time_scale: 1.0,
            current: None,
            last: None,
            fraction: 0.0,
        }
    }

    /// Playhead position in seconds from the start of the recording.
    pub fn playback_time(&self) -> f32 {
        self.clock
    }

    /// Speed multiplier. Negative plays backwards.
    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Change the speed multiplier.
    pub fn set_time_scale(&mut self, time_scale: f32) {
        self.time_scale = time_scale;
    }

    /// Whether the clock runs backwards.
    pub fn is_reversed(&self) -> bool {
        self.time_scale < 0.0
    }

    /// The frame most recently made current.
    pub fn current(&self) -> Option<&Arc<Snapshot>> {
        self.current.as_ref()
    }

    /// The frame that was current before it.
    pub fn last(&self) -> Option<&Arc<Snapshot>> {
        self.last.as_ref()
    }

    /// Position of the playhead between `last` and `current`, in `[0, 1]`.
    pub fn fraction(&self) -> f32 {
        self.fraction
    }

    /// Forget both frames and rewind the clock. Keeps the time scale.
    pub fn reset(&mut self) {
        self.clock = 0.0;
        self.current = None;
        self.last = None;
        self.fraction = 0.0;
    }

    /// Jump the playhead and fetch the frame at the new position.
    ///
    /// With `normalized`, `offset` is a fraction of the duration. The
    /// resolved time is clamped to `[0, duration]`. Returns the frame at
    /// the new position, or `None` if the target has none.
    pub fn seek_playback(
        &mut self,
        target: &mut dyn StorageTarget,
        offset: f32,
        origin: SeekOrigin,
        normalized: bool,
    ) -> Result<Option<Arc<Snapshot>>, StorageError> {
        let duration = target.duration();
        let delta = if normalized { offset * duration } else { offset };
        let time = match origin {
            SeekOrigin::Start => delta,
            SeekOrigin::Current => self.clock + delta,
            SeekOrigin::End => duration - delta,
        };
        self.clock = clamp_time(time, duration);

        let Some(frame) = target.restore_snapshot(self.clock)? else {
            return Ok(None);
        };
        if !self.is_current(&frame) {
            self.last = self.current.replace(Arc::clone(&frame));
        }
        self.fraction = self.compute_fraction();
        trace!(time = self.clock, frame = frame.timestamp(), "seek");
        Ok(Some(frame))
    }

    /// Advance the clock by `delta_time × time_scale` and fetch the frame
    /// at the new position.
    ///
    /// Returns the frame only with [`SequenceResult::Advance`].
    pub fn update_playback(
        &mut self,
        target: &mut dyn StorageTarget,
        end_behaviour: EndBehaviour,
        delta_time: f32,
    ) -> Result<(SequenceResult, Option<Arc<Snapshot>>), StorageError> {
        let duration = target.duration();
        let step = if delta_time.is_finite() {
            delta_time * self.time_scale
        } else {
            0.0
        };
        let mut time = self.clock + step;
        let mut wrapped = false;

        if time > duration || time < 0.0 {
            match end_behaviour {
                EndBehaviour::EndPlayback => {
                    self.clock = clamp_time(time, duration);
                    return Ok((SequenceResult::End, None));
                }
                EndBehaviour::LoopPlayback => {
                    time = if time > duration { 0.0 } else { duration };
                    wrapped = true;
                }
                EndBehaviour::StopPlayback => time = clamp_time(time, duration),
            }
        }
        self.clock = time;

        let Some(frame) = target.restore_snapshot(self.clock)? else {
            return Ok((SequenceResult::End, None));
        };
        if self.is_current(&frame) {
            self.fraction = self.compute_fraction();
            return Ok((SequenceResult::Idle, None));
        }
        self.last = self.current.replace(Arc::clone(&frame));
        if wrapped {
            // Blending across the seam would sweep through the whole
            // recording.
            self.last = None;
        }
        self.fraction = 0.0;
        trace!(time = self.clock, frame = frame.timestamp(), wrapped, "sequence advance");
        Ok((SequenceResult::Advance, Some(frame)))
    }

    // Frames are compared by timestamp: a chunk evicted and fetched
    // again yields a different allocation for the same frame.
    fn is_current(&self, frame: &Snapshot) -> bool {
        self.current
            .as_ref()
            .is_some_and(|c| c.timestamp().to_bits() == frame.timestamp().to_bits())
    }

    fn compute_fraction(&self) -> f32 {
        let (Some(last), Some(current)) = (&self.last, &self.current) else {
            return 0.0;
        };
        interpolation_fraction(last.timestamp(), current.timestamp(), self.clock)
    }
}

/// Linear remap of `time` from `[from, to]` onto `[0, 1]`, clamped.
///
/// Works for either ordering of `from` and `to`, so backward playback
/// gets a fraction that also runs from the old frame to the new one.
pub fn interpolation_fraction(from: f32, to: f32, time: f32) -> f32 {
    let span = to - from;
    if span == 0.0 || !span.is_finite() {
        return 0.0;
    }
    ((time - from) / span).clamp(0.0, 1.0)
}

fn clamp_time(time: f32, duration: f32) -> f32 {
    if time.is_nan() {
        return 0.0;
    }
    time.clamp(0.0, duration.max(0.0))
}
