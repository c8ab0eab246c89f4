//! Playback lifecycle callbacks and recorded events.

use rewind_core::StateBuffer;

use crate::error::BehaviourError;

/// An event an object queued while recording.
///
/// Stored inside the object's snapshot entry and handed back to the same
/// object when that frame becomes current during playback.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplayEvent {
    /// Caller-defined event code.
    pub id: u16,
    /// Event data.
    pub payload: StateBuffer,
}

impl ReplayEvent {
    /// An event with an empty payload.
    pub fn new(id: u16) -> Self {
        Self {
            id,
            payload: StateBuffer::new(),
        }
    }

    /// An event carrying `payload`.
    pub fn with_payload(id: u16, payload: StateBuffer) -> Self {
        Self { id, payload }
    }
}

/// Optional hooks invoked while a recording plays back.
///
/// Every slot defaults to a no-op. An `Err` is logged by the session and
/// does not stop delivery to other objects.
pub trait ReplayBehaviour {
    /// Playback began.
    fn on_replay_start(&mut self) -> Result<(), BehaviourError> {
        Ok(())
    }

    /// Playback ended, by reaching the end or by an explicit stop.
    fn on_replay_end(&mut self) -> Result<(), BehaviourError> {
        Ok(())
    }

    /// The playhead jumped (seek or loop), so any state derived from
    /// frame-to-frame continuity is stale.
    fn on_replay_reset(&mut self) -> Result<(), BehaviourError> {
        Ok(())
    }

    /// Called every playback update with the interpolation fraction
    /// between the previous and current frame.
    fn on_replay_update(&mut self, _fraction: f32) -> Result<(), BehaviourError> {
        Ok(())
    }

    /// A recorded event from the frame that just became current.
    fn on_replay_event(&mut self, _event: &ReplayEvent) -> Result<(), BehaviourError> {
        Ok(())
    }
}
