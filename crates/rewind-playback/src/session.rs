//! Recording and playback loops over one storage target.
//!
//! [`ReplaySession`] owns everything a replay needs: the target, the
//! live object set, the identity registry, the prefab instantiator and
//! the sequencer. The host drives it from its simulation loop:
//!
//! ```text
//! register(obj)*  begin_recording  update_recording(dt)*  stop_recording
//!                 begin_playback   update_playback(dt)* / seek   stop_playback
//! ```

use std::sync::Arc;

use rewind_core::{IdentityRegistry, ObjectIdentity, Snapshot, StateBuffer};
use rewind_storage::{StorageTarget, TargetTask};
use tracing::{debug, info, warn};

use crate::behaviour::{ReplayBehaviour, ReplayEvent};
use crate::config::{validate_time_scale, SessionConfig};
use crate::error::{BehaviourError, PlaybackError};
use crate::object::{EntryPayload, Instantiator, ObjectSet, ReplayObject};
use crate::reconcile::{reconcile, ReconcileReport};
use crate::sequencer::{PlaybackSequencer, SeekOrigin, SequenceResult};

/// What the session is doing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SessionState {
    /// Neither recording nor playing.
    Idle,
    /// Sampling live objects into the target.
    Recording {
        /// Recording time of the last sample, in seconds.
        elapsed: f32,
        /// Time accumulated towards the next sample.
        accumulator: f32,
    },
    /// Replaying the target onto live objects.
    Playback {
        /// Whether updates are suspended.
        paused: bool,
    },
}

/// A recording/playback driver for one storage target.
pub struct ReplaySession<T: StorageTarget> {
    config: SessionConfig,
    target: T,
    objects: ObjectSet,
    registry: IdentityRegistry,
    instantiator: Box<dyn Instantiator>,
    sequencer: PlaybackSequencer,
    state: SessionState,
    last_report: Option<ReconcileReport>,
}

impl<T: StorageTarget> ReplaySession<T> {
    /// Validate `config` and build an idle session.
    pub fn new(
        target: T,
        instantiator: Box<dyn Instantiator>,
        config: SessionConfig,
    ) -> Result<Self, PlaybackError> {
        config.validate()?;
        let registry = match config.identity_seed {
            Some(seed) => IdentityRegistry::with_seed(seed),
            None => IdentityRegistry::new(),
        };
        let mut sequencer = PlaybackSequencer::new();
        sequencer.set_time_scale(config.time_scale);
        Ok(Self {
            config,
            target,
            objects: ObjectSet::new(),
            registry,
            instantiator,
            sequencer,
            state: SessionState::Idle,
            last_report: None,
        })
    }

    // ── Accessors ───────────────────────────────────────────────

    /// Active configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a recording is in progress.
    pub fn is_recording(&self) -> bool {
        matches!(self.state, SessionState::Recording { .. })
    }

    /// Whether playback is active (paused or not).
    pub fn is_replaying(&self) -> bool {
        matches!(self.state, SessionState::Playback { .. })
    }

    /// Whether playback is active and paused.
    pub fn is_paused(&self) -> bool {
        matches!(self.state, SessionState::Playback { paused: true })
    }

    /// The storage target.
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Exclusive access to the storage target.
    ///
    /// Driving its lifecycle directly while the session is recording or
    /// playing leaves the session out of step.
    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    /// Give the target back.
    pub fn into_target(self) -> T {
        self.target
    }

    /// The live object set.
    pub fn objects(&self) -> &ObjectSet {
        &self.objects
    }

    /// One live object.
    pub fn object(&self, identity: ObjectIdentity) -> Option<&dyn ReplayObject> {
        self.objects.get(identity)
    }

    /// Exclusive access to one live object.
    pub fn object_mut(&mut self, identity: ObjectIdentity) -> Option<&mut (dyn ReplayObject + 'static)> {
        self.objects.get_mut(identity)
    }

    /// The identity registry.
    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// The playback sequencer.
    pub fn sequencer(&self) -> &PlaybackSequencer {
        &self.sequencer
    }

    /// What the most recent frame change did to the live set.
    pub fn last_reconcile(&self) -> Option<&ReconcileReport> {
        self.last_report.as_ref()
    }

    // ── Live objects ────────────────────────────────────────────

    /// Register a live object and return its identity.
    ///
    /// The object's own identity is kept if it is free; otherwise a new
    /// one is generated. Spawnable objects registered mid-recording get
    /// a spawn record at the current recording time.
    pub fn register(&mut self, mut object: Box<dyn ReplayObject>) -> Result<ObjectIdentity, PlaybackError> {
        let identity = self.registry.register(object.identity())?;
        object.set_identity(identity);
        if let SessionState::Recording { elapsed, .. } = self.state {
            if object.prefab_name().is_some() {
                let data = object.initial_data(elapsed);
                self.target.initial_state_buffer_mut().record(data);
            }
        }
        if let Some(displaced) = self.objects.insert(object) {
            // Only reachable if the host assigned identities behind the
            // registry's back.
            warn!(identity = %identity, "registration displaced a live object");
            drop(displaced);
        }
        debug!(identity = %identity, "object registered");
        Ok(identity)
    }

    /// Remove a live object and release its identity.
    pub fn unregister(&mut self, identity: ObjectIdentity) -> Option<Box<dyn ReplayObject>> {
        let object = self.objects.remove(identity)?;
        self.registry.unregister(identity);
        debug!(identity = %identity, "object unregistered");
        Some(object)
    }

    // ── Recording ───────────────────────────────────────────────

    fn require_idle(&self, action: &str) -> Result<(), PlaybackError> {
        if self.state != SessionState::Idle {
            return Err(PlaybackError::InvalidState {
                reason: format!("cannot {action} while {}", self.state_name()),
            });
        }
        Ok(())
    }

    fn state_name(&self) -> &'static str {
        match self.state {
            SessionState::Idle => "idle",
            SessionState::Recording { .. } => "recording",
            SessionState::Playback { .. } => "replaying",
        }
    }

    /// Start recording into the target and take the first sample at
    /// time zero.
    pub fn begin_recording(&mut self, scene_name: impl Into<String>) -> Result<(), PlaybackError> {
        self.require_idle("begin recording")?;
        let scene_name = scene_name.into();
        self.target.prepare_target(TargetTask::PrepareWrite {
            scene_name: scene_name.clone(),
        })?;
        for (_, object) in self.objects.iter_mut() {
            if object.prefab_name().is_some() {
                let data = object.initial_data(0.0);
                self.target.initial_state_buffer_mut().record(data);
            }
        }
        self.state = SessionState::Recording {
            elapsed: 0.0,
            accumulator: 0.0,
        };
        info!(scene = %scene_name, objects = self.objects.len(), "recording started");
        self.sample(0.0)
    }

    /// Advance the recording clock by `delta_time` and take a sample for
    /// every full record interval that elapsed. Returns the number of
    /// samples taken.
    pub fn update_recording(&mut self, delta_time: f32) -> Result<usize, PlaybackError> {
        let SessionState::Recording {
            mut elapsed,
            mut accumulator,
        } = self.state
        else {
            return Err(PlaybackError::InvalidState {
                reason: format!("cannot update recording while {}", self.state_name()),
            });
        };
        if delta_time.is_finite() && delta_time > 0.0 {
            accumulator += delta_time;
        }
        let interval = self.config.record_interval();
        let mut taken = 0;
        while accumulator >= interval {
            accumulator -= interval;
            elapsed += interval;
            self.state = SessionState::Recording {
                elapsed,
                accumulator,
            };
            self.sample(elapsed)?;
            taken += 1;
        }
        self.state = SessionState::Recording {
            elapsed,
            accumulator,
        };
        Ok(taken)
    }

    /// Capture every live object into one snapshot at `timestamp`.
    fn sample(&mut self, timestamp: f32) -> Result<(), PlaybackError> {
        let mut snapshot = Snapshot::new(timestamp);
        for (id, object) in self.objects.iter_mut() {
            let mut state = StateBuffer::new();
            object.record_state(&mut state)?;
            let entry = EntryPayload {
                prefab_name: object.prefab_name().unwrap_or_default().to_string(),
                state,
                events: object.drain_events(),
            };
            if entry.is_empty() {
                continue;
            }
            snapshot.record_state(id, entry.encode()?);
        }
        self.target.record_snapshot(snapshot)?;
        Ok(())
    }

    /// Commit the recording and return to idle.
    pub fn stop_recording(&mut self) -> Result<(), PlaybackError> {
        if !self.is_recording() {
            return Err(PlaybackError::InvalidState {
                reason: format!("cannot stop recording while {}", self.state_name()),
            });
        }
        self.state = SessionState::Idle;
        self.target.prepare_target(TargetTask::Commit)?;
        info!(
            duration = self.target.duration(),
            bytes = self.target.memory_size(),
            "recording committed"
        );
        Ok(())
    }

    /// Drop everything recorded. A recording in progress continues from
    /// an empty target; playback stops since nothing is left to show.
    pub fn discard(&mut self) -> Result<(), PlaybackError> {
        self.target.prepare_target(TargetTask::Discard)?;
        match self.state {
            SessionState::Recording { elapsed, .. } => {
                // Objects already live still need a spawn record.
                for (_, object) in self.objects.iter_mut() {
                    if object.prefab_name().is_some() {
                        let data = object.initial_data(elapsed);
                        self.target.initial_state_buffer_mut().record(data);
                    }
                }
            }
            SessionState::Playback { .. } => self.stop_playback(),
            SessionState::Idle => {}
        }
        Ok(())
    }

    // ── Playback ────────────────────────────────────────────────

    /// Open the target for reading, notify every object, and show the
    /// first frame.
    pub fn begin_playback(&mut self) -> Result<(), PlaybackError> {
        self.require_idle("begin playback")?;
        self.target.prepare_target(TargetTask::PrepareRead)?;
        self.sequencer.reset();
        self.sequencer.set_time_scale(self.config.time_scale);
        self.state = SessionState::Playback { paused: false };
        info!(
            scene = %self.target.target_scene_name(),
            duration = self.target.duration(),
            "playback started"
        );
        self.dispatch("on_replay_start", |o| o.on_replay_start());
        let first = self
            .sequencer
            .seek_playback(&mut self.target, 0.0, SeekOrigin::Start, false)?;
        if let Some(frame) = first {
            self.show_frame(&frame);
        }
        self.dispatch_update();
        Ok(())
    }

    fn require_playback(&self, action: &str) -> Result<(), PlaybackError> {
        if !self.is_replaying() {
            return Err(PlaybackError::InvalidState {
                reason: format!("cannot {action} while {}", self.state_name()),
            });
        }
        Ok(())
    }

    /// Advance playback by `delta_time` seconds of wall-clock time.
    ///
    /// Paused sessions report [`SequenceResult::Idle`] without moving.
    /// [`SequenceResult::End`] means playback has stopped.
    pub fn update_playback(&mut self, delta_time: f32) -> Result<SequenceResult, PlaybackError> {
        self.require_playback("update playback")?;
        if self.is_paused() {
            return Ok(SequenceResult::Idle);
        }
        let (result, frame) =
            self.sequencer
                .update_playback(&mut self.target, self.config.end_behaviour, delta_time)?;
        match result {
            SequenceResult::End => {
                self.stop_playback();
                return Ok(SequenceResult::End);
            }
            SequenceResult::Advance => {
                if let Some(frame) = frame {
                    if self.sequencer.last().is_none() {
                        // First frame, or a loop seam.
                        self.dispatch("on_replay_reset", |o| o.on_replay_reset());
                    }
                    self.show_frame(&frame);
                }
            }
            SequenceResult::Idle => {}
        }
        self.dispatch_update();
        Ok(result)
    }

    /// Move the playhead. See [`PlaybackSequencer::seek_playback`] for
    /// how `offset`, `origin` and `normalized` combine. Returns the
    /// timestamp of the frame now shown, if any.
    pub fn seek(
        &mut self,
        offset: f32,
        origin: SeekOrigin,
        normalized: bool,
    ) -> Result<Option<f32>, PlaybackError> {
        self.require_playback("seek")?;
        let frame = self
            .sequencer
            .seek_playback(&mut self.target, offset, origin, normalized)?;
        self.dispatch("on_replay_reset", |o| o.on_replay_reset());
        let Some(frame) = frame else {
            return Ok(None);
        };
        self.show_frame(&frame);
        self.dispatch_update();
        Ok(Some(frame.timestamp()))
    }

    /// Suspend playback updates.
    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        self.require_playback("pause")?;
        self.state = SessionState::Playback { paused: true };
        Ok(())
    }

    /// Resume playback updates.
    pub fn resume(&mut self) -> Result<(), PlaybackError> {
        self.require_playback("resume")?;
        self.state = SessionState::Playback { paused: false };
        Ok(())
    }

    /// Change playback speed. Negative values play backwards.
    pub fn set_time_scale(&mut self, time_scale: f32) -> Result<(), PlaybackError> {
        validate_time_scale(time_scale)?;
        self.config.time_scale = time_scale;
        self.sequencer.set_time_scale(time_scale);
        Ok(())
    }

    /// End playback and notify every object. Objects stay as they are.
    /// No-op unless playback is active.
    pub fn stop_playback(&mut self) {
        if !self.is_replaying() {
            return;
        }
        self.state = SessionState::Idle;
        self.dispatch("on_replay_end", |o| o.on_replay_end());
        info!(time = self.sequencer.playback_time(), "playback stopped");
    }

    // ── Frame application ───────────────────────────────────────

    fn show_frame(&mut self, frame: &Arc<Snapshot>) {
        let report = reconcile(
            frame,
            self.target.initial_state_buffer(),
            &mut self.objects,
            &mut self.registry,
            self.instantiator.as_mut(),
        );
        for (id, event) in &report.events {
            self.dispatch_event(*id, event);
        }
        self.last_report = Some(report);
    }

    fn dispatch_event(&mut self, id: ObjectIdentity, event: &ReplayEvent) {
        let Some(object) = self.objects.get_mut(id) else {
            return;
        };
        if let Err(e) = object.on_replay_event(event) {
            log_behaviour_error(id, "on_replay_event", &e);
        }
    }

    fn dispatch_update(&mut self) {
        let fraction = self.sequencer.fraction();
        self.dispatch("on_replay_update", |o| o.on_replay_update(fraction));
    }

    fn dispatch(
        &mut self,
        callback: &'static str,
        mut f: impl FnMut(&mut dyn ReplayObject) -> Result<(), BehaviourError>,
    ) {
        for (id, object) in self.objects.iter_mut() {
            if let Err(e) = f(object) {
                log_behaviour_error(id, callback, &e);
            }
        }
    }
}

fn log_behaviour_error(id: ObjectIdentity, callback: &'static str, error: &BehaviourError) {
    warn!(identity = %id, callback, error = %error, "replay behaviour failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::PrefabRegistry;
    use crate::sequencer::EndBehaviour;
    use rewind_core::CodecError;
    use rewind_storage::{MemoryTarget, MemoryTargetConfig};

    /// Records a counter that increments every sample.
    struct Counter {
        id: ObjectIdentity,
        value: i32,
        fail_updates: bool,
    }

    impl Counter {
        fn new() -> Self {
            Self {
                id: ObjectIdentity::UNASSIGNED,
                value: 0,
                fail_updates: false,
            }
        }
    }

    impl crate::behaviour::ReplayBehaviour for Counter {
        fn on_replay_update(&mut self, _fraction: f32) -> Result<(), BehaviourError> {
            if self.fail_updates {
                return Err(BehaviourError::new("refusing updates"));
            }
            Ok(())
        }
    }

    impl ReplayObject for Counter {
        fn identity(&self) -> ObjectIdentity {
            self.id
        }
        fn set_identity(&mut self, identity: ObjectIdentity) {
            self.id = identity;
        }
        fn record_state(&mut self, state: &mut StateBuffer) -> Result<(), CodecError> {
            self.value += 1;
            state.write_i32(self.value);
            Ok(())
        }
        fn restore_state(&mut self, state: &mut StateBuffer) -> Result<(), CodecError> {
            self.value = state.read_i32()?;
            Ok(())
        }
    }

    fn session(config: SessionConfig) -> ReplaySession<MemoryTarget> {
        ReplaySession::new(
            MemoryTarget::new(MemoryTargetConfig::default()).unwrap(),
            Box::new(PrefabRegistry::new()),
            SessionConfig {
                record_fps: 4.0,
                identity_seed: Some(7),
                ..config
            },
        )
        .unwrap()
    }

    fn recorded(config: SessionConfig, object: Counter) -> ReplaySession<MemoryTarget> {
        let mut s = session(config);
        s.register(Box::new(object)).unwrap();
        s.begin_recording("lab").unwrap();
        s.update_recording(0.5).unwrap();
        s.stop_recording().unwrap();
        s
    }

    #[test]
    fn samples_follow_record_rate() {
        let mut s = session(SessionConfig::default());
        s.register(Box::new(Counter::new())).unwrap();
        s.begin_recording("lab").unwrap();
        assert_eq!(s.update_recording(0.5).unwrap(), 2);
        assert_eq!(s.update_recording(0.375).unwrap(), 1);
        assert_eq!(s.update_recording(0.0).unwrap(), 0);
        s.stop_recording().unwrap();
        assert_eq!(s.target().len(), 4);
        assert_eq!(s.target().duration(), 0.75);
    }

    #[test]
    fn wrong_state_calls_rejected() {
        let mut s = session(SessionConfig::default());
        assert!(matches!(
            s.update_recording(0.1),
            Err(PlaybackError::InvalidState { .. })
        ));
        assert!(matches!(
            s.update_playback(0.1),
            Err(PlaybackError::InvalidState { .. })
        ));
        s.begin_recording("lab").unwrap();
        assert!(matches!(
            s.begin_playback(),
            Err(PlaybackError::InvalidState { .. })
        ));
    }

    #[test]
    fn end_playback_stops_session() {
        let mut s = recorded(
            SessionConfig {
                end_behaviour: EndBehaviour::EndPlayback,
                ..Default::default()
            },
            Counter::new(),
        );
        s.begin_playback().unwrap();
        assert_eq!(s.update_playback(0.1).unwrap(), SequenceResult::Advance);
        assert_eq!(s.update_playback(1.0).unwrap(), SequenceResult::End);
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn paused_session_does_not_move() {
        let mut s = recorded(SessionConfig::default(), Counter::new());
        s.begin_playback().unwrap();
        s.pause().unwrap();
        assert!(s.is_paused());
        assert_eq!(s.update_playback(0.2).unwrap(), SequenceResult::Idle);
        assert_eq!(s.sequencer().playback_time(), 0.0);
        s.resume().unwrap();
        s.update_playback(0.2).unwrap();
        assert_eq!(s.sequencer().playback_time(), 0.2);
    }

    #[test]
    fn failing_behaviour_does_not_stop_playback() {
        let mut noisy = Counter::new();
        noisy.fail_updates = true;
        let mut s = recorded(SessionConfig::default(), noisy);
        s.begin_playback().unwrap();
        assert_eq!(s.update_playback(0.1).unwrap(), SequenceResult::Advance);
        assert!(s.is_replaying());
    }

    #[test]
    fn discard_during_playback_stops_it() {
        let mut s = recorded(SessionConfig::default(), Counter::new());
        s.begin_playback().unwrap();
        s.discard().unwrap();
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.target().duration(), 0.0);
    }

    #[test]
    fn invalid_time_scale_rejected() {
        let mut s = session(SessionConfig::default());
        assert!(matches!(
            s.set_time_scale(f32::NAN),
            Err(PlaybackError::Config(_))
        ));
        s.set_time_scale(-1.0).unwrap();
        assert_eq!(s.sequencer().time_scale(), -1.0);
    }
}
