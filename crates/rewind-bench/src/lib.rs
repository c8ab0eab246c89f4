//! Recording profiles for benchmarking Rewind.
//!
//! - [`reference_profile`]: 64 objects, 16 bytes each, 10 s at 16 fps
//! - [`stress_profile`]: 1024 objects, 48 bytes each, 60 s at 16 fps
//! - [`make_recording`]: the generator behind both, seeded for
//!   reproducible payloads

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rewind_core::{ObjectIdentity, Snapshot, StateBuffer};
use rewind_storage::{StorageError, StorageTarget, TargetTask};

/// Sampling rate shared by the built-in profiles.
pub const PROFILE_FPS: f32 = 16.0;

/// Shape of a generated recording.
#[derive(Clone, Copy, Debug)]
pub struct RecordingProfile {
    /// Objects present in every frame.
    pub objects: usize,
    /// Payload bytes per object per frame.
    pub payload_len: usize,
    /// Number of frames.
    pub frames: usize,
}

/// 64 objects × 16 bytes, 160 frames.
pub fn reference_profile() -> RecordingProfile {
    RecordingProfile {
        objects: 64,
        payload_len: 16,
        frames: 160,
    }
}

/// 1024 objects × 48 bytes, 960 frames.
pub fn stress_profile() -> RecordingProfile {
    RecordingProfile {
        objects: 1024,
        payload_len: 48,
        frames: 960,
    }
}

/// One frame of `profile` at `timestamp` with random payloads.
pub fn make_snapshot(profile: &RecordingProfile, timestamp: f32, rng: &mut ChaCha8Rng) -> Snapshot {
    let mut snapshot = Snapshot::new(timestamp);
    let mut payload = vec![0u8; profile.payload_len];
    for i in 0..profile.objects {
        rng.fill(payload.as_mut_slice());
        // Identity 0 is the unassigned sentinel.
        let id = ObjectIdentity((i + 1) as i16);
        snapshot.record_state(id, StateBuffer::from_bytes(payload.clone()));
    }
    snapshot
}

/// Every frame of `profile`, spaced at [`PROFILE_FPS`].
pub fn make_recording(profile: &RecordingProfile, seed: u64) -> Vec<Snapshot> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..profile.frames)
        .map(|frame| make_snapshot(profile, frame as f32 / PROFILE_FPS, &mut rng))
        .collect()
}

/// Record `frames` into `target` from `PrepareWrite` through `Commit`.
pub fn record_into(
    target: &mut dyn StorageTarget,
    frames: &[Snapshot],
) -> Result<(), StorageError> {
    target.prepare_target(TargetTask::PrepareWrite {
        scene_name: "bench".into(),
    })?;
    for frame in frames {
        target.record_snapshot(frame.clone())?;
    }
    target.prepare_target(TargetTask::Commit)
}
