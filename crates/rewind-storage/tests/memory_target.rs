//! Integration test: memory targets through the full record, commit and
//! replay lifecycle, plus export and import of a finished recording.

use rewind_core::{Compression, InitialData, ObjectIdentity};
use rewind_storage::{
    MemoryTarget, MemoryTargetConfig, MultichannelConfig, MultichannelMemoryTarget,
    StorageError, StorageTarget, TargetTask,
};
use rewind_test_utils::snapshot_at;

fn record(target: &mut dyn StorageTarget, timestamps: &[f32]) {
    target
        .prepare_target(TargetTask::PrepareWrite {
            scene_name: "arena".into(),
        })
        .unwrap();
    for &ts in timestamps {
        target.record_snapshot(snapshot_at(ts)).unwrap();
    }
    target.prepare_target(TargetTask::Commit).unwrap();
    target.prepare_target(TargetTask::PrepareRead).unwrap();
}

fn restored_ts(target: &mut dyn StorageTarget, offset: f32) -> Option<f32> {
    target
        .restore_snapshot(offset)
        .unwrap()
        .map(|s| s.timestamp())
}

// ── Single channel ───────────────────────────────────────────────

#[test]
fn restore_rounds_up_to_next_frame() {
    let mut target = MemoryTarget::default();
    record(&mut target, &[0.0, 0.1, 0.2]);

    assert_eq!(target.duration(), 0.2);
    assert_eq!(restored_ts(&mut target, 0.05), Some(0.1));
    assert_eq!(restored_ts(&mut target, 0.0), Some(0.0));
    assert_eq!(restored_ts(&mut target, 0.2), Some(0.2));
    assert_eq!(target.target_scene_name(), "arena");
}

#[test]
fn offset_past_duration_restores_nothing() {
    let mut target = MemoryTarget::default();
    record(&mut target, &[0.0, 0.5, 1.0]);
    assert_eq!(restored_ts(&mut target, 1.5), None);
    assert_eq!(restored_ts(&mut target, f32::NAN), None);
}

#[test]
fn empty_recording_restores_nothing() {
    let mut target = MemoryTarget::default();
    record(&mut target, &[]);
    assert_eq!(target.duration(), 0.0);
    assert_eq!(restored_ts(&mut target, 0.0), None);
}

#[test]
fn commit_rebases_late_start() {
    let mut target = MemoryTarget::default();
    target
        .prepare_target(TargetTask::PrepareWrite {
            scene_name: "arena".into(),
        })
        .unwrap();
    target
        .initial_state_buffer_mut()
        .record(InitialData::new(ObjectIdentity(7), 5.5));
    for ts in [5.0, 5.5, 6.0] {
        target.record_snapshot(snapshot_at(ts)).unwrap();
    }
    target.prepare_target(TargetTask::Commit).unwrap();

    assert_eq!(target.duration(), 1.0);
    assert_eq!(restored_ts(&mut target, 0.0), Some(0.0));
    assert_eq!(restored_ts(&mut target, 1.0), Some(1.0));
    let spawn = target
        .initial_state_buffer()
        .nearest(ObjectIdentity(7), 1.0)
        .unwrap();
    assert_eq!(spawn.timestamp, 0.5);
}

#[test]
fn rolling_window_drops_old_frames() {
    let mut target = MemoryTarget::new(MemoryTargetConfig { record_window: 1.0 }).unwrap();
    target
        .prepare_target(TargetTask::PrepareWrite {
            scene_name: String::new(),
        })
        .unwrap();
    for i in 0..20 {
        target.record_snapshot(snapshot_at(i as f32 * 0.5)).unwrap();
    }
    // Window plus margin keeps well under the full 9.5 s.
    assert!(target.duration() < 2.0);
    assert!(target.len() < 20);
}

#[test]
fn export_import_preserves_recording() {
    let mut original = MemoryTarget::default();
    original
        .prepare_target(TargetTask::PrepareWrite {
            scene_name: "harbour".into(),
        })
        .unwrap();
    original
        .initial_state_buffer_mut()
        .record(InitialData::new(ObjectIdentity(3), 0.25));
    for ts in [0.0, 0.25, 0.5, 0.75] {
        original.record_snapshot(snapshot_at(ts)).unwrap();
    }
    original.prepare_target(TargetTask::Commit).unwrap();

    for compression in [Compression::None, Compression::Gzip] {
        let bytes = original.export(compression).unwrap();
        let mut copy = MemoryTarget::import(&bytes, MemoryTargetConfig::default()).unwrap();
        assert_eq!(copy.len(), 4);
        assert_eq!(copy.target_scene_name(), "harbour");
        assert_eq!(copy.duration(), 0.75);
        assert!(copy.initial_state_buffer().contains(ObjectIdentity(3)));
        copy.prepare_target(TargetTask::PrepareRead).unwrap();
        let frame = copy.restore_snapshot(0.3).unwrap().unwrap();
        assert_eq!(frame.timestamp(), 0.5);
        assert_eq!(
            frame.state(ObjectIdentity(1)).unwrap().as_bytes(),
            0.5f32.to_le_bytes()
        );
    }
}

#[test]
fn memory_targets_read_without_prepare_read() {
    let mut target = MemoryTarget::default();
    assert_eq!(restored_ts(&mut target, 0.0), None);
    target
        .prepare_target(TargetTask::PrepareWrite {
            scene_name: "dock".into(),
        })
        .unwrap();
    target.record_snapshot(snapshot_at(2.0)).unwrap();
    target.record_snapshot(snapshot_at(2.5)).unwrap();
    assert_eq!(restored_ts(&mut target, 0.1), Some(2.5));
    target.prepare_target(TargetTask::Commit).unwrap();
    assert_eq!(restored_ts(&mut target, 0.1), Some(0.5));

    let bytes = target.export(Compression::None).unwrap();
    let mut copy = MemoryTarget::import(&bytes, MemoryTargetConfig::default()).unwrap();
    assert_eq!(restored_ts(&mut copy, 0.0), Some(0.0));
}

#[test]
fn import_rejects_garbage() {
    let err = MemoryTarget::import(&[1, 2, 3, 4, 5, 6, 7, 8], MemoryTargetConfig::default())
        .unwrap_err();
    assert!(matches!(err, StorageError::Codec(_)));
}

// ── Multichannel ────────────────────────────────────────────────

#[test]
fn channels_are_isolated() {
    let mut target = MultichannelMemoryTarget::new(MultichannelConfig {
        channels: 2,
        ..MultichannelConfig::default()
    })
    .unwrap();

    record(&mut target, &[0.0, 1.0, 2.0]);
    target.set_active_channel(1).unwrap();
    record(&mut target, &[0.0, 0.5]);

    assert_eq!(target.duration(), 0.5);
    assert_eq!(restored_ts(&mut target, 0.1), Some(0.5));

    target.set_active_channel(0).unwrap();
    assert_eq!(target.duration(), 2.0);
    assert_eq!(restored_ts(&mut target, 0.1), Some(1.0));
    assert_eq!(target.channel(1).unwrap().len(), 2);
}

#[test]
fn channel_layout_frozen_while_recording() {
    let mut target = MultichannelMemoryTarget::new(MultichannelConfig {
        channels: 3,
        ..MultichannelConfig::default()
    })
    .unwrap();
    target
        .prepare_target(TargetTask::PrepareWrite {
            scene_name: String::new(),
        })
        .unwrap();

    assert!(matches!(
        target.set_active_channel(1),
        Err(StorageError::InvalidOperation { .. })
    ));
    assert!(target.add_channel().is_err());
    assert!(target.remove_channel(2).is_err());
    assert!(target.set_number_of_channels(1).is_err());

    target.prepare_target(TargetTask::Commit).unwrap();
    target.set_active_channel(2).unwrap();
    target.set_number_of_channels(2).unwrap();
    assert_eq!(target.active_channel(), 0);
    assert_eq!(target.channel_count(), 2);
}

#[test]
fn last_channel_cannot_be_removed() {
    let mut target = MultichannelMemoryTarget::new(MultichannelConfig::default()).unwrap();
    assert!(target.remove_channel(0).is_err());
    let added = target.add_channel().unwrap();
    assert_eq!(added, 1);
    target.set_active_channel(1).unwrap();
    target.remove_channel(0).unwrap();
    assert_eq!(target.active_channel(), 0);
    assert_eq!(target.channel_count(), 1);
}
