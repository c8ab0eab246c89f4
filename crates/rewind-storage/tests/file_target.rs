//! Integration test: chunked replay files written and read back through
//! the background worker.

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use rewind_core::{CodecError, InitialData, ObjectIdentity};
use rewind_storage::file::{ChunkTable, FileHeader};
use rewind_storage::{FileTarget, FileTargetConfig, StorageError, StorageTarget, TargetTask};
use rewind_test_utils::snapshot_at;
use tempfile::TempDir;

fn config(dir: &TempDir, chunk_size: usize) -> FileTargetConfig {
    FileTargetConfig {
        chunk_size,
        cache_capacity: 2,
        task_timeout: Some(Duration::from_secs(10)),
        ..FileTargetConfig::new(dir.path().join("session.replay"))
    }
}

fn write(target: &mut FileTarget, timestamps: &[f32]) {
    target
        .prepare_target(TargetTask::PrepareWrite {
            scene_name: "docks".into(),
        })
        .unwrap();
    for &ts in timestamps {
        target.record_snapshot(snapshot_at(ts)).unwrap();
    }
    target.prepare_target(TargetTask::Commit).unwrap();
}

fn restored_ts(target: &mut FileTarget, offset: f32) -> Option<f32> {
    target
        .restore_snapshot(offset)
        .unwrap()
        .map(|s| s.timestamp())
}

/// Wait for the worker to land a read-ahead chunk in the cache.
fn wait_for_cached(target: &FileTarget, chunk_id: u32) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if target.cached_chunk_ids().contains(&chunk_id) {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Overwrite the start time stored for chunk `id` in a committed file's
/// chunk table, leaving the chunk itself alone.
fn rewrite_table_start(path: &Path, id: u32, start: f32) {
    let mut file = OpenOptions::new().read(true).write(true).open(path).unwrap();
    let header = FileHeader::decode(&mut file).unwrap();
    file.seek(SeekFrom::Start(header.chunk_table_offset)).unwrap();
    let stored = ChunkTable::decode(&mut file).unwrap();

    let mut table = ChunkTable::new();
    for mut entry in stored.entries().iter().copied() {
        if entry.id == id {
            entry.start = start;
        }
        table.insert(entry);
    }
    let mut bytes = Vec::new();
    table.encode(&mut bytes).unwrap();
    file.seek(SeekFrom::Start(header.chunk_table_offset)).unwrap();
    file.write_all(&bytes).unwrap();
}

#[test]
fn write_then_read_back() {
    let dir = TempDir::new().unwrap();
    let mut target = FileTarget::new(config(&dir, 2)).unwrap();
    write(&mut target, &[0.0, 1.0, 2.0, 3.0, 4.0]);

    target.prepare_target(TargetTask::PrepareRead).unwrap();
    assert_eq!(target.duration(), 4.0);
    assert_eq!(target.target_scene_name(), "docks");

    let ids: Vec<u32> = target.chunk_table().iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![0, 1, 2]);

    assert_eq!(restored_ts(&mut target, 3.5), Some(4.0));
    assert_eq!(restored_ts(&mut target, 0.0), Some(0.0));
    assert_eq!(restored_ts(&mut target, 1.5), Some(2.0));
    assert_eq!(restored_ts(&mut target, 4.5), None);

    let frame = target.restore_snapshot(2.5).unwrap().unwrap();
    assert_eq!(
        frame.state(ObjectIdentity(1)).unwrap().as_bytes(),
        3.0f32.to_le_bytes()
    );
}

#[test]
fn a_second_target_reads_the_committed_file() {
    let dir = TempDir::new().unwrap();
    {
        let mut writer = FileTarget::new(config(&dir, 3)).unwrap();
        writer
            .prepare_target(TargetTask::PrepareWrite {
                scene_name: "docks".into(),
            })
            .unwrap();
        writer
            .initial_state_buffer_mut()
            .record(InitialData::new(ObjectIdentity(9), 2.0));
        for i in 0..10 {
            writer.record_snapshot(snapshot_at(i as f32 * 0.5)).unwrap();
        }
        writer.prepare_target(TargetTask::Commit).unwrap();
    }

    let mut reader = FileTarget::new(config(&dir, 3)).unwrap();
    reader.prepare_target(TargetTask::PrepareRead).unwrap();
    assert_eq!(reader.duration(), 4.5);
    assert_eq!(reader.chunk_table().len(), 4);
    assert!(reader.initial_state_buffer().contains(ObjectIdentity(9)));
    assert_eq!(restored_ts(&mut reader, 4.5), Some(4.5));
}

#[test]
fn commit_rebases_to_zero() {
    let dir = TempDir::new().unwrap();
    let mut target = FileTarget::new(config(&dir, 2)).unwrap();
    write(&mut target, &[10.0, 11.0, 12.0, 13.0]);

    target.prepare_target(TargetTask::PrepareRead).unwrap();
    assert_eq!(target.duration(), 3.0);
    let table = target.chunk_table();
    assert_eq!(table[0].start, 0.0);
    assert_eq!(table[1].end, 3.0);
    assert_eq!(restored_ts(&mut target, 0.0), Some(0.0));
    assert_eq!(restored_ts(&mut target, 2.5), Some(3.0));
}

#[test]
fn restore_while_recording() {
    let dir = TempDir::new().unwrap();
    let mut target = FileTarget::new(config(&dir, 2)).unwrap();
    target
        .prepare_target(TargetTask::PrepareWrite {
            scene_name: String::new(),
        })
        .unwrap();
    for ts in [1.0, 2.0, 3.0, 4.0, 5.0] {
        target.record_snapshot(snapshot_at(ts)).unwrap();
    }
    assert!(target.is_recording());
    assert_eq!(target.duration(), 4.0);
    // Offsets are relative to the first recorded frame.
    assert_eq!(restored_ts(&mut target, 0.5), Some(2.0));
    assert_eq!(restored_ts(&mut target, 4.0), Some(5.0));
    assert_eq!(restored_ts(&mut target, 5.0), None);
}

#[test]
fn read_ahead_and_eviction_follow_playhead() {
    let dir = TempDir::new().unwrap();
    let mut target = FileTarget::new(config(&dir, 2)).unwrap();
    write(&mut target, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    target.prepare_target(TargetTask::PrepareRead).unwrap();

    assert_eq!(restored_ts(&mut target, 0.0), Some(0.0));
    assert!(wait_for_cached(&target, 1), "next chunk was not read ahead");

    assert_eq!(restored_ts(&mut target, 2.0), Some(2.0));
    assert!(!target.cached_chunk_ids().contains(&0));
    assert!(wait_for_cached(&target, 2), "read-ahead did not advance");

    // Turning around reads ahead backwards.
    assert_eq!(restored_ts(&mut target, 6.5), Some(7.0));
    assert_eq!(restored_ts(&mut target, 5.0), Some(5.0));
    assert!(wait_for_cached(&target, 1), "backward read-ahead missing");
}

#[test]
fn discard_while_recording_starts_over() {
    let dir = TempDir::new().unwrap();
    let mut target = FileTarget::new(config(&dir, 2)).unwrap();
    target
        .prepare_target(TargetTask::PrepareWrite {
            scene_name: String::new(),
        })
        .unwrap();
    for ts in [0.0, 1.0, 2.0] {
        target.record_snapshot(snapshot_at(ts)).unwrap();
    }
    target.prepare_target(TargetTask::Discard).unwrap();
    assert!(target.is_recording());
    assert_eq!(target.duration(), 0.0);

    for ts in [5.0, 6.0] {
        target.record_snapshot(snapshot_at(ts)).unwrap();
    }
    target.prepare_target(TargetTask::Commit).unwrap();
    target.prepare_target(TargetTask::PrepareRead).unwrap();
    assert_eq!(target.duration(), 1.0);
    assert_eq!(target.chunk_table().len(), 1);
}

#[test]
fn reading_a_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    let mut target = FileTarget::new(config(&dir, 2)).unwrap();
    assert!(target.prepare_target(TargetTask::PrepareRead).is_err());
}

#[test]
fn wrong_magic_fails_prepare_read() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir, 2);
    let mut bytes = 0x1234i32.to_le_bytes().to_vec();
    bytes.extend_from_slice(&[0; 60]);
    fs::write(&cfg.path, bytes).unwrap();

    let mut target = FileTarget::new(cfg).unwrap();
    let err = target.prepare_target(TargetTask::PrepareRead).unwrap_err();
    assert!(matches!(
        err,
        StorageError::Codec(CodecError::InvalidMagic { found: 0x1234 })
    ));
    assert!(!target.is_faulted());
    assert!(matches!(
        target.restore_snapshot(0.0),
        Err(StorageError::NotPrepared { .. })
    ));
}

#[test]
fn chunk_table_mismatch_plays_the_chunk_as_read() {
    let dir = TempDir::new().unwrap();
    {
        let mut writer = FileTarget::new(config(&dir, 2)).unwrap();
        write(&mut writer, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }
    let cfg = config(&dir, 2);
    rewrite_table_start(&cfg.path, 1, 1.5);

    let mut reader = FileTarget::new(cfg).unwrap();
    reader.prepare_target(TargetTask::PrepareRead).unwrap();
    assert_eq!(reader.chunk_table()[1].start, 1.5);

    assert_eq!(restored_ts(&mut reader, 1.5), Some(2.0));
    let frame = reader.restore_snapshot(2.5).unwrap().unwrap();
    assert_eq!(frame.timestamp(), 3.0);
    assert_eq!(
        frame.state(ObjectIdentity(1)).unwrap().as_bytes(),
        3.0f32.to_le_bytes()
    );
    assert_eq!(restored_ts(&mut reader, 5.0), Some(5.0));
}

#[test]
fn invalid_config_rejected() {
    let dir = TempDir::new().unwrap();
    let err = FileTarget::new(config(&dir, 0)).unwrap_err();
    assert!(matches!(err, StorageError::Config(_)));
}
