//! Criterion benchmarks for storage targets: recording throughput and
//! sequential restores.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use rewind_bench::{make_recording, record_into, reference_profile, PROFILE_FPS};
use rewind_storage::{FileTarget, FileTargetConfig, MemoryTarget, StorageTarget, TargetTask};
use tempfile::TempDir;

/// Benchmark: record and commit the reference profile in memory.
fn bench_memory_record(c: &mut Criterion) {
    let frames = make_recording(&reference_profile(), 3);

    c.bench_function("memory_record_reference", |b| {
        b.iter(|| {
            let mut target = MemoryTarget::default();
            record_into(&mut target, &frames).unwrap();
            black_box(target.len());
        });
    });
}

/// Benchmark: restore every frame of a memory recording in order.
fn bench_memory_restore(c: &mut Criterion) {
    let frames = make_recording(&reference_profile(), 4);
    let mut target = MemoryTarget::default();
    record_into(&mut target, &frames).unwrap();
    target.prepare_target(TargetTask::PrepareRead).unwrap();

    c.bench_function("memory_restore_sequential", |b| {
        b.iter(|| {
            for i in 0..frames.len() {
                black_box(target.restore_snapshot(i as f32 / PROFILE_FPS).unwrap());
            }
        });
    });
}

/// Benchmark: write and commit the reference profile to a replay file.
fn bench_file_record(c: &mut Criterion) {
    let frames = make_recording(&reference_profile(), 5);
    let dir = TempDir::new().unwrap();

    c.bench_function("file_record_reference", |b| {
        b.iter_batched(
            || FileTarget::new(FileTargetConfig::new(dir.path().join("record.replay"))).unwrap(),
            |mut target| {
                record_into(&mut target, &frames).unwrap();
                target
            },
            BatchSize::PerIteration,
        );
    });
}

/// Benchmark: replay a file front to back, with read-ahead.
fn bench_file_restore(c: &mut Criterion) {
    let frames = make_recording(&reference_profile(), 6);
    let dir = TempDir::new().unwrap();
    let mut target = FileTarget::new(FileTargetConfig::new(dir.path().join("restore.replay"))).unwrap();
    record_into(&mut target, &frames).unwrap();
    target.prepare_target(TargetTask::PrepareRead).unwrap();

    c.bench_function("file_restore_sequential", |b| {
        b.iter(|| {
            for i in 0..frames.len() {
                black_box(target.restore_snapshot(i as f32 / PROFILE_FPS).unwrap());
            }
        });
    });
}

criterion_group!(
    benches,
    bench_memory_record,
    bench_memory_restore,
    bench_file_record,
    bench_file_restore,
);
criterion_main!(benches);
