//! Criterion micro-benchmarks for state buffers and snapshot encoding.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use rewind_bench::{make_recording, reference_profile, stress_profile};
use rewind_core::{Compression, Snapshot, StateBuffer};
use rewind_storage::{MemoryTarget, StorageTarget};

/// Benchmark: write a typical transform-sized state.
fn bench_state_buffer_writes(c: &mut Criterion) {
    c.bench_function("state_buffer_write_transform", |b| {
        b.iter(|| {
            let mut buf = StateBuffer::with_capacity(64);
            for i in 0..3 {
                buf.write_f32(black_box(i as f32));
            }
            for _ in 0..3 {
                buf.write_low_precision(black_box(1.25));
            }
            buf.write_bool(true);
            black_box(&buf);
        });
    });
}

/// Benchmark: encode one 1024-object frame.
fn bench_snapshot_encode(c: &mut Criterion) {
    let frame = make_recording(&stress_profile(), 1).remove(0);

    c.bench_function("snapshot_encode_1024", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(frame.encoded_len());
            frame.encode(&mut out).unwrap();
            black_box(&out);
        });
    });
}

/// Benchmark: decode the same frame.
fn bench_snapshot_decode(c: &mut Criterion) {
    let frame = make_recording(&stress_profile(), 1).remove(0);
    let mut encoded = Vec::with_capacity(frame.encoded_len());
    frame.encode(&mut encoded).unwrap();

    c.bench_function("snapshot_decode_1024", |b| {
        b.iter(|| {
            let mut cursor = encoded.as_slice();
            let decoded = Snapshot::decode(&mut cursor).unwrap();
            black_box(&decoded);
        });
    });
}

/// Benchmark: export the reference recording, raw and gzip.
fn bench_memory_export(c: &mut Criterion) {
    let mut target = MemoryTarget::default();
    rewind_bench::record_into(&mut target, &make_recording(&reference_profile(), 2)).unwrap();
    assert!(target.duration() > 0.0);

    let mut group = c.benchmark_group("memory_export");
    for compression in [Compression::None, Compression::Gzip] {
        group.bench_function(format!("{compression:?}"), |b| {
            b.iter(|| black_box(target.export(compression).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_state_buffer_writes,
    bench_snapshot_encode,
    bench_snapshot_decode,
    bench_memory_export,
);
criterion_main!(benches);
