//! Criterion benchmarks for snapshot blob encoding and decoding.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use fdtd_core::NearFieldSnapshots;
use fdtd_store::codec;
use ndarray::{ArrayD, IxDyn};

/// `wavelengths` snapshots of an `n` x `n` plane of 3-vectors.
fn snapshots(n: usize, wavelengths: usize) -> NearFieldSnapshots {
    let mut snapshots = NearFieldSnapshots::new();
    for w in 0..wavelengths {
        let field = ArrayD::from_shape_fn(IxDyn(&[n, n, 1, 3]), |idx| {
            (idx[0] * n + idx[1]) as f32 * 0.01 + idx[3] as f32
        });
        snapshots.insert(10.0, 500.0 + w as f32 * 25.0, field);
    }
    snapshots
}

fn bench_snapshots(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshots");
    for n in [16, 64, 128] {
        let data = snapshots(n, 6);
        let bytes = codec::encode_snapshots(Some(&data))
            .unwrap()
            .unwrap_or_default();

        group.bench_with_input(BenchmarkId::new("encode", n), &data, |b, data| {
            b.iter(|| codec::encode_snapshots(Some(data)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("decode", n), &bytes, |b, bytes| {
            b.iter(|| codec::decode_snapshots(Some(bytes.as_slice())).unwrap())
        });
    }
    group.finish();
}

fn bench_vector(c: &mut Criterion) {
    let spectrum: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.01).sin()).collect();
    c.bench_function("vector/encode_1000", |b| {
        b.iter(|| codec::encode_vector(Some(spectrum.as_slice())).unwrap())
    });
}

criterion_group!(benches, bench_snapshots, bench_vector);
criterion_main!(benches);
