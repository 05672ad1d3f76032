//! Benchmarks for GF(256) Reed-Solomon coding
//!
//! Run with: cargo bench --package nebula-core --bench erasure_coding

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nebula_core::erasure::{ErasureCodec, ShardData};
use std::collections::BTreeMap;

/// Generate test data of specified size
fn generate_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

fn keep<'a>(shards: &'a [ShardData], missing: &[usize]) -> BTreeMap<usize, &'a [u8]> {
    shards
        .iter()
        .filter(|s| !missing.contains(&s.index))
        .map(|s| (s.index, s.data.as_ref()))
        .collect()
}

/// Benchmark encoding at various data sizes
fn bench_encode(c: &mut Criterion) {
    let codec = ErasureCodec::with_shards(10, 4).unwrap();

    let mut group = c.benchmark_group("erasure_encode");

    for size in [
        1024 * 1024,      // 1 MB
        4 * 1024 * 1024,  // 4 MB
        16 * 1024 * 1024, // 16 MB
    ] {
        let data = generate_data(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::new("sequential", format!("{}MB", size / (1024 * 1024))),
            &data,
            |b, data| b.iter(|| codec.encode(black_box(data))),
        );
        group.bench_with_input(
            BenchmarkId::new("parallel", format!("{}MB", size / (1024 * 1024))),
            &data,
            |b, data| b.iter(|| codec.encode_parallel(black_box(data))),
        );
    }

    group.finish();
}

/// Benchmark decoding with various numbers of missing shards
fn bench_decode(c: &mut Criterion) {
    let codec = ErasureCodec::with_shards(10, 4).unwrap();
    let data = generate_data(10 * 1024 * 1024); // 10 MB
    let original_size = data.len();
    let shards = codec.encode(&data);

    let mut group = c.benchmark_group("erasure_decode");
    group.throughput(Throughput::Bytes(original_size as u64));

    for (name, missing) in [
        ("0_missing", &[][..]),
        ("2_missing", &[0, 7][..]),
        ("4_missing", &[0, 3, 10, 13][..]),
    ] {
        let available = keep(&shards, missing);
        group.bench_function(name, |b| {
            b.iter(|| codec.decode(black_box(&available), original_size))
        });
    }

    // matrix path with every data shard present
    let available = keep(&shards, &[]);
    group.bench_function("0_missing_matrix", |b| {
        b.iter(|| codec.decode_with_matrix(black_box(&available), original_size))
    });

    group.finish();
}

/// Sequential vs parallel recovery rows
fn bench_decode_threshold(c: &mut Criterion) {
    let data = generate_data(10 * 1024 * 1024);
    let sequential = ErasureCodec::with_shards(10, 4)
        .unwrap()
        .with_parallel_threshold(usize::MAX);
    let parallel = ErasureCodec::with_shards(10, 4)
        .unwrap()
        .with_parallel_threshold(0);
    let shards = sequential.encode(&data);
    let available = keep(&shards, &[0, 3, 10, 13]);

    let mut group = c.benchmark_group("decode_seq_vs_parallel_10MB");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("sequential", |b| {
        b.iter(|| sequential.decode(black_box(&available), data.len()))
    });
    group.bench_function("parallel", |b| {
        b.iter(|| parallel.decode(black_box(&available), data.len()))
    });

    group.finish();
}

/// Benchmark parity verification
fn bench_verify(c: &mut Criterion) {
    let codec = ErasureCodec::with_shards(10, 4).unwrap();
    let data = generate_data(10 * 1024 * 1024); // 10 MB
    let shards = codec.encode(&data);

    c.bench_function("verify_parity_10MB", |b| {
        b.iter(|| codec.verify_parity(black_box(&shards)))
    });
}

/// Encoding matrix construction (includes one k x k inversion)
fn bench_codec_setup(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_setup");
    for (k, m) in [(3, 2), (10, 4), (32, 16), (128, 64)] {
        group.bench_function(format!("{k}+{m}"), |b| {
            b.iter(|| ErasureCodec::with_shards(black_box(k), black_box(m)))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_decode_threshold,
    bench_verify,
    bench_codec_setup,
);
criterion_main!(benches);
