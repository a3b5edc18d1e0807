//! Benchmarks for signature computation and batch ingestion.
//!
//! Ingestion runs against the in-process store, so these numbers are the
//! CPU side of the pipeline; a networked store adds round-trip latency
//! per band.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;

use vicinity_lsh::hash::{BandPartitioner, HyperplaneProjector};
use vicinity_lsh::{LshConfig, LshIndex};

fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.random::<f32>() - 0.5).collect())
        .collect()
}

fn bench_signature(c: &mut Criterion) {
    let mut group = c.benchmark_group("signature");
    let dim = 128;
    let vectors = random_vectors(1000, dim, 42);

    for num_perm in [64, 256, 1024].iter() {
        let projector = HyperplaneProjector::new(dim, *num_perm, 7).unwrap();
        let partitioner = BandPartitioner::new(*num_perm, 4).unwrap();
        group.throughput(Throughput::Elements(vectors.len() as u64));

        group.bench_with_input(BenchmarkId::new("num_perm", num_perm), num_perm, |bench, _| {
            bench.iter(|| {
                vectors
                    .iter()
                    .map(|v| {
                        let sig = projector.compute_signature(black_box(v)).unwrap();
                        partitioner.band_hashes(&sig)
                    })
                    .collect::<Vec<_>>()
            });
        });
    }

    group.finish();
}

fn bench_index_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_batch");
    group.sample_size(10);
    let dim = 128;

    for n in [1000, 10000].iter() {
        let vectors = random_vectors(*n, dim, 42);
        let ids: Vec<u64> = (0..*n as u64).collect();
        group.throughput(Throughput::Elements(*n as u64));

        group.bench_with_input(BenchmarkId::from_parameter(n), n, |bench, _| {
            bench.iter(|| {
                let config = LshConfig::new(dim)
                    .with_bands(256, 4)
                    .with_namespace("bench")
                    .with_seed(7);
                let index = LshIndex::in_memory(config).unwrap();
                index.index(black_box(&ids), black_box(&vectors)).unwrap()
            });
        });
    }

    group.finish();
}

fn bench_reindex(c: &mut Criterion) {
    let mut group = c.benchmark_group("reindex");
    group.sample_size(10);
    let dim = 128;
    let n = 5000;

    let first = random_vectors(n, dim, 42);
    let second = random_vectors(n, dim, 43);
    let ids: Vec<u64> = (0..n as u64).collect();
    let config = LshConfig::new(dim)
        .with_bands(256, 4)
        .with_namespace("bench")
        .with_seed(7);
    let index = LshIndex::in_memory(config).unwrap();
    index.index(&ids, &first).unwrap();

    group.throughput(Throughput::Elements(n as u64));
    let mut flip = false;
    group.bench_function("replace_all", |bench| {
        bench.iter(|| {
            flip = !flip;
            let batch = if flip { &second } else { &first };
            index.index(black_box(&ids), batch).unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_signature, bench_index_batch, bench_reindex);
criterion_main!(benches);
