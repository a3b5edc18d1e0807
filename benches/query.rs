//! Benchmarks for top-k queries.
//!
//! Measures how band width trades candidate count against query latency on
//! a fixed 10k-vector index.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;

use vicinity_lsh::distance::normalize;
use vicinity_lsh::{LshConfig, LshIndex, MemoryStore};

fn normalized_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let v: Vec<f32> = (0..dim).map(|_| rng.random::<f32>() - 0.5).collect();
            normalize(&v)
        })
        .collect()
}

fn build(rows_per_band: usize, vectors: &[Vec<f32>]) -> LshIndex<MemoryStore> {
    let config = LshConfig::new(vectors[0].len())
        .with_bands(256, rows_per_band)
        .with_namespace("bench")
        .with_seed(7);
    let index = LshIndex::in_memory(config).unwrap();
    let ids: Vec<u64> = (0..vectors.len() as u64).collect();
    index.index(&ids, vectors).unwrap();
    index
}

fn bench_query_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_rows_per_band");

    let dim = 128;
    let n_queries = 100;
    let vectors = normalized_vectors(10000, dim, 42);
    let queries = normalized_vectors(n_queries, dim, 123);

    for rows in [4, 8, 16].iter() {
        let index = build(*rows, &vectors);
        group.throughput(Throughput::Elements(n_queries as u64));

        group.bench_with_input(BenchmarkId::new("rows", rows), rows, |bench, _| {
            bench.iter(|| {
                queries
                    .iter()
                    .map(|q| index.get_top_k(black_box(q), 10).unwrap())
                    .collect::<Vec<_>>()
            });
        });
    }

    group.finish();
}

fn bench_query_k(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_k");

    let dim = 128;
    let n_queries = 100;
    let vectors = normalized_vectors(10000, dim, 42);
    let queries = normalized_vectors(n_queries, dim, 123);
    let index = build(8, &vectors);

    for k in [1, 10, 100].iter() {
        group.throughput(Throughput::Elements(n_queries as u64));

        group.bench_with_input(BenchmarkId::new("k", k), k, |bench, &k| {
            bench.iter(|| {
                queries
                    .iter()
                    .map(|q| index.get_top_k(black_box(q), k).unwrap())
                    .collect::<Vec<_>>()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_query_rows, bench_query_k);
criterion_main!(benches);
