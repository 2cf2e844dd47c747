//! Batch dispatch benchmark for `spfresh-core`.
#![allow(clippy::cast_precision_loss, clippy::unreadable_literal)]
//!
//! Run with: `cargo bench --bench dispatch_benchmark`
//!
//! Measures how insert and search batches scale with the worker count.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use spfresh_core::{FreshIndex, InMemoryEngine, ParallelDispatcher, VectorValueType};

/// Generate a deterministic flat matrix
fn generate_matrix(dim: usize, rows: usize, seed: u64) -> Vec<f32> {
    let mut state = seed;
    (0..dim * rows)
        .map(|_| {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            let val = ((state >> 16) & 0x7FFF) as f32 / 32768.0;
            val * 2.0 - 1.0
        })
        .collect()
}

/// Raw dispatcher overhead on a trivial closure
fn bench_dispatch_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_overhead");

    for &workers in &[1, 4, 8] {
        group.bench_function(BenchmarkId::new("10k_items", workers), |b| {
            let dispatcher = ParallelDispatcher::new(workers);
            b.iter(|| black_box(dispatcher.run(10_000, |j| j.wrapping_mul(31))));
        });
    }

    group.finish();
}

/// Search batch: 100 queries over 10k vectors
fn bench_search_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_scaling");
    group.sample_size(10);

    let dim = 64;
    let n = 10_000;
    let dir = tempfile::tempdir().expect("tempdir");
    let index =
        FreshIndex::new(InMemoryEngine::new(), dim, VectorValueType::Float).expect("construct");
    index
        .build(&generate_matrix(dim, n, 1), dir.path(), 8, false)
        .expect("build");
    let queries = generate_matrix(dim, 100, 2);

    for &threads in &[1, 2, 4, 8] {
        group.bench_function(BenchmarkId::new("100q_k10", threads), |b| {
            b.iter(|| black_box(index.search(&queries, 10, threads).expect("search")));
        });
    }

    group.finish();
}

/// Insert batch of 1000 vectors into a fresh index
fn bench_insert_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_scaling");
    group.sample_size(10);

    let dim = 64;
    let base = generate_matrix(dim, 1000, 3);
    let fresh = generate_matrix(dim, 1000, 4);
    let ids: Vec<i64> = (10_000..11_000).collect();

    for &threads in &[1, 4, 8] {
        group.bench_function(BenchmarkId::new("1000v", threads), |b| {
            b.iter_with_setup(
                || {
                    let dir = tempfile::tempdir().expect("tempdir");
                    let index = FreshIndex::new(InMemoryEngine::new(), dim, VectorValueType::Float)
                        .expect("construct");
                    index.build(&base, dir.path(), 4, false).expect("build");
                    (index, dir)
                },
                |(index, _dir)| black_box(index.insert(&fresh, &ids, threads).expect("insert")),
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_dispatch_overhead,
    bench_search_scaling,
    bench_insert_scaling
);
criterion_main!(benches);
