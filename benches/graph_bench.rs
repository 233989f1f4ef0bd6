//! # Graph benchmarks
//!
//! Run with `cargo bench`.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use melvin_core::{form_edges, ingest_sequence, propagate, Graph};
use std::hint::black_box;

fn corpus(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest_sequence");
    for &size in &[64usize, 512, 4096] {
        let data = corpus(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| {
                let mut g = Graph::new();
                let s = ingest_sequence(&mut g, black_box(data)).expect("ingest");
                black_box(s);
            });
        });
    }
    group.finish();
}

fn bench_form_edges_and_propagate(c: &mut Criterion) {
    let mut group = c.benchmark_group("form_edges_and_propagate");
    for &size in &[64usize, 512] {
        let data = corpus(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| {
                let mut g = Graph::new();
                let s = ingest_sequence(&mut g, data).expect("ingest");
                form_edges(&mut g, &s).expect("form edges");
                propagate(&mut g, &s).expect("propagate");
                black_box(g.node_count());
            });
        });
    }
    group.finish();
}

fn bench_repeated_ingestion(c: &mut Criterion) {
    c.bench_function("repeated_ingestion_of_learned_pattern", |b| {
        let mut g = Graph::new();
        let data = b"the quick brown fox";
        ingest_sequence(&mut g, data).expect("warm up");
        b.iter(|| {
            let s = ingest_sequence(&mut g, black_box(data)).expect("ingest");
            black_box(s);
        });
    });
}

criterion_group!(
    benches,
    bench_ingest,
    bench_form_edges_and_propagate,
    bench_repeated_ingestion
);
criterion_main!(benches);
