use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rowsearch::documents::Document;
use rowsearch::index::{IndexEntry, VectorIndex};
use std::hint::black_box;

const DIMENSION: usize = 768;

/// Deterministic pseudo-random components in [-1, 1).
fn vector(seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
    (0..DIMENSION)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            ((state >> 40) as f32 / (1u64 << 24) as f32).mul_add(2.0, -1.0)
        })
        .collect()
}

fn index_of(size: usize) -> VectorIndex {
    VectorIndex::build(
        (0..size)
            .map(|id| IndexEntry {
                document: Document {
                    id,
                    content: format!("Vendor Name: Vendor {id}"),
                },
                vector: vector(id as u64),
            })
            .collect(),
    )
    .expect("bench index builds")
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let query = vector(u64::MAX);
    let mut group = c.benchmark_group("search");

    for size in [1_000, 10_000] {
        let index = index_of(size);
        group.bench_with_input(BenchmarkId::new("top10", size), &index, |b, index| {
            b.iter(|| index.search(black_box(&query), black_box(10)))
        });
    }

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
