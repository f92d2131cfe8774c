//! # Cache Index Benchmark
//!
//! Insert, point lookup and box query on the chunk cache index, plus a full
//! bulk pass over one chunk column.
//!
//! Run with: `cargo bench --package strata_core`

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata_core::{BlockId, Bounds, BufferPool, Chunk, IVec2, QuadTree, WorldLayout};

/// Deterministic chunk keys spread over a 2048 x 2048 area.
fn keys(count: usize, seed: u64) -> Vec<IVec2> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| IVec2::new(rng.gen_range(-1024..1024), rng.gen_range(-1024..1024)))
        .collect()
}

fn filled_tree(keys: &[IVec2]) -> QuadTree<u32> {
    let tree = QuadTree::new(WorldLayout::default().chunk_domain());
    for (i, &k) in keys.iter().enumerate() {
        // random keys may repeat
        let _ = tree.insert(k, u32::try_from(i).unwrap_or(u32::MAX));
    }
    tree
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("quadtree_insert");

    for count in [1_000, 10_000, 100_000] {
        let keys = keys(count, 1);
        group.bench_with_input(BenchmarkId::from_parameter(count), &keys, |b, keys| {
            b.iter(|| black_box(filled_tree(keys).len()));
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let keys = keys(100_000, 2);
    let tree = filled_tree(&keys);

    c.bench_function("quadtree_try_get_100K", |b| {
        b.iter(|| {
            let mut hits = 0usize;
            for &k in &keys[..1_000] {
                hits += usize::from(tree.try_get(black_box(k)).is_some());
            }
            hits
        });
    });
}

fn bench_overlap(c: &mut Criterion) {
    let keys = keys(100_000, 3);
    let tree = filled_tree(&keys);
    let query = Bounds::new(IVec2::new(-16, -16), IVec2::new(15, 15));

    c.bench_function("quadtree_overlap_32x32", |b| {
        b.iter(|| black_box(tree.overlap_box(&query).len()));
    });
}

fn bench_chunk_bulk_write(c: &mut Criterion) {
    let layout = WorldLayout::default();
    let pool = BufferPool::new(layout.chunk_volume(), 4);
    let chunk = Chunk::new(&pool, layout.chunk_dims());

    c.bench_function("chunk_bulk_write_16x16x256", |b| {
        b.iter(|| {
            chunk.bulk_write(|pos, _| {
                if pos.z < 64 {
                    BlockId::STONE
                } else {
                    BlockId::AIR
                }
            });
        });
    });
}

criterion_group!(
    benches,
    bench_insert,
    bench_lookup,
    bench_overlap,
    bench_chunk_bulk_write,
);

criterion_main!(benches);
