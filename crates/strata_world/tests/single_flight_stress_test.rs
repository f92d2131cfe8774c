//! # Concurrent Load Stress Test
//!
//! Many tasks hitting the world at once: one generation per chunk, one
//! region read per region, and identical handles for identical requests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use strata_core::{BlockId, CancelToken, Chunk, IVec2, WorldError, WorldLayout};
use strata_world::{RegionChunkSource, RegionStore, World, WorldGenerator};

const LAYOUT: WorldLayout = WorldLayout::new(2, 2, 16);

/// Slow generator so that concurrent requests overlap.
struct SlowGenerator {
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

impl WorldGenerator for SlowGenerator {
    fn generate(&self, coord: IVec2, chunk: &Chunk) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        let code =
            u16::try_from(coord.x.rem_euclid(1000) + coord.y.rem_euclid(1000)).unwrap_or(0);
        chunk.fill(BlockId(code));
        chunk.set_initialized(true);
    }
}

type TestWorld = World<RegionChunkSource<RegionStore, SlowGenerator>>;

fn world(
    root: &std::path::Path,
    calls: &Arc<AtomicUsize>,
    delay: Duration,
) -> (Arc<RegionStore>, Arc<TestWorld>) {
    let pool = strata_core::BufferPool::new(LAYOUT.chunk_volume(), 256);
    let store = Arc::new(RegionStore::new(root, LAYOUT, pool).unwrap());
    let generator = SlowGenerator {
        calls: Arc::clone(calls),
        delay,
    };
    let world = World::new(LAYOUT, RegionChunkSource::new(Arc::clone(&store), generator));
    (store, Arc::new(world))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_same_chunk_generated_once() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let (store, world) = world(dir.path(), &calls, Duration::from_millis(50));
    let coord = IVec2::new(-3, 2);

    let tasks: Vec<_> = (0..200)
        .map(|_| {
            let world = Arc::clone(&world);
            tokio::spawn(async move { world.load_chunk(coord, &CancelToken::new()).await })
        })
        .collect();

    let mut chunks = Vec::with_capacity(tasks.len());
    for task in tasks {
        chunks.push(task.await.unwrap().unwrap());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(chunks.iter().all(|c| c.ptr_eq(&chunks[0])));
    assert!(chunks.iter().all(|c| c.content_eq(&chunks[0])));
    assert_eq!(world.cached_chunks(), 1);
    assert_eq!(world.in_flight(), 0);
    assert_eq!(store.cached_regions(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_distinct_chunks_each_generated_once() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let (store, world) = world(dir.path(), &calls, Duration::from_millis(5));

    // 8 x 8 chunks = 2 x 2 regions, each chunk requested by 4 tasks
    let coords: Vec<IVec2> = (0..8)
        .flat_map(|x| (0..8).map(move |y| IVec2::new(x, y)))
        .collect();

    let tasks: Vec<_> = coords
        .iter()
        .flat_map(|&coord| std::iter::repeat(coord).take(4))
        .map(|coord| {
            let world = Arc::clone(&world);
            tokio::spawn(async move { (coord, world.load_chunk(coord, &CancelToken::new()).await) })
        })
        .collect();

    for task in tasks {
        let (coord, result) = task.await.unwrap();
        let chunk = result.unwrap();
        let expected = u16::try_from(coord.x + coord.y).unwrap();
        assert!(chunk.snapshot().iter().all(|&code| code == expected));
    }

    assert_eq!(calls.load(Ordering::SeqCst), coords.len());
    assert_eq!(world.cached_chunks(), coords.len());
    assert_eq!(store.cached_regions(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancelled_request_still_fills_cache() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let (_store, world) = world(dir.path(), &calls, Duration::from_millis(100));
    let coord = IVec2::new(9, 9);

    let token = CancelToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = world.load_chunk(coord, &token).await.unwrap_err();
    assert!(matches!(err, WorldError::Cancelled));

    // a later caller joins the running load instead of starting another
    let chunk = world.load_chunk(coord, &CancelToken::new()).await.unwrap();
    assert!(chunk.is_initialized());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
