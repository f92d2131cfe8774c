//! # World Façade
//!
//! Entry point for chunk requests. Chunks are cached in a quadtree over the
//! chunk domain; misses go to the [`ChunkSource`] through a single-flight
//! gate, so concurrent requests for one chunk share one load.
//!
//! ## Example
//!
//! ```rust,ignore
//! let config = WorldConfig::load("world.toml")?;
//! let store = Arc::new(RegionStore::from_config(&config, config.buffer_pool())?);
//! let world = World::new(config.layout, RegionChunkSource::new(store, generator));
//!
//! let chunk = world.load_chunk(IVec2::new(3, -2), &CancelToken::new()).await?;
//! ```

use std::sync::Arc;

use strata_core::{
    BlockId, Bounds, CancelToken, Chunk, IVec2, IVec3, QuadTree, SingleFlight, TreePoint,
    WorldError, WorldLayout, WorldResult,
};

use crate::source::ChunkSource;

/// Chunk cache in front of a chunk source.
pub struct World<S> {
    layout: WorldLayout,
    source: Arc<S>,
    loader: SingleFlight<IVec2, Chunk>,
}

impl<S: ChunkSource> World<S> {
    /// Creates a world with an empty chunk cache.
    #[must_use]
    pub fn new(layout: WorldLayout, source: S) -> Self {
        Self {
            layout,
            source: Arc::new(source),
            loader: SingleFlight::new(layout.chunk_domain()),
        }
    }

    /// Layout in use.
    #[must_use]
    pub const fn layout(&self) -> &WorldLayout {
        &self.layout
    }

    /// The chunk source behind the cache.
    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The chunk cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<QuadTree<Chunk>> {
        self.loader.cache()
    }

    /// Number of cached chunks.
    #[must_use]
    pub fn cached_chunks(&self) -> usize {
        self.loader.cache().len()
    }

    /// Number of chunk loads in progress.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.loader.in_flight()
    }

    /// Returns the chunk at `coord`, loading it at most once.
    ///
    /// # Errors
    ///
    /// - [`WorldError::OutOfRange`] outside the chunk domain
    /// - [`WorldError::Cancelled`] if `cancel` fires first
    /// - any error from the chunk source (storage or upstream failures)
    pub async fn load_chunk(&self, coord: IVec2, cancel: &CancelToken) -> WorldResult<Chunk> {
        let source = Arc::clone(&self.source);
        self.loader
            .load(coord, cancel, move |coord| async move {
                source.load_chunk(coord).await
            })
            .await
    }

    /// Returns the chunk containing world block `pos`.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::OutOfRange`] if `pos.z` is outside `[0, height)`,
    /// otherwise as for [`load_chunk`](Self::load_chunk).
    pub async fn load_chunk_at(&self, pos: IVec3, cancel: &CancelToken) -> WorldResult<Chunk> {
        if !self.layout.height_contains(pos.z) {
            return Err(WorldError::OutOfRange {
                coord: pos.components(),
                min: vec![i64::from(i32::MIN), i64::from(i32::MIN), 0],
                max: vec![
                    i64::from(i32::MAX),
                    i64::from(i32::MAX),
                    i64::from(self.layout.height) - 1,
                ],
            });
        }
        self.load_chunk(self.layout.world_to_chunk(pos), cancel).await
    }

    /// Reads the block at world position `pos`.
    ///
    /// # Errors
    ///
    /// As for [`load_chunk_at`](Self::load_chunk_at).
    pub async fn read_block(&self, pos: IVec3, cancel: &CancelToken) -> WorldResult<BlockId> {
        let chunk = self.load_chunk_at(pos, cancel).await?;
        chunk.read(self.layout.block_local_in_chunk(pos))
    }

    /// Writes the block at world position `pos`.
    ///
    /// # Errors
    ///
    /// As for [`load_chunk_at`](Self::load_chunk_at).
    pub async fn write_block(
        &self,
        pos: IVec3,
        block: BlockId,
        cancel: &CancelToken,
    ) -> WorldResult<()> {
        let chunk = self.load_chunk_at(pos, cancel).await?;
        chunk.write(self.layout.block_local_in_chunk(pos), block)
    }

    /// Cached chunks whose coordinate lies in `bounds`. Never loads.
    #[must_use]
    pub fn cached_chunks_in(&self, bounds: &Bounds<IVec2>) -> Vec<(IVec2, Chunk)> {
        self.loader.cache().overlap_box(bounds)
    }
}

impl<S> std::fmt::Debug for World<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("layout", &self.layout)
            .field("chunks", &self.loader.cache().len())
            .finish_non_exhaustive()
    }
}
