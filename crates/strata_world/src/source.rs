//! # Chunk Sources
//!
//! Where the world goes on a chunk cache miss.
//!
//! - [`RegionChunkSource`] - the owning region from a [`RegionSource`]
//!   (the file-backed [`RegionStore`](crate::RegionStore) or the in-memory
//!   [`MemoryRegionStore`](crate::MemoryRegionStore)),
//!   generating the chunk first if its slot has never been filled
//! - [`RemoteChunkSource`] - a serialized chunk from some upstream
//!   [`ChunkTransport`]

use std::future::Future;
use std::sync::Arc;

use strata_core::{
    BufferPool, CancelToken, Chunk, IVec2, Region, TreePoint, WorldError, WorldLayout,
    WorldResult,
};

use crate::generator::WorldGenerator;
use crate::run_blocking;
use crate::store::check_pool;

/// Error type reported by transports.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Produces chunks for the world's slow path.
pub trait ChunkSource: Send + Sync + 'static {
    /// Loads (or creates) the chunk at `coord`.
    ///
    /// The world calls this at most once per coordinate at a time.
    fn load_chunk(&self, coord: IVec2) -> impl Future<Output = WorldResult<Chunk>> + Send;
}

/// Produces regions for a [`RegionChunkSource`].
pub trait RegionSource: Send + Sync + 'static {
    /// Layout shared by every region of this source.
    fn layout(&self) -> &WorldLayout;

    /// Returns the region at `coord`, loading it at most once.
    fn load_region(
        &self,
        coord: IVec2,
        cancel: &CancelToken,
    ) -> impl Future<Output = WorldResult<Region>> + Send;
}

/// Fetches serialized chunk payloads from elsewhere.
///
/// A payload is the chunk encoding: one flag byte, then the block codes as
/// little-endian `u16` if the flag is set.
pub trait ChunkTransport: Send + Sync + 'static {
    /// Fetches the payload for `coord`.
    fn fetch_chunk(
        &self,
        coord: IVec2,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;
}

/// Region backed source with generation on first touch.
pub struct RegionChunkSource<R, G> {
    store: Arc<R>,
    generator: Arc<G>,
}

impl<R: RegionSource, G: WorldGenerator> RegionChunkSource<R, G> {
    /// Creates a source over `store`, filling new chunks with `generator`.
    #[must_use]
    pub fn new(store: Arc<R>, generator: G) -> Self {
        Self {
            store,
            generator: Arc::new(generator),
        }
    }

    /// The backing region source.
    #[must_use]
    pub fn store(&self) -> &Arc<R> {
        &self.store
    }
}

impl<R: RegionSource, G: WorldGenerator> ChunkSource for RegionChunkSource<R, G> {
    fn load_chunk(&self, coord: IVec2) -> impl Future<Output = WorldResult<Chunk>> + Send {
        async move {
            let layout = self.store.layout();
            let region_coord = layout.chunk_to_region(coord);
            let local = layout.chunk_local_in_region(coord);

            // Own token: once started, a region load is never abandoned halfway.
            let region = self.store.load_region(region_coord, &CancelToken::new()).await?;
            let chunk = region.chunk_at(local)?;

            if !region.is_initialized(local)? {
                let generator = Arc::clone(&self.generator);
                let target = chunk.clone();
                run_blocking(move || {
                    generator.generate(coord, &target);
                    Ok(())
                })
                .await?;
                region.mark_initialized(local)?;
            }

            Ok(chunk)
        }
    }
}

impl<R: std::fmt::Debug, G> std::fmt::Debug for RegionChunkSource<R, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionChunkSource")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Source that decodes chunks fetched through a transport.
pub struct RemoteChunkSource<T> {
    transport: Arc<T>,
    layout: WorldLayout,
    pool: Arc<BufferPool>,
}

impl<T: ChunkTransport> RemoteChunkSource<T> {
    /// Creates a source decoding with `layout`'s chunk shape.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidConfig`] if the pool's buffers do not
    /// match the layout's chunk volume.
    pub fn new(transport: T, layout: WorldLayout, pool: Arc<BufferPool>) -> WorldResult<Self> {
        check_pool(&layout, &pool)?;
        Ok(Self {
            transport: Arc::new(transport),
            layout,
            pool,
        })
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: ChunkTransport> ChunkSource for RemoteChunkSource<T> {
    fn load_chunk(&self, coord: IVec2) -> impl Future<Output = WorldResult<Chunk>> + Send {
        async move {
            let payload = self
                .transport
                .fetch_chunk(coord)
                .await
                .map_err(|source| WorldError::UpstreamFailure {
                    coord: coord.components(),
                    source,
                })?;

            let pool = Arc::clone(&self.pool);
            let dims = self.layout.chunk_dims();
            run_blocking(move || {
                Chunk::from_payload(&pool, dims, &payload).map_err(|e| {
                    WorldError::UpstreamFailure {
                        coord: coord.components(),
                        source: Box::new(e),
                    }
                })
            })
            .await
        }
    }
}

impl<T> std::fmt::Debug for RemoteChunkSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteChunkSource")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}
