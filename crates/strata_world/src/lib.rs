//! # STRATA World
//!
//! Persistence and streaming on top of `strata_core`:
//!
//! ```text
//!   World::load_chunk(c)
//!       │  chunk cache miss (single-flight per chunk)
//!       ▼
//!   ChunkSource ──► RegionChunkSource ──► RegionSource::load_region(r)
//!              │                              │ region cache miss (single-flight per region)
//!              │                              ▼
//!              │                         <root>/<x>_<y>.region  (lz4)
//!              │                              │ slot not initialized
//!              │                              ▼
//!              │                         WorldGenerator::generate
//!              └─► RemoteChunkSource ──► ChunkTransport::fetch_chunk
//! ```
//!
//! ## Architecture Rules
//!
//! 1. **Blocking work off the workers** - file I/O, compression and terrain
//!    generation run through `tokio::task::spawn_blocking`
//! 2. **Atomic saves** - region files are replaced by rename, never rewritten
//!    in place
//! 3. **No hidden retries** - every failure reaches the caller

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod generator;
pub mod source;
pub mod store;
pub mod world;

pub use config::{StoreConfig, WorldConfig};
pub use generator::{LayeredGenerator, Modifier, WorldGenerator};
pub use source::{
    ChunkSource, ChunkTransport, RegionChunkSource, RegionSource, RemoteChunkSource,
    TransportError,
};
pub use store::{MemoryRegionStore, RegionStore};
pub use world::World;

use strata_core::{WorldError, WorldResult};

/// Runs `work` on the blocking pool and waits for it.
///
/// A panic in `work` is re-raised here. A task dropped by runtime shutdown
/// reports [`WorldError::Cancelled`].
pub(crate) async fn run_blocking<T, F>(work: F) -> WorldResult<T>
where
    F: FnOnce() -> WorldResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Err(WorldError::Cancelled),
    }
}
