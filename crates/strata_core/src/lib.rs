//! # STRATA Core
//!
//! In-memory half of the chunk streaming engine:
//! - Coordinate spaces tying world blocks, chunks and regions together
//! - Pooled voxel buffers with their own shared/exclusive lock
//! - Sparse octree / quadtree used as the cache index for chunks and regions
//! - Per-key single-flight admission so one coordinate is loaded once
//!
//! ## Architecture Rules
//!
//! 1. **Explicit state** - caches and gate tables are constructed and passed in,
//!    never process-wide singletons
//! 2. **Short critical sections** - the tree lock and a chunk's lock are never
//!    held across an `.await`
//! 3. **Deterministic release** - buffer storage goes back to its pool exactly
//!    when the last chunk handle is dropped
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_core::{IVec2, QuadTree, WorldLayout};
//!
//! let layout = WorldLayout::default();
//! let cache: QuadTree<u32> = QuadTree::new(layout.chunk_domain());
//! cache.insert(IVec2::new(3, -7), 42)?;
//! assert_eq!(cache.try_get(IVec2::new(3, -7)), Some(42));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod cancel;
pub mod chunk;
pub mod coords;
pub mod error;
pub mod layout;
pub mod memory;
pub mod region;
pub mod single_flight;
pub mod tree;

pub use cancel::CancelToken;
pub use chunk::{BlockId, Chunk, ChunkDims};
pub use coords::{Bounds, IVec2, IVec3, TreePoint};
pub use error::{WorldError, WorldResult};
pub use layout::WorldLayout;
pub use memory::{BufferPool, PoolStats, PooledBuffer};
pub use region::Region;
pub use single_flight::SingleFlight;
pub use tree::{Octree, QuadTree, SparseTree};
