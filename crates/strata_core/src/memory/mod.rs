//! # Memory Management
//!
//! Pooled storage for voxel buffers.
//!
//! ## Design Philosophy
//!
//! Chunk storage is large and allocated in bursts (a whole region at a time),
//! so buffers are recycled instead of going back to the allocator:
//! - Checked out zeroed, returned on drop
//! - Returned only when the owning chunk is destroyed, never speculatively
//! - One pool per layout, shared by every region of a store

mod pool;

pub use pool::{BufferPool, PoolStats, PooledBuffer};
