//! # Buffer Pool
//!
//! Recycles fixed-size block-code buffers between chunks.
//!
//! A buffer is checked out as a [`PooledBuffer`] and goes back to the pool
//! when that guard is dropped. A chunk owns its guard for its whole lifetime,
//! so storage is only recycled once nothing can reach it any more.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Thread-safe pool of equally sized `u16` buffers.
///
/// # Example
///
/// ```rust,ignore
/// let pool = BufferPool::new(16 * 16 * 256, 64);
///
/// let buffer = pool.acquire();   // zeroed, len == volume
/// drop(buffer);                  // back on the free list
/// assert_eq!(pool.stats().retained, 1);
/// ```
pub struct BufferPool {
    /// Length of every buffer handed out.
    volume: usize,
    /// Maximum number of idle buffers kept around.
    max_retained: usize,
    /// Idle buffers.
    free_list: Mutex<Vec<Box<[u16]>>>,
    /// Buffers allocated fresh because the free list was empty.
    allocated: AtomicU64,
    /// Buffers served from the free list.
    reused: AtomicU64,
}

/// Counters describing pool usage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers allocated from the heap.
    pub allocated: u64,
    /// Buffers served from the free list.
    pub reused: u64,
    /// Idle buffers currently held.
    pub retained: usize,
}

impl BufferPool {
    /// Creates a pool of `volume`-length buffers keeping at most
    /// `max_retained` idle buffers.
    ///
    /// # Panics
    ///
    /// Panics if `volume` is zero.
    #[must_use]
    pub fn new(volume: usize, max_retained: usize) -> Arc<Self> {
        assert!(volume > 0, "Buffer volume must be greater than zero");

        Arc::new(Self {
            volume,
            max_retained,
            free_list: Mutex::new(Vec::new()),
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        })
    }

    /// Length of every buffer this pool hands out.
    #[inline]
    #[must_use]
    pub const fn volume(&self) -> usize {
        self.volume
    }

    /// Checks out a zero-filled buffer.
    #[must_use]
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let recycled = self.free_list.lock().pop();

        let data = if let Some(mut data) = recycled {
            self.reused.fetch_add(1, Ordering::Relaxed);
            data.fill(0);
            data
        } else {
            self.allocated.fetch_add(1, Ordering::Relaxed);
            vec![0u16; self.volume].into_boxed_slice()
        };

        PooledBuffer {
            data: Some(data),
            pool: Arc::clone(self),
        }
    }

    /// Returns the current counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            retained: self.free_list.lock().len(),
        }
    }

    fn release(&self, data: Box<[u16]>) {
        debug_assert_eq!(data.len(), self.volume);

        let mut free_list = self.free_list.lock();
        if free_list.len() < self.max_retained {
            free_list.push(data);
        }
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("volume", &self.volume)
            .field("max_retained", &self.max_retained)
            .field("stats", &self.stats())
            .finish()
    }
}

/// A buffer checked out of a [`BufferPool`]; returned on drop.
pub struct PooledBuffer {
    /// Always `Some` until drop.
    data: Option<Box<[u16]>>,
    pool: Arc<BufferPool>,
}

impl PooledBuffer {
    /// The pool this buffer returns to.
    #[must_use]
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }
}

impl Deref for PooledBuffer {
    type Target = [u16];

    fn deref(&self) -> &[u16] {
        self.data.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u16] {
        self.data.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.pool.release(data);
        }
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer").field("len", &self.len()).finish()
    }
}
