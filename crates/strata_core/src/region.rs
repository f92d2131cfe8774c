//! # Region Container
//!
//! A region is a `width x width` grid of chunk columns and the unit of
//! durability: one region maps to one file.
//!
//! ```text
//!   slot index = x + width * y        (x, y in [0, width))
//!
//!   serialized, per slot in index order:
//!     [1 byte: slot initialized]
//!     [chunk payload]                  (only if initialized)
//! ```
//!
//! Chunk storage is allocated the first time a slot is touched, so a region
//! that is only partly explored only holds the chunks that were asked for.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::chunk::{read_flag, BlockId, Chunk, ChunkDims};
use crate::coords::IVec2;
use crate::error::{WorldError, WorldResult};
use crate::layout::WorldLayout;
use crate::memory::BufferPool;

struct RegionInner {
    coord: IVec2,
    width: usize,
    dims: ChunkDims,
    pool: Arc<BufferPool>,
    slots: Box<[OnceLock<Chunk>]>,
    initialized: Box<[AtomicBool]>,
}

/// Shared handle to a grid of chunks.
#[derive(Clone)]
pub struct Region {
    inner: Arc<RegionInner>,
}

impl Region {
    /// Creates an empty region (no slot initialized).
    ///
    /// # Panics
    ///
    /// Panics if the pool's buffer volume differs from the layout's chunk volume.
    #[must_use]
    pub fn new(coord: IVec2, layout: &WorldLayout, pool: Arc<BufferPool>) -> Self {
        assert_eq!(
            pool.volume(),
            layout.chunk_volume(),
            "pool volume does not match layout chunk volume"
        );

        let width = layout.region_width();
        let slots = width * width;

        Self {
            inner: Arc::new(RegionInner {
                coord,
                width,
                dims: layout.chunk_dims(),
                pool,
                slots: (0..slots).map(|_| OnceLock::new()).collect(),
                initialized: (0..slots).map(|_| AtomicBool::new(false)).collect(),
            }),
        }
    }

    /// Reads a region previously written with [`serialize`](Self::serialize).
    ///
    /// # Errors
    ///
    /// Propagates read errors and malformed payloads.
    pub fn from_reader<R: Read>(
        coord: IVec2,
        layout: &WorldLayout,
        pool: Arc<BufferPool>,
        reader: &mut R,
    ) -> io::Result<Self> {
        let region = Self::new(coord, layout, pool);
        region.deserialize(reader)?;
        Ok(region)
    }

    /// Region coordinate.
    #[inline]
    #[must_use]
    pub fn coord(&self) -> IVec2 {
        self.inner.coord
    }

    /// Chunks per axis.
    #[inline]
    #[must_use]
    pub fn width(&self) -> usize {
        self.inner.width
    }

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    fn index(&self, local: IVec2) -> WorldResult<usize> {
        let width = self.inner.width;
        let inside = |v: i32| v >= 0 && (v as usize) < width;
        if !inside(local.x) || !inside(local.y) {
            return Err(WorldError::OutOfBounds {
                coord: vec![local.x.into(), local.y.into()],
                extent: vec![width as i64, width as i64],
            });
        }
        Ok(local.x as usize + width * local.y as usize)
    }

    fn slot(&self, index: usize) -> Chunk {
        self.inner.slots[index]
            .get_or_init(|| Chunk::new(&self.inner.pool, self.inner.dims))
            .clone()
    }

    /// The chunk at `local`. Never generates.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::OutOfBounds`] outside `[0, width)²`.
    pub fn chunk_at(&self, local: IVec2) -> WorldResult<Chunk> {
        let index = self.index(local)?;
        Ok(self.slot(index))
    }

    /// Returns true if the slot at `local` holds generated or loaded content.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::OutOfBounds`] outside `[0, width)²`.
    pub fn is_initialized(&self, local: IVec2) -> WorldResult<bool> {
        let index = self.index(local)?;
        Ok(self.inner.initialized[index].load(Ordering::Acquire))
    }

    /// Marks the slot at `local` as holding content.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::OutOfBounds`] outside `[0, width)²`.
    pub fn mark_initialized(&self, local: IVec2) -> WorldResult<()> {
        let index = self.index(local)?;
        self.inner.initialized[index].store(true, Ordering::Release);
        Ok(())
    }

    /// Number of initialized slots.
    #[must_use]
    pub fn initialized_count(&self) -> usize {
        self.inner
            .initialized
            .iter()
            .filter(|flag| flag.load(Ordering::Acquire))
            .count()
    }

    /// Writes every slot in index order.
    ///
    /// # Errors
    ///
    /// Propagates errors from `writer`.
    pub fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for (index, flag) in self.inner.initialized.iter().enumerate() {
            let initialized = flag.load(Ordering::Acquire);
            writer.write_all(&[u8::from(initialized)])?;

            if initialized {
                self.slot(index).serialize(writer)?;
            }
        }
        Ok(())
    }

    /// Encodes the region into a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (index, flag) in self.inner.initialized.iter().enumerate() {
            let initialized = flag.load(Ordering::Acquire);
            out.push(u8::from(initialized));

            if initialized {
                self.slot(index).encode_into(&mut out);
            }
        }
        out
    }

    /// Reads every slot in index order, replacing current contents.
    ///
    /// # Errors
    ///
    /// Propagates read errors and malformed payloads.
    pub fn deserialize<R: Read>(&self, reader: &mut R) -> io::Result<()> {
        for (index, flag) in self.inner.initialized.iter().enumerate() {
            let initialized = read_flag(reader)?;

            if initialized {
                self.slot(index).deserialize(reader)?;
            } else if let Some(chunk) = self.inner.slots[index].get() {
                chunk.fill(BlockId::AIR);
                chunk.set_initialized(false);
            }

            flag.store(initialized, Ordering::Release);
        }
        Ok(())
    }

    /// Returns true if both handles point at the same region.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("coord", &self.inner.coord)
            .field("width", &self.inner.width)
            .field("initialized", &self.initialized_count())
            .finish_non_exhaustive()
    }
}
