//! # Voxel Buffers
//!
//! A chunk is one column of the world: `side x side` blocks horizontally and
//! `height` blocks on z. Each block is stored as a `u16` block code.
//!
//! ## Layout
//!
//! Cells are addressed as `x + side * y + side² * z`, so a z-slice is
//! contiguous. Serialization walks cells in that index order.
//!
//! ## Payload Format
//!
//! ```text
//! [1 byte: initialized (0 or 1)]
//! [volume x 2 bytes: little-endian block codes]   (only if initialized)
//! ```
//!
//! ## Thread Safety
//!
//! `Chunk` is a cheap handle (`Arc`). Every handle sees the same cells, guarded
//! by the chunk's own reader/writer lock. The lock is held only for a single
//! access or a single bulk pass, never across an `.await`.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rayon::prelude::*;

use crate::coords::IVec3;
use crate::error::{WorldError, WorldResult};
use crate::memory::{BufferPool, PooledBuffer};

/// A block type code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct BlockId(pub u16);

impl BlockId {
    /// Air block (empty).
    pub const AIR: Self = Self(0);
    /// Stone block.
    pub const STONE: Self = Self(1);
    /// Dirt block.
    pub const DIRT: Self = Self(2);
    /// Grass block.
    pub const GRASS: Self = Self(3);
    /// Water block.
    pub const WATER: Self = Self(4);
    /// Sand block.
    pub const SAND: Self = Self(5);
    /// Bedrock block.
    pub const BEDROCK: Self = Self(7);

    /// Returns true if this is an air block.
    #[inline]
    #[must_use]
    pub const fn is_air(self) -> bool {
        self.0 == 0
    }
}

/// Shape of a chunk buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkDims {
    /// Blocks per horizontal axis.
    pub side: usize,
    /// Blocks on the z axis.
    pub height: usize,
}

impl ChunkDims {
    /// Creates a shape.
    #[inline]
    #[must_use]
    pub const fn new(side: usize, height: usize) -> Self {
        Self { side, height }
    }

    /// Total number of cells.
    #[inline]
    #[must_use]
    pub const fn volume(&self) -> usize {
        self.side * self.side * self.height
    }

    /// Returns true if `pos` addresses a cell.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn contains(&self, pos: IVec3) -> bool {
        pos.x >= 0
            && pos.y >= 0
            && pos.z >= 0
            && (pos.x as usize) < self.side
            && (pos.y as usize) < self.side
            && (pos.z as usize) < self.height
    }

    /// Flat index of `pos`, or `OutOfBounds`.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::OutOfBounds`] if any axis is outside the chunk.
    #[allow(clippy::cast_sign_loss)]
    pub fn index(&self, pos: IVec3) -> WorldResult<usize> {
        if !self.contains(pos) {
            return Err(WorldError::OutOfBounds {
                coord: vec![pos.x.into(), pos.y.into(), pos.z.into()],
                extent: vec![self.side as i64, self.side as i64, self.height as i64],
            });
        }
        let (x, y, z) = (pos.x as usize, pos.y as usize, pos.z as usize);
        Ok(x + self.side * y + self.side * self.side * z)
    }

    /// Inverse of [`index`](Self::index).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub const fn position_of(&self, index: usize) -> IVec3 {
        let layer = self.side * self.side;
        IVec3::new(
            (index % self.side) as i32,
            (index / self.side % self.side) as i32,
            (index / layer) as i32,
        )
    }
}

struct ChunkInner {
    dims: ChunkDims,
    /// Set once terrain generation (or deserialization) has filled the cells.
    initialized: AtomicBool,
    blocks: RwLock<PooledBuffer>,
}

/// Shared handle to one chunk's cells.
#[derive(Clone)]
pub struct Chunk {
    inner: Arc<ChunkInner>,
}

impl Chunk {
    /// Creates an uninitialized, all-air chunk with storage from `pool`.
    ///
    /// # Panics
    ///
    /// Panics if the pool's buffer volume differs from `dims.volume()`.
    #[must_use]
    pub fn new(pool: &Arc<BufferPool>, dims: ChunkDims) -> Self {
        assert_eq!(
            pool.volume(),
            dims.volume(),
            "pool volume does not match chunk dimensions"
        );

        Self {
            inner: Arc::new(ChunkInner {
                dims,
                initialized: AtomicBool::new(false),
                blocks: RwLock::new(pool.acquire()),
            }),
        }
    }

    /// Decodes a chunk payload (see module docs).
    ///
    /// # Errors
    ///
    /// Returns an `InvalidData` / `UnexpectedEof` error for a malformed payload.
    pub fn from_payload(
        pool: &Arc<BufferPool>,
        dims: ChunkDims,
        payload: &[u8],
    ) -> io::Result<Self> {
        let chunk = Self::new(pool, dims);
        let mut reader = payload;
        chunk.deserialize(&mut reader)?;
        if !reader.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} trailing bytes after chunk payload", reader.len()),
            ));
        }
        Ok(chunk)
    }

    /// Shape of this chunk.
    #[inline]
    #[must_use]
    pub fn dims(&self) -> ChunkDims {
        self.inner.dims
    }

    /// Returns true once generation has run for this chunk.
    #[inline]
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// Marks the chunk as generated (or not).
    #[inline]
    pub fn set_initialized(&self, initialized: bool) {
        self.inner.initialized.store(initialized, Ordering::Release);
    }

    /// Reads one cell.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::OutOfBounds`] for a position outside the chunk.
    pub fn read(&self, pos: IVec3) -> WorldResult<BlockId> {
        let index = self.inner.dims.index(pos)?;
        Ok(BlockId(self.inner.blocks.read()[index]))
    }

    /// Writes one cell.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::OutOfBounds`] for a position outside the chunk.
    pub fn write(&self, pos: IVec3, block: BlockId) -> WorldResult<()> {
        let index = self.inner.dims.index(pos)?;
        self.inner.blocks.write()[index] = block.0;
        Ok(())
    }

    /// Visits every cell in parallel under the shared lock.
    ///
    /// Visitation order is unspecified and the visitor runs on several worker
    /// threads at once.
    pub fn bulk_read<F>(&self, visitor: F)
    where
        F: Fn(IVec3, BlockId) + Send + Sync,
    {
        let dims = self.inner.dims;
        let blocks = self.inner.blocks.read();
        let cells: &[u16] = &blocks;
        cells
            .par_iter()
            .enumerate()
            .for_each(|(index, &code)| visitor(dims.position_of(index), BlockId(code)));
    }

    /// Replaces every cell in parallel under the exclusive lock.
    ///
    /// The visitor receives the cell position and current value and returns
    /// the replacement. Order is unspecified.
    pub fn bulk_write<F>(&self, visitor: F)
    where
        F: Fn(IVec3, BlockId) -> BlockId + Send + Sync,
    {
        let dims = self.inner.dims;
        let mut blocks = self.inner.blocks.write();
        let cells: &mut [u16] = &mut blocks;
        cells.par_iter_mut().enumerate().for_each(|(index, code)| {
            *code = visitor(dims.position_of(index), BlockId(*code)).0;
        });
    }

    /// Sets every cell to `block`.
    pub fn fill(&self, block: BlockId) {
        self.inner.blocks.write().fill(block.0);
    }

    /// Copy of all block codes in index order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u16> {
        self.inner.blocks.read().to_vec()
    }

    /// Returns true if both chunks have the same flag and the same cells.
    #[must_use]
    pub fn content_eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        self.dims() == other.dims()
            && self.is_initialized() == other.is_initialized()
            && self.inner.blocks.read()[..] == other.inner.blocks.read()[..]
    }

    /// Returns true if both handles point at the same chunk.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Appends the payload encoding to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let initialized = self.is_initialized();
        out.push(u8::from(initialized));

        if initialized {
            let blocks = self.inner.blocks.read();
            out.reserve(blocks.len() * 2);
            for code in blocks.iter() {
                out.extend_from_slice(&code.to_le_bytes());
            }
        }
    }

    /// Payload encoding as a fresh buffer.
    #[must_use]
    pub fn to_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    /// Writes the payload encoding.
    ///
    /// # Errors
    ///
    /// Propagates errors from `writer`.
    pub fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        // encode under the lock, write without it
        writer.write_all(&self.to_payload())
    }

    /// Reads a payload encoding into this chunk.
    ///
    /// An uninitialized payload clears the cells.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` for a flag byte other than 0/1 and propagates
    /// read errors (including `UnexpectedEof`).
    pub fn deserialize<R: Read>(&self, reader: &mut R) -> io::Result<()> {
        let initialized = read_flag(reader)?;

        if initialized {
            let mut bytes = vec![0u8; self.inner.dims.volume() * 2];
            reader.read_exact(&mut bytes)?;

            let mut blocks = self.inner.blocks.write();
            debug_assert_eq!(blocks.len() * 2, bytes.len());
            for (code, pair) in blocks.iter_mut().zip(bytes.chunks_exact(2)) {
                *code = u16::from_le_bytes([pair[0], pair[1]]);
            }
        } else {
            self.inner.blocks.write().fill(0);
        }

        self.set_initialized(initialized);
        Ok(())
    }
}

/// Reads a 0/1 flag byte.
pub(crate) fn read_flag<R: Read>(reader: &mut R) -> io::Result<bool> {
    let mut flag = [0u8; 1];
    reader.read_exact(&mut flag)?;
    match flag[0] {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid flag byte {other}"),
        )),
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("dims", &self.inner.dims)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const DIMS: ChunkDims = ChunkDims::new(4, 8);

    fn chunk() -> (Arc<BufferPool>, Chunk) {
        let pool = BufferPool::new(DIMS.volume(), 8);
        let chunk = Chunk::new(&pool, DIMS);
        (pool, chunk)
    }

    #[test]
    fn test_index_is_bijective() {
        let mut seen = vec![false; DIMS.volume()];
        for z in 0..8 {
            for y in 0..4 {
                for x in 0..4 {
                    let pos = IVec3::new(x, y, z);
                    let index = DIMS.index(pos).unwrap();
                    assert!(!seen[index], "index {index} hit twice");
                    seen[index] = true;
                    assert_eq!(DIMS.position_of(index), pos);
                }
            }
        }
        assert!(seen.iter().all(|&s| s));
        assert_eq!(DIMS.index(IVec3::new(1, 2, 3)).unwrap(), 1 + 4 * 2 + 16 * 3);
    }

    #[test]
    fn test_read_write_bounds() {
        let (_pool, chunk) = chunk();
        chunk.write(IVec3::new(3, 3, 7), BlockId::STONE).unwrap();
        assert_eq!(chunk.read(IVec3::new(3, 3, 7)).unwrap(), BlockId::STONE);
        assert_eq!(chunk.read(IVec3::new(0, 0, 0)).unwrap(), BlockId::AIR);

        for pos in [IVec3::new(4, 0, 0), IVec3::new(0, -1, 0), IVec3::new(0, 0, 8)] {
            assert!(matches!(chunk.read(pos), Err(WorldError::OutOfBounds { .. })));
            assert!(matches!(
                chunk.write(pos, BlockId::DIRT),
                Err(WorldError::OutOfBounds { .. })
            ));
        }
    }

    #[test]
    fn test_handles_share_cells() {
        let (_pool, chunk) = chunk();
        let other = chunk.clone();
        other.write(IVec3::new(1, 1, 1), BlockId::GRASS).unwrap();
        assert_eq!(chunk.read(IVec3::new(1, 1, 1)).unwrap(), BlockId::GRASS);
        assert!(chunk.ptr_eq(&other));
    }

    #[test]
    fn test_bulk_write_then_bulk_read() {
        let (_pool, chunk) = chunk();
        chunk.bulk_write(|pos, prev| {
            assert_eq!(prev, BlockId::AIR);
            if pos.z < 3 {
                BlockId::STONE
            } else {
                BlockId::AIR
            }
        });

        let solid = AtomicUsize::new(0);
        chunk.bulk_read(|pos, block| {
            assert_eq!(block == BlockId::STONE, pos.z < 3);
            if !block.is_air() {
                solid.fetch_add(1, Ordering::Relaxed);
            }
        });
        assert_eq!(solid.load(Ordering::Relaxed), 4 * 4 * 3);
    }

    #[test]
    fn test_payload_layout() {
        let (pool, chunk) = chunk();
        assert_eq!(chunk.to_payload(), vec![0u8]);

        chunk.fill(BlockId(0x0102));
        chunk.set_initialized(true);
        let payload = chunk.to_payload();
        assert_eq!(payload.len(), 1 + DIMS.volume() * 2);
        assert_eq!(&payload[..3], &[1, 0x02, 0x01]);

        let decoded = Chunk::from_payload(&pool, DIMS, &payload).unwrap();
        assert!(decoded.content_eq(&chunk));
        assert!(!decoded.ptr_eq(&chunk));
    }

    #[test]
    fn test_malformed_payloads() {
        let (pool, _chunk) = chunk();
        assert!(Chunk::from_payload(&pool, DIMS, &[]).is_err());
        assert!(Chunk::from_payload(&pool, DIMS, &[2]).is_err());
        assert!(Chunk::from_payload(&pool, DIMS, &[1, 0, 0]).is_err());
        assert!(Chunk::from_payload(&pool, DIMS, &[0, 0]).is_err());
    }

    #[test]
    fn test_storage_returns_to_pool_after_last_handle() {
        let (pool, chunk) = chunk();
        let other = chunk.clone();
        drop(chunk);
        assert_eq!(pool.stats().retained, 0);
        drop(other);
        assert_eq!(pool.stats().retained, 1);
    }

    #[test]
    #[should_panic(expected = "pool volume")]
    fn test_mismatched_pool_panics() {
        let pool = BufferPool::new(10, 1);
        let _ = Chunk::new(&pool, DIMS);
    }
}
