//! # World Layout
//!
//! Extent constants for the three coordinate spaces, fixed at process start.
//!
//! ```text
//!   world block (x, y, z)  --(>> chunk_bits on x, y)-->  chunk (x, y)
//!   chunk (x, y)           --(>> region_bits)-------->   region (x, y)
//! ```
//!
//! Chunks are columns: `2^chunk_bits` blocks on each horizontal axis and the
//! full `height` on z. Regions are `2^region_bits` chunks on each axis.
//! Every transform in the engine goes through one `WorldLayout` so that the
//! chunk side, region width and the cache domains always agree.

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkDims;
use crate::coords::{Bounds, IVec2, IVec3};
use crate::error::{WorldError, WorldResult};

/// Largest accepted `chunk_bits` / `region_bits`.
const MAX_BITS: u32 = 10;

/// Largest accepted column height.
const MAX_HEIGHT: u32 = 4096;

/// Chunk and region extents, expressed as powers of two.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldLayout {
    /// log2 of the chunk side in blocks.
    pub chunk_bits: u32,
    /// log2 of the region width in chunks.
    pub region_bits: u32,
    /// Column height in blocks (z axis).
    pub height: u32,
}

impl Default for WorldLayout {
    fn default() -> Self {
        Self {
            chunk_bits: 4,
            region_bits: 5,
            height: 256,
        }
    }
}

impl WorldLayout {
    /// Creates a layout. Call [`validate`](Self::validate) before use.
    #[must_use]
    pub const fn new(chunk_bits: u32, region_bits: u32, height: u32) -> Self {
        Self {
            chunk_bits,
            region_bits,
            height,
        }
    }

    /// Checks that every derived extent is representable.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidConfig`] if a bit count or the height is out
    /// of the supported range.
    pub fn validate(&self) -> WorldResult<()> {
        if !(1..=MAX_BITS).contains(&self.chunk_bits) {
            return Err(WorldError::InvalidConfig(format!(
                "chunk_bits must be in 1..={MAX_BITS}, got {}",
                self.chunk_bits
            )));
        }
        if !(1..=MAX_BITS).contains(&self.region_bits) {
            return Err(WorldError::InvalidConfig(format!(
                "region_bits must be in 1..={MAX_BITS}, got {}",
                self.region_bits
            )));
        }
        if !(1..=MAX_HEIGHT).contains(&self.height) {
            return Err(WorldError::InvalidConfig(format!(
                "height must be in 1..={MAX_HEIGHT}, got {}",
                self.height
            )));
        }
        Ok(())
    }

    /// Chunk side in blocks.
    #[inline]
    #[must_use]
    pub const fn chunk_side(&self) -> usize {
        1 << self.chunk_bits
    }

    /// Region width in chunks.
    #[inline]
    #[must_use]
    pub const fn region_width(&self) -> usize {
        1 << self.region_bits
    }

    /// Dimensions of one chunk buffer.
    #[inline]
    #[must_use]
    pub const fn chunk_dims(&self) -> ChunkDims {
        ChunkDims::new(self.chunk_side(), self.height as usize)
    }

    /// Blocks per chunk.
    #[inline]
    #[must_use]
    pub const fn chunk_volume(&self) -> usize {
        self.chunk_dims().volume()
    }

    /// World block to owning chunk (floor division on x and y).
    #[inline]
    #[must_use]
    pub const fn world_to_chunk(&self, world: IVec3) -> IVec2 {
        world.xy().shr(self.chunk_bits)
    }

    /// Chunk to owning region.
    #[inline]
    #[must_use]
    pub const fn chunk_to_region(&self, chunk: IVec2) -> IVec2 {
        chunk.shr(self.region_bits)
    }

    /// World block to owning region.
    #[inline]
    #[must_use]
    pub const fn world_to_region(&self, world: IVec3) -> IVec2 {
        self.chunk_to_region(self.world_to_chunk(world))
    }

    /// Origin block of a chunk (z = 0).
    #[inline]
    #[must_use]
    pub const fn chunk_to_world(&self, chunk: IVec2) -> IVec3 {
        chunk.shl(self.chunk_bits).extend(0)
    }

    /// Origin chunk of a region.
    #[inline]
    #[must_use]
    pub const fn region_to_chunk(&self, region: IVec2) -> IVec2 {
        region.shl(self.region_bits)
    }

    /// Origin block of a region (z = 0).
    #[inline]
    #[must_use]
    pub const fn region_to_world(&self, region: IVec2) -> IVec3 {
        self.chunk_to_world(self.region_to_chunk(region))
    }

    /// Slot of a chunk inside its region, in `[0, width)²`.
    #[inline]
    #[must_use]
    pub const fn chunk_local_in_region(&self, chunk: IVec2) -> IVec2 {
        let mask = (1 << self.region_bits) - 1;
        IVec2::new(chunk.x & mask, chunk.y & mask)
    }

    /// Offset of a world block inside its chunk; z passes through unchanged.
    #[inline]
    #[must_use]
    pub const fn block_local_in_chunk(&self, world: IVec3) -> IVec3 {
        let mask = (1 << self.chunk_bits) - 1;
        IVec3::new(world.x & mask, world.y & mask, world.z)
    }

    /// Chunk coordinates whose blocks are all addressable with `i32`.
    #[must_use]
    pub const fn chunk_domain(&self) -> Bounds<IVec2> {
        let bits = self.chunk_bits;
        Bounds::new(
            IVec2::new(i32::MIN >> bits, i32::MIN >> bits),
            IVec2::new(i32::MAX >> bits, i32::MAX >> bits),
        )
    }

    /// Region coordinates owning the chunk domain.
    #[must_use]
    pub const fn region_domain(&self) -> Bounds<IVec2> {
        let bits = self.chunk_bits + self.region_bits;
        Bounds::new(
            IVec2::new(i32::MIN >> bits, i32::MIN >> bits),
            IVec2::new(i32::MAX >> bits, i32::MAX >> bits),
        )
    }

    /// Returns true if `world.z` lies in `[0, height)`.
    #[inline]
    #[must_use]
    pub const fn height_contains(&self, z: i32) -> bool {
        z >= 0 && (z as u32) < self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_to_chunk_floors_negatives() {
        let layout = WorldLayout::default();
        assert_eq!(layout.world_to_chunk(IVec3::new(0, 0, 0)), IVec2::new(0, 0));
        assert_eq!(layout.world_to_chunk(IVec3::new(15, 15, 3)), IVec2::new(0, 0));
        assert_eq!(layout.world_to_chunk(IVec3::new(16, -1, 0)), IVec2::new(1, -1));
        assert_eq!(layout.world_to_chunk(IVec3::new(-16, -17, 0)), IVec2::new(-1, -2));
    }

    #[test]
    fn test_chunk_alignment_roundtrip() {
        let layout = WorldLayout::default();
        let domain = layout.chunk_domain();
        let samples = [
            IVec2::ZERO,
            IVec2::new(1, -1),
            IVec2::new(-300, 77),
            domain.min,
            domain.max,
        ];

        for chunk in samples {
            assert_eq!(layout.world_to_chunk(layout.chunk_to_world(chunk)), chunk);
        }
    }

    #[test]
    fn test_chunk_to_world_is_aligned_floor() {
        let layout = WorldLayout::default();
        let p = IVec3::new(-5, 37, 100);
        let origin = layout.chunk_to_world(layout.world_to_chunk(p));
        assert_eq!(origin, IVec3::new(-16, 32, 0));
    }

    #[test]
    fn test_region_transforms() {
        let layout = WorldLayout::new(4, 5, 256);
        assert_eq!(layout.chunk_to_region(IVec2::new(31, 32)), IVec2::new(0, 1));
        assert_eq!(layout.chunk_to_region(IVec2::new(-1, -33)), IVec2::new(-1, -2));
        assert_eq!(layout.world_to_region(IVec3::new(511, 512, 0)), IVec2::new(0, 1));
        assert_eq!(layout.region_to_chunk(IVec2::new(-1, 2)), IVec2::new(-32, 64));
        assert_eq!(layout.region_to_world(IVec2::new(1, -1)), IVec3::new(512, -512, 0));

        for region in [IVec2::new(0, 0), IVec2::new(-7, 12)] {
            assert_eq!(layout.chunk_to_region(layout.region_to_chunk(region)), region);
        }
    }

    #[test]
    fn test_local_offsets() {
        let layout = WorldLayout::new(4, 5, 256);
        assert_eq!(layout.chunk_local_in_region(IVec2::new(-1, 33)), IVec2::new(31, 1));
        assert_eq!(
            layout.block_local_in_chunk(IVec3::new(-1, 17, 200)),
            IVec3::new(15, 1, 200)
        );
    }

    #[test]
    fn test_domains_nest() {
        let layout = WorldLayout::default();
        let chunks = layout.chunk_domain();
        let regions = layout.region_domain();
        assert_eq!(layout.chunk_to_region(chunks.min), regions.min);
        assert_eq!(layout.chunk_to_region(chunks.max), regions.max);
    }

    #[test]
    fn test_validate() {
        assert!(WorldLayout::default().validate().is_ok());
        assert!(WorldLayout::new(0, 5, 256).validate().is_err());
        assert!(WorldLayout::new(4, 11, 256).validate().is_err());
        assert!(WorldLayout::new(4, 5, 0).validate().is_err());
        assert!(!WorldLayout::default().height_contains(256));
        assert!(!WorldLayout::default().height_contains(-1));
        assert!(WorldLayout::default().height_contains(255));
    }
}
