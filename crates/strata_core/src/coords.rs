//! # Integer Coordinates
//!
//! Lattice points and inclusive axis-aligned boxes used by every coordinate
//! space (world blocks, chunks, regions) and by the sparse cache index.
//!
//! ## Box subdivision
//!
//! A box `[min, max]` splits per axis at `center = floor((min + max + 1) / 2)`:
//!
//! ```text
//!   lower child: [min, center - 1]      upper child: [center, max]
//! ```
//!
//! A point goes to the upper child on an axis when `center <= point`, so ties
//! resolve toward the upper child and a split of a box with `max > min` never
//! produces an empty child.

use std::fmt;
use std::hash::Hash;
use std::ops::{Add, Sub};

/// A point type the sparse tree can be keyed by.
///
/// Each axis contributes one bit to a child offset, so a tree over `DIMS`
/// axes has `2^DIMS` children per internal node.
pub trait TreePoint: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Number of axes.
    const DIMS: usize;

    /// Children per internal node (`2^DIMS`).
    const ARITY: usize = 1 << Self::DIMS;

    /// Returns the component on `axis` (`0..DIMS`).
    fn axis(self, axis: usize) -> i32;

    /// Builds a point from one value per axis.
    fn from_axes(f: impl FnMut(usize) -> i32) -> Self;

    /// Widened components, used in error reports.
    fn components(self) -> Vec<i64> {
        (0..Self::DIMS).map(|i| i64::from(self.axis(i))).collect()
    }
}

/// A 2D integer point (chunk and region coordinates).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IVec2 {
    /// X component.
    pub x: i32,
    /// Y component.
    pub y: i32,
}

impl IVec2 {
    /// The origin.
    pub const ZERO: Self = Self::new(0, 0);

    /// Creates a new point.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Arithmetic right shift on both axes (floor division by `2^bits`).
    #[inline]
    #[must_use]
    pub const fn shr(self, bits: u32) -> Self {
        Self::new(self.x >> bits, self.y >> bits)
    }

    /// Left shift on both axes (multiplication by `2^bits`).
    #[inline]
    #[must_use]
    pub const fn shl(self, bits: u32) -> Self {
        Self::new(self.x << bits, self.y << bits)
    }

    /// Lifts to 3D with the given z.
    #[inline]
    #[must_use]
    pub const fn extend(self, z: i32) -> IVec3 {
        IVec3::new(self.x, self.y, z)
    }
}

impl fmt::Display for IVec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl Add for IVec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for IVec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl TreePoint for IVec2 {
    const DIMS: usize = 2;

    #[inline]
    fn axis(self, axis: usize) -> i32 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => unreachable!("IVec2 has two axes, got {axis}"),
        }
    }

    #[inline]
    fn from_axes(mut f: impl FnMut(usize) -> i32) -> Self {
        Self::new(f(0), f(1))
    }
}

/// A 3D integer point (world block coordinates, octree keys).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IVec3 {
    /// X component.
    pub x: i32,
    /// Y component.
    pub y: i32,
    /// Z component (height axis in world space).
    pub z: i32,
}

impl IVec3 {
    /// The origin.
    pub const ZERO: Self = Self::new(0, 0, 0);

    /// Creates a new point.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Drops the z component.
    #[inline]
    #[must_use]
    pub const fn xy(self) -> IVec2 {
        IVec2::new(self.x, self.y)
    }
}

impl fmt::Display for IVec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl Add for IVec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for IVec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl TreePoint for IVec3 {
    const DIMS: usize = 3;

    #[inline]
    fn axis(self, axis: usize) -> i32 {
        match axis {
            0 => self.x,
            1 => self.y,
            2 => self.z,
            _ => unreachable!("IVec3 has three axes, got {axis}"),
        }
    }

    #[inline]
    fn from_axes(mut f: impl FnMut(usize) -> i32) -> Self {
        Self::new(f(0), f(1), f(2))
    }
}

/// Inclusive axis-aligned box `[min, max]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Bounds<P> {
    /// Inclusive minimum corner.
    pub min: P,
    /// Inclusive maximum corner.
    pub max: P,
}

impl<P: TreePoint> Bounds<P> {
    /// Creates a box from its inclusive corners.
    #[inline]
    #[must_use]
    pub const fn new(min: P, max: P) -> Self {
        Self { min, max }
    }

    /// The single-point box `[p, p]`.
    #[inline]
    #[must_use]
    pub const fn point(p: P) -> Self {
        Self { min: p, max: p }
    }

    /// Split point: `floor((min + max + 1) / 2)` per axis, computed without overflow.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn center(&self) -> P {
        P::from_axes(|i| {
            let sum = i64::from(self.min.axis(i)) + i64::from(self.max.axis(i)) + 1;
            // always within [min, max], so the narrowing is lossless
            sum.div_euclid(2) as i32
        })
    }

    /// Returns true if `p` lies inside the box.
    #[must_use]
    pub fn contains(&self, p: P) -> bool {
        (0..P::DIMS).all(|i| self.min.axis(i) <= p.axis(i) && p.axis(i) <= self.max.axis(i))
    }

    /// Returns true if the two boxes share at least one lattice point.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        (0..P::DIMS).all(|i| {
            self.max.axis(i) >= other.min.axis(i) && self.min.axis(i) <= other.max.axis(i)
        })
    }

    /// Child offset of `p` relative to `center`: bit `i` is set when
    /// `center.axis(i) <= p.axis(i)`.
    #[inline]
    #[must_use]
    pub fn child_offset(center: P, p: P) -> usize {
        (0..P::DIMS).fold(0, |offset, i| {
            if center.axis(i) <= p.axis(i) {
                offset | (1 << i)
            } else {
                offset
            }
        })
    }

    /// Bounds of the child at `offset`.
    ///
    /// Only meaningful for a child that can hold a point of this box; the lower
    /// half of an axis with `min == max` is empty and is never asked for.
    #[must_use]
    pub fn child(&self, offset: usize) -> Self {
        let center = self.center();
        let min = P::from_axes(|i| {
            if offset & (1 << i) != 0 {
                center.axis(i)
            } else {
                self.min.axis(i)
            }
        });
        let max = P::from_axes(|i| {
            if offset & (1 << i) != 0 {
                self.max.axis(i)
            } else {
                center.axis(i) - 1
            }
        });
        Self { min, max }
    }
}
