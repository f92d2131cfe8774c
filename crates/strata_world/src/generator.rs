//! # Terrain Generation Seam
//!
//! A generator fills a freshly allocated chunk column and marks it
//! initialized. The layered generator runs an ordered list of per-block
//! modifiers, each as one parallel pass over the chunk:
//!
//! ```text
//!   for modifier in modifiers:
//!       block[p] = modifier(chunk_origin + p, block[p])     (all p, in parallel)
//! ```
//!
//! Noise synthesis and block placement rules live in the modifiers.

use std::fmt;

use strata_core::{BlockId, Chunk, IVec2, IVec3, WorldLayout};

/// Fills a chunk with terrain.
pub trait WorldGenerator: Send + Sync + 'static {
    /// Fills `chunk` (at chunk coordinate `coord`) and marks it initialized.
    ///
    /// Runs on the blocking pool.
    fn generate(&self, coord: IVec2, chunk: &Chunk);
}

/// One generation pass: world block position and current block in, new
/// block out. Must be pure; cells are visited in parallel.
pub type Modifier = Box<dyn Fn(IVec3, BlockId) -> BlockId + Send + Sync>;

/// Applies modifiers in insertion order.
///
/// # Example
///
/// ```rust,ignore
/// let generator = LayeredGenerator::new(layout)
///     .with_modifier(|p, _| if p.z < 60 { BlockId::STONE } else { BlockId::AIR })
///     .with_modifier(|p, prev| if p.z == 60 && prev.is_air() { BlockId::GRASS } else { prev });
/// ```
pub struct LayeredGenerator {
    layout: WorldLayout,
    modifiers: Vec<Modifier>,
}

impl LayeredGenerator {
    /// Creates a generator with no modifiers (chunks stay all air).
    #[must_use]
    pub fn new(layout: WorldLayout) -> Self {
        Self {
            layout,
            modifiers: Vec::new(),
        }
    }

    /// Appends a modifier.
    #[must_use]
    pub fn with_modifier<F>(mut self, modifier: F) -> Self
    where
        F: Fn(IVec3, BlockId) -> BlockId + Send + Sync + 'static,
    {
        self.push(modifier);
        self
    }

    /// Appends a modifier.
    pub fn push<F>(&mut self, modifier: F)
    where
        F: Fn(IVec3, BlockId) -> BlockId + Send + Sync + 'static,
    {
        self.modifiers.push(Box::new(modifier));
    }

    /// Number of modifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modifiers.len()
    }

    /// Returns true if there are no modifiers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }
}

impl WorldGenerator for LayeredGenerator {
    fn generate(&self, coord: IVec2, chunk: &Chunk) {
        let origin = self.layout.chunk_to_world(coord);

        for modifier in &self.modifiers {
            chunk.bulk_write(|local, previous| modifier(origin + local, previous));
        }

        chunk.set_initialized(true);
        tracing::debug!("Generated chunk {} ({} passes)", coord, self.modifiers.len());
    }
}

impl fmt::Debug for LayeredGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayeredGenerator")
            .field("layout", &self.layout)
            .field("modifiers", &self.modifiers.len())
            .finish()
    }
}
