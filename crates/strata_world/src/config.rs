//! # World Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! file is a valid configuration.
//!
//! ```toml
//! [layout]
//! chunk_bits = 4      # 16 x 16 blocks per chunk column
//! region_bits = 5     # 32 x 32 chunks per region file
//! height = 256
//!
//! [store]
//! root = "world"
//! pool_retain = 4096
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_core::{BufferPool, WorldError, WorldLayout, WorldResult};

/// Region file store settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory holding `<x>_<y>.region` files.
    pub root: PathBuf,
    /// Idle chunk buffers kept by the buffer pool.
    pub pool_retain: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("world"),
            pool_retain: 4096,
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldConfig {
    /// Chunk and region extents.
    pub layout: WorldLayout,
    /// Persistence settings.
    pub store: StoreConfig,
}

impl WorldConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidConfig`] for malformed TOML, unknown keys
    /// or out-of-range values.
    pub fn from_toml_str(text: &str) -> WorldResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| WorldError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::StorageFailure`] if the file cannot be read, or
    /// [`WorldError::InvalidConfig`] as for [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> WorldResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| WorldError::storage(path, e))?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!("Loaded world config from {}", path.display());
        Ok(config)
    }

    /// Checks the layout and store settings.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidConfig`] describing the first bad value.
    pub fn validate(&self) -> WorldResult<()> {
        self.layout.validate()?;
        if self.store.root.as_os_str().is_empty() {
            return Err(WorldError::InvalidConfig("store.root must not be empty".into()));
        }
        Ok(())
    }

    /// Buffer pool sized for this layout. Build one per process and share it.
    #[must_use]
    pub fn buffer_pool(&self) -> Arc<BufferPool> {
        BufferPool::new(self.layout.chunk_volume(), self.store.pool_retain)
    }
}
