//! # Region File Store
//!
//! Caches regions in a quadtree and persists them as one file per region.
//!
//! ```text
//!   <root>/<x>_<y>.region      lz4 frame stream of the region encoding
//!   <root>/<x>_<y>.region.tmp  in-progress write, renamed over the above
//! ```
//!
//! Loading a region that has no file yields an empty region; it only reaches
//! disk on the next [`RegionStore::save_all`].
//!
//! [`MemoryRegionStore`] is the same cache with no files behind it, for
//! worlds that are generated fresh on every run.

use std::fs::File;
use std::future::Future;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use strata_core::{
    BufferPool, CancelToken, IVec2, Region, SingleFlight, WorldError, WorldLayout, WorldResult,
};

use crate::config::WorldConfig;
use crate::run_blocking;
use crate::source::RegionSource;

/// Checks that `layout` is valid and `pool` hands out buffers of its chunk
/// volume.
pub(crate) fn check_pool(layout: &WorldLayout, pool: &BufferPool) -> WorldResult<()> {
    layout.validate()?;
    if pool.volume() != layout.chunk_volume() {
        return Err(WorldError::InvalidConfig(format!(
            "buffer pool volume {} does not match chunk volume {}",
            pool.volume(),
            layout.chunk_volume()
        )));
    }
    Ok(())
}

/// File-backed region cache.
pub struct RegionStore {
    root: PathBuf,
    layout: WorldLayout,
    pool: Arc<BufferPool>,
    loader: SingleFlight<IVec2, Region>,
}

impl RegionStore {
    /// Creates a store rooted at `root`. The directory is created on first save.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidConfig`] if the layout is invalid or the
    /// pool's buffers do not match the layout's chunk volume.
    pub fn new(
        root: impl Into<PathBuf>,
        layout: WorldLayout,
        pool: Arc<BufferPool>,
    ) -> WorldResult<Self> {
        check_pool(&layout, &pool)?;

        Ok(Self {
            root: root.into(),
            layout,
            pool,
            loader: SingleFlight::new(layout.region_domain()),
        })
    }

    /// Creates a store from configuration.
    ///
    /// # Errors
    ///
    /// As for [`new`](Self::new).
    pub fn from_config(config: &WorldConfig, pool: Arc<BufferPool>) -> WorldResult<Self> {
        Self::new(config.store.root.clone(), config.layout, pool)
    }

    /// Directory holding the region files.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Layout shared by every region of this store.
    #[must_use]
    pub const fn layout(&self) -> &WorldLayout {
        &self.layout
    }

    /// Pool backing every chunk of this store.
    #[must_use]
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// File for the region at `coord`.
    #[must_use]
    pub fn region_path(&self, coord: IVec2) -> PathBuf {
        self.root.join(format!("{}_{}.region", coord.x, coord.y))
    }

    /// Number of regions held in memory.
    #[must_use]
    pub fn cached_regions(&self) -> usize {
        self.loader.cache().len()
    }

    /// Returns the region at `coord`, reading it from disk (or creating it
    /// empty) at most once.
    ///
    /// # Errors
    ///
    /// - [`WorldError::OutOfRange`] outside the region domain
    /// - [`WorldError::Cancelled`] if `cancel` fires first
    /// - [`WorldError::StorageFailure`] if the file exists but cannot be read
    pub async fn load_region(&self, coord: IVec2, cancel: &CancelToken) -> WorldResult<Region> {
        let path = self.region_path(coord);
        let layout = self.layout;
        let pool = Arc::clone(&self.pool);

        self.loader
            .load(coord, cancel, move |coord| {
                run_blocking(move || read_region(&path, coord, &layout, pool))
            })
            .await
    }

    /// Writes every cached region to disk. Returns the number written.
    ///
    /// Each file is written to a temporary name, synced, then renamed into
    /// place, so a crash never leaves a partially written region file. The
    /// directory itself is synced once the batch is renamed.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::StorageFailure`] for the first region that
    /// cannot be written. Regions written before it stay written.
    pub async fn save_all(&self) -> WorldResult<usize> {
        let regions: Vec<Region> = self
            .loader
            .cache()
            .entries()
            .into_iter()
            .map(|(_, region)| region)
            .collect();
        let count = regions.len();
        let root = self.root.clone();
        let paths: Vec<PathBuf> = regions.iter().map(|r| self.region_path(r.coord())).collect();

        run_blocking(move || {
            std::fs::create_dir_all(&root).map_err(|e| WorldError::storage(&root, e))?;
            for (region, path) in regions.iter().zip(&paths) {
                write_region_atomic(path, region)?;
            }
            sync_dir(&root).map_err(|e| WorldError::storage(&root, e))
        })
        .await?;

        tracing::info!("Saved {} regions to {}", count, self.root.display());
        Ok(count)
    }
}

impl RegionSource for RegionStore {
    fn layout(&self) -> &WorldLayout {
        &self.layout
    }

    fn load_region(
        &self,
        coord: IVec2,
        cancel: &CancelToken,
    ) -> impl Future<Output = WorldResult<Region>> + Send {
        RegionStore::load_region(self, coord, cancel)
    }
}

impl std::fmt::Debug for RegionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionStore")
            .field("root", &self.root)
            .field("layout", &self.layout)
            .field("cached", &self.cached_regions())
            .finish_non_exhaustive()
    }
}

/// Region cache with no backing files.
///
/// Every region starts empty and lives as long as the store; nothing is
/// ever written.
pub struct MemoryRegionStore {
    layout: WorldLayout,
    pool: Arc<BufferPool>,
    loader: SingleFlight<IVec2, Region>,
}

impl MemoryRegionStore {
    /// Creates an empty in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidConfig`] if the layout is invalid or the
    /// pool's buffers do not match the layout's chunk volume.
    pub fn new(layout: WorldLayout, pool: Arc<BufferPool>) -> WorldResult<Self> {
        check_pool(&layout, &pool)?;
        Ok(Self {
            layout,
            pool,
            loader: SingleFlight::new(layout.region_domain()),
        })
    }

    /// Layout shared by every region of this store.
    #[must_use]
    pub const fn layout(&self) -> &WorldLayout {
        &self.layout
    }

    /// Number of regions held in memory.
    #[must_use]
    pub fn cached_regions(&self) -> usize {
        self.loader.cache().len()
    }

    /// Returns the region at `coord`, creating it empty on first use.
    ///
    /// # Errors
    ///
    /// - [`WorldError::OutOfRange`] outside the region domain
    /// - [`WorldError::Cancelled`] if `cancel` fires first
    pub async fn load_region(&self, coord: IVec2, cancel: &CancelToken) -> WorldResult<Region> {
        let layout = self.layout;
        let pool = Arc::clone(&self.pool);

        self.loader
            .load(coord, cancel, move |coord| async move {
                Ok(Region::new(coord, &layout, pool))
            })
            .await
    }
}

impl RegionSource for MemoryRegionStore {
    fn layout(&self) -> &WorldLayout {
        &self.layout
    }

    fn load_region(
        &self,
        coord: IVec2,
        cancel: &CancelToken,
    ) -> impl Future<Output = WorldResult<Region>> + Send {
        MemoryRegionStore::load_region(self, coord, cancel)
    }
}

impl std::fmt::Debug for MemoryRegionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRegionStore")
            .field("layout", &self.layout)
            .field("cached", &self.cached_regions())
            .finish_non_exhaustive()
    }
}

fn read_region(
    path: &Path,
    coord: IVec2,
    layout: &WorldLayout,
    pool: Arc<BufferPool>,
) -> WorldResult<Region> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("No file for region {}, starting empty", coord);
            return Ok(Region::new(coord, layout, pool));
        }
        Err(e) => return Err(WorldError::storage(path, e)),
    };

    let mut reader = FrameDecoder::new(BufReader::new(file));
    let region = Region::from_reader(coord, layout, pool, &mut reader)
        .map_err(|e| WorldError::storage(path, e))?;

    tracing::debug!(
        "Loaded region {} ({} chunks) from {}",
        coord,
        region.initialized_count(),
        path.display()
    );
    Ok(region)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_region_atomic(path: &Path, region: &Region) -> WorldResult<()> {
    let tmp = tmp_path(path);

    let written = write_region(&tmp, region).and_then(|()| std::fs::rename(&tmp, path));
    if let Err(e) = written {
        match std::fs::remove_file(&tmp) {
            Ok(()) => {}
            Err(cleanup) if cleanup.kind() == io::ErrorKind::NotFound => {}
            Err(cleanup) => {
                tracing::warn!("Could not remove {}: {}", tmp.display(), cleanup);
            }
        }
        return Err(WorldError::storage(path, e));
    }
    Ok(())
}

/// Makes renames inside `dir` durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

fn write_region(tmp: &Path, region: &Region) -> io::Result<()> {
    let file = File::create(tmp)?;
    let mut encoder = FrameEncoder::new(BufWriter::new(file));
    region.serialize(&mut encoder)?;

    let mut writer = encoder
        .finish()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    writer.flush()?;
    let file = writer.into_inner().map_err(io::IntoInnerError::into_error)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{BlockId, IVec3};

    const LAYOUT: WorldLayout = WorldLayout::new(2, 2, 4);

    fn store(root: &Path) -> RegionStore {
        RegionStore::new(root, LAYOUT, BufferPool::new(LAYOUT.chunk_volume(), 64)).unwrap()
    }

    #[test]
    fn test_region_path_and_tmp_path() {
        let store = store(Path::new("/data/world"));
        let path = store.region_path(IVec2::new(-2, 7));
        assert_eq!(path, PathBuf::from("/data/world/-2_7.region"));
        assert_eq!(tmp_path(&path), PathBuf::from("/data/world/-2_7.region.tmp"));
    }

    #[test]
    fn test_rejects_mismatched_pool() {
        let result = RegionStore::new("w", LAYOUT, BufferPool::new(7, 1));
        assert!(matches!(result, Err(WorldError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_missing_file_gives_empty_region_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let cancel = CancelToken::new();

        let a = store.load_region(IVec2::new(1, -1), &cancel).await.unwrap();
        let b = store.load_region(IVec2::new(1, -1), &cancel).await.unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(a.initialized_count(), 0);
        assert_eq!(store.cached_regions(), 1);
        // nothing is written until save_all
        assert!(!store.region_path(IVec2::new(1, -1)).exists());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelToken::new();
        let coord = IVec2::new(-1, 0);

        {
            let store = store(dir.path());
            let region = store.load_region(coord, &cancel).await.unwrap();
            let chunk = region.chunk_at(IVec2::new(3, 1)).unwrap();
            chunk.fill(BlockId::SAND);
            chunk.write(IVec3::new(0, 0, 3), BlockId::WATER).unwrap();
            chunk.set_initialized(true);
            region.mark_initialized(IVec2::new(3, 1)).unwrap();

            assert_eq!(store.save_all().await.unwrap(), 1);
        }

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(leftovers, vec!["-1_0.region".to_string()]);

        let store = store(dir.path());
        let region = store.load_region(coord, &cancel).await.unwrap();
        assert_eq!(region.initialized_count(), 1);
        assert!(region.is_initialized(IVec2::new(3, 1)).unwrap());
        let chunk = region.chunk_at(IVec2::new(3, 1)).unwrap();
        assert!(chunk.is_initialized());
        assert_eq!(chunk.read(IVec3::new(0, 0, 3)).unwrap(), BlockId::WATER);
        assert_eq!(chunk.read(IVec3::new(1, 1, 1)).unwrap(), BlockId::SAND);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_storage_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        std::fs::write(store.region_path(IVec2::ZERO), b"not an lz4 frame").unwrap();

        let err = store
            .load_region(IVec2::ZERO, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorldError::StorageFailure { .. }));
        assert_eq!(store.cached_regions(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_tmp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let coord = IVec2::new(2, 2);
        store.load_region(coord, &CancelToken::new()).await.unwrap();

        // a non-empty directory in the way makes the rename fail
        let blocked = store.region_path(coord);
        std::fs::create_dir_all(blocked.join("occupied")).unwrap();

        let err = store.save_all().await.unwrap_err();
        assert!(matches!(err, WorldError::StorageFailure { .. }));
        assert!(!tmp_path(&blocked).exists());
        assert!(blocked.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_sync_dir() {
        let dir = tempfile::tempdir().unwrap();
        sync_dir(dir.path()).unwrap();
        assert!(sync_dir(&dir.path().join("missing")).is_err());
    }

    #[tokio::test]
    async fn test_memory_store_shares_regions() {
        let store = MemoryRegionStore::new(LAYOUT, BufferPool::new(LAYOUT.chunk_volume(), 8))
            .unwrap();
        let cancel = CancelToken::new();

        let a = store.load_region(IVec2::new(-3, 4), &cancel).await.unwrap();
        let b = store.load_region(IVec2::new(-3, 4), &cancel).await.unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(a.coord(), IVec2::new(-3, 4));
        assert_eq!(a.initialized_count(), 0);
        assert_eq!(store.cached_regions(), 1);

        let beyond = IVec2::new(i32::MAX, 0);
        let err = store.load_region(beyond, &cancel).await.unwrap_err();
        assert!(matches!(err, WorldError::OutOfRange { .. }));
    }

    #[test]
    fn test_memory_store_rejects_mismatched_pool() {
        let result = MemoryRegionStore::new(LAYOUT, BufferPool::new(3, 1));
        assert!(matches!(result, Err(WorldError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_save_all_with_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir.path().join("nested"));
        assert_eq!(store.save_all().await.unwrap(), 0);
        assert!(dir.path().join("nested").is_dir());
    }
}
