use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tessera_blocks::MaterialCatalog;
use tessera_chunk::VoxelGrid;
use tessera_world::ChunkCoord;

use crate::codec::{self, CodecError, FormatVersion};

#[derive(Debug)]
pub enum StoreError {
    Io { path: PathBuf, source: io::Error },
    Codec { coord: ChunkCoord, source: CodecError },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            StoreError::Codec { coord, source } => write!(f, "chunk {coord}: {source}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io { source, .. } => Some(source),
            StoreError::Codec { source, .. } => Some(source),
        }
    }
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub dirty: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub written: usize,
    pub failed: usize,
}

#[derive(Clone)]
struct CacheEntry {
    bytes: Arc<[u8]>,
    dirty: bool,
}

/// Write-back cache of encoded chunks in front of one file per chunk.
///
/// `save` only touches memory. Dirty entries reach disk on `flush` and are
/// never evicted before that; clean entries are evicted least recently used
/// first once the cache holds more than `capacity`.
pub struct PersistenceStore {
    dir: PathBuf,
    edge: usize,
    format: FormatVersion,
    catalog: Arc<MaterialCatalog>,
    entries: RwLock<HashMap<ChunkCoord, CacheEntry>>,
    order: Mutex<VecDeque<ChunkCoord>>,
    /// Held for a whole flush; writers share one temp path per chunk.
    flush_lock: Mutex<()>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl PersistenceStore {
    pub fn open(
        dir: impl Into<PathBuf>,
        edge: usize,
        format: FormatVersion,
        capacity: usize,
        catalog: Arc<MaterialCatalog>,
    ) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self {
            dir,
            edge,
            format,
            catalog,
            entries: RwLock::new(HashMap::new()),
            order: Mutex::new(VecDeque::new()),
            flush_lock: Mutex::new(()),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[inline]
    pub fn format(&self) -> FormatVersion {
        self.format
    }

    #[inline]
    pub fn edge(&self) -> usize {
        self.edge
    }

    pub fn path_for(&self, coord: ChunkCoord) -> PathBuf {
        self.dir
            .join(format!("chunk_{}_{}_{}.dat", coord.cx, coord.cy, coord.cz))
    }

    /// Encodes `grid` into the cache as a dirty entry.
    pub fn save(&self, coord: ChunkCoord, grid: &VoxelGrid) {
        let bytes: Arc<[u8]> = codec::encode(grid, coord, self.format).into();
        self.insert(coord, CacheEntry { bytes, dirty: true });
    }

    pub fn load(&self, coord: ChunkCoord) -> Result<Option<VoxelGrid>, StoreError> {
        let mut grid = VoxelGrid::new_air(self.edge);
        if self.load_into(coord, &mut grid)? {
            Ok(Some(grid))
        } else {
            Ok(None)
        }
    }

    /// Fills `grid` from the cache or the chunk file. `Ok(false)` when neither
    /// has the chunk; `grid` is then left untouched.
    pub fn load_into(&self, coord: ChunkCoord, grid: &mut VoxelGrid) -> Result<bool, StoreError> {
        let bytes = match self.lookup(&coord) {
            Some(bytes) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.touch(&coord);
                bytes
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                let path = self.path_for(coord);
                let bytes: Arc<[u8]> = match fs::read(&path) {
                    Ok(b) => b.into(),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
                    Err(e) => return Err(StoreError::io(&path, e)),
                };
                self.insert(
                    coord,
                    CacheEntry {
                        bytes: bytes.clone(),
                        dirty: false,
                    },
                );
                bytes
            }
        };
        if grid.edge() != self.edge {
            *grid = VoxelGrid::new_air(self.edge);
        }
        let report = codec::decode_into(&bytes, coord, self.format, &self.catalog, grid)
            .map_err(|source| StoreError::Codec { coord, source })?;
        if !report.is_clean() {
            log::warn!(
                "chunk {} decoded with {} unknown materials and {} repaired states",
                coord,
                report.unknown_materials,
                report.repaired_states
            );
        }
        Ok(true)
    }

    /// True when the chunk is cached or has a file on disk.
    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.lookup(&coord).is_some() || self.path_for(coord).is_file()
    }

    /// Writes every dirty entry. Failed writes stay dirty for the next flush.
    pub fn flush(&self) -> FlushReport {
        let _flushing = self.flush_lock.lock().unwrap();
        let pending: Vec<(ChunkCoord, Arc<[u8]>)> = {
            let entries = self.entries.read().unwrap();
            entries
                .iter()
                .filter(|(_, e)| e.dirty)
                .map(|(c, e)| (*c, e.bytes.clone()))
                .collect()
        };
        let mut report = FlushReport::default();
        for (coord, bytes) in pending {
            match self.write_file(coord, &bytes) {
                Ok(()) => {
                    report.written += 1;
                    let mut entries = self.entries.write().unwrap();
                    // a save that raced the write keeps its entry dirty
                    if let Some(e) = entries.get_mut(&coord) {
                        if Arc::ptr_eq(&e.bytes, &bytes) {
                            e.dirty = false;
                        }
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    log::warn!("flush of chunk {} failed: {}", coord, e);
                }
            }
        }
        self.enforce_capacity();
        if report.written > 0 || report.failed > 0 {
            log::debug!(
                "flushed {} chunks to {} ({} failed)",
                report.written,
                self.dir.display(),
                report.failed
            );
        }
        report
    }

    /// Flushes, then drops every clean entry. Entries whose write failed are
    /// kept so a later flush can retry them.
    pub fn flush_and_clear(&self) -> FlushReport {
        let report = self.flush();
        let mut entries = self.entries.write().unwrap();
        entries.retain(|_, e| e.dirty);
        let mut order = self.order.lock().unwrap();
        order.retain(|c| entries.contains_key(c));
        if !entries.is_empty() {
            log::warn!("{} chunks still unsaved after shutdown flush", entries.len());
        }
        report
    }

    /// Deletes every chunk file in the save directory and empties the cache.
    pub fn clear_saves(&self) -> Result<usize, StoreError> {
        {
            let mut entries = self.entries.write().unwrap();
            entries.clear();
            self.order.lock().unwrap().clear();
        }
        let mut removed = 0;
        let dir = fs::read_dir(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        for entry in dir {
            let entry = entry.map_err(|e| StoreError::io(&self.dir, e))?;
            let path = entry.path();
            let is_chunk = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| {
                    n.starts_with("chunk_") && (n.ends_with(".dat") || n.ends_with(".tmp"))
                });
            if is_chunk && path.is_file() {
                fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))?;
                removed += 1;
            }
        }
        log::info!("cleared {} chunk files from {}", removed, self.dir.display());
        Ok(removed)
    }

    pub fn stats(&self) -> StoreStats {
        let (entries, dirty) = self
            .entries
            .read()
            .map(|m| (m.len(), m.values().filter(|e| e.dirty).count()))
            .unwrap_or((0, 0));
        StoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries,
            dirty,
        }
    }

    fn write_file(&self, coord: ChunkCoord, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(coord);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes).map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| StoreError::io(&path, e))
    }

    fn lookup(&self, coord: &ChunkCoord) -> Option<Arc<[u8]>> {
        self.entries
            .read()
            .ok()
            .and_then(|map| map.get(coord).map(|e| e.bytes.clone()))
    }

    fn insert(&self, coord: ChunkCoord, entry: CacheEntry) {
        {
            let mut entries = self.entries.write().unwrap();
            entries.insert(coord, entry);
        }
        self.remove_from_order(&coord);
        self.order.lock().unwrap().push_back(coord);
        self.enforce_capacity();
    }

    fn touch(&self, coord: &ChunkCoord) {
        let mut order = self.order.lock().unwrap();
        if let Some(pos) = order.iter().position(|c| c == coord) {
            if let Some(entry) = order.remove(pos) {
                order.push_back(entry);
            }
        }
    }

    fn remove_from_order(&self, coord: &ChunkCoord) {
        let mut order = self.order.lock().unwrap();
        if let Some(pos) = order.iter().position(|c| c == coord) {
            order.remove(pos);
        }
    }

    /// Evicts clean entries from the cold end until within capacity.
    fn enforce_capacity(&self) {
        let mut entries = self.entries.write().unwrap();
        let mut order = self.order.lock().unwrap();
        let mut excess = entries.len().saturating_sub(self.capacity);
        if excess == 0 {
            return;
        }
        order.retain(|c| {
            if excess == 0 {
                return true;
            }
            match entries.get(c).map(|e| e.dirty) {
                Some(false) => {
                    entries.remove(c);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    excess -= 1;
                    false
                }
                Some(true) => true,
                None => false,
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_blocks::MaterialId;

    fn store(dir: &Path, capacity: usize) -> PersistenceStore {
        PersistenceStore::open(
            dir,
            2,
            FormatVersion::Durable,
            capacity,
            Arc::new(MaterialCatalog::builtin()),
        )
        .unwrap()
    }

    fn grid(m: MaterialId) -> VoxelGrid {
        let mut g = VoxelGrid::new_air(2);
        g.set(1, 0, 1, MaterialCatalog::builtin().voxel(m));
        g
    }

    #[test]
    fn dirty_entries_survive_capacity_pressure() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path(), 1);
        for i in 0..4 {
            s.save(ChunkCoord::new(i, 0, 0), &grid(MaterialId::Stone));
        }
        assert_eq!(s.stats().entries, 4);
        assert_eq!(s.stats().dirty, 4);
        let report = s.flush();
        assert_eq!(report, FlushReport { written: 4, failed: 0 });
        let st = s.stats();
        assert_eq!((st.entries, st.dirty, st.evictions), (1, 0, 3));
    }

    #[test]
    fn file_name_encodes_coordinate() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path(), 8);
        let p = s.path_for(ChunkCoord::new(-1, 2, 30));
        assert_eq!(p.file_name().and_then(|n| n.to_str()), Some("chunk_-1_2_30.dat"));
    }

    #[test]
    fn evicted_chunk_reloads_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path(), 0);
        let c = ChunkCoord::new(3, 1, -2);
        s.save(c, &grid(MaterialId::Cobblestone));
        s.flush();
        assert_eq!(s.stats().entries, 0);
        let back = s.load(c).unwrap().unwrap();
        assert_eq!(back, grid(MaterialId::Cobblestone));
        assert_eq!(s.stats().misses, 1);
    }
}
