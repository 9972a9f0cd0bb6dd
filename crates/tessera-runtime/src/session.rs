use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rayon::ThreadPoolBuildError;
use tessera_blocks::{DamageOutcome, MaterialCatalog, Voxel};
use tessera_chunk::{ChunkPool, ChunkPoolStats};
use tessera_edit::{EditStats, EditTracker};
use tessera_geom::Vec3;
use tessera_io::{FlushReport, PersistenceStore, StoreError, StoreStats};
use tessera_mesh_cpu::{MeshBuffer, SurfaceExtractor, build_extractor, extract_chunk};
use tessera_world::{ChunkCoord, LocalPos, TerrainGenerator};

use crate::config::SessionConfig;
use crate::events::MeshEvent;
use crate::lanes::{JobKind, JobOut, LoadSource, QueueCounts, Runtime, WorkerCtx};
use crate::streaming::{StreamCtx, StreamingManager, TickReport};

#[derive(Debug)]
pub enum SessionError {
    /// The chunk holding the position is not loaded.
    NotResident(ChunkCoord),
    /// `wy` lies outside `[0, world_height)`.
    OutOfWorld { wy: i32 },
    Store(StoreError),
    Config(String),
    Runtime(ThreadPoolBuildError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NotResident(c) => write!(f, "chunk {c} is not resident"),
            SessionError::OutOfWorld { wy } => write!(f, "y={wy} is outside the world"),
            SessionError::Store(e) => write!(f, "persistence: {e}"),
            SessionError::Config(msg) => write!(f, "invalid configuration: {msg}"),
            SessionError::Runtime(e) => write!(f, "worker pool: {e}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Store(e) => Some(e),
            SessionError::Runtime(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        SessionError::Store(e)
    }
}

impl From<ThreadPoolBuildError> for SessionError {
    fn from(e: ThreadPoolBuildError) -> Self {
        SessionError::Runtime(e)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Counters {
    meshes_attached: u64,
    meshes_discarded: u64,
    loaded_from_disk: u64,
    generated: u64,
    failures: u64,
    flushes: u64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SessionStats {
    pub tick: u64,
    pub resident: usize,
    pub loading: usize,
    pub cancelled: usize,
    pub queues: QueueCounts,
    pub store: StoreStats,
    pub pool: ChunkPoolStats,
    pub edits: EditStats,
    pub meshes_attached: u64,
    pub meshes_discarded: u64,
    pub loaded_from_disk: u64,
    pub generated: u64,
    pub failures: u64,
    pub flushes: u64,
}

/// Coordinating-thread facade: streams chunks around the actor, applies
/// worker results, accepts edits and hands finished meshes to the host.
pub struct WorldSession {
    cfg: SessionConfig,
    ctx: Arc<WorkerCtx>,
    runtime: Runtime,
    pool: ChunkPool,
    streaming: StreamingManager,
    edits: EditTracker,
    events: Vec<MeshEvent>,
    save_accum: f32,
    counters: Counters,
}

impl WorldSession {
    pub fn new(cfg: SessionConfig, catalog: MaterialCatalog) -> Result<Self, SessionError> {
        let extractor = build_extractor(&cfg.meshing);
        Self::with_extractor(cfg, catalog, extractor)
    }

    /// Like [`WorldSession::new`] with a caller-supplied extractor in the mesh lane.
    pub fn with_extractor(
        cfg: SessionConfig,
        catalog: MaterialCatalog,
        extractor: Box<dyn SurfaceExtractor>,
    ) -> Result<Self, SessionError> {
        cfg.validate().map_err(SessionError::Config)?;
        let edge = cfg.world.chunk_edge;
        let catalog = Arc::new(catalog);
        let store = PersistenceStore::open(
            cfg.persistence.save_dir.clone(),
            edge,
            cfg.persistence.format,
            cfg.persistence.cache_capacity,
            Arc::clone(&catalog),
        )?;
        let ctx = Arc::new(WorkerCtx {
            generator: Arc::new(TerrainGenerator::new(cfg.world.clone())),
            catalog,
            store: Arc::new(store),
            extractor,
        });
        let (w_load, w_mesh) = cfg.workers.resolve();
        let runtime = Runtime::new(Arc::clone(&ctx), w_load, w_mesh)?;
        let pool = ChunkPool::new(edge, cfg.streaming.max_loads_per_tick * 2);
        let streaming = StreamingManager::new(cfg.streaming.clone(), edge, cfg.world.vertical_chunks());
        log::info!(
            "session ready: edge={} world_height={} view_radius={} extractor={:?} save_dir={}",
            edge,
            cfg.world.world_height,
            cfg.streaming.view_radius,
            ctx.extractor.kind(),
            cfg.persistence.save_dir.display()
        );
        Ok(Self {
            edits: EditTracker::new(edge),
            cfg,
            ctx,
            runtime,
            pool,
            streaming,
            events: Vec::new(),
            save_accum: 0.0,
            counters: Counters::default(),
        })
    }

    #[inline]
    pub fn config(&self) -> &SessionConfig {
        &self.cfg
    }

    #[inline]
    pub fn catalog(&self) -> &MaterialCatalog {
        &self.ctx.catalog
    }

    #[inline]
    pub fn store(&self) -> &PersistenceStore {
        &self.ctx.store
    }

    #[inline]
    pub fn streaming(&self) -> &StreamingManager {
        &self.streaming
    }

    /// One coordinating step: apply worker results, stream around the actor,
    /// dispatch remeshes and run the save timer.
    pub fn update(&mut self, dt: f32, actor_pos: Vec3) -> TickReport {
        self.apply_results();
        let report = {
            let mut sctx = StreamCtx {
                pool: &self.pool,
                store: &self.ctx.store,
                runtime: &self.runtime,
                events: &mut self.events,
            };
            self.streaming.update(dt, actor_pos, &mut sctx)
        };
        for coord in &report.unloaded {
            self.edits.forget(*coord);
        }
        self.streaming.dispatch_remeshes(&self.runtime);

        self.save_accum += dt.max(0.0);
        if self.save_accum >= self.cfg.persistence.save_interval_secs {
            self.save_accum = 0.0;
            let saved = self.streaming.save_all(&self.ctx.store);
            if self.runtime.submit_flush() {
                log::info!(
                    target: "events",
                    "[tick {}] save scheduled resident={}",
                    self.streaming.ticks(),
                    saved
                );
            }
        }
        report
    }

    /// Applies every result waiting on the worker channel. Returns how many
    /// were drained.
    pub fn apply_results(&mut self) -> usize {
        let results = self.runtime.drain_worker_results();
        let n = results.len();
        let tick = self.streaming.ticks();
        for out in results {
            match out {
                JobOut::Loaded(l) => {
                    let (coord, source, occupancy, t_ms) = (l.coord, l.source, l.occupancy, l.t_ms);
                    if self.streaming.complete_load(l, &self.pool) {
                        match source {
                            LoadSource::Disk => self.counters.loaded_from_disk += 1,
                            LoadSource::Generated => self.counters.generated += 1,
                        }
                        log::info!(
                            target: "events",
                            "[tick {}] chunk loaded coord={} source={} empty={} t_ms={}",
                            tick,
                            coord,
                            source,
                            occupancy.is_empty(),
                            t_ms
                        );
                    }
                }
                JobOut::Meshed(m) => {
                    let (coord, t_ms) = (m.coord, m.t_ms);
                    if self.streaming.apply_mesh(m, &mut self.events) {
                        self.counters.meshes_attached += 1;
                        log::debug!(
                            target: "events",
                            "[tick {}] mesh attached coord={} t_ms={}",
                            tick,
                            coord,
                            t_ms
                        );
                    } else {
                        self.counters.meshes_discarded += 1;
                    }
                }
                JobOut::Flushed(r) => {
                    self.counters.flushes += 1;
                    if r.failed > 0 {
                        log::warn!("flush wrote {} chunks, {} failed", r.written, r.failed);
                    } else {
                        log::info!(target: "events", "[tick {}] flushed {} chunks", tick, r.written);
                    }
                }
                JobOut::Failed(f) => {
                    self.counters.failures += 1;
                    log::warn!(
                        "{:?} job failed coord={:?}: {}",
                        f.kind,
                        f.coord,
                        f.reason
                    );
                    match (f.kind, f.coord) {
                        (JobKind::Load, Some(c)) => self.streaming.fail_load(c, f.ticket),
                        (JobKind::Mesh, Some(c)) => {
                            self.streaming.fail_mesh(c, f.ticket, f.version);
                        }
                        _ => {}
                    }
                }
            }
        }
        n
    }

    /// Runs result application and remesh dispatch until every lane is idle
    /// or `timeout` passes. Does not stream.
    pub fn pump_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let drained = self.apply_results();
            let dispatched = self.streaming.dispatch_remeshes(&self.runtime);
            if drained == 0 && dispatched == 0 && self.runtime.queue_counts().is_idle() {
                // results are sent before a worker reads as idle
                if self.apply_results() == 0 {
                    return true;
                }
                continue;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn drain_mesh_events(&mut self) -> Vec<MeshEvent> {
        std::mem::take(&mut self.events)
    }

    fn resident_pos(&self, wx: i32, wy: i32, wz: i32) -> Result<(ChunkCoord, LocalPos), SessionError> {
        if wy < 0 || wy >= self.ctx.generator.world_height() {
            return Err(SessionError::OutOfWorld { wy });
        }
        let (coord, local) = self.edits.locate(wx, wy, wz);
        if self.streaming.chunk(coord).is_none() {
            return Err(SessionError::NotResident(coord));
        }
        Ok((coord, local))
    }

    fn propagate_edit(&mut self, wx: i32, wy: i32, wz: i32) {
        for coord in self.edits.record(wx, wy, wz).into_iter().skip(1) {
            self.streaming.mark_dirty(coord);
        }
    }

    pub fn get_voxel(&self, wx: i32, wy: i32, wz: i32) -> Result<Voxel, SessionError> {
        let (coord, local) = self.resident_pos(wx, wy, wz)?;
        self.streaming
            .chunk(coord)
            .map(|c| c.voxel(local))
            .ok_or(SessionError::NotResident(coord))
    }

    /// Writes a voxel and returns the previous one. The state class is taken
    /// from the catalog when `v` pairs a non-air material with the air state.
    pub fn set_voxel(&mut self, wx: i32, wy: i32, wz: i32, v: Voxel) -> Result<Voxel, SessionError> {
        let (coord, local) = self.resident_pos(wx, wy, wz)?;
        let v = self.ctx.catalog.normalize(v);
        let chunk = self
            .streaming
            .chunk_mut(coord)
            .ok_or(SessionError::NotResident(coord))?;
        let prev = chunk.set_voxel(local, v);
        self.propagate_edit(wx, wy, wz);
        Ok(prev)
    }

    /// Damages a solid voxel. Only a destroyed voxel changes any mesh.
    pub fn damage_voxel(
        &mut self,
        wx: i32,
        wy: i32,
        wz: i32,
        amount: f32,
    ) -> Result<DamageOutcome, SessionError> {
        let (coord, local) = self.resident_pos(wx, wy, wz)?;
        let chunk = self
            .streaming
            .chunk_mut(coord)
            .ok_or(SessionError::NotResident(coord))?;
        let outcome = chunk.damage_voxel(local, amount);
        if outcome == DamageOutcome::Destroyed {
            self.propagate_edit(wx, wy, wz);
        }
        Ok(outcome)
    }

    /// Queues a remesh of a resident chunk whether or not it is dirty.
    pub fn request_remesh(&mut self, coord: ChunkCoord) -> bool {
        self.streaming.request_remesh(coord, &self.runtime)
    }

    /// Extracts a resident chunk on the calling thread against the current
    /// resident set. Does not touch versions or events.
    pub fn extract_now(&self, coord: ChunkCoord) -> Option<MeshBuffer> {
        let chunk = self.streaming.chunk(coord)?;
        Some(extract_chunk(
            self.ctx.extractor.as_ref(),
            coord,
            chunk.grid(),
            &self.streaming,
            self.ctx.generator.world_height(),
            &self.ctx.catalog,
        ))
    }

    pub fn clear_saves(&self) -> Result<usize, SessionError> {
        Ok(self.ctx.store.clear_saves()?)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            tick: self.streaming.ticks(),
            resident: self.streaming.resident_count(),
            loading: self.streaming.loading_count(),
            cancelled: self.streaming.cancelled_count(),
            queues: self.runtime.queue_counts(),
            store: self.ctx.store.stats(),
            pool: self.pool.stats(),
            edits: self.edits.stats(),
            meshes_attached: self.counters.meshes_attached,
            meshes_discarded: self.counters.meshes_discarded,
            loaded_from_disk: self.counters.loaded_from_disk,
            generated: self.counters.generated,
            failures: self.counters.failures,
            flushes: self.counters.flushes,
        }
    }

    /// Saves every resident chunk and flushes the store on this thread.
    pub fn shutdown(mut self) -> FlushReport {
        let deadline = Instant::now() + Duration::from_secs(10);
        while self.runtime.queue_counts().io != Default::default() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        self.apply_results();
        let saved = self.streaming.save_all(&self.ctx.store);
        let report = self.ctx.store.flush_and_clear();
        log::info!(
            "shutdown: saved {} resident chunks, wrote {} files, {} failed",
            saved,
            report.written,
            report.failed
        );
        report
    }
}
