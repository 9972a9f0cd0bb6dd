use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, unbounded};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use tessera_blocks::MaterialCatalog;
use tessera_chunk::{ChunkOccupancy, VoxelGrid, fill_generated};
use tessera_io::{FlushReport, PersistenceStore};
use tessera_mesh_cpu::{MeshBuffer, NeighborSnapshot, SurfaceExtractor, extract_chunk};
use tessera_world::{ChunkCoord, TerrainGenerator};

/// Shared, read-only state every worker needs.
pub struct WorkerCtx {
    pub generator: Arc<TerrainGenerator>,
    pub catalog: Arc<MaterialCatalog>,
    pub store: Arc<PersistenceStore>,
    pub extractor: Box<dyn SurfaceExtractor>,
}

pub struct LoadJob {
    pub coord: ChunkCoord,
    pub ticket: u64,
    /// Pooled grid to fill; contents are overwritten.
    pub grid: VoxelGrid,
}

pub struct MeshJob {
    pub coord: ChunkCoord,
    pub slot: u64,
    pub version: u64,
    pub grid: Arc<VoxelGrid>,
    pub neighbors: NeighborSnapshot,
}

pub enum IoJob {
    Flush,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadSource {
    Disk,
    Generated,
}

impl fmt::Display for LoadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoadSource::Disk => "disk",
            LoadSource::Generated => "generated",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobKind {
    Load,
    Mesh,
    Io,
}

pub struct LoadOut {
    pub coord: ChunkCoord,
    pub ticket: u64,
    pub grid: VoxelGrid,
    pub source: LoadSource,
    pub occupancy: ChunkOccupancy,
    pub t_ms: u32,
}

pub struct MeshOut {
    pub coord: ChunkCoord,
    pub slot: u64,
    pub version: u64,
    pub mesh: MeshBuffer,
    pub t_ms: u32,
}

#[derive(Debug)]
pub struct JobFailure {
    pub kind: JobKind,
    pub coord: Option<ChunkCoord>,
    /// Load ticket or mesh slot of the failed job.
    pub ticket: u64,
    /// Mesh version the job was building; 0 for other lanes.
    pub version: u64,
    pub reason: String,
}

pub enum JobOut {
    Loaded(LoadOut),
    Meshed(MeshOut),
    Flushed(FlushReport),
    Failed(JobFailure),
}

#[inline]
fn elapsed_ms(t0: Instant) -> u32 {
    t0.elapsed().as_millis().min(u128::from(u32::MAX)) as u32
}

fn panic_reason(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

fn process_load(job: LoadJob, ctx: &WorkerCtx) -> LoadOut {
    let LoadJob {
        coord,
        ticket,
        mut grid,
    } = job;
    let t0 = Instant::now();
    let source = match ctx.store.load_into(coord, &mut grid) {
        Ok(true) => LoadSource::Disk,
        Ok(false) => LoadSource::Generated,
        Err(e) => {
            log::error!("load of chunk {} failed, regenerating: {}", coord, e);
            LoadSource::Generated
        }
    };
    let occupancy = match source {
        LoadSource::Disk => ChunkOccupancy::of(&grid),
        LoadSource::Generated => fill_generated(&ctx.generator, &ctx.catalog, coord, &mut grid),
    };
    LoadOut {
        coord,
        ticket,
        grid,
        source,
        occupancy,
        t_ms: elapsed_ms(t0),
    }
}

fn process_mesh(job: MeshJob, ctx: &WorkerCtx) -> MeshOut {
    let t0 = Instant::now();
    let mesh = extract_chunk(
        ctx.extractor.as_ref(),
        job.coord,
        &job.grid,
        &job.neighbors,
        ctx.generator.world_height(),
        &ctx.catalog,
    );
    MeshOut {
        coord: job.coord,
        slot: job.slot,
        version: job.version,
        mesh,
        t_ms: elapsed_ms(t0),
    }
}

fn run_load(job: LoadJob, ctx: &WorkerCtx) -> JobOut {
    let (coord, ticket) = (job.coord, job.ticket);
    match panic::catch_unwind(AssertUnwindSafe(|| process_load(job, ctx))) {
        Ok(out) => JobOut::Loaded(out),
        Err(p) => JobOut::Failed(JobFailure {
            kind: JobKind::Load,
            coord: Some(coord),
            ticket,
            version: 0,
            reason: panic_reason(p),
        }),
    }
}

fn run_mesh(job: MeshJob, ctx: &WorkerCtx) -> JobOut {
    let (coord, slot, version) = (job.coord, job.slot, job.version);
    match panic::catch_unwind(AssertUnwindSafe(|| process_mesh(job, ctx))) {
        Ok(out) => JobOut::Meshed(out),
        Err(p) => JobOut::Failed(JobFailure {
            kind: JobKind::Mesh,
            coord: Some(coord),
            ticket: slot,
            version,
            reason: panic_reason(p),
        }),
    }
}

fn run_io(job: IoJob, ctx: &WorkerCtx) -> JobOut {
    match job {
        IoJob::Flush => match panic::catch_unwind(AssertUnwindSafe(|| ctx.store.flush())) {
            Ok(report) => JobOut::Flushed(report),
            Err(p) => JobOut::Failed(JobFailure {
                kind: JobKind::Io,
                coord: None,
                ticket: 0,
                version: 0,
                reason: panic_reason(p),
            }),
        },
    }
}

/// Queue depth and in-flight count of one lane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LaneCounts {
    pub queued: usize,
    pub inflight: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub load: LaneCounts,
    pub mesh: LaneCounts,
    pub io: LaneCounts,
}

impl QueueCounts {
    pub fn is_idle(&self) -> bool {
        [self.load, self.mesh, self.io]
            .iter()
            .all(|l| l.queued == 0 && l.inflight == 0)
    }
}

struct Lane<J> {
    tx: Sender<J>,
    queued: Arc<AtomicUsize>,
    inflight: Arc<AtomicUsize>,
    _pool: Arc<ThreadPool>,
}

impl<J: Send + 'static> Lane<J> {
    fn spawn(
        name: &'static str,
        workers: usize,
        ctx: &Arc<WorkerCtx>,
        res_tx: &Sender<JobOut>,
        run: fn(J, &WorkerCtx) -> JobOut,
    ) -> Result<Self, ThreadPoolBuildError> {
        let (tx, rx): (Sender<J>, Receiver<J>) = unbounded();
        let workers = workers.max(1);
        let pool = Arc::new(
            ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(move |i| format!("tessera-{name}-{i}"))
                .build()?,
        );
        let queued = Arc::new(AtomicUsize::new(0));
        let inflight = Arc::new(AtomicUsize::new(0));
        for _ in 0..workers {
            let rx = rx.clone();
            let res_tx = res_tx.clone();
            let ctx = Arc::clone(ctx);
            let queued = Arc::clone(&queued);
            let inflight = Arc::clone(&inflight);
            pool.spawn(move || {
                while let Ok(job) = rx.recv() {
                    // in-flight first so the lane never reads as idle mid-hand-off
                    inflight.fetch_add(1, Ordering::AcqRel);
                    queued.fetch_sub(1, Ordering::AcqRel);
                    let out = run(job, ctx.as_ref());
                    let _ = res_tx.send(out);
                    inflight.fetch_sub(1, Ordering::AcqRel);
                }
            });
        }
        Ok(Self {
            tx,
            queued,
            inflight,
            _pool: pool,
        })
    }

    fn submit(&self, job: J) -> bool {
        self.queued.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(job).is_err() {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }

    fn counts(&self) -> LaneCounts {
        LaneCounts {
            queued: self.queued.load(Ordering::Acquire),
            inflight: self.inflight.load(Ordering::Acquire),
        }
    }
}

/// Worker pools for loading, meshing and disk flushes. Results of all lanes
/// arrive on one channel drained by the coordinating thread.
pub struct Runtime {
    load: Lane<LoadJob>,
    mesh: Lane<MeshJob>,
    io: Lane<IoJob>,
    res_rx: Receiver<JobOut>,
    pub w_load: usize,
    pub w_mesh: usize,
}

impl Runtime {
    pub fn new(
        ctx: Arc<WorkerCtx>,
        load_workers: usize,
        mesh_workers: usize,
    ) -> Result<Self, ThreadPoolBuildError> {
        let (res_tx, res_rx) = unbounded::<JobOut>();
        let load = Lane::spawn("load", load_workers, &ctx, &res_tx, run_load)?;
        let mesh = Lane::spawn("mesh", mesh_workers, &ctx, &res_tx, run_mesh)?;
        let io = Lane::spawn("io", 1, &ctx, &res_tx, run_io)?;
        log::debug!(
            "runtime started with {} load and {} mesh workers",
            load_workers.max(1),
            mesh_workers.max(1)
        );
        Ok(Self {
            load,
            mesh,
            io,
            res_rx,
            w_load: load_workers.max(1),
            w_mesh: mesh_workers.max(1),
        })
    }

    pub fn submit_load(&self, job: LoadJob) -> bool {
        self.load.submit(job)
    }

    pub fn submit_mesh(&self, job: MeshJob) -> bool {
        self.mesh.submit(job)
    }

    pub fn submit_flush(&self) -> bool {
        self.io.submit(IoJob::Flush)
    }

    pub fn drain_worker_results(&self) -> Vec<JobOut> {
        self.res_rx.try_iter().collect()
    }

    pub fn queue_counts(&self) -> QueueCounts {
        QueueCounts {
            load: self.load.counts(),
            mesh: self.mesh.counts(),
            io: self.io.counts(),
        }
    }
}
