use std::sync::Arc;
use std::time::{Duration, Instant};

use tessera_blocks::MaterialCatalog;
use tessera_chunk::{ChunkOccupancy, ChunkPool, VoxelGrid};
use tessera_io::{FormatVersion, PersistenceStore};
use tessera_mesh_cpu::{ExtractOptions, build_extractor};
use tessera_runtime::{
    ChunkState, JobOut, LoadOut, LoadSource, MeshEvent, Runtime, StreamCtx, StreamingConfig,
    StreamingManager, WorkerCtx,
};
use tessera_world::{ChunkCoord, TerrainGenerator, WorldGenConfig};

const EDGE: usize = 8;
const LAYERS: i32 = 4;

struct Harness {
    _tmp: tempfile::TempDir,
    ctx: Arc<WorkerCtx>,
    runtime: Runtime,
    pool: ChunkPool,
    events: Vec<MeshEvent>,
}

impl Harness {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = Arc::new(MaterialCatalog::builtin());
        let store =
            PersistenceStore::open(tmp.path(), EDGE, FormatVersion::Durable, 64, Arc::clone(&catalog))
                .unwrap();
        let ctx = Arc::new(WorkerCtx {
            generator: Arc::new(TerrainGenerator::new(WorldGenConfig {
                chunk_edge: EDGE,
                world_height: EDGE as i32 * LAYERS,
                ..WorldGenConfig::default()
            })),
            catalog,
            store: Arc::new(store),
            extractor: build_extractor(&ExtractOptions::default()),
        });
        let runtime = Runtime::new(Arc::clone(&ctx), 2, 1).unwrap();
        Self {
            _tmp: tmp,
            ctx,
            runtime,
            pool: ChunkPool::new(EDGE, 256),
            events: Vec::new(),
        }
    }

    fn step(&mut self, mgr: &mut StreamingManager, center: ChunkCoord) -> tessera_runtime::TickReport {
        let mut sctx = StreamCtx {
            pool: &self.pool,
            store: &self.ctx.store,
            runtime: &self.runtime,
            events: &mut self.events,
        };
        mgr.stream_around(center, &mut sctx)
    }

    fn wait_for_loads(&self, n: usize) -> Vec<LoadOut> {
        let deadline = Instant::now() + Duration::from_secs(20);
        let mut out = Vec::new();
        while out.len() < n && Instant::now() < deadline {
            for r in self.runtime.drain_worker_results() {
                if let JobOut::Loaded(l) = r {
                    out.push(l);
                }
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        out
    }
}

fn manager() -> StreamingManager {
    let cfg = StreamingConfig {
        view_radius: 1,
        tick_interval_secs: 0.0,
        max_loads_per_tick: 64,
    };
    StreamingManager::new(cfg, EDGE, LAYERS)
}

fn lane_jobs(rt: &Runtime) -> usize {
    let q = rt.queue_counts();
    q.load.queued + q.load.inflight
}

#[test]
fn cancelled_loads_stay_tracked_until_their_result_returns() {
    let mut h = Harness::new();
    let mut mgr = manager();
    let home = ChunkCoord::new(0, 1, 0);
    let away = ChunkCoord::new(10, 1, 0);

    let r1 = h.step(&mut mgr, home);
    assert_eq!(r1.scheduled, 36);

    let r2 = h.step(&mut mgr, away);
    assert_eq!(r2.cancelled, 36);
    assert_eq!(r2.scheduled, 36);
    assert_eq!(mgr.cancelled_count(), 36);
    // still on the lane, so not free to load again
    assert_eq!(mgr.state(ChunkCoord::new(0, 0, 0)), ChunkState::Loading);

    // returning resumes the cancelled loads instead of submitting new ones
    let r3 = h.step(&mut mgr, home);
    assert_eq!(r3.scheduled, 0);
    assert_eq!(r3.cancelled, 36);
    assert_eq!(mgr.loading_count(), 36);
    assert_eq!(mgr.cancelled_count(), 36);
    assert!(lane_jobs(&h.runtime) <= mgr.loading_count() + mgr.cancelled_count());

    let idle_before = h.pool.stats().idle;
    let results = h.wait_for_loads(72);
    assert_eq!(results.len(), 72);
    let mut admitted = 0;
    for out in results {
        let coord = out.coord;
        if mgr.complete_load(out, &h.pool) {
            admitted += 1;
            assert!(mgr.is_desired(home, coord), "{coord}");
        }
    }
    assert_eq!(admitted, 36);
    assert_eq!(mgr.resident_count(), 36);
    assert_eq!(mgr.loading_count(), 0);
    assert_eq!(mgr.cancelled_count(), 0);
    assert_eq!(mgr.state(ChunkCoord::new(10, 0, 0)), ChunkState::Unloaded);
    assert_eq!(h.pool.stats().idle, idle_before + 36);
}

#[test]
fn stale_ticket_is_discarded_and_grid_pooled() {
    let h = Harness::new();
    let mut mgr = manager();
    let coord = ChunkCoord::new(0, 0, 0);
    let out = LoadOut {
        coord,
        ticket: 999,
        grid: VoxelGrid::new_air(EDGE),
        source: LoadSource::Generated,
        occupancy: ChunkOccupancy::Empty,
        t_ms: 0,
    };
    assert!(!mgr.complete_load(out, &h.pool));
    assert_eq!(mgr.state(coord), ChunkState::Unloaded);
    assert_eq!(h.pool.stats().idle, 1);
}

#[test]
fn superseded_load_result_is_ignored() {
    let mut h = Harness::new();
    let mut mgr = manager();
    let home = ChunkCoord::new(0, 0, 0);
    h.step(&mut mgr, home);
    // a load that failed for this coordinate frees it for a fresh ticket
    let results = h.wait_for_loads(36);
    let first = results.into_iter().find(|l| l.coord == home).unwrap();
    let stale_ticket = first.ticket;
    mgr.fail_load(home, stale_ticket);
    assert_eq!(mgr.state(home), ChunkState::Unloaded);
    let r = h.step(&mut mgr, home);
    assert_eq!(r.scheduled, 1);
    // the old result arriving late does not make the chunk resident
    assert!(!mgr.complete_load(first, &h.pool));
    assert_eq!(mgr.state(home), ChunkState::Loading);
}
