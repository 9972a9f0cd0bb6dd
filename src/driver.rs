use std::error::Error;
use std::fmt;
use std::time::Duration;

use hashbrown::HashMap;
use tessera_blocks::{MaterialCatalog, MaterialId};
use tessera_geom::Vec3;
use tessera_io::FlushReport;
use tessera_runtime::{MeshEvent, SessionConfig, SessionError, WorldSession};
use tessera_world::ChunkCoord;

const WALK_SPEED: f32 = 6.0;
const EDIT_EVERY: u64 = 20;
const STATS_EVERY: u64 = 100;
const LOCKSTEP_BUDGET: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug)]
pub struct DriverOptions {
    pub ticks: u64,
    pub dt: f32,
    pub clear_saves: bool,
    /// Wait for every lane to go idle after each tick.
    pub lockstep: bool,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub ticks: u64,
    pub distance: f32,
    pub attached: u64,
    pub detached: u64,
    pub live_meshes: usize,
    pub live_triangles: usize,
    pub digs: u64,
    pub places: u64,
    pub flush: FlushReport,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ticks:          {}", self.ticks)?;
        writeln!(f, "distance:       {:.1}", self.distance)?;
        writeln!(f, "meshes:         {} attached, {} detached", self.attached, self.detached)?;
        writeln!(f, "live meshes:    {} ({} triangles)", self.live_meshes, self.live_triangles)?;
        writeln!(f, "edits:          {} dug, {} placed", self.digs, self.places)?;
        write!(f, "saved:          {} written, {} failed", self.flush.written, self.flush.failed)
    }
}

/// What the host would keep: the latest mesh per chunk.
#[derive(Default)]
struct MeshSink {
    triangles: HashMap<ChunkCoord, usize>,
    attached: u64,
    detached: u64,
}

impl MeshSink {
    fn consume(&mut self, events: Vec<MeshEvent>) {
        for ev in events {
            match ev {
                MeshEvent::Attached { coord, mesh } => {
                    self.triangles.insert(coord, mesh.triangle_count());
                    self.attached += 1;
                }
                MeshEvent::Detached { coord } => {
                    self.triangles.remove(&coord);
                    self.detached += 1;
                }
            }
        }
    }

    fn live_triangles(&self) -> usize {
        self.triangles.values().sum()
    }
}

/// Highest non-air cell of a resident column.
fn surface_y(session: &WorldSession, wx: i32, wz: i32) -> Result<Option<i32>, SessionError> {
    let top = session.config().world.world_height - 1;
    for wy in (0..=top).rev() {
        if !session.get_voxel(wx, wy, wz)?.is_air() {
            return Ok(Some(wy));
        }
    }
    Ok(None)
}

/// Digs the surface two cells ahead and stacks cobblestone three ahead.
fn edit_ahead(session: &mut WorldSession, pos: Vec3, summary: &mut RunSummary) -> Result<(), SessionError> {
    let (ax, az) = (pos.x.floor() as i32, pos.z.floor() as i32);
    if let Some(wy) = surface_y(session, ax + 2, az)? {
        let air = session.catalog().voxel(MaterialId::Air);
        session.set_voxel(ax + 2, wy, az, air)?;
        summary.digs += 1;
    }
    let place_y = surface_y(session, ax + 3, az)?.map_or(0, |y| y + 1);
    if place_y < session.config().world.world_height {
        let cobble = session.catalog().voxel(MaterialId::Cobblestone);
        session.set_voxel(ax + 3, place_y, az, cobble)?;
        summary.places += 1;
    }
    Ok(())
}

fn log_stats(session: &WorldSession) {
    let s = session.stats();
    log::info!(
        "[tick {}] resident={} loading={} cancelled={} load_q={}/{} mesh_q={}/{} cache entries={} dirty={} hits={} misses={} evictions={} meshes_attached={} discarded={} failures={}",
        s.tick,
        s.resident,
        s.loading,
        s.cancelled,
        s.queues.load.queued,
        s.queues.load.inflight,
        s.queues.mesh.queued,
        s.queues.mesh.inflight,
        s.store.entries,
        s.store.dirty,
        s.store.hits,
        s.store.misses,
        s.store.evictions,
        s.meshes_attached,
        s.meshes_discarded,
        s.failures
    );
}

/// Walks a simulated actor along +x for `opts.ticks` steps, editing the
/// terrain in front of it, then flushes everything to disk.
pub fn run(
    cfg: SessionConfig,
    catalog: MaterialCatalog,
    opts: DriverOptions,
) -> Result<RunSummary, Box<dyn Error>> {
    let spawn_y = cfg.world.world_height as f32 * 0.8;
    let mut session = WorldSession::new(cfg, catalog)?;
    if opts.clear_saves {
        session.clear_saves()?;
    }

    let start = Vec3::new(0.5, spawn_y, 0.5);
    let mut pos = start;
    let mut sink = MeshSink::default();
    let mut summary = RunSummary::default();
    for tick in 0..opts.ticks {
        session.update(opts.dt, pos);
        if opts.lockstep && !session.pump_until_idle(LOCKSTEP_BUDGET) {
            log::warn!("[tick {}] workers still busy after {:?}", tick, LOCKSTEP_BUDGET);
        }
        sink.consume(session.drain_mesh_events());
        if tick > 0 && tick % EDIT_EVERY == 0 {
            if let Err(e) = edit_ahead(&mut session, pos, &mut summary) {
                log::debug!("[tick {}] edit skipped: {}", tick, e);
            }
        }
        if tick % STATS_EVERY == 0 {
            log_stats(&session);
        }
        pos.x += WALK_SPEED * opts.dt;
        summary.ticks += 1;
    }

    session.pump_until_idle(Duration::from_secs(10));
    sink.consume(session.drain_mesh_events());
    log_stats(&session);

    summary.distance = pos.x - start.x;
    summary.attached = sink.attached;
    summary.detached = sink.detached;
    summary.live_meshes = sink.triangles.len();
    summary.live_triangles = sink.live_triangles();
    summary.flush = session.shutdown();
    Ok(summary)
}
