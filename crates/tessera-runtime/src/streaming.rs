use std::sync::Arc;

use hashbrown::HashMap;
use tessera_chunk::{Chunk, ChunkPool, VoxelGrid};
use tessera_geom::Vec3;
use tessera_io::PersistenceStore;
use tessera_mesh_cpu::{ChunkSource, NeighborSnapshot, neighbor_offsets};
use tessera_world::ChunkCoord;

use crate::config::StreamingConfig;
use crate::events::MeshEvent;
use crate::lanes::{LoadJob, LoadOut, MeshJob, MeshOut, Runtime};

/// Neighbors whose meshes read a chunk's cells: the six face neighbors plus
/// the lower diagonals a marching-cubes lattice reaches across.
const DEPENDENT_OFFSETS: [(i32, i32, i32); 10] = [
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
    (-1, -1, 0),
    (-1, 0, -1),
    (0, -1, -1),
    (-1, -1, -1),
];

/// Extraction attempts per chunk version before the chunk is left unmeshed
/// until its voxels change again.
pub const MAX_MESH_ATTEMPTS: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkState {
    Unloaded,
    Loading,
    Resident,
}

/// Collaborators a streaming step needs, borrowed from the session.
pub struct StreamCtx<'a> {
    pub pool: &'a ChunkPool,
    pub store: &'a PersistenceStore,
    pub runtime: &'a Runtime,
    pub events: &'a mut Vec<MeshEvent>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub ticked: bool,
    pub scheduled: usize,
    pub unloaded: Vec<ChunkCoord>,
    pub cancelled: usize,
}

/// Owns the resident set and decides which chunks load and unload around a
/// moving reference point. All methods run on the coordinating thread.
pub struct StreamingManager {
    cfg: StreamingConfig,
    edge: usize,
    vertical: i32,
    resident: HashMap<ChunkCoord, Chunk>,
    /// Coordinates with a load in flight, keyed to the ticket that may complete them.
    loading: HashMap<ChunkCoord, u64>,
    /// Loads still on the lane whose coordinate left the radius. Their result
    /// only returns the grid to the pool.
    cancelled: HashMap<ChunkCoord, u64>,
    /// Failed extraction attempts of the current version, per chunk.
    mesh_failures: HashMap<ChunkCoord, (u64, u32)>,
    next_ticket: u64,
    accum: f32,
    center: Option<ChunkCoord>,
    ticks: u64,
}

impl StreamingManager {
    pub fn new(cfg: StreamingConfig, edge: usize, vertical_chunks: i32) -> Self {
        Self {
            cfg,
            edge,
            vertical: vertical_chunks.max(1),
            resident: HashMap::new(),
            loading: HashMap::new(),
            cancelled: HashMap::new(),
            mesh_failures: HashMap::new(),
            next_ticket: 1,
            accum: 0.0,
            center: None,
            ticks: 0,
        }
    }

    #[inline]
    pub fn config(&self) -> &StreamingConfig {
        &self.cfg
    }

    #[inline]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    #[inline]
    pub fn center(&self) -> Option<ChunkCoord> {
        self.center
    }

    pub fn state(&self, coord: ChunkCoord) -> ChunkState {
        if self.resident.contains_key(&coord) {
            ChunkState::Resident
        } else if self.loading.contains_key(&coord) || self.cancelled.contains_key(&coord) {
            ChunkState::Loading
        } else {
            ChunkState::Unloaded
        }
    }

    #[inline]
    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.resident.get(&coord)
    }

    #[inline]
    pub fn chunk_mut(&mut self, coord: ChunkCoord) -> Option<&mut Chunk> {
        self.resident.get_mut(&coord)
    }

    #[inline]
    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }

    #[inline]
    pub fn loading_count(&self) -> usize {
        self.loading.len()
    }

    /// Cancelled loads whose result has not come back yet.
    #[inline]
    pub fn cancelled_count(&self) -> usize {
        self.cancelled.len()
    }

    pub fn resident_coords(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        self.resident.keys().copied()
    }

    /// Whether `coord` belongs to the desired set around `center`.
    pub fn is_desired(&self, center: ChunkCoord, coord: ChunkCoord) -> bool {
        coord.cy >= 0 && coord.cy < self.vertical && center.chebyshev_xz(coord) <= self.cfg.view_radius
    }

    /// Accumulates `dt` and streams around `pos` at most once per tick
    /// interval. The first call always streams.
    pub fn update(&mut self, dt: f32, pos: Vec3, ctx: &mut StreamCtx<'_>) -> TickReport {
        self.accum += dt.max(0.0);
        if self.ticks > 0 && self.accum < self.cfg.tick_interval_secs {
            return TickReport::default();
        }
        self.accum = 0.0;
        let center = ChunkCoord::containing(pos.x, pos.y, pos.z, self.edge);
        self.stream_around(center, ctx)
    }

    /// One streaming step around `center`, regardless of the tick timer.
    pub fn stream_around(&mut self, center: ChunkCoord, ctx: &mut StreamCtx<'_>) -> TickReport {
        self.ticks += 1;
        self.center = Some(center);
        let mut report = TickReport {
            ticked: true,
            ..TickReport::default()
        };

        let leaving: Vec<ChunkCoord> = self
            .resident
            .keys()
            .copied()
            .filter(|c| !self.is_desired(center, *c))
            .collect();
        for coord in leaving {
            if self.unload(coord, ctx) {
                report.unloaded.push(coord);
            }
        }

        let cancelled: Vec<ChunkCoord> = self
            .loading
            .keys()
            .copied()
            .filter(|c| !self.is_desired(center, *c))
            .collect();
        for coord in cancelled {
            if let Some(ticket) = self.loading.remove(&coord) {
                self.cancelled.insert(coord, ticket);
                log::debug!("[tick {}] load cancelled coord={}", self.ticks, coord);
                report.cancelled += 1;
            }
        }

        // back in range before the cancelled result arrived: keep that load
        let revived: Vec<ChunkCoord> = self
            .cancelled
            .keys()
            .copied()
            .filter(|c| self.is_desired(center, *c))
            .collect();
        for coord in revived {
            if let Some(ticket) = self.cancelled.remove(&coord) {
                self.loading.insert(coord, ticket);
                log::debug!("[tick {}] load resumed coord={}", self.ticks, coord);
            }
        }

        let r = self.cfg.view_radius;
        let focus = center.with_y(center.cy.clamp(0, self.vertical - 1));
        let mut wanted: Vec<ChunkCoord> = Vec::new();
        for dz in -r..=r {
            for dx in -r..=r {
                for cy in 0..self.vertical {
                    let c = ChunkCoord::new(center.cx + dx, cy, center.cz + dz);
                    if self.state(c) == ChunkState::Unloaded {
                        wanted.push(c);
                    }
                }
            }
        }
        wanted.sort_by_key(|c| (c.distance_sq(focus), *c));
        for coord in wanted.into_iter().take(self.cfg.max_loads_per_tick) {
            let ticket = self.next_ticket;
            self.next_ticket += 1;
            let job = LoadJob {
                coord,
                ticket,
                grid: ctx.pool.acquire(),
            };
            if ctx.runtime.submit_load(job) {
                self.loading.insert(coord, ticket);
                report.scheduled += 1;
            }
        }
        report
    }

    /// Saves the chunk into the store cache, detaches its mesh and returns its
    /// grid to the pool.
    pub fn unload(&mut self, coord: ChunkCoord, ctx: &mut StreamCtx<'_>) -> bool {
        let Some(chunk) = self.resident.remove(&coord) else {
            return false;
        };
        ctx.store.save(coord, chunk.grid());
        self.mesh_failures.remove(&coord);
        if chunk.attached_version() > 0 {
            ctx.events.push(MeshEvent::Detached { coord });
        }
        if let Some(grid) = chunk.into_grid() {
            ctx.pool.release(grid);
        }
        log::info!(target: "events", "[tick {}] chunk unloaded coord={}", self.ticks, coord);
        true
    }

    /// Admits a finished load. Results for cancelled or superseded tickets
    /// only give their grid back to the pool.
    pub fn complete_load(&mut self, out: LoadOut, pool: &ChunkPool) -> bool {
        if self.loading.get(&out.coord) != Some(&out.ticket) {
            if self.cancelled.get(&out.coord) == Some(&out.ticket) {
                self.cancelled.remove(&out.coord);
            }
            log::debug!(
                "[tick {}] discarding stale load coord={} ticket={}",
                self.ticks,
                out.coord,
                out.ticket
            );
            pool.release(out.grid);
            return false;
        }
        self.loading.remove(&out.coord);
        self.resident
            .insert(out.coord, Chunk::new(out.coord, out.grid, out.ticket));
        self.mark_dependents_dirty(out.coord);
        true
    }

    /// Frees a coordinate whose load failed so a later tick retries it.
    pub fn fail_load(&mut self, coord: ChunkCoord, ticket: u64) {
        if self.loading.get(&coord) == Some(&ticket) {
            self.loading.remove(&coord);
        } else if self.cancelled.get(&coord) == Some(&ticket) {
            self.cancelled.remove(&coord);
        }
    }

    /// Flags every resident chunk whose mesh reads cells of `coord`.
    pub fn mark_dependents_dirty(&mut self, coord: ChunkCoord) {
        for (dx, dy, dz) in DEPENDENT_OFFSETS {
            if let Some(n) = self.resident.get_mut(&coord.offset(dx, dy, dz)) {
                n.mark_dirty();
            }
        }
    }

    pub fn mark_dirty(&mut self, coord: ChunkCoord) -> bool {
        match self.resident.get_mut(&coord) {
            Some(c) => {
                c.mark_dirty();
                true
            }
            None => false,
        }
    }

    fn snapshot_neighbors(&self, coord: ChunkCoord) -> NeighborSnapshot {
        let mut snap = NeighborSnapshot::new();
        for (dx, dy, dz) in neighbor_offsets() {
            let n = coord.offset(dx, dy, dz);
            if let Some(chunk) = self.resident.get(&n) {
                snap.insert(n, chunk.snapshot());
            }
        }
        snap
    }

    fn dispatch(&mut self, coord: ChunkCoord, runtime: &Runtime) -> bool {
        let neighbors = self.snapshot_neighbors(coord);
        let Some(chunk) = self.resident.get_mut(&coord) else {
            return false;
        };
        let version = chunk.begin_remesh();
        let job = MeshJob {
            coord,
            slot: chunk.slot(),
            version,
            grid: chunk.snapshot(),
            neighbors,
        };
        if runtime.submit_mesh(job) {
            true
        } else {
            chunk.mark_dirty();
            false
        }
    }

    /// Submits a mesh job for every dirty resident chunk.
    pub fn dispatch_remeshes(&mut self, runtime: &Runtime) -> usize {
        let dirty: Vec<ChunkCoord> = self
            .resident
            .iter()
            .filter(|(_, c)| c.is_dirty())
            .map(|(k, _)| *k)
            .collect();
        dirty
            .into_iter()
            .filter(|c| self.dispatch(*c, runtime))
            .count()
    }

    /// Submits a mesh job for `coord` even if it is clean. A chunk whose
    /// current version is already attached moves to a new version first;
    /// otherwise the request repeats the pending version and at most one of
    /// the results attaches.
    pub fn request_remesh(&mut self, coord: ChunkCoord, runtime: &Runtime) -> bool {
        let Some(chunk) = self.resident.get_mut(&coord) else {
            return false;
        };
        if chunk.mesh_version() == chunk.attached_version() {
            chunk.mark_dirty();
        }
        self.dispatch(coord, runtime)
    }

    /// Attaches a finished mesh if its chunk is still the same residency and
    /// the mesh is of the current version.
    pub fn apply_mesh(&mut self, out: MeshOut, events: &mut Vec<MeshEvent>) -> bool {
        let Some(chunk) = self.resident.get_mut(&out.coord) else {
            log::debug!("discarding mesh for unloaded chunk {}", out.coord);
            return false;
        };
        if chunk.slot() != out.slot || !chunk.try_attach(out.version) {
            log::debug!(
                "discarding stale mesh coord={} version={} current={}",
                out.coord,
                out.version,
                chunk.mesh_version()
            );
            return false;
        }
        self.mesh_failures.remove(&out.coord);
        events.push(MeshEvent::Attached {
            coord: out.coord,
            mesh: Arc::new(out.mesh),
        });
        true
    }

    /// Re-queues a chunk whose mesh job failed, up to [`MAX_MESH_ATTEMPTS`]
    /// per version. Returns whether another attempt was queued.
    pub fn fail_mesh(&mut self, coord: ChunkCoord, slot: u64, version: u64) -> bool {
        let Some(chunk) = self.resident.get_mut(&coord) else {
            return false;
        };
        // an edit since dispatch has already queued a newer version
        if chunk.slot() != slot || chunk.mesh_version() != version {
            return false;
        }
        let entry = self.mesh_failures.entry(coord).or_insert((version, 0));
        if entry.0 != version {
            *entry = (version, 0);
        }
        entry.1 += 1;
        if entry.1 >= MAX_MESH_ATTEMPTS {
            log::warn!(
                "[tick {}] giving up on mesh coord={} version={} after {} attempts",
                self.ticks,
                coord,
                version,
                entry.1
            );
            return false;
        }
        chunk.retry_remesh();
        true
    }

    /// Failed attempts recorded against the current version of `coord`.
    pub fn mesh_attempts(&self, coord: ChunkCoord) -> u32 {
        match (self.resident.get(&coord), self.mesh_failures.get(&coord)) {
            (Some(chunk), Some(&(version, n))) if chunk.mesh_version() == version => n,
            _ => 0,
        }
    }

    /// Writes every resident chunk into the store cache without unloading.
    pub fn save_all(&self, store: &PersistenceStore) -> usize {
        for (coord, chunk) in &self.resident {
            store.save(*coord, chunk.grid());
        }
        self.resident.len()
    }
}

impl ChunkSource for StreamingManager {
    fn chunk_grid(&self, coord: ChunkCoord) -> Option<&VoxelGrid> {
        self.resident.get(&coord).map(|c| c.grid())
    }
}
