use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::Arc;

use tessera_blocks::Voxel;
use tessera_chunk::VoxelGrid;
use tessera_world::ChunkCoord;

/// Read access to whatever chunks are currently available, keyed by coordinate.
pub trait ChunkSource {
    fn chunk_grid(&self, coord: ChunkCoord) -> Option<&VoxelGrid>;
}

impl<S: BuildHasher> ChunkSource for HashMap<ChunkCoord, VoxelGrid, S> {
    fn chunk_grid(&self, coord: ChunkCoord) -> Option<&VoxelGrid> {
        self.get(&coord)
    }
}

impl<S: BuildHasher> ChunkSource for hashbrown::HashMap<ChunkCoord, VoxelGrid, S> {
    fn chunk_grid(&self, coord: ChunkCoord) -> Option<&VoxelGrid> {
        self.get(&coord)
    }
}

/// No neighbors at all; every cross-boundary lookup is `Missing`.
pub struct Isolated;

impl ChunkSource for Isolated {
    fn chunk_grid(&self, _coord: ChunkCoord) -> Option<&VoxelGrid> {
        None
    }
}

/// Immutable copy of the neighbor grids a mesh job may read, captured on the
/// coordinating thread at dispatch.
#[derive(Clone, Default)]
pub struct NeighborSnapshot {
    grids: hashbrown::HashMap<ChunkCoord, Arc<VoxelGrid>>,
}

impl NeighborSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, coord: ChunkCoord, grid: Arc<VoxelGrid>) {
        self.grids.insert(coord, grid);
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }

    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.grids.contains_key(&coord)
    }
}

impl ChunkSource for NeighborSnapshot {
    fn chunk_grid(&self, coord: ChunkCoord) -> Option<&VoxelGrid> {
        self.grids.get(&coord).map(|g| g.as_ref())
    }
}

/// Offsets of all 26 chunks around a center.
pub fn neighbor_offsets() -> impl Iterator<Item = (i32, i32, i32)> {
    (-1..=1).flat_map(|dy| {
        (-1..=1).flat_map(move |dz| {
            (-1..=1)
                .map(move |dx| (dx, dy, dz))
                .filter(|&d| d != (0, 0, 0))
        })
    })
}

/// Result of a neighbor-aware voxel read.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Sample {
    Found(Voxel),
    /// At or above the world height. Reads as air.
    AboveWorld,
    /// Below world y = 0. Reads as solid.
    BelowWorld,
    /// The owning chunk is not resident.
    Missing,
}

impl Sample {
    /// `false` only for `Missing`.
    #[inline]
    pub fn found(&self) -> bool {
        !matches!(self, Sample::Missing)
    }

    #[inline]
    pub fn voxel(&self) -> Option<Voxel> {
        match *self {
            Sample::Found(v) => Some(v),
            Sample::AboveWorld => Some(Voxel::AIR),
            Sample::BelowWorld => Some(Voxel::BOUNDARY),
            Sample::Missing => None,
        }
    }
}

/// Resolves voxel reads that may step outside the chunk being meshed.
pub struct ChunkNeighborResolver<'a> {
    source: &'a dyn ChunkSource,
    edge: i32,
    world_height: i32,
}

impl<'a> ChunkNeighborResolver<'a> {
    pub fn new(source: &'a dyn ChunkSource, edge: usize, world_height: i32) -> Self {
        Self {
            source,
            edge: edge as i32,
            world_height,
        }
    }

    #[inline]
    pub fn edge(&self) -> usize {
        self.edge as usize
    }

    #[inline]
    pub fn world_height(&self) -> i32 {
        self.world_height
    }

    /// Reads the cell one step of `dir` away from local `(x, y, z)` in `origin`.
    #[inline]
    pub fn lookup(
        &self,
        origin: ChunkCoord,
        grid: &VoxelGrid,
        x: i32,
        y: i32,
        z: i32,
        dir: (i32, i32, i32),
    ) -> Sample {
        self.sample(origin, grid, x + dir.0, y + dir.1, z + dir.2)
    }

    /// Reads local `(tx, ty, tz)` of `origin`, where the coordinates may fall
    /// outside `[0, edge)` on any number of axes.
    pub fn sample(&self, origin: ChunkCoord, grid: &VoxelGrid, tx: i32, ty: i32, tz: i32) -> Sample {
        if let Some(v) = grid.get_signed(tx, ty, tz) {
            return Sample::Found(v);
        }
        let e = self.edge;
        let wy = origin.cy * e + ty;
        if wy >= self.world_height {
            return Sample::AboveWorld;
        }
        if wy < 0 {
            return Sample::BelowWorld;
        }
        let coord = origin.offset(tx.div_euclid(e), ty.div_euclid(e), tz.div_euclid(e));
        match self.source.chunk_grid(coord) {
            Some(g) => Sample::Found(g.get(
                tx.rem_euclid(e) as usize,
                ty.rem_euclid(e) as usize,
                tz.rem_euclid(e) as usize,
            )),
            None => Sample::Missing,
        }
    }

    /// Reads a world position straight from the source.
    pub fn sample_world(&self, wx: i32, wy: i32, wz: i32) -> Sample {
        if wy >= self.world_height {
            return Sample::AboveWorld;
        }
        if wy < 0 {
            return Sample::BelowWorld;
        }
        let (coord, l) = ChunkCoord::locate(wx, wy, wz, self.edge as usize);
        match self.source.chunk_grid(coord) {
            Some(g) => Sample::Found(g.get(l.x, l.y, l.z)),
            None => Sample::Missing,
        }
    }
}
