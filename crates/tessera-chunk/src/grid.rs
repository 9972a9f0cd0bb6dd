use tessera_blocks::Voxel;
use tessera_world::LocalPos;

/// Cubic `edge³` voxel array, x fastest then z then y.
#[derive(Clone, Debug, PartialEq)]
pub struct VoxelGrid {
    edge: usize,
    cells: Vec<Voxel>,
}

impl VoxelGrid {
    pub fn new_air(edge: usize) -> Self {
        Self {
            edge,
            cells: vec![Voxel::AIR; edge * edge * edge],
        }
    }

    /// Wraps `cells`, padding with air or truncating to exactly `edge³`.
    pub fn from_cells(edge: usize, cells: Vec<Voxel>) -> Self {
        let mut c = cells;
        let expect = edge * edge * edge;
        if c.len() != expect {
            c.resize(expect, Voxel::AIR);
        }
        Self { edge, cells: c }
    }

    #[inline]
    pub fn edge(&self) -> usize {
        self.edge
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn idx(&self, x: usize, y: usize, z: usize) -> usize {
        (y * self.edge + z) * self.edge + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> Voxel {
        self.cells[self.idx(x, y, z)]
    }

    #[inline]
    pub fn get_at(&self, p: LocalPos) -> Voxel {
        self.get(p.x, p.y, p.z)
    }

    /// Reads with signed coordinates, `None` outside `[0, edge)`.
    #[inline]
    pub fn get_signed(&self, x: i32, y: i32, z: i32) -> Option<Voxel> {
        let e = self.edge as i32;
        if x < 0 || y < 0 || z < 0 || x >= e || y >= e || z >= e {
            return None;
        }
        Some(self.get(x as usize, y as usize, z as usize))
    }

    /// Writes a cell and returns the previous value.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, z: usize, v: Voxel) -> Voxel {
        let i = self.idx(x, y, z);
        std::mem::replace(&mut self.cells[i], v)
    }

    #[inline]
    pub fn get_mut(&mut self, p: LocalPos) -> &mut Voxel {
        let i = self.idx(p.x, p.y, p.z);
        &mut self.cells[i]
    }

    pub fn fill(&mut self, v: Voxel) {
        self.cells.fill(v);
    }

    #[inline]
    pub fn cells(&self) -> &[Voxel] {
        &self.cells
    }

    #[inline]
    pub fn cells_mut(&mut self) -> &mut [Voxel] {
        &mut self.cells
    }

    #[inline]
    pub fn has_non_air(&self) -> bool {
        self.cells.iter().any(|v| !v.is_air())
    }

    #[inline]
    pub fn is_all_air(&self) -> bool {
        !self.has_non_air()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChunkOccupancy {
    Empty,
    Populated,
}

impl ChunkOccupancy {
    #[inline]
    pub fn of(grid: &VoxelGrid) -> Self {
        if grid.has_non_air() {
            ChunkOccupancy::Populated
        } else {
            ChunkOccupancy::Empty
        }
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        matches!(self, ChunkOccupancy::Empty)
    }

    #[inline]
    pub fn has_blocks(self) -> bool {
        matches!(self, ChunkOccupancy::Populated)
    }
}
