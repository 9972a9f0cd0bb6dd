use tessera_blocks::{MaterialCatalog, MaterialId, Voxel};
use tessera_world::{ChunkCoord, TerrainGenerator};

use crate::grid::{ChunkOccupancy, VoxelGrid};

/// Overwrites every cell of `grid` with generated terrain for `coord`.
/// Columns are sampled at world-space positions so adjacent chunks agree.
pub fn fill_generated(
    generator: &TerrainGenerator,
    catalog: &MaterialCatalog,
    coord: ChunkCoord,
    grid: &mut VoxelGrid,
) -> ChunkOccupancy {
    let edge = generator.chunk_edge();
    if grid.edge() != edge {
        *grid = VoxelGrid::new_air(edge);
    }
    let palette: [Voxel; MaterialId::COUNT] = MaterialId::ALL.map(|m| catalog.voxel(m));
    let (base_x, base_y, base_z) = coord.origin(edge);
    let mut has_blocks = false;
    for z in 0..edge {
        for x in 0..edge {
            let wx = base_x + x as i32;
            let wz = base_z + z as i32;
            let height = generator.column_height(wx, wz);
            for y in 0..edge {
                let m = generator.material_at(base_y + y as i32, height);
                if m != MaterialId::Air {
                    has_blocks = true;
                }
                grid.set(x, y, z, palette[m.index()]);
            }
        }
    }
    if has_blocks {
        ChunkOccupancy::Populated
    } else {
        ChunkOccupancy::Empty
    }
}

pub fn generate_grid(
    generator: &TerrainGenerator,
    catalog: &MaterialCatalog,
    coord: ChunkCoord,
) -> VoxelGrid {
    let mut grid = VoxelGrid::new_air(generator.chunk_edge());
    fill_generated(generator, catalog, coord, &mut grid);
    grid
}
