use tessera_blocks::{MaterialCatalog, MaterialId};
use tessera_chunk::{ChunkOccupancy, VoxelGrid, fill_generated, generate_grid};
use tessera_world::{ChunkCoord, TerrainGenerator, WorldGenConfig};

fn setup() -> (TerrainGenerator, MaterialCatalog) {
    let cfg = WorldGenConfig {
        chunk_edge: 8,
        ..WorldGenConfig::default()
    };
    (TerrainGenerator::new(cfg), MaterialCatalog::builtin())
}

#[test]
fn generation_is_deterministic() {
    let (g, cat) = setup();
    for coord in [ChunkCoord::new(0, 7, 0), ChunkCoord::new(-3, 5, 12), ChunkCoord::new(4, 0, -9)] {
        let a = generate_grid(&g, &cat, coord);
        let b = generate_grid(&TerrainGenerator::new(g.config().clone()), &cat, coord);
        assert_eq!(a, b, "coord {coord}");
    }
}

#[test]
fn columns_agree_with_world_space_sampling() {
    let (g, cat) = setup();
    let edge = 8;
    for coord in [ChunkCoord::new(2, 7, -1), ChunkCoord::new(3, 7, -1)] {
        let grid = generate_grid(&g, &cat, coord);
        let (bx, by, bz) = coord.origin(edge);
        for z in 0..edge {
            for x in 0..edge {
                let h = g.column_height(bx + x as i32, bz + z as i32);
                for y in 0..edge {
                    let m = g.material_at(by + y as i32, h);
                    assert_eq!(grid.get(x, y, z).material, m);
                }
            }
        }
    }
}

#[test]
fn bottom_layer_is_populated_and_sky_is_empty() {
    let (g, cat) = setup();
    let mut grid = VoxelGrid::new_air(8);
    let occ = fill_generated(&g, &cat, ChunkCoord::new(0, 0, 0), &mut grid);
    assert_eq!(occ, ChunkOccupancy::Populated);
    assert_eq!(grid.get(0, 0, 0).material, MaterialId::Stone);

    let top = ChunkCoord::new(0, g.config().vertical_chunks() + 1, 0);
    let occ = fill_generated(&g, &cat, top, &mut grid);
    assert_eq!(occ, ChunkOccupancy::Empty);
    assert!(grid.is_all_air());
}

#[test]
fn refill_overwrites_previous_contents() {
    let (g, cat) = setup();
    let mut grid = VoxelGrid::new_air(8);
    fill_generated(&g, &cat, ChunkCoord::new(0, 0, 0), &mut grid);
    fill_generated(&g, &cat, ChunkCoord::new(5, 9, 5), &mut grid);
    assert_eq!(grid, generate_grid(&g, &cat, ChunkCoord::new(5, 9, 5)));
}

#[test]
fn generated_voxels_carry_catalog_durability() {
    let (g, cat) = setup();
    let grid = generate_grid(&g, &cat, ChunkCoord::new(0, 0, 0));
    let stone = grid.get(0, 0, 0);
    assert_eq!(stone, cat.voxel(MaterialId::Stone));
}
