use proptest::prelude::*;
use tessera_blocks::{MaterialId, StateClass, Voxel};
use tessera_chunk::VoxelGrid;

fn edge() -> impl Strategy<Value = usize> {
    1usize..=8
}

fn tagged(i: usize) -> Voxel {
    let m = MaterialId::from_u8((i % 7 + 1) as u8).unwrap_or(MaterialId::Stone);
    Voxel::new(m, StateClass::Solid, i as f32, 1.0)
}

proptest! {
    // idx maps each (x,y,z) within bounds to a unique in-range index
    #[test]
    fn idx_is_unique_and_in_range(e in edge()) {
        let grid = VoxelGrid::new_air(e);
        let expect = e * e * e;
        let mut seen = vec![false; expect];
        for y in 0..e { for z in 0..e { for x in 0..e {
            let i = grid.idx(x, y, z);
            prop_assert!(i < expect);
            prop_assert!(!seen[i]);
            seen[i] = true;
        }}}
        prop_assert!(seen.into_iter().all(|b| b));
    }

    // get reads from linearized storage at idx
    #[test]
    fn get_matches_linear(e in edge()) {
        let cells = (0..e * e * e).map(tagged).collect();
        let grid = VoxelGrid::from_cells(e, cells);
        for y in 0..e { for z in 0..e { for x in 0..e {
            prop_assert_eq!(grid.get(x, y, z), grid.cells()[grid.idx(x, y, z)]);
        }}}
    }

    // get_signed agrees with get inside and is None one step outside
    #[test]
    fn get_signed_bounds(e in edge(), x in -2i32..10, y in -2i32..10, z in -2i32..10) {
        let cells = (0..e * e * e).map(tagged).collect();
        let grid = VoxelGrid::from_cells(e, cells);
        let ei = e as i32;
        let inside = (0..ei).contains(&x) && (0..ei).contains(&y) && (0..ei).contains(&z);
        match grid.get_signed(x, y, z) {
            Some(v) => {
                prop_assert!(inside);
                prop_assert_eq!(v, grid.get(x as usize, y as usize, z as usize));
            }
            None => prop_assert!(!inside),
        }
    }

    // from_cells preserves or resizes to exact length
    #[test]
    fn from_cells_resizes(e in edge(), extra in 0usize..5) {
        let expect = e * e * e;
        prop_assert_eq!(VoxelGrid::from_cells(e, vec![Voxel::AIR; expect]).len(), expect);
        prop_assert_eq!(VoxelGrid::from_cells(e, vec![Voxel::AIR; expect.saturating_sub(1)]).len(), expect);
        prop_assert_eq!(VoxelGrid::from_cells(e, vec![Voxel::AIR; expect + extra]).len(), expect);
    }
}

#[test]
fn set_returns_previous() {
    let mut grid = VoxelGrid::new_air(3);
    let v = tagged(4);
    assert_eq!(grid.set(1, 2, 0, v), Voxel::AIR);
    assert_eq!(grid.set(1, 2, 0, Voxel::AIR), v);
    assert!(grid.is_all_air());
}
