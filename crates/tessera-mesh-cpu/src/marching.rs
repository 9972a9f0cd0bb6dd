use tessera_blocks::{FaceRole, MaterialId};
use tessera_geom::{Vec2, Vec3};

use crate::marching_tables::{CORNERS, EDGES, TRIANGLES};
use crate::mesh_build::{MeshBuffer, MeshBuilder};
use crate::neighbors::Sample;
use crate::{ExtractInput, ExtractorKind, SurfaceExtractor};

const ISO: f32 = 0.5;

/// Smooth surface over a binary density field sampled at voxel centres.
#[derive(Clone, Copy, Debug, Default)]
pub struct MarchingCubesExtractor;

/// Density of a lattice corner, `None` when the owning chunk is not resident.
#[inline]
fn density(s: Sample) -> Option<(f32, MaterialId)> {
    match s {
        Sample::Found(v) if v.is_solid() => Some((1.0, v.material)),
        Sample::Found(v) => Some((0.0, v.material)),
        Sample::BelowWorld => Some((1.0, MaterialId::Stone)),
        Sample::AboveWorld => Some((0.0, MaterialId::Air)),
        Sample::Missing => None,
    }
}

/// Cube index with bit `i` set when corner `i` is inside.
#[inline]
pub fn cube_index(densities: &[f32; 8]) -> u8 {
    let mut idx = 0u8;
    for (i, d) in densities.iter().enumerate() {
        if *d > ISO {
            idx |= 1 << i;
        }
    }
    idx
}

/// Triangles for one cube configuration, as corner-relative positions in
/// `[0, 1]³` wound outward (away from the inside corners).
pub fn config_triangles(config: u8) -> impl Iterator<Item = [Vec3; 3]> {
    TRIANGLES[config as usize]
        .iter()
        .map(|&[a, b, c]| [edge_midpoint(a), edge_midpoint(c), edge_midpoint(b)])
}

#[inline]
fn corner_pos(i: u8) -> Vec3 {
    let (x, y, z) = CORNERS[i as usize];
    Vec3::new(f32::from(x), f32::from(y), f32::from(z))
}

#[inline]
fn edge_midpoint(e: u8) -> Vec3 {
    let (a, b) = EDGES[e as usize];
    corner_pos(a).midpoint(corner_pos(b))
}

impl SurfaceExtractor for MarchingCubesExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::MarchingCubes
    }

    fn extract(&self, input: &ExtractInput) -> MeshBuffer {
        let grid = input.grid;
        let edge = grid.edge() as i32;
        let mut builder = MeshBuilder::new();
        let mut skipped = 0usize;
        for y in 0..edge {
            for z in 0..edge {
                'cell: for x in 0..edge {
                    let mut dens = [0.0f32; 8];
                    let mut mats = [MaterialId::Air; 8];
                    for (i, &(cx, cy, cz)) in CORNERS.iter().enumerate() {
                        let s = input.neighbors.sample(
                            input.coord,
                            grid,
                            x + i32::from(cx),
                            y + i32::from(cy),
                            z + i32::from(cz),
                        );
                        match density(s) {
                            Some((d, m)) => {
                                dens[i] = d;
                                mats[i] = m;
                            }
                            None => {
                                skipped += 1;
                                continue 'cell;
                            }
                        }
                    }
                    let config = cube_index(&dens);
                    if config == 0 || config == u8::MAX {
                        continue;
                    }
                    let material = (0..8)
                        .find(|&i| config & (1 << i) != 0)
                        .map(|i| mats[i])
                        .unwrap_or(MaterialId::Stone);
                    let r = input.catalog.tile_uv(material, FaceRole::Side);
                    let uvs = [
                        Vec2::new(r.u0, r.v1),
                        Vec2::new(r.u1, r.v1),
                        Vec2::new(r.u1, r.v0),
                    ];
                    // Corners sit at voxel centres.
                    let base = Vec3::new(x as f32 + 0.5, y as f32 + 0.5, z as f32 + 0.5);
                    for [a, b, c] in config_triangles(config) {
                        builder.add_triangle(material, [base + a, base + b, base + c], uvs);
                    }
                }
            }
        }
        if skipped > 0 {
            log::trace!(
                "marching cubes {} skipped {} cells at missing neighbors",
                input.coord,
                skipped
            );
        }
        builder.finish()
    }
}
