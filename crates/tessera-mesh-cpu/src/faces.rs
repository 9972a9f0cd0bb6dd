use tessera_blocks::{MaterialCatalog, MaterialId, StateClass, Voxel};
use tessera_geom::{Vec2, Vec3};

use crate::face::Face;
use crate::mesh_build::{MeshBuffer, MeshBuilder};
use crate::neighbors::Sample;
use crate::{CullRule, ExtractInput, ExtractorKind, MissingNeighborPolicy, SurfaceExtractor};

/// One quad per exposed voxel face.
#[derive(Clone, Copy, Debug, Default)]
pub struct FaceCullingExtractor {
    pub missing: MissingNeighborPolicy,
    pub cull: CullRule,
}

impl FaceCullingExtractor {
    pub fn new(missing: MissingNeighborPolicy, cull: CullRule) -> Self {
        Self { missing, cull }
    }
}

/// Decides whether the face of `this` looking at `neighbor` is drawn.
#[inline]
pub fn face_visible(
    this: Voxel,
    neighbor: Sample,
    missing: MissingNeighborPolicy,
    cull: CullRule,
) -> bool {
    let other = match neighbor {
        Sample::AboveWorld => return true,
        Sample::BelowWorld => return false,
        Sample::Missing => return missing == MissingNeighborPolicy::Visible,
        Sample::Found(v) => v,
    };
    if other.is_air() {
        return true;
    }
    match cull {
        CullRule::AnyNonAir => false,
        CullRule::SameClass => match (this.state, other.state) {
            (_, StateClass::Solid) => false,
            (StateClass::Liquid, StateClass::Liquid) => false,
            _ => true,
        },
    }
}

fn face_uvs(
    catalog: &MaterialCatalog,
    material: MaterialId,
    face: Face,
    corners: &[Vec3; 4],
    origin: Vec3,
) -> [Vec2; 4] {
    let r = catalog.tile_uv(material, face.role());
    corners.map(|p| {
        let (s, t) = face.planar(p, origin);
        Vec2::new(r.u0 + s * (r.u1 - r.u0), r.v1 - t * (r.v1 - r.v0))
    })
}

impl SurfaceExtractor for FaceCullingExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Faces
    }

    fn extract(&self, input: &ExtractInput) -> MeshBuffer {
        let grid = input.grid;
        let edge = grid.edge();
        let mut builder = MeshBuilder::new();
        if grid.is_all_air() {
            return builder.finish();
        }
        for y in 0..edge {
            for z in 0..edge {
                for x in 0..edge {
                    let here = grid.get(x, y, z);
                    if here.is_air() {
                        continue;
                    }
                    let (xi, yi, zi) = (x as i32, y as i32, z as i32);
                    let origin = Vec3::new(x as f32, y as f32, z as f32);
                    for face in Face::ALL {
                        let s = input
                            .neighbors
                            .lookup(input.coord, grid, xi, yi, zi, face.delta());
                        if !face_visible(here, s, self.missing, self.cull) {
                            continue;
                        }
                        let corners = face.corners(origin);
                        let uvs = face_uvs(input.catalog, here.material, face, &corners, origin);
                        builder.add_quad(here.material, corners, face.normal(), uvs);
                    }
                }
            }
        }
        builder.finish()
    }
}
