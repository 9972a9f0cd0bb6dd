use std::collections::HashMap;

use tessera_blocks::MaterialId;
use tessera_geom::{Aabb, Vec2, Vec3};

/// Index list for one material.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Submesh {
    pub material: MaterialId,
    pub indices: Vec<u32>,
}

/// Finished chunk geometry in chunk-local space. Vertex arrays are shared by
/// all submeshes; submeshes are sorted by material.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshBuffer {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub submeshes: Vec<Submesh>,
}

impl MeshBuffer {
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.submeshes.iter().map(|s| s.indices.len() / 3).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.submeshes.iter().all(|s| s.indices.is_empty())
    }

    pub fn submesh(&self, material: MaterialId) -> Option<&Submesh> {
        self.submeshes.iter().find(|s| s.material == material)
    }

    pub fn bounds(&self) -> Aabb {
        let mut bb = Aabb::EMPTY;
        for p in &self.positions {
            bb.include(*p);
        }
        bb
    }

    /// Every triangle of every submesh, for building a collider.
    pub fn collision_triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.submeshes.iter().flat_map(move |s| {
            s.indices.chunks_exact(3).map(move |t| {
                [
                    self.positions[t[0] as usize],
                    self.positions[t[1] as usize],
                    self.positions[t[2] as usize],
                ]
            })
        })
    }
}

/// Accumulates vertices and per-material indices while extracting.
#[derive(Default)]
pub struct MeshBuilder {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Vec<Vec2>,
    parts: HashMap<MaterialId, Vec<u32>>,
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-reserve capacity for approximately `n_quads` quads worth of data.
    pub fn reserve_quads(&mut self, n_quads: usize) {
        self.positions.reserve(n_quads * 4);
        self.normals.reserve(n_quads * 4);
        self.uvs.reserve(n_quads * 4);
    }

    #[inline]
    fn push_vertex(&mut self, p: Vec3, n: Vec3, uv: Vec2) -> u32 {
        let i = self.positions.len() as u32;
        self.positions.push(p);
        self.normals.push(n);
        self.uvs.push(uv);
        i
    }

    /// Appends a quad as two triangles. Corners are reordered if their
    /// winding disagrees with `n`.
    pub fn add_quad(&mut self, material: MaterialId, corners: [Vec3; 4], n: Vec3, uvs: [Vec2; 4]) {
        let mut vs = corners;
        let mut ts = uvs;
        if (vs[1] - vs[0]).cross(vs[2] - vs[0]).dot(n) < 0.0 {
            vs.swap(1, 3);
            ts.swap(1, 3);
        }
        let base = self.push_vertex(vs[0], n, ts[0]);
        for i in 1..4 {
            self.push_vertex(vs[i], n, ts[i]);
        }
        self.parts.entry(material).or_default().extend_from_slice(&[
            base,
            base + 1,
            base + 2,
            base,
            base + 2,
            base + 3,
        ]);
    }

    /// Appends one triangle with a flat normal taken from its winding.
    pub fn add_triangle(&mut self, material: MaterialId, tri: [Vec3; 3], uvs: [Vec2; 3]) {
        let n = (tri[1] - tri[0]).cross(tri[2] - tri[0]).normalized();
        let a = self.push_vertex(tri[0], n, uvs[0]);
        let b = self.push_vertex(tri[1], n, uvs[1]);
        let c = self.push_vertex(tri[2], n, uvs[2]);
        self.parts.entry(material).or_default().extend_from_slice(&[a, b, c]);
    }

    pub fn finish(self) -> MeshBuffer {
        let mut submeshes: Vec<Submesh> = self
            .parts
            .into_iter()
            .filter(|(_, idx)| !idx.is_empty())
            .map(|(material, indices)| Submesh { material, indices })
            .collect();
        submeshes.sort_by_key(|s| s.material);
        MeshBuffer {
            positions: self.positions,
            normals: self.normals,
            uvs: self.uvs,
            submeshes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_winding_is_corrected() {
        let mut b = MeshBuilder::new();
        // clockwise seen from +Y
        let corners = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, 1.0),
        ];
        b.add_quad(MaterialId::Stone, corners, Vec3::new(0.0, 1.0, 0.0), [Vec2::default(); 4]);
        let mesh = b.finish();
        for [a, b, c] in mesh.collision_triangles() {
            assert!((b - a).cross(c - a).y > 0.0);
        }
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.vertex_count(), 4);
    }

    #[test]
    fn submeshes_are_sorted_by_material() {
        let mut b = MeshBuilder::new();
        let tri = [Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)];
        b.add_triangle(MaterialId::WoodPlanks, tri, [Vec2::default(); 3]);
        b.add_triangle(MaterialId::Dirt, tri, [Vec2::default(); 3]);
        let mesh = b.finish();
        let order: Vec<_> = mesh.submeshes.iter().map(|s| s.material).collect();
        assert_eq!(order, vec![MaterialId::Dirt, MaterialId::WoodPlanks]);
        assert!(mesh.bounds().contains(Vec3::new(0.5, 0.5, 0.0)));
        assert_eq!(mesh.normals[0], Vec3::new(0.0, 0.0, 1.0));
    }
}
