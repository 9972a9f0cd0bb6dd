//! CPU surface extraction for voxel chunks: face culling and marching cubes.
#![forbid(unsafe_code)]

mod face;
mod faces;
mod marching;
pub mod marching_tables;
mod mesh_build;
mod neighbors;

pub use face::Face;
pub use faces::{FaceCullingExtractor, face_visible};
pub use marching::{MarchingCubesExtractor, config_triangles, cube_index};
pub use mesh_build::{MeshBuffer, MeshBuilder, Submesh};
pub use neighbors::{
    ChunkNeighborResolver, ChunkSource, Isolated, NeighborSnapshot, Sample, neighbor_offsets,
};

use serde::Deserialize;
use tessera_blocks::MaterialCatalog;
use tessera_chunk::VoxelGrid;
use tessera_world::ChunkCoord;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    #[default]
    Faces,
    MarchingCubes,
}

/// What a face does when the chunk across it is not resident.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingNeighborPolicy {
    #[default]
    Hidden,
    Visible,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CullRule {
    /// Hidden against solids, and liquid against liquid.
    #[default]
    SameClass,
    /// Hidden against anything that is not air.
    AnyNonAir,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    pub extractor: ExtractorKind,
    pub missing_neighbor: MissingNeighborPolicy,
    pub cull_rule: CullRule,
}

/// Everything an extractor reads. The grid is the chunk being meshed; the
/// resolver answers reads that leave it.
pub struct ExtractInput<'a> {
    pub coord: ChunkCoord,
    pub grid: &'a VoxelGrid,
    pub neighbors: &'a ChunkNeighborResolver<'a>,
    pub catalog: &'a MaterialCatalog,
}

pub trait SurfaceExtractor: Send + Sync {
    fn kind(&self) -> ExtractorKind;
    fn extract(&self, input: &ExtractInput) -> MeshBuffer;
}

pub fn build_extractor(opts: &ExtractOptions) -> Box<dyn SurfaceExtractor> {
    match opts.extractor {
        ExtractorKind::Faces => Box::new(FaceCullingExtractor::new(
            opts.missing_neighbor,
            opts.cull_rule,
        )),
        ExtractorKind::MarchingCubes => Box::new(MarchingCubesExtractor),
    }
}

/// Meshes `grid` at `coord`, reading neighbors from `source`.
pub fn extract_chunk(
    extractor: &dyn SurfaceExtractor,
    coord: ChunkCoord,
    grid: &VoxelGrid,
    source: &dyn ChunkSource,
    world_height: i32,
    catalog: &MaterialCatalog,
) -> MeshBuffer {
    let resolver = ChunkNeighborResolver::new(source, grid.edge(), world_height);
    extractor.extract(&ExtractInput {
        coord,
        grid,
        neighbors: &resolver,
        catalog,
    })
}
