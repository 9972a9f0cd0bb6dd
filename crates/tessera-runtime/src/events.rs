use std::sync::Arc;

use tessera_mesh_cpu::MeshBuffer;
use tessera_world::ChunkCoord;

/// Mesh hand-off to the host renderer and collider.
#[derive(Clone, Debug)]
pub enum MeshEvent {
    /// Replaces whatever mesh the host holds for `coord`.
    Attached {
        coord: ChunkCoord,
        mesh: Arc<MeshBuffer>,
    },
    /// The chunk left residency; drop its mesh.
    Detached { coord: ChunkCoord },
}

impl MeshEvent {
    #[inline]
    pub fn coord(&self) -> ChunkCoord {
        match self {
            MeshEvent::Attached { coord, .. } | MeshEvent::Detached { coord } => *coord,
        }
    }
}
