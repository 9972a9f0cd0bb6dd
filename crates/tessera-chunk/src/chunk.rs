use std::sync::Arc;

use tessera_blocks::{DamageOutcome, Voxel};
use tessera_world::{ChunkCoord, LocalPos};

use crate::grid::VoxelGrid;

/// A resident chunk. Only built from a fully populated grid.
///
/// `mesh_version` increases every time the voxels (or a neighbor's voxels at
/// the shared border) change. A mesh built from version `v` is attached only
/// while `v` is still current and newer than the attached one.
#[derive(Debug)]
pub struct Chunk {
    pub coord: ChunkCoord,
    grid: Arc<VoxelGrid>,
    dirty: bool,
    mesh_version: u64,
    attached_version: u64,
    slot: u64,
}

impl Chunk {
    pub fn new(coord: ChunkCoord, grid: VoxelGrid, slot: u64) -> Self {
        Self {
            coord,
            grid: Arc::new(grid),
            dirty: true,
            mesh_version: 1,
            attached_version: 0,
            slot,
        }
    }

    #[inline]
    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    /// Shared read-only snapshot for background meshing.
    #[inline]
    pub fn snapshot(&self) -> Arc<VoxelGrid> {
        Arc::clone(&self.grid)
    }

    #[inline]
    pub fn slot(&self) -> u64 {
        self.slot
    }

    #[inline]
    pub fn voxel(&self, p: LocalPos) -> Voxel {
        self.grid.get_at(p)
    }

    /// Writes a voxel and marks the chunk dirty. Copies the grid first if a
    /// mesh job still holds a snapshot of it.
    pub fn set_voxel(&mut self, p: LocalPos, v: Voxel) -> Voxel {
        let prev = Arc::make_mut(&mut self.grid).set(p.x, p.y, p.z, v);
        self.mark_dirty();
        prev
    }

    pub fn damage_voxel(&mut self, p: LocalPos, amount: f32) -> DamageOutcome {
        if !self.grid.get_at(p).is_solid() {
            return DamageOutcome::Unaffected;
        }
        let outcome = Arc::make_mut(&mut self.grid).get_mut(p).deal_damage(amount);
        if outcome == DamageOutcome::Destroyed {
            self.mark_dirty();
        }
        outcome
    }

    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.mesh_version += 1;
    }

    /// Flags the current version for another extraction attempt.
    #[inline]
    pub fn retry_remesh(&mut self) {
        self.dirty = true;
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn mesh_version(&self) -> u64 {
        self.mesh_version
    }

    #[inline]
    pub fn attached_version(&self) -> u64 {
        self.attached_version
    }

    /// Clears the dirty flag and returns the version the new mesh represents.
    #[inline]
    pub fn begin_remesh(&mut self) -> u64 {
        self.dirty = false;
        self.mesh_version
    }

    /// Accepts a finished mesh of `version` if it is current and not already
    /// attached. Returns whether the caller should publish it.
    pub fn try_attach(&mut self, version: u64) -> bool {
        if version != self.mesh_version || version <= self.attached_version {
            return false;
        }
        self.attached_version = version;
        true
    }

    /// Gives back the grid for pooling. `None` if a mesh job still shares it.
    pub fn into_grid(self) -> Option<VoxelGrid> {
        Arc::try_unwrap(self.grid).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_blocks::{MaterialCatalog, MaterialId};

    fn chunk() -> Chunk {
        Chunk::new(ChunkCoord::new(0, 0, 0), VoxelGrid::new_air(4), 7)
    }

    #[test]
    fn new_chunk_is_dirty_and_unattached() {
        let c = chunk();
        assert!(c.is_dirty());
        assert_eq!(c.attached_version(), 0);
        assert_eq!(c.slot(), 7);
    }

    #[test]
    fn duplicate_attach_is_rejected() {
        let mut c = chunk();
        let v = c.begin_remesh();
        assert!(!c.is_dirty());
        assert!(c.try_attach(v));
        assert!(!c.try_attach(v));
    }

    #[test]
    fn edit_after_dispatch_makes_result_stale() {
        let cat = MaterialCatalog::builtin();
        let mut c = chunk();
        let v = c.begin_remesh();
        c.set_voxel(LocalPos::new(1, 1, 1), cat.voxel(MaterialId::Stone));
        assert!(c.is_dirty());
        assert!(!c.try_attach(v));
        let v2 = c.begin_remesh();
        assert!(c.try_attach(v2));
    }

    #[test]
    fn retry_keeps_the_pending_version() {
        let mut c = chunk();
        let v = c.begin_remesh();
        c.retry_remesh();
        assert!(c.is_dirty());
        assert_eq!(c.begin_remesh(), v);
        assert!(c.try_attach(v));
    }

    #[test]
    fn edits_copy_on_write_under_snapshot() {
        let cat = MaterialCatalog::builtin();
        let mut c = chunk();
        let snap = c.snapshot();
        c.set_voxel(LocalPos::new(0, 0, 0), cat.voxel(MaterialId::Dirt));
        assert!(snap.get(0, 0, 0).is_air());
        assert_eq!(c.voxel(LocalPos::new(0, 0, 0)).material, MaterialId::Dirt);
        // snapshot still alive, the chunk's own grid is unique again
        assert!(c.into_grid().is_some());
    }

    #[test]
    fn shared_grid_is_not_returned() {
        let c = chunk();
        let _snap = c.snapshot();
        assert!(c.into_grid().is_none());
    }

    #[test]
    fn damage_marks_dirty_only_on_destroy() {
        let cat = MaterialCatalog::builtin();
        let mut c = chunk();
        let p = LocalPos::new(2, 2, 2);
        c.set_voxel(p, cat.voxel(MaterialId::Stone));
        let v = c.begin_remesh();
        assert!(matches!(c.damage_voxel(p, 1.0), DamageOutcome::Damaged { .. }));
        assert!(!c.is_dirty());
        assert_eq!(c.mesh_version(), v);
        assert_eq!(c.damage_voxel(p, 100.0), DamageOutcome::Destroyed);
        assert!(c.is_dirty());
        assert!(c.voxel(p).is_air());
    }
}
