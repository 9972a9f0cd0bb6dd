use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::grid::VoxelGrid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChunkPoolStats {
    pub allocated: usize,
    pub reused: usize,
    pub idle: usize,
}

/// Lock-free pool of grid allocations so chunks entering residency reuse the
/// arrays of evicted ones. Contents of an acquired grid are unspecified; the
/// caller overwrites every cell.
pub struct ChunkPool {
    edge: usize,
    idle_tx: Sender<VoxelGrid>,
    idle_rx: Receiver<VoxelGrid>,
    allocated: AtomicUsize,
    reused: AtomicUsize,
}

impl ChunkPool {
    pub fn new(edge: usize, max_idle: usize) -> Self {
        let (tx, rx) = bounded(max_idle.max(1));
        Self {
            edge,
            idle_tx: tx,
            idle_rx: rx,
            allocated: AtomicUsize::new(0),
            reused: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn edge(&self) -> usize {
        self.edge
    }

    pub fn acquire(&self) -> VoxelGrid {
        if let Ok(grid) = self.idle_rx.try_recv() {
            self.reused.fetch_add(1, Ordering::Relaxed);
            return grid;
        }
        self.allocated.fetch_add(1, Ordering::Relaxed);
        VoxelGrid::new_air(self.edge)
    }

    /// Returns a grid to the pool. Dropped when the pool is full or the grid
    /// has a different edge.
    pub fn release(&self, grid: VoxelGrid) {
        if grid.edge() != self.edge || grid.len() != self.edge.pow(3) {
            return;
        }
        let _ = self.idle_tx.try_send(grid);
    }

    pub fn stats(&self) -> ChunkPoolStats {
        ChunkPoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            idle: self.idle_rx.len(),
        }
    }
}
