//! Edit bookkeeping: which chunks an edit touches and how often.
#![forbid(unsafe_code)]

use hashbrown::HashMap;
use tessera_world::{ChunkCoord, LocalPos};

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditStats {
    pub edits: u64,
    /// Neighbor chunks flagged because an edit sat on a shared border.
    pub seam_marks: u64,
    pub chunks_touched: usize,
}

/// Maps world edits to chunk coordinates and counts them per chunk.
pub struct EditTracker {
    edge: i32,
    per_chunk: HashMap<ChunkCoord, u64>,
    edits: u64,
    seam_marks: u64,
}

impl EditTracker {
    pub fn new(edge: usize) -> Self {
        Self {
            edge: edge as i32,
            per_chunk: HashMap::new(),
            edits: 0,
            seam_marks: 0,
        }
    }

    #[inline]
    pub fn edge(&self) -> usize {
        self.edge as usize
    }

    #[inline]
    pub fn chunk_key(&self, wx: i32, wy: i32, wz: i32) -> ChunkCoord {
        ChunkCoord::new(
            wx.div_euclid(self.edge),
            wy.div_euclid(self.edge),
            wz.div_euclid(self.edge),
        )
    }

    #[inline]
    pub fn locate(&self, wx: i32, wy: i32, wz: i32) -> (ChunkCoord, LocalPos) {
        ChunkCoord::locate(wx, wy, wz, self.edge as usize)
    }

    /// The chunk holding the cell, then every neighbor whose mesh reads it:
    /// one step out on each axis where the cell sits on a border, including
    /// the edge and corner combinations.
    pub fn affected_chunks(&self, wx: i32, wy: i32, wz: i32) -> Vec<ChunkCoord> {
        let (c, l) = self.locate(wx, wy, wz);
        let last = self.edge as usize - 1;
        let steps = |v: usize| -> ([i32; 2], usize) {
            if last == 0 {
                ([-1, 1], 2)
            } else if v == 0 {
                ([-1, 0], 1)
            } else if v == last {
                ([1, 0], 1)
            } else {
                ([0, 0], 0)
            }
        };
        let (sx, nx) = steps(l.x);
        let (sy, ny) = steps(l.y);
        let (sz, nz) = steps(l.z);
        let mut out = vec![c];
        let xs = std::iter::once(0).chain(sx[..nx].iter().copied());
        for dx in xs {
            let ys = std::iter::once(0).chain(sy[..ny].iter().copied());
            for dy in ys {
                let zs = std::iter::once(0).chain(sz[..nz].iter().copied());
                for dz in zs {
                    if (dx, dy, dz) != (0, 0, 0) {
                        out.push(c.offset(dx, dy, dz));
                    }
                }
            }
        }
        out
    }

    /// Counts an edit at the cell and returns the chunks to remesh.
    pub fn record(&mut self, wx: i32, wy: i32, wz: i32) -> Vec<ChunkCoord> {
        let affected = self.affected_chunks(wx, wy, wz);
        self.edits += 1;
        self.seam_marks += affected.len() as u64 - 1;
        *self.per_chunk.entry(affected[0]).or_insert(0) += 1;
        affected
    }

    pub fn edits_in(&self, coord: ChunkCoord) -> u64 {
        self.per_chunk.get(&coord).copied().unwrap_or(0)
    }

    /// Drops the per-chunk count once the chunk leaves residency.
    pub fn forget(&mut self, coord: ChunkCoord) {
        self.per_chunk.remove(&coord);
    }

    pub fn stats(&self) -> EditStats {
        EditStats {
            edits: self.edits,
            seam_marks: self.seam_marks,
            chunks_touched: self.per_chunk.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tracker() -> EditTracker {
        EditTracker::new(32)
    }

    #[test]
    fn vertical_seam_edit_marks_neighbors() {
        let mut tracker = make_tracker();
        let (cx, cy, cz) = (4, 7, -2);
        let s = 32;
        let (bx, by, bz) = (cx * s, cy * s, cz * s);

        // near the top face: chunk and +Y neighbor only
        let mut top = tracker.record(bx + 5, by + s - 1, bz + 11);
        top.sort();
        assert_eq!(
            top,
            vec![ChunkCoord::new(cx, cy, cz), ChunkCoord::new(cx, cy + 1, cz)]
        );

        // near the bottom face: chunk and -Y neighbor only
        let mut bottom = tracker.record(bx + 9, by, bz + 3);
        bottom.sort();
        assert_eq!(
            bottom,
            vec![ChunkCoord::new(cx, cy - 1, cz), ChunkCoord::new(cx, cy, cz)]
        );
        assert_eq!(tracker.edits_in(ChunkCoord::new(cx, cy, cz)), 2);
        assert_eq!(tracker.stats().seam_marks, 2);
    }

    #[test]
    fn interior_edit_marks_only_its_chunk() {
        let mut tracker = make_tracker();
        let affected = tracker.record(40, 40, 40);
        assert_eq!(affected, vec![ChunkCoord::new(1, 1, 1)]);
        assert_eq!(tracker.stats().seam_marks, 0);
    }

    #[test]
    fn corner_edit_reaches_diagonals() {
        let tracker = make_tracker();
        // local (0, 0, 0) of chunk (0, 0, 0)
        let affected = tracker.affected_chunks(0, 0, 0);
        assert_eq!(affected.len(), 8);
        assert_eq!(affected[0], ChunkCoord::new(0, 0, 0));
        assert!(affected.contains(&ChunkCoord::new(-1, -1, -1)));
        assert!(affected.contains(&ChunkCoord::new(-1, 0, -1)));
    }

    #[test]
    fn negative_world_positions_use_floor_division() {
        let tracker = make_tracker();
        let (c, l) = tracker.locate(-1, 5, -33);
        assert_eq!(c, ChunkCoord::new(-1, 0, -2));
        assert_eq!((l.x, l.y, l.z), (31, 5, 31));
        assert_eq!(tracker.chunk_key(-1, 5, -33), c);
    }

    #[test]
    fn forget_clears_per_chunk_count() {
        let mut tracker = make_tracker();
        tracker.record(1, 1, 1);
        tracker.forget(ChunkCoord::new(0, 0, 0));
        assert_eq!(tracker.edits_in(ChunkCoord::new(0, 0, 0)), 0);
        assert_eq!(tracker.stats().edits, 1);
    }
}
