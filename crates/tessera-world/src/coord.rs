use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    pub cx: i32,
    pub cy: i32,
    pub cz: i32,
}

/// Cell position inside a chunk, each axis in `[0, edge)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LocalPos {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl LocalPos {
    #[inline]
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }
}

impl ChunkCoord {
    #[inline]
    pub const fn new(cx: i32, cy: i32, cz: i32) -> Self {
        Self { cx, cy, cz }
    }

    #[inline]
    pub fn with_y(self, cy: i32) -> Self {
        Self { cy, ..self }
    }

    #[inline]
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            cx: self.cx + dx,
            cy: self.cy + dy,
            cz: self.cz + dz,
        }
    }

    #[inline]
    pub fn distance_sq(self, other: ChunkCoord) -> i64 {
        let dx = i64::from(self.cx - other.cx);
        let dy = i64::from(self.cy - other.cy);
        let dz = i64::from(self.cz - other.cz);
        dx * dx + dy * dy + dz * dz
    }

    /// Horizontal Chebyshev distance; the streaming radius ignores Y.
    #[inline]
    pub fn chebyshev_xz(self, other: ChunkCoord) -> i32 {
        (self.cx - other.cx).abs().max((self.cz - other.cz).abs())
    }

    /// World-space position of the chunk's minimum corner.
    #[inline]
    pub fn origin(self, edge: usize) -> (i32, i32, i32) {
        let e = edge as i32;
        (self.cx * e, self.cy * e, self.cz * e)
    }

    /// Splits a world position into its chunk and the local cell, using floor
    /// division and positive modulo so negative coordinates land correctly.
    #[inline]
    pub fn locate(wx: i32, wy: i32, wz: i32, edge: usize) -> (ChunkCoord, LocalPos) {
        let e = edge as i32;
        (
            ChunkCoord::new(wx.div_euclid(e), wy.div_euclid(e), wz.div_euclid(e)),
            LocalPos::new(
                wx.rem_euclid(e) as usize,
                wy.rem_euclid(e) as usize,
                wz.rem_euclid(e) as usize,
            ),
        )
    }

    /// Chunk containing the world-space point.
    #[inline]
    pub fn containing(x: f32, y: f32, z: f32, edge: usize) -> ChunkCoord {
        ChunkCoord::locate(x.floor() as i32, y.floor() as i32, z.floor() as i32, edge).0
    }
}

impl From<(i32, i32, i32)> for ChunkCoord {
    fn from(value: (i32, i32, i32)) -> Self {
        Self::new(value.0, value.1, value.2)
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.cx, self.cy, self.cz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_handles_negative_positions() {
        let (c, l) = ChunkCoord::locate(-1, 0, -16, 16);
        assert_eq!(c, ChunkCoord::new(-1, 0, -1));
        assert_eq!(l, LocalPos::new(15, 0, 0));
        let (c, l) = ChunkCoord::locate(17, 33, 15, 16);
        assert_eq!(c, ChunkCoord::new(1, 2, 0));
        assert_eq!(l, LocalPos::new(1, 1, 15));
    }

    #[test]
    fn chebyshev_ignores_vertical() {
        let a = ChunkCoord::new(0, 0, 0);
        assert_eq!(a.chebyshev_xz(ChunkCoord::new(3, 9, -2)), 3);
        assert_eq!(a.chebyshev_xz(ChunkCoord::new(-1, 0, -4)), 4);
    }

    #[test]
    fn containing_floors_fractional_points() {
        assert_eq!(ChunkCoord::containing(-0.5, 3.0, 15.9, 16), ChunkCoord::new(-1, 0, 0));
    }
}
