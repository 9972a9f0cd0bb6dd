use tessera_blocks::FaceRole;
use tessera_geom::Vec3;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Face {
    PosY = 0,
    NegY = 1,
    PosX = 2,
    NegX = 3,
    PosZ = 4,
    NegZ = 5,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::PosY,
        Face::NegY,
        Face::PosX,
        Face::NegX,
        Face::PosZ,
        Face::NegZ,
    ];

    /// Returns the `[0..6)` index of this face.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Converts a face index `[0..6)` back into a `Face` value.
    #[inline]
    pub fn from_index(i: usize) -> Option<Face> {
        Self::ALL.get(i).copied()
    }

    #[inline]
    pub fn normal(self) -> Vec3 {
        let (dx, dy, dz) = self.delta();
        Vec3::new(dx as f32, dy as f32, dz as f32)
    }

    /// Returns the integer grid delta `(dx,dy,dz)` when stepping out of this face.
    #[inline]
    pub fn delta(self) -> (i32, i32, i32) {
        match self {
            Face::PosY => (0, 1, 0),
            Face::NegY => (0, -1, 0),
            Face::PosX => (1, 0, 0),
            Face::NegX => (-1, 0, 0),
            Face::PosZ => (0, 0, 1),
            Face::NegZ => (0, 0, -1),
        }
    }

    #[inline]
    pub fn opposite(self) -> Face {
        match self {
            Face::PosY => Face::NegY,
            Face::NegY => Face::PosY,
            Face::PosX => Face::NegX,
            Face::NegX => Face::PosX,
            Face::PosZ => Face::NegZ,
            Face::NegZ => Face::PosZ,
        }
    }

    /// Classifies the face into top/bottom/side role for atlas lookup.
    #[inline]
    pub fn role(self) -> FaceRole {
        match self {
            Face::PosY => FaceRole::Top,
            Face::NegY => FaceRole::Bottom,
            _ => FaceRole::Side,
        }
    }

    /// Corners of the unit cube face at `origin`, counter-clockwise seen from
    /// outside.
    pub fn corners(self, origin: Vec3) -> [Vec3; 4] {
        let Vec3 { x, y, z } = origin;
        let (x1, y1, z1) = (x + 1.0, y + 1.0, z + 1.0);
        match self {
            Face::PosY => [
                Vec3::new(x, y1, z),
                Vec3::new(x, y1, z1),
                Vec3::new(x1, y1, z1),
                Vec3::new(x1, y1, z),
            ],
            Face::NegY => [
                Vec3::new(x, y, z),
                Vec3::new(x1, y, z),
                Vec3::new(x1, y, z1),
                Vec3::new(x, y, z1),
            ],
            Face::PosX => [
                Vec3::new(x1, y, z),
                Vec3::new(x1, y1, z),
                Vec3::new(x1, y1, z1),
                Vec3::new(x1, y, z1),
            ],
            Face::NegX => [
                Vec3::new(x, y, z),
                Vec3::new(x, y, z1),
                Vec3::new(x, y1, z1),
                Vec3::new(x, y1, z),
            ],
            Face::PosZ => [
                Vec3::new(x, y, z1),
                Vec3::new(x1, y, z1),
                Vec3::new(x1, y1, z1),
                Vec3::new(x, y1, z1),
            ],
            Face::NegZ => [
                Vec3::new(x, y, z),
                Vec3::new(x, y1, z),
                Vec3::new(x1, y1, z),
                Vec3::new(x1, y, z),
            ],
        }
    }

    /// Planar `(s, t)` of a face corner relative to the cube origin.
    #[inline]
    pub fn planar(self, p: Vec3, origin: Vec3) -> (f32, f32) {
        let d = p - origin;
        match self {
            Face::PosY | Face::NegY => (d.x, d.z),
            Face::PosX | Face::NegX => (d.z, d.y),
            Face::PosZ | Face::NegZ => (d.x, d.y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_wind_counter_clockwise_outward() {
        for f in Face::ALL {
            let [a, b, c, d] = f.corners(Vec3::ZERO);
            let n = f.normal();
            assert!((b - a).cross(c - a).dot(n) > 0.0, "{f:?}");
            assert!((c - a).cross(d - a).dot(n) > 0.0, "{f:?}");
        }
    }

    #[test]
    fn index_roundtrip_and_opposites() {
        for f in Face::ALL {
            assert_eq!(Face::from_index(f.index()), Some(f));
            assert_eq!(f.opposite().opposite(), f);
            assert_eq!(f.normal() + f.opposite().normal(), Vec3::ZERO);
        }
        assert_eq!(Face::from_index(6), None);
    }
}
