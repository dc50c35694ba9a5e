//! The six cardinal directions a block face can point.

/// One of the six cardinal directions a block face can point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FaceDirection {
    /// +X direction.
    PosX = 0,
    /// −X direction.
    NegX = 1,
    /// +Y direction.
    PosY = 2,
    /// −Y direction.
    NegY = 3,
    /// +Z direction.
    PosZ = 4,
    /// −Z direction.
    NegZ = 5,
}

impl FaceDirection {
    /// All six directions in order.
    pub const ALL: [FaceDirection; 6] = [
        Self::PosX,
        Self::NegX,
        Self::PosY,
        Self::NegY,
        Self::PosZ,
        Self::NegZ,
    ];

    /// The direction along `axis` (0=X, 1=Y, 2=Z) with the given sign.
    pub fn from_axis(axis: usize, positive: bool) -> Self {
        match (axis, positive) {
            (0, true) => Self::PosX,
            (0, false) => Self::NegX,
            (1, true) => Self::PosY,
            (1, false) => Self::NegY,
            (_, true) => Self::PosZ,
            (_, false) => Self::NegZ,
        }
    }

    /// Returns the sweep axes for greedy meshing: `(layer_axis, u_axis, v_axis)`.
    ///
    /// `layer_axis` is the axis perpendicular to the face. `u_axis` and
    /// `v_axis` span the face plane. Each value is 0=X, 1=Y, 2=Z.
    pub fn sweep_axes(self) -> (usize, usize, usize) {
        match self {
            Self::PosX | Self::NegX => (0, 2, 1), // layer=X, u=Z, v=Y
            Self::PosY | Self::NegY => (1, 0, 2), // layer=Y, u=X, v=Z
            Self::PosZ | Self::NegZ => (2, 0, 1), // layer=Z, u=X, v=Y
        }
    }

    pub fn axis(self) -> usize {
        self.sweep_axes().0
    }

    pub fn is_positive(self) -> bool {
        matches!(self, Self::PosX | Self::PosY | Self::PosZ)
    }

    /// Returns the unit normal as `[f32; 3]` for this face direction.
    pub fn normal(self) -> [f32; 3] {
        let mut n = [0.0; 3];
        n[self.axis()] = if self.is_positive() { 1.0 } else { -1.0 };
        n
    }

    /// Returns the neighbor coordinate offset for this direction.
    pub fn offset(self, x: i32, y: i32, z: i32) -> (i32, i32, i32) {
        match self {
            Self::PosX => (x + 1, y, z),
            Self::NegX => (x - 1, y, z),
            Self::PosY => (x, y + 1, z),
            Self::NegY => (x, y - 1, z),
            Self::PosZ => (x, y, z + 1),
            Self::NegZ => (x, y, z - 1),
        }
    }

    /// Returns the opposite face direction.
    pub fn opposite(self) -> Self {
        Self::from_axis(self.axis(), !self.is_positive())
    }

    /// Returns the direction index (0–5), matching
    /// [`lattice_voxel::ChunkCoord::face_neighbors`] order.
    pub fn index(self) -> usize {
        self as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_directions_unique() {
        for (i, a) in FaceDirection::ALL.iter().enumerate() {
            for (j, b) in FaceDirection::ALL.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b);
                }
            }
        }
    }

    #[test]
    fn test_offset_pos_x() {
        assert_eq!(FaceDirection::PosX.offset(5, 10, 15), (6, 10, 15));
    }

    #[test]
    fn test_offset_negative_result() {
        assert_eq!(FaceDirection::NegX.offset(0, 0, 0), (-1, 0, 0));
    }

    #[test]
    fn test_opposite_and_axis_roundtrip() {
        for dir in FaceDirection::ALL {
            assert_eq!(dir.opposite().opposite(), dir);
            assert_eq!(dir.opposite().axis(), dir.axis());
            assert_ne!(dir.opposite().is_positive(), dir.is_positive());
            assert_eq!(FaceDirection::from_axis(dir.axis(), dir.is_positive()), dir);
        }
    }

    #[test]
    fn test_index_matches_neighbor_order() {
        let c = lattice_voxel::ChunkCoord::new(0, 0, 0);
        let neighbors = c.face_neighbors();
        for dir in FaceDirection::ALL {
            let (x, y, z) = dir.offset(0, 0, 0);
            assert_eq!(neighbors[dir.index()], lattice_voxel::ChunkCoord::new(x, y, z));
        }
    }
}
