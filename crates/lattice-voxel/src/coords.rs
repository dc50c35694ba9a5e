//! Chunk-space and block-space coordinates.
//!
//! World block coordinates are split into a [`ChunkCoord`] plus a local
//! offset using floored division, so negative positions land in the chunk
//! below/behind rather than being truncated toward zero.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Chunk extent along X, in blocks.
pub const CHUNK_SIZE_X: usize = 16;
/// Chunk extent along Y, in blocks.
pub const CHUNK_SIZE_Y: usize = 16;
/// Chunk extent along Z, in blocks.
pub const CHUNK_SIZE_Z: usize = 16;
/// Total blocks in one chunk.
pub const CHUNK_VOLUME: usize = CHUNK_SIZE_X * CHUNK_SIZE_Y * CHUNK_SIZE_Z;

/// Identifies a chunk's position on the chunk grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    /// Chunk-grid X coordinate.
    pub x: i32,
    /// Chunk-grid Y coordinate.
    pub y: i32,
    /// Chunk-grid Z coordinate.
    pub z: i32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the coordinate offset by `(dx, dy, dz)` chunks.
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// The chunk containing world block `(wx, wy, wz)`.
    pub fn from_block(wx: i32, wy: i32, wz: i32) -> Self {
        Self {
            x: wx.div_euclid(CHUNK_SIZE_X as i32),
            y: wy.div_euclid(CHUNK_SIZE_Y as i32),
            z: wz.div_euclid(CHUNK_SIZE_Z as i32),
        }
    }

    /// World block coordinate of this chunk's `(0, 0, 0)` corner.
    pub fn origin(self) -> [i32; 3] {
        [
            self.x * CHUNK_SIZE_X as i32,
            self.y * CHUNK_SIZE_Y as i32,
            self.z * CHUNK_SIZE_Z as i32,
        ]
    }

    /// The six face-adjacent neighbors, in `+X, -X, +Y, -Y, +Z, -Z` order.
    pub fn face_neighbors(self) -> [ChunkCoord; 6] {
        [
            self.offset(1, 0, 0),
            self.offset(-1, 0, 0),
            self.offset(0, 1, 0),
            self.offset(0, -1, 0),
            self.offset(0, 0, 1),
            self.offset(0, 0, -1),
        ]
    }

    /// Squared distance to another chunk, in chunk units.
    pub fn distance_sq(self, other: ChunkCoord) -> u64 {
        let dx = (self.x as i64 - other.x as i64).unsigned_abs();
        let dy = (self.y as i64 - other.y as i64).unsigned_abs();
        let dz = (self.z as i64 - other.z as i64).unsigned_abs();
        dx * dx + dy * dy + dz * dz
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Local block position within a chunk, each axis in `[0, CHUNK_SIZE_*)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LocalPos {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

/// Splits a world block coordinate into its chunk and local offset.
pub fn world_to_chunk_local(wx: i32, wy: i32, wz: i32) -> (ChunkCoord, LocalPos) {
    let local = LocalPos {
        x: wx.rem_euclid(CHUNK_SIZE_X as i32) as usize,
        y: wy.rem_euclid(CHUNK_SIZE_Y as i32) as usize,
        z: wz.rem_euclid(CHUNK_SIZE_Z as i32) as usize,
    };
    (ChunkCoord::from_block(wx, wy, wz), local)
}

/// Neighbor chunks whose shared face touches `local`.
///
/// A block in the interior of a chunk touches no neighbor; a corner block
/// touches three (one per axis). Edge and corner neighbors are never returned.
pub fn seam_neighbors(coord: ChunkCoord, local: LocalPos) -> Vec<ChunkCoord> {
    let mut out = Vec::new();
    if local.x == 0 {
        out.push(coord.offset(-1, 0, 0));
    } else if local.x == CHUNK_SIZE_X - 1 {
        out.push(coord.offset(1, 0, 0));
    }
    if local.y == 0 {
        out.push(coord.offset(0, -1, 0));
    } else if local.y == CHUNK_SIZE_Y - 1 {
        out.push(coord.offset(0, 1, 0));
    }
    if local.z == 0 {
        out.push(coord.offset(0, 0, -1));
    } else if local.z == CHUNK_SIZE_Z - 1 {
        out.push(coord.offset(0, 0, 1));
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_coordinates_floor() {
        let (coord, local) = world_to_chunk_local(-1, -16, -17);
        assert_eq!(coord, ChunkCoord::new(-1, -1, -2));
        assert_eq!(local, LocalPos { x: 15, y: 0, z: 15 });
    }

    #[test]
    fn test_positive_coordinates() {
        let (coord, local) = world_to_chunk_local(17, 0, 31);
        assert_eq!(coord, ChunkCoord::new(1, 0, 1));
        assert_eq!(local, LocalPos { x: 1, y: 0, z: 15 });
    }

    #[test]
    fn test_origin_inverts_from_block() {
        let coord = ChunkCoord::new(-3, 2, 7);
        let [ox, oy, oz] = coord.origin();
        assert_eq!(ChunkCoord::from_block(ox, oy, oz), coord);
        assert_eq!(ChunkCoord::from_block(ox + 15, oy + 15, oz + 15), coord);
    }

    #[test]
    fn test_interior_block_has_no_seam_neighbors() {
        let local = LocalPos { x: 5, y: 7, z: 9 };
        assert!(seam_neighbors(ChunkCoord::new(0, 0, 0), local).is_empty());
    }

    #[test]
    fn test_corner_block_touches_three_faces() {
        let c = ChunkCoord::new(2, 2, 2);
        let n = seam_neighbors(c, LocalPos { x: 0, y: 15, z: 0 });
        assert_eq!(n.len(), 3);
        assert!(n.contains(&c.offset(-1, 0, 0)));
        assert!(n.contains(&c.offset(0, 1, 0)));
        assert!(n.contains(&c.offset(0, 0, -1)));
    }

    #[test]
    fn test_distance_sq() {
        let a = ChunkCoord::new(0, 0, 0);
        let b = ChunkCoord::new(-3, 4, 0);
        assert_eq!(a.distance_sq(b), 25);
    }
}
