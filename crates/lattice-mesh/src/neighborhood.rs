//! Owned snapshot of a chunk plus the boundary layers of its face neighbors.
//!
//! [`ChunkNeighborhood`] is captured under one read of the world map and then
//! handed to a mesh worker, which never touches the world lock again.

use lattice_voxel::{
    BlockId, CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z, ChunkCoord, VoxelChunkData, VoxelWorld,
};
use rustc_hash::FxHashMap;

use crate::face_direction::FaceDirection;

const DIMS: [usize; 3] = [CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z];

/// The single layer of a neighbor chunk that touches the centre chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkBoundarySlice {
    /// Indexed `a * size_b + b`, where `a` and `b` are the two remaining axes
    /// in X, Y, Z order.
    data: Vec<BlockId>,
    size_b: usize,
}

impl ChunkBoundarySlice {
    pub fn get(&self, a: usize, b: usize) -> BlockId {
        self.data.get(a * self.size_b + b).copied().unwrap_or(BlockId::AIR)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The two axes spanning a face perpendicular to `axis`, in X, Y, Z order.
fn plane_axes(axis: usize) -> (usize, usize) {
    match axis {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    }
}

/// Extracts the layer of `neighbor` that faces a chunk lying in direction
/// `towards.opposite()` of it. For `towards == PosX` the neighbor sits on
/// the centre's +X side, so its `x = 0` layer is taken.
pub fn extract_boundary_slice(neighbor: &VoxelChunkData, towards: FaceDirection) -> ChunkBoundarySlice {
    let axis = towards.axis();
    let layer = if towards.is_positive() { 0 } else { DIMS[axis] - 1 };
    let (a_axis, b_axis) = plane_axes(axis);
    let mut data = Vec::with_capacity(DIMS[a_axis] * DIMS[b_axis]);
    for a in 0..DIMS[a_axis] {
        for b in 0..DIMS[b_axis] {
            let mut p = [0usize; 3];
            p[axis] = layer;
            p[a_axis] = a;
            p[b_axis] = b;
            data.push(neighbor.get(p[0], p[1], p[2]));
        }
    }
    ChunkBoundarySlice {
        data,
        size_b: DIMS[b_axis],
    }
}

/// A centre chunk plus the face-adjacent boundary layers meshing needs.
///
/// Missing neighbors read as air.
#[derive(Clone, Debug)]
pub struct ChunkNeighborhood {
    center: VoxelChunkData,
    faces: [Option<ChunkBoundarySlice>; 6],
}

impl ChunkNeighborhood {
    /// A neighborhood whose neighbors are all air.
    pub fn isolated(center: VoxelChunkData) -> Self {
        Self {
            center,
            faces: Default::default(),
        }
    }

    /// Copies `coord` and its face neighbors out of `world` under a single
    /// read lock. Returns `None` if `coord` is not loaded.
    pub fn capture(world: &VoxelWorld, coord: ChunkCoord) -> Option<Self> {
        world.read(|chunks| Self::capture_in(chunks, coord))
    }

    /// Same as [`capture`](Self::capture), for callers already inside
    /// [`VoxelWorld::read`].
    pub fn capture_in(chunks: &FxHashMap<ChunkCoord, VoxelChunkData>, coord: ChunkCoord) -> Option<Self> {
        let center = chunks.get(&coord)?.clone();
        let mut hood = Self::isolated(center);
        for (dir, neighbor) in FaceDirection::ALL.into_iter().zip(coord.face_neighbors()) {
            if let Some(chunk) = chunks.get(&neighbor) {
                hood.faces[dir.index()] = Some(extract_boundary_slice(chunk, dir));
            }
        }
        Some(hood)
    }

    /// Sets the neighbor on side `dir` of the centre.
    pub fn set_neighbor(&mut self, dir: FaceDirection, neighbor: &VoxelChunkData) {
        self.faces[dir.index()] = Some(extract_boundary_slice(neighbor, dir));
    }

    pub fn center(&self) -> &VoxelChunkData {
        &self.center
    }

    pub fn coord(&self) -> ChunkCoord {
        self.center.coord()
    }

    pub fn has_neighbor(&self, dir: FaceDirection) -> bool {
        self.faces[dir.index()].is_some()
    }

    /// Block at a local position, which may step one block outside the
    /// centre across a face. Edge and corner positions read as air.
    pub fn get(&self, x: i32, y: i32, z: i32) -> BlockId {
        let p = [x, y, z];
        let mut outside = None;
        for axis in 0..3 {
            let size = DIMS[axis] as i32;
            let dir = if p[axis] < 0 {
                FaceDirection::from_axis(axis, false)
            } else if p[axis] >= size {
                FaceDirection::from_axis(axis, true)
            } else {
                continue;
            };
            if outside.is_some() || p[axis] < -1 || p[axis] > size {
                return BlockId::AIR;
            }
            outside = Some(dir);
        }

        match outside {
            None => self.center.get(x as usize, y as usize, z as usize),
            Some(dir) => {
                let (a_axis, b_axis) = plane_axes(dir.axis());
                self.faces[dir.index()]
                    .as_ref()
                    .map_or(BlockId::AIR, |slice| slice.get(p[a_axis] as usize, p[b_axis] as usize))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_voxel::WorldMeta;
    use std::sync::Arc;

    fn filled(coord: ChunkCoord, block: BlockId) -> VoxelChunkData {
        let blocks = vec![block.0; lattice_voxel::CHUNK_VOLUME];
        VoxelChunkData::from_blocks(coord, blocks).expect("full buffer")
    }

    #[test]
    fn test_isolated_reads_air_outside() {
        let hood = ChunkNeighborhood::isolated(filled(ChunkCoord::new(0, 0, 0), BlockId::STONE));
        assert_eq!(hood.get(0, 0, 0), BlockId::STONE);
        assert_eq!(hood.get(-1, 0, 0), BlockId::AIR);
        assert_eq!(hood.get(0, 16, 0), BlockId::AIR);
    }

    #[test]
    fn test_face_neighbor_lookup() {
        let mut center = VoxelChunkData::new(ChunkCoord::new(0, 0, 0));
        center.set_raw(15, 3, 4, BlockId::DIRT);
        let mut east = VoxelChunkData::new(ChunkCoord::new(1, 0, 0));
        east.set_raw(0, 3, 4, BlockId::GLASS);
        east.set_raw(15, 3, 4, BlockId::STONE);

        let mut hood = ChunkNeighborhood::isolated(center);
        hood.set_neighbor(FaceDirection::PosX, &east);
        assert_eq!(hood.get(15, 3, 4), BlockId::DIRT);
        assert_eq!(hood.get(16, 3, 4), BlockId::GLASS);
        assert_eq!(hood.get(16, 3, 5), BlockId::AIR);

        let mut below = VoxelChunkData::new(ChunkCoord::new(0, -1, 0));
        below.set_raw(7, 15, 9, BlockId::SAND);
        hood.set_neighbor(FaceDirection::NegY, &below);
        assert_eq!(hood.get(7, -1, 9), BlockId::SAND);
    }

    #[test]
    fn test_edge_and_corner_read_air() {
        let mut hood = ChunkNeighborhood::isolated(VoxelChunkData::new(ChunkCoord::new(0, 0, 0)));
        hood.set_neighbor(FaceDirection::PosX, &filled(ChunkCoord::new(1, 0, 0), BlockId::STONE));
        hood.set_neighbor(FaceDirection::PosY, &filled(ChunkCoord::new(0, 1, 0), BlockId::STONE));
        assert_eq!(hood.get(16, 5, 5), BlockId::STONE);
        assert_eq!(hood.get(16, 16, 5), BlockId::AIR);
        assert_eq!(hood.get(17, 5, 5), BlockId::AIR);
    }

    #[test]
    fn test_capture_from_world() {
        let meta = WorldMeta::new(1, 64, 64, 64);
        let world = VoxelWorld::new(meta, None, Arc::new(|c: ChunkCoord| VoxelChunkData::new(c)));
        world.insert_chunk(filled(ChunkCoord::new(1, 1, 1), BlockId::STONE));
        world.insert_chunk(filled(ChunkCoord::new(1, 1, 2), BlockId::WATER));

        assert!(ChunkNeighborhood::capture(&world, ChunkCoord::new(0, 0, 0)).is_none());
        let hood = ChunkNeighborhood::capture(&world, ChunkCoord::new(1, 1, 1)).expect("loaded");
        assert!(hood.has_neighbor(FaceDirection::PosZ));
        assert!(!hood.has_neighbor(FaceDirection::NegZ));
        assert_eq!(hood.get(3, 3, 16), BlockId::WATER);
        assert_eq!(hood.get(3, 3, -1), BlockId::AIR);
    }
}
