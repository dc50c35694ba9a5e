//! Fixed-size block storage for a single chunk, with dirty tracking and versioning.
//!
//! Blocks are stored one byte per cell in a flat buffer indexed
//! `((x * CHUNK_SIZE_Y) + y) * CHUNK_SIZE_Z + z`. Out-of-range local
//! coordinates read as air and writes to them are ignored.

use crate::coords::{CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z, CHUNK_VOLUME, ChunkCoord};
use crate::registry::BlockId;

/// Dirty-flag bit: chunk mesh needs rebuilding.
pub const MESH_DIRTY: u8 = 0b0000_0001;
/// Dirty-flag bit: chunk needs saving to disk.
pub const SAVE_DIRTY: u8 = 0b0000_0010;

const ALL_DIRTY: u8 = MESH_DIRTY | SAVE_DIRTY;

/// Block grid for one chunk.
///
/// The buffer length is always exactly [`CHUNK_VOLUME`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoxelChunkData {
    coord: ChunkCoord,
    blocks: Box<[u8]>,
    /// Bitfield of dirty flags.
    dirty: u8,
    /// Incremented on each block mutation.
    version: u64,
    /// Incremented on each block mutation and each mesh invalidation.
    mesh_version: u64,
}

impl VoxelChunkData {
    /// Creates an all-air chunk with no dirty flags set.
    pub fn new(coord: ChunkCoord) -> Self {
        Self {
            coord,
            blocks: vec![0u8; CHUNK_VOLUME].into_boxed_slice(),
            dirty: 0,
            version: 0,
            mesh_version: 0,
        }
    }

    /// Builds a chunk from a raw block buffer.
    ///
    /// Returns `None` if `blocks` is not exactly [`CHUNK_VOLUME`] long.
    pub fn from_blocks(coord: ChunkCoord, blocks: Vec<u8>) -> Option<Self> {
        if blocks.len() != CHUNK_VOLUME {
            return None;
        }
        Some(Self {
            coord,
            blocks: blocks.into_boxed_slice(),
            dirty: 0,
            version: 0,
            mesh_version: 0,
        })
    }

    /// Position of this chunk in chunk space.
    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Flat index of a local position. Caller guarantees bounds.
    #[inline]
    pub fn index(x: usize, y: usize, z: usize) -> usize {
        ((x * CHUNK_SIZE_Y) + y) * CHUNK_SIZE_Z + z
    }

    #[inline]
    fn in_bounds(x: usize, y: usize, z: usize) -> bool {
        x < CHUNK_SIZE_X && y < CHUNK_SIZE_Y && z < CHUNK_SIZE_Z
    }

    /// Returns the block at `(x, y, z)`, or air if out of range.
    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> BlockId {
        if !Self::in_bounds(x, y, z) {
            return BlockId::AIR;
        }
        BlockId(self.blocks[Self::index(x, y, z)])
    }

    /// Like [`get`](Self::get) but with signed coordinates, so callers can
    /// probe one step outside the chunk without wrapping.
    #[inline]
    pub fn get_signed(&self, x: i32, y: i32, z: i32) -> BlockId {
        if x < 0 || y < 0 || z < 0 {
            return BlockId::AIR;
        }
        self.get(x as usize, y as usize, z as usize)
    }

    /// Writes a block, marking the chunk mesh- and save-dirty.
    ///
    /// Returns `false` (and changes nothing) if out of range.
    pub fn set(&mut self, x: usize, y: usize, z: usize, block: BlockId) -> bool {
        if !Self::in_bounds(x, y, z) {
            tracing::warn!("VoxelChunkData::set out of bounds: ({}, {}, {})", x, y, z);
            return false;
        }
        self.blocks[Self::index(x, y, z)] = block.0;
        self.dirty |= ALL_DIRTY;
        self.version += 1;
        self.mesh_version += 1;
        true
    }

    /// Writes a block without touching flags or version.
    ///
    /// Used by the generator while building a fresh chunk.
    #[inline]
    pub fn set_raw(&mut self, x: usize, y: usize, z: usize, block: BlockId) {
        if Self::in_bounds(x, y, z) {
            self.blocks[Self::index(x, y, z)] = block.0;
        }
    }

    /// The raw block buffer.
    pub fn blocks(&self) -> &[u8] {
        &self.blocks
    }

    /// Returns `true` if every block is air.
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|&b| b == 0)
    }

    /// Mesh must be rebuilt.
    pub fn is_dirty(&self) -> bool {
        self.dirty & MESH_DIRTY != 0
    }

    /// Contents must be persisted.
    pub fn needs_save(&self) -> bool {
        self.dirty & SAVE_DIRTY != 0
    }

    /// Raw [`MESH_DIRTY`] / [`SAVE_DIRTY`] bits.
    pub fn dirty_flags(&self) -> u8 {
        self.dirty
    }

    /// Sets flag bits without bumping the version.
    pub fn mark_dirty(&mut self, flags: u8) {
        self.dirty |= flags;
    }

    /// Flags the mesh stale without changing any block, e.g. after a
    /// neighbor's seam block was edited. Bumps only the mesh version, so an
    /// in-flight mesh built from the old neighborhood cannot clear the flag
    /// while an in-flight save of the unchanged blocks still can.
    pub fn invalidate_mesh(&mut self) {
        self.dirty |= MESH_DIRTY;
        self.mesh_version += 1;
    }

    /// Clears the specified flag bits.
    pub fn clear_dirty(&mut self, flags: u8) {
        self.dirty &= !flags;
    }

    /// Current version counter.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Version a finished mesh must match to clear [`MESH_DIRTY`].
    pub fn mesh_version(&self) -> u64 {
        self.mesh_version
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
