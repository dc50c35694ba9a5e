//! Texture atlas layout contract and a square tile-grid implementation.

use lattice_voxel::BlockId;
use rustc_hash::FxHashMap;

use crate::face_direction::FaceDirection;

/// Supplies texture coordinates for block faces.
///
/// The four corners are returned in face-plane order: `(u0, v0)`, `(u1, v0)`,
/// `(u1, v1)`, `(u0, v1)`. The mesher stretches them over the whole quad.
pub trait TextureAtlas: Send + Sync {
    fn face_uv_rect(&self, block: BlockId, face: FaceDirection) -> [[f32; 2]; 4];
}

/// Tile indices for the three face groups of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockTiles {
    pub top: u32,
    pub side: u32,
    pub bottom: u32,
}

impl BlockTiles {
    /// Same tile on every face.
    pub const fn uniform(tile: u32) -> Self {
        Self {
            top: tile,
            side: tile,
            bottom: tile,
        }
    }
}

/// A square atlas of `tiles_per_row × tiles_per_row` equal tiles.
///
/// Blocks without an assignment use tile 0.
#[derive(Clone, Debug)]
pub struct GridAtlas {
    tiles_per_row: u32,
    tiles: FxHashMap<BlockId, BlockTiles>,
}

impl GridAtlas {
    pub fn new(tiles_per_row: u32) -> Self {
        Self {
            tiles_per_row: tiles_per_row.max(1),
            tiles: FxHashMap::default(),
        }
    }

    /// Layout for the built-in block set.
    pub fn with_defaults() -> Self {
        let mut atlas = Self::new(16);
        let defaults = [
            (BlockId::NULLBLOCK, BlockTiles::uniform(1)),
            (BlockId::STONE, BlockTiles::uniform(2)),
            (BlockId::DIRT, BlockTiles::uniform(3)),
            (
                BlockId::GRASS,
                BlockTiles {
                    top: 4,
                    side: 5,
                    bottom: 3,
                },
            ),
            (BlockId::SAND, BlockTiles::uniform(6)),
            (BlockId::GRAVEL, BlockTiles::uniform(7)),
            (BlockId::WATER, BlockTiles::uniform(8)),
            (
                BlockId::LOG,
                BlockTiles {
                    top: 10,
                    side: 9,
                    bottom: 10,
                },
            ),
            (BlockId::LEAVES, BlockTiles::uniform(11)),
            (BlockId::GLASS, BlockTiles::uniform(12)),
            (BlockId::FLOWER, BlockTiles::uniform(13)),
        ];
        for (block, tiles) in defaults {
            atlas.set_tiles(block, tiles);
        }
        atlas
    }

    pub fn tiles_per_row(&self) -> u32 {
        self.tiles_per_row
    }

    pub fn set_tiles(&mut self, block: BlockId, tiles: BlockTiles) {
        self.tiles.insert(block, tiles);
    }

    pub fn tile_for(&self, block: BlockId, face: FaceDirection) -> u32 {
        let tiles = self.tiles.get(&block).copied().unwrap_or(BlockTiles::uniform(0));
        match face {
            FaceDirection::PosY => tiles.top,
            FaceDirection::NegY => tiles.bottom,
            _ => tiles.side,
        }
    }

    /// UV corners of `tile`. Tiles past the end of the grid wrap around.
    pub fn tile_rect(&self, tile: u32) -> [[f32; 2]; 4] {
        let n = self.tiles_per_row;
        let tile = tile % (n * n);
        let step = 1.0 / n as f32;
        let u0 = (tile % n) as f32 * step;
        let v0 = (tile / n) as f32 * step;
        let (u1, v1) = (u0 + step, v0 + step);
        [[u0, v0], [u1, v0], [u1, v1], [u0, v1]]
    }
}

impl Default for GridAtlas {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TextureAtlas for GridAtlas {
    fn face_uv_rect(&self, block: BlockId, face: FaceDirection) -> [[f32; 2]; 4] {
        self.tile_rect(self.tile_for(block, face))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
