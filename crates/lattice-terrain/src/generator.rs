//! Chunk generation pipeline: columns, materials, caves, then trees.

use lattice_voxel::{
    BlockId, CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z, ChunkCoord, ChunkGenerator, VoxelChunkData,
    WorldMeta,
};

use crate::cave::{CaveCarver, CaveConfig};
use crate::terrain_height::{ColumnSample, ColumnSampler, TerrainParams};
use crate::trees::{TreeConfig, TreePlacer};

/// Blocks directly below the surface that share the surface family.
const SUBSOIL_DEPTH: i32 = 3;

/// Builds chunks for one world.
///
/// Holds only immutable noise parameters, so one instance can be shared by
/// every load worker.
#[derive(Clone, Debug)]
pub struct TerrainGenerator {
    seed: u64,
    width: u32,
    height: u32,
    depth: u32,
    columns: ColumnSampler,
    caves: CaveCarver,
    trees: TreePlacer,
}

impl TerrainGenerator {
    /// Creates a generator for the world described by `meta`.
    pub fn new(meta: &WorldMeta) -> Self {
        Self::with_configs(meta, CaveConfig::default(), TreeConfig::default())
    }

    pub fn with_configs(meta: &WorldMeta, caves: CaveConfig, trees: TreeConfig) -> Self {
        Self {
            seed: meta.seed,
            width: meta.width,
            height: meta.height,
            depth: meta.depth,
            columns: ColumnSampler::new(
                meta.seed,
                meta.width,
                meta.depth,
                TerrainParams::for_height(meta.height),
            ),
            caves: CaveCarver::new(meta.seed, caves),
            trees: TreePlacer::new(meta.seed, trees),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn sea_level(&self) -> i32 {
        self.columns.params().sea_level
    }

    pub fn columns(&self) -> &ColumnSampler {
        &self.columns
    }

    fn column_in_world(&self, wx: i32, wz: i32) -> bool {
        wx >= 0 && wz >= 0 && (wx as u32) < self.width && (wz as u32) < self.depth
    }

    fn chunk_in_world(&self, coord: ChunkCoord) -> bool {
        let [ox, oy, oz] = coord.origin();
        let overlaps = |o: i32, size: usize, extent: u32| o + size as i32 > 0 && (o.max(0) as u32) < extent;
        overlaps(ox, CHUNK_SIZE_X, self.width)
            && overlaps(oy, CHUNK_SIZE_Y, self.height)
            && overlaps(oz, CHUNK_SIZE_Z, self.depth)
    }

    /// Generates `coord`. Chunks outside the world volume come back empty
    /// without sampling any noise.
    pub fn generate_chunk(&self, coord: ChunkCoord) -> VoxelChunkData {
        let mut chunk = VoxelChunkData::new(coord);
        if !self.chunk_in_world(coord) {
            return chunk;
        }
        let [ox, oy, oz] = coord.origin();

        let mut samples: Vec<Option<ColumnSample>> = Vec::with_capacity(CHUNK_SIZE_X * CHUNK_SIZE_Z);
        for lx in 0..CHUNK_SIZE_X as i32 {
            for lz in 0..CHUNK_SIZE_Z as i32 {
                let (wx, wz) = (ox + lx, oz + lz);
                samples.push(self.column_in_world(wx, wz).then(|| self.columns.sample(wx, wz)));
            }
        }

        let sea_level = self.sea_level();
        let top_y = (oy + CHUNK_SIZE_Y as i32).min(self.height as i32);
        for lx in 0..CHUNK_SIZE_X {
            for lz in 0..CHUNK_SIZE_Z {
                let Some(col) = samples[lx * CHUNK_SIZE_Z + lz] else {
                    continue;
                };
                let (wx, wz) = (ox + lx as i32, oz + lz as i32);
                for wy in oy.max(0)..top_y {
                    let mut block = self.material_at(wy, &col, sea_level);
                    if is_carvable(block)
                        && self.caves.is_cave(wx, wy, wz, col.solid_top(), sea_level)
                    {
                        block = BlockId::AIR;
                    }
                    if block != BlockId::AIR {
                        chunk.set_raw(lx, (wy - oy) as usize, lz, block);
                    }
                }
            }
        }

        let lookup = |wx: i32, wz: i32| {
            let (lx, lz) = (wx - ox, wz - oz);
            if (0..CHUNK_SIZE_X as i32).contains(&lx) && (0..CHUNK_SIZE_Z as i32).contains(&lz) {
                samples[lx as usize * CHUNK_SIZE_Z + lz as usize]
            } else {
                None
            }
        };
        let trees = self.trees.place(&mut chunk, &lookup, sea_level, self.height as i32);
        if trees > 0 {
            tracing::trace!(?coord, trees, "placed trees");
        }
        chunk
    }

    /// Block at height `wy` in a column, before caves and trees.
    pub fn material_at(&self, wy: i32, col: &ColumnSample, sea_level: i32) -> BlockId {
        if wy == 0 {
            return BlockId::NULLBLOCK;
        }
        let top = col.solid_top();
        if wy > top {
            let water_level = if col.pool_depth > 0 { col.height - 1 } else { sea_level };
            return if wy <= water_level { BlockId::WATER } else { BlockId::AIR };
        }

        let surface = surface_block(col, sea_level);
        let depth = top - wy;
        if depth == 0 {
            return surface;
        }
        if depth <= SUBSOIL_DEPTH {
            return match surface {
                BlockId::GRASS => BlockId::DIRT,
                other => other,
            };
        }
        let transitional = col.is_desert() || col.is_beach() || top < sea_level;
        if depth == SUBSOIL_DEPTH + 1 && transitional {
            return BlockId::GRAVEL;
        }
        BlockId::STONE
    }
}

impl ChunkGenerator for TerrainGenerator {
    fn generate(&self, coord: ChunkCoord) -> VoxelChunkData {
        self.generate_chunk(coord)
    }
}

/// Top block of a column: grass, sand or gravel.
fn surface_block(col: &ColumnSample, sea_level: i32) -> BlockId {
    if col.pool_depth > 0 {
        return BlockId::GRAVEL;
    }
    if col.height < sea_level {
        // Shallow sea floor is sand, deep floor gravel.
        return if col.height >= sea_level - 6 || col.is_desert() {
            BlockId::SAND
        } else {
            BlockId::GRAVEL
        };
    }
    if col.is_desert() || col.is_beach() {
        return BlockId::SAND;
    }
    BlockId::GRASS
}

/// Caves cut through ground, never through water or bedrock.
fn is_carvable(block: BlockId) -> bool {
    !matches!(block, BlockId::AIR | BlockId::WATER | BlockId::NULLBLOCK)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_voxel::CHUNK_VOLUME;

    fn generator(seed: u64) -> TerrainGenerator {
        TerrainGenerator::new(&WorldMeta::new(seed, 512, 128, 512))
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = generator(1337);
        let b = generator(1337);
        for coord in [ChunkCoord::new(0, 0, 0), ChunkCoord::new(5, 3, 9), ChunkCoord::new(31, 2, 17)] {
            assert_eq!(
                a.generate_chunk(coord).blocks(),
                b.generate_chunk(coord).blocks(),
                "chunk {coord} differs between runs"
            );
        }
    }

    #[test]
    fn test_different_seeds_differ() {
        let coord = ChunkCoord::new(4, 3, 4);
        let a = generator(1).generate_chunk(coord);
        let b = generator(2).generate_chunk(coord);
        assert_ne!(a.blocks(), b.blocks());
    }

    #[test]
    fn test_chunks_outside_world_are_void() {
        let g = generator(1337);
        for coord in [
            ChunkCoord::new(0, -1, 0),
            ChunkCoord::new(0, 8, 0),
            ChunkCoord::new(-1, 0, 0),
            ChunkCoord::new(0, 0, 32),
        ] {
            let chunk = g.generate_chunk(coord);
            assert!(chunk.is_empty(), "chunk {coord} should be void");
            assert_eq!(chunk.blocks().len(), CHUNK_VOLUME);
        }
    }

    /// Seed 1337, 512x128x512: bedrock only at Y=0, and every column's top
    /// ground block is grass, sand or gravel.
    #[test]
    fn test_seed_1337_origin_column_surface() {
        let g = generator(1337);
        let chunks: Vec<VoxelChunkData> = (0..8).map(|cy| g.generate_chunk(ChunkCoord::new(0, cy, 0))).collect();
        let block = |x: usize, y: usize, z: usize| chunks[y / 16].get(x, y % 16, z);

        for x in 0..16 {
            for z in 0..16 {
                assert_eq!(block(x, 0, z), BlockId::NULLBLOCK, "bedrock missing at ({x}, 0, {z})");
                for y in 1..128 {
                    assert_ne!(block(x, y, z), BlockId::NULLBLOCK, "bedrock above floor at ({x},{y},{z})");
                }

                let top = (0..128)
                    .rev()
                    .map(|y| block(x, y, z))
                    .find(|b| !matches!(*b, BlockId::AIR | BlockId::WATER | BlockId::LOG | BlockId::LEAVES))
                    .expect("column has ground");
                assert!(
                    matches!(top, BlockId::GRASS | BlockId::SAND | BlockId::GRAVEL),
                    "column ({x}, {z}) topped with {top:?}"
                );
            }
        }
    }

    #[test]
    fn test_water_fills_to_sea_level_over_ocean() {
        let g = generator(1337);
        let (ox, oz) = g.columns().climate().anchors().ocean;
        let (wx, wz) = (ox as i32, oz as i32);
        let col = g.columns().sample(wx, wz);
        let sea = g.sea_level();
        assert!(col.height < sea);
        assert_eq!(g.material_at(sea, &col, sea), BlockId::WATER);
        assert_eq!(g.material_at(sea + 1, &col, sea), BlockId::AIR);
        assert_eq!(g.material_at(col.height + 1, &col, sea), BlockId::WATER);
    }

    #[test]
    fn test_material_layers() {
        let g = generator(3);
        let sea = 51;
        let col = ColumnSample {
            height: 70,
            climate: crate::climate::Climate {
                continental: 0.8,
                temperature: 0.4,
                moisture: 0.6,
                desert: 0.0,
                ocean: 0.0,
            },
            beach: 0.0,
            pool_depth: 0,
        };
        assert_eq!(g.material_at(70, &col, sea), BlockId::GRASS);
        assert_eq!(g.material_at(69, &col, sea), BlockId::DIRT);
        assert_eq!(g.material_at(67, &col, sea), BlockId::DIRT);
        assert_eq!(g.material_at(66, &col, sea), BlockId::STONE);
        assert_eq!(g.material_at(0, &col, sea), BlockId::NULLBLOCK);

        let desert = ColumnSample {
            climate: crate::climate::Climate { desert: 0.9, ..col.climate },
            ..col
        };
        assert_eq!(g.material_at(70, &desert, sea), BlockId::SAND);
        assert_eq!(g.material_at(67, &desert, sea), BlockId::SAND);
        assert_eq!(g.material_at(66, &desert, sea), BlockId::GRAVEL);
        assert_eq!(g.material_at(65, &desert, sea), BlockId::STONE);

        let pool = ColumnSample { pool_depth: 2, ..col };
        assert_eq!(g.material_at(69, &pool, sea), BlockId::WATER);
        assert_eq!(g.material_at(68, &pool, sea), BlockId::WATER);
        assert_eq!(g.material_at(67, &pool, sea), BlockId::GRAVEL);
        assert_eq!(g.material_at(70, &pool, sea), BlockId::AIR);
    }
}
