//! Deterministic tree placement on a jittered grid.
//!
//! The XZ plane is split into square cells. Each cell hashes to at most one
//! candidate site, which survives only if a per-cell spawn roll and a broad
//! cluster noise gate both pass. Trees are written only when their whole
//! footprint fits inside the chunk being generated, so no tree is ever split
//! across a chunk seam.

use lattice_voxel::{BlockId, CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z, VoxelChunkData};

use crate::noise::{ValueNoise, hash3, hash_unit};
use crate::seed::{derive_seed, salt};
use crate::terrain_height::ColumnSample;

/// Configuration for tree placement.
#[derive(Clone, Debug)]
pub struct TreeConfig {
    /// Grid cell edge in blocks; at most one tree per cell.
    pub cell_size: i32,
    /// Probability that a cell's candidate spawns.
    pub spawn_chance: f64,
    /// Wavelength of the cluster gate, in blocks.
    pub cluster_scale: f64,
    /// Cluster noise must exceed this for trees to grow.
    pub cluster_threshold: f64,
    /// Largest allowed height difference to the four neighbor columns.
    pub max_height_delta: i32,
    /// Surface must be at least this far above sea level.
    pub min_height_above_sea: i32,
    pub trunk_min: i32,
    pub trunk_max: i32,
    /// Horizontal canopy radius around the trunk.
    pub canopy_radius: i32,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            cell_size: 8,
            spawn_chance: 0.6,
            cluster_scale: 64.0,
            cluster_threshold: 0.4,
            max_height_delta: 1,
            min_height_above_sea: 3,
            trunk_min: 4,
            trunk_max: 6,
            canopy_radius: 2,
        }
    }
}

/// A tree candidate that passed the spawn and cluster tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeSite {
    pub x: i32,
    pub z: i32,
    pub trunk_height: i32,
}

#[derive(Clone, Debug)]
pub struct TreePlacer {
    cell_seed: u64,
    clusters: ValueNoise,
    config: TreeConfig,
}

impl TreePlacer {
    pub fn new(world_seed: u64, config: TreeConfig) -> Self {
        Self {
            cell_seed: derive_seed(world_seed, salt::TREE_CELLS),
            clusters: ValueNoise::new(derive_seed(world_seed, salt::TREE_CLUSTERS)),
            config,
        }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// The candidate site of grid cell `(gx, gz)`, if it spawns.
    pub fn site_in_cell(&self, gx: i32, gz: i32) -> Option<TreeSite> {
        let c = &self.config;
        if hash_unit(gx, 1, gz, self.cell_seed) >= c.spawn_chance {
            return None;
        }
        // Jitter inside the cell, inset so the canopy stays in the cell.
        let span = (c.cell_size - 2 * c.canopy_radius).max(1) as u64;
        let h = hash3(gx, 2, gz, self.cell_seed);
        let x = gx * c.cell_size + c.canopy_radius + (h % span) as i32;
        let z = gz * c.cell_size + c.canopy_radius + ((h >> 16) % span) as i32;

        let cluster = self
            .clusters
            .sample_2d(x as f64 / c.cluster_scale, z as f64 / c.cluster_scale);
        if cluster <= c.cluster_threshold {
            return None;
        }

        let trunk_span = (c.trunk_max - c.trunk_min + 1).max(1) as u64;
        let trunk_height = c.trunk_min + ((h >> 40) % trunk_span) as i32;
        Some(TreeSite { x, z, trunk_height })
    }

    /// Places every tree whose full footprint lies inside `chunk`.
    ///
    /// `column` returns the sample for a world column inside the chunk
    /// footprint, or `None` outside it. Existing blocks other than air and
    /// leaves are never overwritten; a tree that would need to is skipped.
    /// Returns the number of trees written.
    pub fn place(
        &self,
        chunk: &mut VoxelChunkData,
        column: &dyn Fn(i32, i32) -> Option<ColumnSample>,
        sea_level: i32,
        world_height: i32,
    ) -> usize {
        let c = &self.config;
        let [ox, oy, oz] = chunk.coord().origin();
        let (max_x, max_y, max_z) = (
            ox + CHUNK_SIZE_X as i32 - 1,
            (oy + CHUNK_SIZE_Y as i32 - 1).min(world_height - 1),
            oz + CHUNK_SIZE_Z as i32 - 1,
        );
        let r = c.canopy_radius;

        let mut placed = 0;
        for gx in ox.div_euclid(c.cell_size)..=max_x.div_euclid(c.cell_size) {
            for gz in oz.div_euclid(c.cell_size)..=max_z.div_euclid(c.cell_size) {
                let Some(site) = self.site_in_cell(gx, gz) else {
                    continue;
                };
                if site.x - r < ox || site.x + r > max_x || site.z - r < oz || site.z + r > max_z {
                    continue;
                }
                let Some(ground) = column(site.x, site.z) else {
                    continue;
                };
                if !self.ground_accepts_tree(&ground, site, column, sea_level) {
                    continue;
                }

                let base = ground.height + 1;
                let top = base + site.trunk_height + 1;
                if base < oy || top > max_y {
                    continue;
                }

                let blocks = tree_blocks(site, base, r);
                let fits = blocks.iter().all(|&(x, y, z, _)| {
                    let b = chunk.get((x - ox) as usize, (y - oy) as usize, (z - oz) as usize);
                    b.is_air() || b == BlockId::LEAVES
                });
                if !fits {
                    continue;
                }

                for (x, y, z, block) in blocks {
                    let (lx, ly, lz) = ((x - ox) as usize, (y - oy) as usize, (z - oz) as usize);
                    if block == BlockId::LEAVES && !chunk.get(lx, ly, lz).is_air() {
                        continue;
                    }
                    chunk.set_raw(lx, ly, lz, block);
                }
                placed += 1;
            }
        }
        placed
    }

    /// Grass, high enough above the sea, and flat against its neighbors.
    fn ground_accepts_tree(
        &self,
        ground: &ColumnSample,
        site: TreeSite,
        column: &dyn Fn(i32, i32) -> Option<ColumnSample>,
        sea_level: i32,
    ) -> bool {
        let c = &self.config;
        if ground.is_desert() || ground.is_beach() || ground.pool_depth > 0 {
            return false;
        }
        if ground.height < sea_level + c.min_height_above_sea {
            return false;
        }
        [(1, 0), (-1, 0), (0, 1), (0, -1)].iter().all(|&(dx, dz)| {
            column(site.x + dx, site.z + dz)
                .is_some_and(|n| (n.height - ground.height).abs() <= c.max_height_delta)
        })
    }
}

/// Trunk and canopy cells of one tree, in world coordinates.
fn tree_blocks(site: TreeSite, base: i32, radius: i32) -> Vec<(i32, i32, i32, BlockId)> {
    let mut blocks = Vec::new();
    let trunk_top = base + site.trunk_height - 1;
    for y in base..=trunk_top {
        blocks.push((site.x, y, site.z, BlockId::LOG));
    }
    // Two wide layers around the top of the trunk, two narrow ones above.
    for y in (trunk_top - 1)..=(trunk_top + 2) {
        let rad = if y <= trunk_top { radius } else { (radius - 1).max(1) };
        for dx in -rad..=rad {
            for dz in -rad..=rad {
                if dx.abs() == rad && dz.abs() == rad {
                    continue;
                }
                if dx == 0 && dz == 0 && y <= trunk_top {
                    continue;
                }
                blocks.push((site.x + dx, y, site.z + dz, BlockId::LEAVES));
            }
        }
    }
    blocks
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
