//! Per-column surface height and surface classification.
//!
//! Land height is blended with a desert dune profile by desert weight, then
//! eroded toward the ocean floor by ocean weight. Columns near sea level are
//! classified as beach, and a separate noise threshold cuts inland pools.

use crate::climate::{Climate, ClimateConfig, ClimateSampler};
use crate::noise::{FbmParams, ValueNoise, lerp, smooth_range};
use crate::seed::{derive_seed, salt};

/// Configuration for mapping climate to block heights.
#[derive(Clone, Debug)]
pub struct TerrainParams {
    /// Total world height in blocks.
    pub world_height: i32,
    /// Water fills every column up to this Y.
    pub sea_level: i32,
    /// Lowest allowed surface Y.
    pub min_height: i32,
    /// Land rises at most this far above sea level before clamping.
    pub land_relief: f64,
    /// Ocean floor depth below sea level at full ocean weight.
    pub ocean_depth: f64,
    /// Columns within this many blocks of sea level count as shoreline.
    pub beach_band: i32,
    /// Pool noise above this value carves a depression.
    pub pool_threshold: f64,
    /// Deepest pool, in blocks.
    pub max_pool_depth: i32,
}

impl TerrainParams {
    /// Defaults scaled to a world of `world_height` blocks.
    pub fn for_height(world_height: u32) -> Self {
        let h = world_height as i32;
        Self {
            world_height: h,
            sea_level: (world_height as f64 * 0.40) as i32,
            min_height: 4.min(h - 1),
            land_relief: world_height as f64 * 0.35,
            ocean_depth: 14.0,
            beach_band: 2,
            pool_threshold: 0.8,
            max_pool_depth: 4,
        }
    }

    /// Highest allowed surface Y.
    pub fn max_height(&self) -> i32 {
        self.world_height - 1
    }
}

/// Everything the generator needs to know about one block column.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColumnSample {
    /// Y of the topmost solid block, before pool carving.
    pub height: i32,
    pub climate: Climate,
    /// Shoreline weight in `[0, 1]`; above 0.5 the surface is sand.
    pub beach: f64,
    /// Depth of an inland pool cut below `height - 1`, or 0.
    pub pool_depth: i32,
}

impl ColumnSample {
    /// Y of the topmost solid block after pool carving.
    pub fn solid_top(&self) -> i32 {
        if self.pool_depth > 0 {
            self.height - 1 - self.pool_depth
        } else {
            self.height
        }
    }

    pub fn is_beach(&self) -> bool {
        self.beach > 0.5
    }

    pub fn is_desert(&self) -> bool {
        self.climate.desert > 0.5
    }
}

/// Samples [`ColumnSample`]s for one world.
#[derive(Clone, Debug)]
pub struct ColumnSampler {
    climate: ClimateSampler,
    detail: ValueNoise,
    dunes: ValueNoise,
    pools: ValueNoise,
    params: TerrainParams,
}

const DETAIL: FbmParams = FbmParams {
    octaves: 3,
    frequency: 1.0 / 48.0,
    lacunarity: 2.0,
    persistence: 0.5,
};

impl ColumnSampler {
    pub fn new(world_seed: u64, width: u32, depth: u32, params: TerrainParams) -> Self {
        Self {
            climate: ClimateSampler::new(world_seed, width, depth, ClimateConfig::default()),
            detail: ValueNoise::new(derive_seed(world_seed, salt::DETAIL)),
            dunes: ValueNoise::new(derive_seed(world_seed, salt::DUNES)),
            pools: ValueNoise::new(derive_seed(world_seed, salt::POOLS)),
            params,
        }
    }

    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    pub fn climate(&self) -> &ClimateSampler {
        &self.climate
    }

    pub fn sample(&self, wx: i32, wz: i32) -> ColumnSample {
        let p = &self.params;
        let (x, z) = (wx as f64, wz as f64);
        let climate = self.climate.sample(wx, wz);
        let sea = p.sea_level as f64;

        // Land rises with continentalness above a shoreline shelf.
        let detail = self.detail.fbm_2d(x, z, &DETAIL);
        let inland = smooth_range(0.3, 0.9, climate.continental);
        let land = sea + 2.0 + inland * p.land_relief + (detail - 0.5) * 8.0;

        // Deserts are low rolling dunes.
        let dune = self.dunes.sample_2d(x / 20.0, z / 20.0);
        let desert = sea + 3.0 + dune * 5.0;

        let base = lerp(land, desert, climate.desert);

        // Coastal erosion: pull toward the ocean floor as ocean weight rises.
        let floor = sea - p.ocean_depth + (detail - 0.5) * 4.0;
        let eroded = lerp(base, floor, smooth_range(0.0, 1.0, climate.ocean));

        let height = (eroded.round() as i32).clamp(p.min_height, p.max_height());

        let offset = (height - p.sea_level).abs();
        let beach = if offset <= p.beach_band && climate.ocean > 0.05 {
            1.0 - offset as f64 / (p.beach_band as f64 + 1.0)
        } else {
            0.0
        };

        let pool_depth = self.pool_depth(x, z, height, &climate, beach);

        ColumnSample {
            height,
            climate,
            beach,
            pool_depth,
        }
    }

    /// Inland depressions, independent of ocean columns.
    fn pool_depth(&self, x: f64, z: f64, height: i32, climate: &Climate, beach: f64) -> i32 {
        let p = &self.params;
        if climate.ocean > 0.2 || beach > 0.0 || height < p.sea_level + 3 {
            return 0;
        }
        let v = self.pools.sample_2d(x / 24.0, z / 24.0);
        if v <= p.pool_threshold {
            return 0;
        }
        let t = (v - p.pool_threshold) / (1.0 - p.pool_threshold);
        ((t * p.max_pool_depth as f64).ceil() as i32).clamp(1, p.max_pool_depth)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler() -> ColumnSampler {
        ColumnSampler::new(1337, 512, 512, TerrainParams::for_height(128))
    }

    #[test]
    fn test_heights_clamped_to_world() {
        let s = sampler();
        let p = s.params().clone();
        for i in 0..2000 {
            let col = s.sample((i * 37) % 512, (i * 91) % 512);
            assert!(col.height >= p.min_height && col.height <= p.max_height());
            assert!(col.solid_top() >= p.min_height, "pool floor above bedrock");
        }
    }

    #[test]
    fn test_ocean_anchor_is_below_sea_level() {
        let s = sampler();
        let (ox, oz) = s.climate().anchors().ocean;
        let col = s.sample(ox as i32, oz as i32);
        assert!(
            col.height < s.params().sea_level,
            "ocean anchor height {} vs sea level {}",
            col.height,
            s.params().sea_level
        );
    }

    #[test]
    fn test_pools_only_inland() {
        let s = sampler();
        let sea = s.params().sea_level;
        for i in 0..4000 {
            let col = s.sample((i * 7) % 512, (i * 13) % 512);
            if col.pool_depth > 0 {
                assert!(col.height >= sea + 3);
                assert!(col.climate.ocean <= 0.2);
                assert!(col.pool_depth <= s.params().max_pool_depth);
            }
        }
    }

    #[test]
    fn test_sea_level_scaled_to_height() {
        assert_eq!(TerrainParams::for_height(128).sea_level, 51);
        assert_eq!(TerrainParams::for_height(256).max_height(), 255);
    }
}
