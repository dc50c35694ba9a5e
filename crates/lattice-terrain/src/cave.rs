//! 3D cave carving from two intersecting value-noise bands.
//!
//! A block is carved where both noise fields sit close to their midpoint,
//! which traces long winding tunnels. The band half-width grows with depth so
//! caves open up further underground.

use crate::noise::ValueNoise;
use crate::seed::{derive_seed, salt};

/// Configuration for cave carving.
#[derive(Clone, Debug)]
pub struct CaveConfig {
    /// Tunnel wavelength in blocks. Default: 28.
    pub scale: f64,
    /// Vertical stretch; values above 1 flatten tunnels. Default: 1.6.
    pub vertical_squash: f64,
    /// Band half-width at `min_depth`. Default: 0.06.
    pub base_threshold: f64,
    /// Band widening per block of extra depth. Default: 0.0015.
    pub depth_gain: f64,
    /// Upper limit for the band half-width. Default: 0.12.
    pub max_threshold: f64,
    /// Blocks below the surface before caves may appear. Default: 6.
    pub min_depth: i32,
    /// Extra solid cover kept under submerged columns. Default: 4.
    pub ocean_floor_buffer: i32,
    /// Blocks at or below this Y are never carved. Default: 1.
    pub floor_y: i32,
}

impl Default for CaveConfig {
    fn default() -> Self {
        Self {
            scale: 28.0,
            vertical_squash: 1.6,
            base_threshold: 0.06,
            depth_gain: 0.0015,
            max_threshold: 0.12,
            min_depth: 6,
            ocean_floor_buffer: 4,
            floor_y: 1,
        }
    }
}

/// Decides which subsurface blocks become cave air.
#[derive(Clone, Debug)]
pub struct CaveCarver {
    a: ValueNoise,
    b: ValueNoise,
    config: CaveConfig,
}

impl CaveCarver {
    pub fn new(world_seed: u64, config: CaveConfig) -> Self {
        Self {
            a: ValueNoise::new(derive_seed(world_seed, salt::CAVE_A)),
            b: ValueNoise::new(derive_seed(world_seed, salt::CAVE_B)),
            config,
        }
    }

    pub fn config(&self) -> &CaveConfig {
        &self.config
    }

    /// Carve threshold at `depth` blocks below the surface.
    pub fn threshold_at(&self, depth: i32) -> f64 {
        let c = &self.config;
        let extra = (depth - c.min_depth).max(0) as f64;
        (c.base_threshold + extra * c.depth_gain).min(c.max_threshold)
    }

    /// Returns `true` if `(wx, wy, wz)` should be carved to air.
    ///
    /// `surface` is the Y of the column's topmost solid block.
    pub fn is_cave(&self, wx: i32, wy: i32, wz: i32, surface: i32, sea_level: i32) -> bool {
        let c = &self.config;
        if wy <= c.floor_y || wy >= surface {
            return false;
        }
        let depth = surface - wy;
        if depth < c.min_depth {
            return false;
        }
        // Keep a thicker seal under water so it cannot drain into tunnels.
        if surface < sea_level && depth < c.min_depth + c.ocean_floor_buffer {
            return false;
        }

        let (x, y, z) = (
            wx as f64 / c.scale,
            wy as f64 * c.vertical_squash / c.scale,
            wz as f64 / c.scale,
        );
        let t = self.threshold_at(depth);
        (self.a.sample_3d(x, y, z) - 0.5).abs() < t && (self.b.sample_3d(x, y, z) - 0.5).abs() < t
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
