//! Broad climate fields: continentalness, desert weight and ocean weight.
//!
//! Each weight blends a smooth, large-scale climate signal with medium and
//! small "pocket" bands. Pockets are gated by the broad climate so that wet or
//! cold regions never sprout isolated desert specks.

use crate::noise::{FbmParams, ValueNoise, smooth_range};
use crate::seed::{WorldAnchors, derive_seed, distance, salt};

/// Climate at one block column. All weights are in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Climate {
    /// Macro land/sea height signal.
    pub continental: f64,
    pub temperature: f64,
    pub moisture: f64,
    /// How strongly the column is desert.
    pub desert: f64,
    /// How strongly the column is ocean.
    pub ocean: f64,
}

/// Tuning for [`ClimateSampler`].
#[derive(Clone, Debug)]
pub struct ClimateConfig {
    pub continental: FbmParams,
    pub climate: FbmParams,
    /// Wavelength of medium pocket bands, in blocks.
    pub medium_pocket_scale: f64,
    /// Wavelength of small pocket bands, in blocks.
    pub small_pocket_scale: f64,
    /// Anchor influence radius as a fraction of the smaller world extent.
    pub anchor_radius: f64,
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            continental: FbmParams {
                octaves: 4,
                frequency: 1.0 / 256.0,
                ..Default::default()
            },
            climate: FbmParams {
                octaves: 3,
                frequency: 1.0 / 384.0,
                ..Default::default()
            },
            medium_pocket_scale: 96.0,
            small_pocket_scale: 40.0,
            anchor_radius: 0.18,
        }
    }
}

/// Samples [`Climate`] for any block column of one world.
#[derive(Clone, Debug)]
pub struct ClimateSampler {
    continental: ValueNoise,
    temperature: ValueNoise,
    moisture: ValueNoise,
    desert_medium: ValueNoise,
    desert_small: ValueNoise,
    ocean_medium: ValueNoise,
    anchors: WorldAnchors,
    anchor_radius: f64,
    config: ClimateConfig,
}

impl ClimateSampler {
    pub fn new(world_seed: u64, width: u32, depth: u32, config: ClimateConfig) -> Self {
        let noise = |s| ValueNoise::new(derive_seed(world_seed, s));
        Self {
            continental: noise(salt::CONTINENTAL),
            temperature: noise(salt::TEMPERATURE),
            moisture: noise(salt::MOISTURE),
            desert_medium: noise(salt::DESERT_MEDIUM),
            desert_small: noise(salt::DESERT_SMALL),
            ocean_medium: noise(salt::OCEAN_MEDIUM),
            anchors: WorldAnchors::place(world_seed, width, depth),
            anchor_radius: config.anchor_radius * (width.min(depth) as f64),
            config,
        }
    }

    pub fn anchors(&self) -> &WorldAnchors {
        &self.anchors
    }

    /// Radius within which an anchor biases climate, in blocks.
    pub fn anchor_radius(&self) -> f64 {
        self.anchor_radius
    }

    /// Anchor pull at `p`: 1 at the anchor, falling smoothly to 0 at the radius.
    fn anchor_bias(&self, anchor: (f64, f64), p: (f64, f64)) -> f64 {
        if self.anchor_radius <= 0.0 {
            return 0.0;
        }
        smooth_range(self.anchor_radius, self.anchor_radius * 0.35, distance(anchor, p))
    }

    pub fn sample(&self, wx: i32, wz: i32) -> Climate {
        let (x, z) = (wx as f64, wz as f64);
        let cfg = &self.config;

        let continental = self.continental.fbm_2d(x, z, &cfg.continental);
        let temperature = self.temperature.fbm_2d(x, z, &cfg.climate);
        let moisture = self.moisture.fbm_2d(x, z, &cfg.climate);

        // Desert: hot and dry broadly, plus pockets that only survive where
        // the broad climate is neither wet nor cold.
        let aridity = temperature * 0.6 + (1.0 - moisture) * 0.4;
        let broad_desert = smooth_range(0.52, 0.72, aridity);
        let pocket = 0.6
            * self
                .desert_medium
                .sample_2d(x / cfg.medium_pocket_scale, z / cfg.medium_pocket_scale)
            + 0.4
                * self
                    .desert_small
                    .sample_2d(x / cfg.small_pocket_scale, z / cfg.small_pocket_scale);
        let wet_or_cold = moisture.max(1.0 - temperature);
        let pocket_gate = 1.0 - smooth_range(0.5, 0.65, wet_or_cold);
        let desert_pocket = smooth_range(0.6, 0.8, pocket) * pocket_gate * 0.85;
        let mut desert = broad_desert.max(desert_pocket);

        // Ocean: low continentalness, plus medium basins in moist regions.
        let broad_ocean = smooth_range(0.42, 0.28, continental);
        let basin = self
            .ocean_medium
            .sample_2d(x / cfg.medium_pocket_scale, z / cfg.medium_pocket_scale);
        let basin_gate = smooth_range(0.45, 0.65, moisture);
        let ocean_pocket = smooth_range(0.72, 0.88, basin) * basin_gate;
        let mut ocean = broad_ocean.max(ocean_pocket);

        let ocean_pull = self.anchor_bias(self.anchors.ocean, (x, z));
        let desert_pull = self.anchor_bias(self.anchors.desert, (x, z));
        ocean = ocean.max(ocean_pull) * (1.0 - desert_pull);
        desert = desert.max(desert_pull);
        // Open water wins over sand.
        desert *= 1.0 - ocean;

        Climate {
            continental,
            temperature,
            moisture,
            desert: desert.clamp(0.0, 1.0),
            ocean: ocean.clamp(0.0, 1.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
