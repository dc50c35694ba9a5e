//! Deterministic terrain generation: hash value noise, climate, column heights, caves and trees.

mod cave;
mod climate;
mod generator;
mod terrain_height;
mod trees;

pub mod noise;
pub mod seed;

pub use cave::{CaveCarver, CaveConfig};
pub use climate::{Climate, ClimateConfig, ClimateSampler};
pub use generator::TerrainGenerator;
pub use noise::{FbmParams, ValueNoise};
pub use seed::{WorldAnchors, derive_seed};
pub use terrain_height::{ColumnSample, ColumnSampler, TerrainParams};
pub use trees::{TreeConfig, TreePlacer, TreeSite};
