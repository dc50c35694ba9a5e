//! Per-world metadata persisted as `world.ron` inside the world directory.
//!
//! The seed and dimensions are fixed at creation. Only the game mode and
//! spawn point may change afterwards.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::coords::{CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z, ChunkCoord};

/// File name of the metadata record.
pub const WORLD_META_FILE: &str = "world.ron";

/// Generator identifier written into new worlds.
pub const DEFAULT_GENERATOR: &str = "lattice-default-v1";

/// Errors from reading or writing world metadata.
#[derive(Debug, thiserror::Error)]
pub enum WorldMetaError {
    #[error("no world metadata at {0}")]
    NotFound(String),
    #[error("failed to read world metadata: {0}")]
    ReadError(#[source] std::io::Error),
    #[error("failed to write world metadata: {0}")]
    WriteError(#[source] std::io::Error),
    #[error("failed to parse world metadata: {0}")]
    ParseError(#[source] ron::error::SpannedError),
    #[error("failed to serialize world metadata: {0}")]
    SerializeError(#[source] ron::Error),
    /// Dimensions of zero or a height that cannot hold a single layer.
    #[error("invalid world dimensions {width}x{height}x{depth}")]
    InvalidDimensions { width: u32, height: u32, depth: u32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameMode {
    #[default]
    Survival,
    Creative,
}

/// Immutable world description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldMeta {
    /// Sole source of generation determinism.
    pub seed: u64,
    /// Extent along X, in blocks.
    pub width: u32,
    /// Extent along Y, in blocks.
    pub height: u32,
    /// Extent along Z, in blocks.
    pub depth: u32,
    pub generator: String,
    /// Creation time, seconds since the UNIX epoch.
    pub created_at: u64,
    pub game_mode: GameMode,
    /// Spawn position in world block coordinates.
    pub spawn: [i32; 3],
}

impl WorldMeta {
    /// Describes a new world, stamped with the current time.
    pub fn new(seed: u64, width: u32, height: u32, depth: u32) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        Self {
            seed,
            width,
            height,
            depth,
            generator: DEFAULT_GENERATOR.to_string(),
            created_at,
            game_mode: GameMode::default(),
            spawn: [width as i32 / 2, height as i32 - 1, depth as i32 / 2],
        }
    }

    fn validate(&self) -> Result<(), WorldMetaError> {
        if self.width == 0 || self.depth == 0 || self.height < 2 || self.height > i32::MAX as u32 {
            return Err(WorldMetaError::InvalidDimensions {
                width: self.width,
                height: self.height,
                depth: self.depth,
            });
        }
        Ok(())
    }

    /// Loads `world.ron` from `world_dir`.
    pub fn load(world_dir: &Path) -> Result<Self, WorldMetaError> {
        let path = world_dir.join(WORLD_META_FILE);
        if !path.exists() {
            return Err(WorldMetaError::NotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(&path).map_err(WorldMetaError::ReadError)?;
        let meta: WorldMeta = ron::from_str(&contents).map_err(WorldMetaError::ParseError)?;
        meta.validate()?;
        tracing::info!(seed = meta.seed, "loaded world metadata from {}", path.display());
        Ok(meta)
    }

    /// Writes `world.ron` into `world_dir`, creating the directory.
    pub fn save(&self, world_dir: &Path) -> Result<(), WorldMetaError> {
        self.validate()?;
        std::fs::create_dir_all(world_dir).map_err(WorldMetaError::WriteError)?;
        let pretty = ron::ser::PrettyConfig::new().depth_limit(2);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(WorldMetaError::SerializeError)?;
        std::fs::write(world_dir.join(WORLD_META_FILE), serialized)
            .map_err(WorldMetaError::WriteError)
    }

    /// Loads existing metadata, or creates and saves `fresh` when none exists.
    ///
    /// A present but unreadable file is an error, never silently replaced.
    pub fn load_or_create(world_dir: &Path, fresh: WorldMeta) -> Result<Self, WorldMetaError> {
        match Self::load(world_dir) {
            Err(WorldMetaError::NotFound(_)) => {
                fresh.save(world_dir)?;
                tracing::info!(seed = fresh.seed, "created world at {}", world_dir.display());
                Ok(fresh)
            }
            other => other,
        }
    }

    /// Returns `true` if block column `(wx, wz)` lies inside the world footprint.
    pub fn contains_column(&self, wx: i32, wz: i32) -> bool {
        wx >= 0 && wz >= 0 && (wx as u32) < self.width && (wz as u32) < self.depth
    }

    /// Returns `true` if the block lies inside the world volume.
    pub fn contains_block(&self, wx: i32, wy: i32, wz: i32) -> bool {
        self.contains_column(wx, wz) && wy >= 0 && (wy as u32) < self.height
    }

    /// Returns `true` if any block of `coord` lies inside the world volume.
    pub fn contains_chunk(&self, coord: ChunkCoord) -> bool {
        let [ox, oy, oz] = coord.origin();
        let hits = |origin: i32, size: usize, extent: u32| {
            origin + size as i32 > 0 && (origin.max(0) as u32) < extent
        };
        hits(ox, CHUNK_SIZE_X, self.width)
            && hits(oy, CHUNK_SIZE_Y, self.height)
            && hits(oz, CHUNK_SIZE_Z, self.depth)
    }

    /// Number of chunk layers needed to cover the world height.
    pub fn chunk_layers(&self) -> i32 {
        self.height.div_ceil(CHUNK_SIZE_Y as u32) as i32
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
