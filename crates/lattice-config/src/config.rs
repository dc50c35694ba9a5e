//! Settings structs, their defaults, and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name inside the config directory.
pub const CONFIG_FILE: &str = "config.ron";

/// `<platform config dir>/lattice`, or `./lattice` when the platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lattice")
}

fn default_saves_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lattice")
        .join("saves")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub world: WorldConfig,
    pub streaming: StreamingSettings,
    pub debug: DebugConfig,
}

/// Which world to open, and how big a new one should be.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    /// Directory holding one subdirectory per world.
    pub saves_dir: PathBuf,
    pub world_name: String,
    /// Seed for a new world. `None` picks one from the clock. Ignored when
    /// the world already exists.
    pub seed: Option<u64>,
    /// Size of a new world in blocks.
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// Worker pools, queue sizes and timing for chunk streaming.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamingSettings {
    pub load_workers: usize,
    pub mesh_workers: usize,
    pub load_queue_capacity: usize,
    pub mesh_queue_capacity: usize,
    pub save_queue_capacity: usize,
    pub urgent_queue_capacity: usize,
    /// Non-urgent saves per second. 0 disables the limit.
    pub max_saves_per_second: usize,
    pub mesh_retry_limit: u32,
    pub stuck_timeout_ms: u64,
    pub idle_poll_ms: u64,
    pub shutdown_timeout_ms: u64,
    /// Chunks within this many chunks of the viewpoint are loaded.
    pub view_radius: u32,
    /// Chunks beyond this many chunks are unloaded.
    pub unload_radius: u32,
    pub use_mesh_cache: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level used when `RUST_LOG` is unset (e.g. "debug", "info").
    pub log_level: String,
    /// Also write JSON logs to a file in debug builds.
    pub log_to_file: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            saves_dir: default_saves_dir(),
            world_name: "world".to_string(),
            seed: None,
            width: 512,
            height: 128,
            depth: 512,
        }
    }
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            load_workers: 4,
            mesh_workers: 2,
            load_queue_capacity: 256,
            mesh_queue_capacity: 256,
            save_queue_capacity: 512,
            urgent_queue_capacity: 64,
            max_saves_per_second: 20,
            mesh_retry_limit: 3,
            stuck_timeout_ms: 10_000,
            idle_poll_ms: 2,
            shutdown_timeout_ms: 2_000,
            view_radius: 6,
            unload_radius: 8,
            use_mesh_cache: true,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: true,
        }
    }
}

impl WorldConfig {
    pub fn world_dir(&self) -> PathBuf {
        self.saves_dir.join(&self.world_name)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        let write_error = |source: std::io::Error| ConfigError::Write {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(config_dir).map_err(write_error)?;

        let pretty = ron::ser::PrettyConfig::new().depth_limit(3);
        let serialized = ron::ser::to_string_pretty(self, pretty)?;
        std::fs::write(&path, serialized).map_err(write_error)?;
        log::debug!("Saved config to {}", config_dir.display());
        Ok(())
    }

    /// Re-reads the file: `Some(new_config)` if it differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE))?;
        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.streaming;
        let counts = [
            ("streaming.load_workers", s.load_workers),
            ("streaming.mesh_workers", s.mesh_workers),
            ("streaming.load_queue_capacity", s.load_queue_capacity),
            ("streaming.mesh_queue_capacity", s.mesh_queue_capacity),
            ("streaming.save_queue_capacity", s.save_queue_capacity),
            ("streaming.urgent_queue_capacity", s.urgent_queue_capacity),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(invalid(field, "must be at least 1"));
            }
        }
        if s.mesh_retry_limit == 0 {
            return Err(invalid("streaming.mesh_retry_limit", "must be at least 1"));
        }
        if s.unload_radius < s.view_radius {
            return Err(invalid(
                "streaming.unload_radius",
                format!("{} is smaller than view_radius {}", s.unload_radius, s.view_radius),
            ));
        }

        let w = &self.world;
        if w.width == 0 || w.height == 0 || w.depth == 0 {
            return Err(invalid(
                "world",
                format!("size {}x{}x{} has an empty axis", w.width, w.height, w.depth),
            ));
        }
        if w.world_name.is_empty() || w.world_name.contains(&['/', '\\'][..]) {
            return Err(invalid("world.world_name", format!("{:?} is not a directory name", w.world_name)));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
