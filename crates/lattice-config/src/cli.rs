//! Command-line arguments for the `lattice` driver.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "lattice", about = "Headless voxel chunk streaming driver")]
pub struct CliArgs {
    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// World name to open or create.
    #[arg(long)]
    pub world: Option<String>,

    /// Seed for a newly created world.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Load radius in chunks.
    #[arg(long)]
    pub view_radius: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Number of simulated frames to run before shutting down.
    #[arg(long)]
    pub frames: Option<u32>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    ///
    /// A larger view radius drags the unload radius up with it.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref name) = args.world {
            self.world.world_name = name.clone();
        }
        if let Some(seed) = args.seed {
            self.world.seed = Some(seed);
        }
        if let Some(radius) = args.view_radius {
            self.streaming.view_radius = radius;
            self.streaming.unload_radius = self.streaming.unload_radius.max(radius);
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            world: Some("flatland".to_string()),
            seed: Some(42),
            view_radius: Some(12),
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.world.world_name, "flatland");
        assert_eq!(config.world.seed, Some(42));
        assert_eq!(config.streaming.view_radius, 12);
        assert_eq!(config.streaming.unload_radius, 12);
        // Non-overridden fields retain defaults
        assert_eq!(config.debug.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::parse_from(["lattice", "--seed", "1337", "--frames", "30", "--log-level", "debug"]);
        assert_eq!(args.seed, Some(1337));
        assert_eq!(args.frames, Some(30));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.world.is_none());
    }
}
